// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut

//! Clock conversion, power-on sequencing and pacing tests
//!
//! Rate assertions run the block at a synthetic host clock of twice the
//! internal unit rate, which makes every deadline land on an exact host
//! timestamp: one internal unit is exactly two host cycles.

use super::super::*;
use super::helpers::*;

/// Host clock giving exactly two cycles per internal drive unit
fn half_unit_ratio() -> u32 {
    clock_ratio_from_hz((2 * UNITS_PER_SECOND) as u32)
}

#[test]
fn test_clock_ratio_conversion() {
    // At or below the unit rate the ratio saturates to one unit per cycle.
    assert_eq!(clock_ratio_from_hz(UNITS_PER_SECOND as u32), u32::MAX);
    assert_eq!(clock_ratio_from_hz(0), u32::MAX);

    // Exact multiples of the unit rate convert without rounding.
    assert_eq!(half_unit_ratio(), 1 << 31);
    assert_eq!(clock_ratio_from_hz((4 * UNITS_PER_SECOND) as u32), 1 << 30);

    // The stock host clock runs the block below one unit per cycle.
    assert!(clock_ratio_from_hz(DEFAULT_HOST_CLOCK_HZ) < u32::MAX);
}

#[test]
fn test_power_on_delay_and_greeting() {
    let mut cdb = CdBlock::new();
    cdb.set_clock_ratio(half_unit_ratio());

    // One host cycle short of the boot delay
    cdb.update(9_759_999);
    assert!(!cdb.hirq.contains(Hirq::CMOK));

    cdb.update(9_760_000);
    assert!(cdb.hirq.contains(
        Hirq::CMOK
            | Hirq::DCHG
            | Hirq::ESEL
            | Hirq::EHST
            | Hirq::MPED
            | Hirq::ECPY
            | Hirq::EFLS
    ));
    // "CDBLOCK"
    assert_eq!(results(&cdb), [0x0043, 0x4442, 0x4C4F, 0x434B]);
}

#[test]
fn test_data_sectors_stream_at_double_speed() {
    let mut cdb = block_with_disc();
    cdb.set_clock_ratio(half_unit_ratio());
    step_until_ready(&mut cdb);
    ack_hirq(&mut cdb, Hirq::all());

    // Unauthenticated playback still reports each sector as it passes,
    // it just never admits one to the pool.
    run_command(&mut cdb, [0x1080, 150, 0x0080, 6]);
    let first = wait_hirq(&mut cdb, Hirq::CSCT);
    ack_hirq(&mut cdb, Hirq::CSCT);
    let second = wait_hirq(&mut cdb, Hirq::CSCT);
    assert_eq!(second - first, 2 * (UNITS_PER_SECOND / 150));

    wait_hirq(&mut cdb, Hirq::PEND);
    assert_eq!(cdb.pool.free_count(), NUM_BUFFERS as u8);
}

#[test]
fn test_pause_reports_follow_the_sector_cadence() {
    // Paused over a data track the pickup re-reads at 2x.
    let mut cdb = block_with_disc();
    cdb.set_clock_ratio(half_unit_ratio());
    step_until_ready(&mut cdb);

    ack_hirq(&mut cdb, Hirq::SCDQ);
    let first = wait_hirq(&mut cdb, Hirq::SCDQ);
    ack_hirq(&mut cdb, Hirq::SCDQ);
    let second = wait_hirq(&mut cdb, Hirq::SCDQ);
    assert_eq!(second - first, 2 * (UNITS_PER_SECOND / 150));

    // Over an audio track it re-reads at 1x.
    let mut cdb = block_with_audio_disc();
    cdb.set_clock_ratio(half_unit_ratio());
    step_until_ready(&mut cdb);

    ack_hirq(&mut cdb, Hirq::SCDQ);
    let first = wait_hirq(&mut cdb, Hirq::SCDQ);
    ack_hirq(&mut cdb, Hirq::SCDQ);
    let second = wait_hirq(&mut cdb, Hirq::SCDQ);
    assert_eq!(second - first, 2 * (UNITS_PER_SECOND / 75));
}

#[test]
fn test_periodic_report_waits_for_the_reader() {
    let mut cdb = block_with_disc();
    step_until_ready(&mut cdb);

    // The power-on greeting survives every refresh until it is consumed.
    assert_eq!(results(&cdb), [0x0043, 0x4442, 0x4C4F, 0x434B]);

    let mut words = [0u16; 4];
    for (i, w) in words.iter_mut().enumerate() {
        *w = cdb.read_register(0x6 + i as u32);
    }
    assert_eq!(words, [0x0043, 0x4442, 0x4C4F, 0x434B]);

    // Consuming the last word lets the next refresh claim the slot.
    ack_hirq(&mut cdb, Hirq::SCDQ);
    wait_hirq(&mut cdb, Hirq::SCDQ);
    assert_eq!(
        results(&cdb)[0] >> 8,
        u16::from(status::PAUSE | status::PERIODIC)
    );

    // A status request parks fresh words in the slot; refreshes hold off
    // again until they are read.
    run_command(&mut cdb, [0x0000, 0, 0, 0]);
    let direct = results(&cdb);
    assert_eq!(direct[0] >> 8, u16::from(status::PAUSE));

    ack_hirq(&mut cdb, Hirq::SCDQ);
    wait_hirq(&mut cdb, Hirq::SCDQ);
    ack_hirq(&mut cdb, Hirq::SCDQ);
    wait_hirq(&mut cdb, Hirq::SCDQ);
    assert_eq!(results(&cdb), direct);
}

#[test]
fn test_seek_time_grows_with_distance() {
    let elapsed = |target: u16| {
        let mut cdb = block_with_disc();
        cdb.set_clock_ratio(half_unit_ratio());
        step_until_ready(&mut cdb);
        ack_hirq(&mut cdb, Hirq::all());

        let start = run_command(&mut cdb, [0x1080, target, 0x0080, 1]);
        wait_hirq(&mut cdb, Hirq::PEND) - start
    };

    let near = elapsed(152);
    let far = elapsed(178);
    assert!(far > near, "far {far} near {near}");
}
