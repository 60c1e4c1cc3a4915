// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut

//! Data transfer engine, virtual sources and buffer hand-off tests

use super::super::*;
use super::helpers::*;

/// Authenticate, route the drive to filter 0 and buffer `numsec` sectors
/// from the start of B.BIN into partition 0
fn loaded_block(numsec: u16) -> CdBlock {
    let mut cdb = block_with_disc();
    step_until_ready(&mut cdb);

    run_command(&mut cdb, [0xE000, 0, 0, 0]);
    wait_hirq(&mut cdb, Hirq::EFLS);
    run_command(&mut cdb, [0x3000, 0, 0, 0]);
    step_until_ready(&mut cdb);

    let start = (150 + FILE_B_LBA) as u16;
    run_command(&mut cdb, [0x1080, start, 0x0080, numsec]);
    wait_hirq(&mut cdb, Hirq::PEND);
    step_until_ready(&mut cdb);
    ack_hirq(&mut cdb, Hirq::all());

    assert_eq!(cdb.pool.partition(0).count, numsec as u8);
    cdb
}

/// Expected word `i` of a read-out of B.BIN sectors in 2048-byte mode
fn file_b_word(i: usize) -> u16 {
    let lba = FILE_B_LBA + (i / 1024) as u32;
    let offs = (i % 1024) * 2;
    u16::from_be_bytes([payload_byte(lba, offs), payload_byte(lba, offs + 1)])
}

#[test]
fn test_read_layout_follows_the_sector_form() {
    let mut sec = [0u8; RAW_SECTOR_SIZE];

    sec[15] = 0x01;
    assert_eq!(SectorLength::Data2048.read_layout(&sec), (8, 1024));

    sec[15] = 0x02;
    assert_eq!(SectorLength::Data2048.read_layout(&sec), (12, 1024));

    // Form 2 bit in the subheader switches to the long payload
    sec[18] = 0x20;
    assert_eq!(SectorLength::Data2048.read_layout(&sec), (12, 1162));

    assert_eq!(SectorLength::Data2336.read_layout(&sec), (8, 1168));
    assert_eq!(SectorLength::Data2340.read_layout(&sec), (6, 1170));
    assert_eq!(SectorLength::Data2352.read_layout(&sec), (0, 1176));
}

#[test]
fn test_write_layout_is_fixed_per_mode() {
    assert_eq!(SectorLength::Data2048.write_layout(), (12, 1024));
    assert_eq!(SectorLength::Data2336.write_layout(), (8, 1168));
    assert_eq!(SectorLength::Data2340.write_layout(), (6, 1170));
    assert_eq!(SectorLength::Data2352.write_layout(), (0, 1176));
}

#[test]
fn test_toc_transfer() {
    let mut cdb = block_with_disc();
    step_until_ready(&mut cdb);
    ack_hirq(&mut cdb, Hirq::all());

    run_command(&mut cdb, [0x0200, 0, 0, 0]);
    let res = results(&cdb);
    assert_eq!(res[0] >> 8, u16::from(status::PAUSE | status::DTREQ));
    assert_eq!(res[1], 0xCC);
    wait_hirq(&mut cdb, Hirq::DRDY);

    let words = drain_words(&mut cdb, 0xCC);

    // Track 1: data control/adr, start at FAD 150
    assert_eq!(words[0], 0x4100);
    assert_eq!(words[1], 150);
    // Unrecorded tracks 2-99
    for (i, &w) in words[2..198].iter().enumerate() {
        assert_eq!(w, 0xFFFF, "toc word {}", i + 2);
    }
    // A0: first track and disc type, A1: last track
    assert_eq!(words[198], 0x4101);
    assert_eq!(words[199], 0x0000);
    assert_eq!(words[200], 0x4101);
    assert_eq!(words[201], 0x0000);
    // Lead-out point
    assert_eq!(words[202], 0x4100);
    assert_eq!(words[203], 150 + TEST_SECTORS as u16);

    // The session stays open until end-transfer, deferring new requests
    run_command(&mut cdb, [0x0200, 0, 0, 0]);
    assert_ne!(results(&cdb)[0] >> 8 & u16::from(status::WAIT), 0);

    run_command(&mut cdb, [0x0600, 0, 0, 0]);
    let res = results(&cdb);
    assert_eq!(res[0] & 0xFF, 0);
    assert_eq!(res[1], 0xCC);
    // A virtual source hands no buffers back
    assert!(!cdb.hirq.contains(Hirq::EHST));
    assert!(!cdb.dt.active);
}

#[test]
fn test_subcode_q_transfer() {
    let mut cdb = block_with_disc();
    step_until_ready(&mut cdb);

    // Let one periodic refresh the snapshot at the paused position
    ack_hirq(&mut cdb, Hirq::SCDQ);
    wait_hirq(&mut cdb, Hirq::SCDQ);
    ack_hirq(&mut cdb, Hirq::all());

    run_command(&mut cdb, [0x2000, 0, 0, 0]);
    let res = results(&cdb);
    assert_eq!(res[0] >> 8, u16::from(status::PAUSE | status::DTREQ));
    assert_eq!(res[1], 5);
    wait_hirq(&mut cdb, Hirq::DRDY);

    let q = cdb.subcode.q_snapshot;
    let words = drain_words(&mut cdb, 5);
    for (i, &w) in words.iter().enumerate() {
        assert_eq!(w, u16::from_be_bytes([q[2 * i], q[2 * i + 1]]));
    }
    // Paused over track 1 of a data disc
    assert_eq!(words[0], 0x4101);

    run_command(&mut cdb, [0x0600, 0, 0, 0]);
    assert_eq!(results(&cdb)[1], 5);
}

#[test]
fn test_subcode_rw_transfer_is_unimplemented_ones() {
    let mut cdb = block_with_disc();
    step_until_ready(&mut cdb);
    ack_hirq(&mut cdb, Hirq::all());

    run_command(&mut cdb, [0x2001, 0, 0, 0]);
    assert_eq!(results(&cdb)[1], 12);
    wait_hirq(&mut cdb, Hirq::DRDY);

    for w in drain_words(&mut cdb, 12) {
        assert_eq!(w, 0xFFFF);
    }
    run_command(&mut cdb, [0x0600, 0, 0, 0]);

    // Unknown subcode types are refused
    run_command(&mut cdb, [0x2002, 0, 0, 0]);
    assert!(rejected(results(&cdb)));
}

#[test]
fn test_get_sector_data_streams_buffered_payload() {
    let mut cdb = loaded_block(2);

    run_command(&mut cdb, [0x6100, 0, 0, 0xFFFF]);
    let res = results(&cdb);
    assert_ne!(res[0] >> 8 & u16::from(status::DTREQ), 0);
    // The FIFO is primed ahead of the first host read
    assert_eq!(cdb.dt.fifo_len, 5);
    wait_hirq(&mut cdb, Hirq::DRDY);

    // Another data request defers while the session is open
    run_command(&mut cdb, [0x6100, 0, 0, 1]);
    assert_ne!(results(&cdb)[0] >> 8 & u16::from(status::WAIT), 0);

    let words = drain_words(&mut cdb, 2 * 1024);
    for (i, &w) in words.iter().enumerate() {
        assert_eq!(w, file_b_word(i), "payload word {i}");
    }

    // Get without delete leaves the partition intact
    run_command(&mut cdb, [0x0600, 0, 0, 0]);
    let res = results(&cdb);
    assert_eq!(res[0] & 0xFF, 0);
    assert_eq!(res[1], 2048);
    wait_hirq(&mut cdb, Hirq::EHST);
    assert_eq!(cdb.pool.partition(0).count, 2);
    assert_eq!(cdb.pool.free_count(), NUM_BUFFERS as u8 - 2);
}

#[test]
fn test_raw_sector_length_includes_sync_and_header() {
    let mut cdb = loaded_block(1);

    run_command(&mut cdb, [0x6003, 0xFF00, 0, 0]);
    run_command(&mut cdb, [0x6100, 0, 0, 1]);
    wait_hirq(&mut cdb, Hirq::DRDY);

    let words = drain_words(&mut cdb, 1176);

    // Sync run, then the BCD header of FAD 172 and the mode byte
    assert_eq!(words[0], 0x00FF);
    for &w in &words[1..5] {
        assert_eq!(w, 0xFFFF);
    }
    assert_eq!(words[5], 0xFF00);
    assert_eq!(words[6], 0x0002);
    assert_eq!(words[7], 0x2201);
    assert_eq!(
        words[8],
        u16::from_be_bytes([payload_byte(FILE_B_LBA, 0), payload_byte(FILE_B_LBA, 1)])
    );

    run_command(&mut cdb, [0x0600, 0, 0, 0]);
    assert_eq!(results(&cdb)[1], 1176);
}

#[test]
fn test_get_then_delete_frees_at_end_transfer() {
    let mut cdb = loaded_block(2);

    run_command(&mut cdb, [0x6300, 0, 0, 0xFFFF]);
    wait_hirq(&mut cdb, Hirq::DRDY);

    // Unlinked up front, freed only when the host is done
    assert_eq!(cdb.pool.partition(0).count, 0);
    assert_eq!(cdb.pool.free_count(), NUM_BUFFERS as u8 - 2);

    let words = drain_words(&mut cdb, 2 * 1024);
    for (i, &w) in words.iter().enumerate() {
        assert_eq!(w, file_b_word(i), "payload word {i}");
    }

    run_command(&mut cdb, [0x0600, 0, 0, 0]);
    wait_hirq(&mut cdb, Hirq::EHST);
    assert_eq!(cdb.pool.free_count(), NUM_BUFFERS as u8);
}

#[test]
fn test_delete_sector_data_frees_immediately() {
    let mut cdb = loaded_block(2);

    run_command(&mut cdb, [0x6200, 0, 0, 0xFFFF]);
    let res = results(&cdb);
    assert_eq!(res[0] >> 8 & u16::from(status::DTREQ), 0);
    assert!(!cdb.dt.active);
    assert_eq!(cdb.pool.partition(0).count, 0);
    assert_eq!(cdb.pool.free_count(), NUM_BUFFERS as u8);

    wait_hirq(&mut cdb, Hirq::EHST);
}

#[test]
fn test_put_sector_data_routes_at_end_transfer() {
    let mut cdb = block_with_disc();
    step_until_ready(&mut cdb);
    ack_hirq(&mut cdb, Hirq::all());

    // An empty request defers
    run_command(&mut cdb, [0x6400, 0, 0, 0]);
    assert_ne!(results(&cdb)[0] >> 8 & u16::from(status::WAIT), 0);

    run_command(&mut cdb, [0x6400, 0, 0, 2]);
    assert_ne!(results(&cdb)[0] >> 8 & u16::from(status::DTREQ), 0);
    assert_eq!(cdb.pool.free_count(), NUM_BUFFERS as u8 - 2);
    let mut ts = wait_hirq(&mut cdb, Hirq::DRDY);

    // The port reads back nothing while the direction is host-to-buffer
    assert_eq!(cdb.read_register(0x0), 0);

    for i in 0..2 * 1024u16 {
        ts = cdb.write_register(ts, 0x0, 0x1000 | i);
    }

    ack_hirq(&mut cdb, Hirq::all());
    run_command(&mut cdb, [0x0600, 0, 0, 0]);
    let res = results(&cdb);
    assert_eq!(res[0] & 0xFF, 0);
    assert_eq!(res[1], 2048);
    wait_hirq(&mut cdb, Hirq::EHST);

    // Both sectors landed behind filter 0's true output
    assert_eq!(cdb.pool.partition(0).count, 2);
    let bufs: Vec<u8> = cdb.pool.iter_partition(0).collect();
    for (n, &index) in bufs.iter().enumerate() {
        let data = cdb.pool.data(index);
        let first = 0x1000 | (n as u16 * 1024);
        assert_eq!(data[24], (first >> 8) as u8);
        assert_eq!(data[25], first as u8);
        assert_eq!(data[26], (first >> 8) as u8);
        assert_eq!(data[27], first as u8 + 1);
    }
}

#[test]
fn test_copy_duplicates_and_move_relinks() {
    let mut cdb = loaded_block(2);

    // Oversized span defers
    run_command(&mut cdb, [0x6501, 0, 0, 5]);
    assert_ne!(results(&cdb)[0] >> 8 & u16::from(status::WAIT), 0);

    run_command(&mut cdb, [0x6501, 0, 0, 0xFFFF]);
    wait_hirq(&mut cdb, Hirq::ECPY);
    assert_eq!(cdb.pool.partition(0).count, 2);
    assert_eq!(cdb.pool.partition(1).count, 2);
    assert_eq!(cdb.pool.free_count(), NUM_BUFFERS as u8 - 4);

    let src: Vec<u8> = cdb.pool.iter_partition(0).collect();
    let dup: Vec<u8> = cdb.pool.iter_partition(1).collect();
    assert_eq!(cdb.pool.data(src[0]), cdb.pool.data(dup[0]));
    assert_eq!(cdb.pool.data(src[1]), cdb.pool.data(dup[1]));

    ack_hirq(&mut cdb, Hirq::all());

    // Move allocates nothing, it relinks the same buffers
    run_command(&mut cdb, [0x6602, 0, 0x0100, 0xFFFF]);
    wait_hirq(&mut cdb, Hirq::ECPY);
    assert_eq!(cdb.pool.partition(1).count, 0);
    assert_eq!(cdb.pool.partition(2).count, 2);
    assert_eq!(cdb.pool.free_count(), NUM_BUFFERS as u8 - 4);

    run_command(&mut cdb, [0x6700, 0, 0, 0]);
    let res = results(&cdb);
    assert_eq!(res[0] & 0xFF, 0);
    assert_eq!(res[1], 0);
}

#[test]
fn test_end_transfer_without_a_session() {
    let mut cdb = block_with_disc();
    step_until_ready(&mut cdb);
    ack_hirq(&mut cdb, Hirq::all());

    assert_eq!(cdb.read_register(0x0), 0);

    run_command(&mut cdb, [0x0600, 0, 0, 0]);
    let res = results(&cdb);
    assert_eq!(res[0] & 0xFF, 0xFF);
    assert_eq!(res[1], 0xFFFF);
    assert!(!cdb.hirq.contains(Hirq::EHST));
}
