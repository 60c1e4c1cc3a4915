// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! End-to-end tests against the public register interface
//!
//! A small Saturn data disc is written to disk as a cue/bin pair, loaded
//! through the regular image loader and then driven the way host software
//! drives the real unit: boot, authenticate, walk the filesystem and pull
//! a file out through the transfer FIFO.

use ssrx::core::cdblock::{dec_to_bcd, status, Hirq, RAW_SECTOR_SIZE};
use ssrx::core::disc::LEADOUT_TRACK;
use ssrx::core::error::DiscError;
use ssrx::core::{CdBlock, DiscImage, DiscReader, StateSave};
use tempfile::Builder;

/// Sectors in the fixture image
const SECTORS: u32 = 24;

/// Root directory extent
const ROOT_LBA: u32 = 18;

/// "GAME.DAT;1", two sectors
const FILE_LBA: u32 = 19;
const FILE_SIZE: u32 = 4096;

/// Content byte at `offs` into the user data of `lba`
fn fill(lba: u32, offs: usize) -> u8 {
    (lba as usize * 31 + offs) as u8
}

/// Write one raw mode 1 sector: sync run, BCD header, 2048 payload bytes
fn put_sector(image: &mut [u8], lba: u32, payload: &[u8]) {
    let base = lba as usize * RAW_SECTOR_SIZE;
    let sec = &mut image[base..base + RAW_SECTOR_SIZE];

    sec.fill(0);
    sec[1..11].fill(0xFF);

    let fad = lba + 150;
    sec[12] = dec_to_bcd((fad / (60 * 75)) as u8);
    sec[13] = dec_to_bcd(((fad / 75) % 60) as u8);
    sec[14] = dec_to_bcd((fad % 75) as u8);
    sec[15] = 0x01;

    sec[16..16 + payload.len()].copy_from_slice(payload);
}

/// Build one ISO 9660 directory record
fn dir_record(lba: u32, size: u32, flags: u8, name: &[u8]) -> Vec<u8> {
    let len = 33 + (name.len() | 1);

    let mut rec = vec![0u8; len];
    rec[0] = len as u8;
    rec[2..6].copy_from_slice(&lba.to_le_bytes());
    rec[6..10].copy_from_slice(&lba.to_be_bytes());
    rec[10..14].copy_from_slice(&size.to_le_bytes());
    rec[14..18].copy_from_slice(&size.to_be_bytes());
    rec[25] = flags;
    rec[28] = 1;
    rec[31] = 1;
    rec[32] = name.len() as u8;
    rec[33..33 + name.len()].copy_from_slice(name);

    rec
}

/// Raw fixture image: boot identifier, volume descriptors, a root
/// directory holding one file, deterministic payload everywhere else
fn fixture_image() -> Vec<u8> {
    let mut image = vec![0u8; SECTORS as usize * RAW_SECTOR_SIZE];

    for lba in 0..SECTORS {
        let mut payload = [0u8; 2048];
        for (i, b) in payload.iter_mut().enumerate() {
            *b = fill(lba, i);
        }
        put_sector(&mut image, lba, &payload);
    }

    let mut boot = [0u8; 2048];
    boot[..16].copy_from_slice(b"SEGA SEGASATURN ");
    put_sector(&mut image, 0, &boot);

    let mut pvd = [0u8; 2048];
    pvd[0] = 0x01;
    pvd[1..6].copy_from_slice(b"CD001");
    pvd[6] = 0x01;
    let root = dir_record(ROOT_LBA, 2048, 0x02, &[0x00]);
    pvd[156..156 + root.len()].copy_from_slice(&root);
    put_sector(&mut image, 16, &pvd);

    let mut term = [0u8; 2048];
    term[0] = 0xFF;
    term[1..6].copy_from_slice(b"CD001");
    term[6] = 0x01;
    put_sector(&mut image, 17, &term);

    let records = [
        dir_record(ROOT_LBA, 2048, 0x02, &[0x00]),
        dir_record(ROOT_LBA, 2048, 0x02, &[0x01]),
        dir_record(FILE_LBA, FILE_SIZE, 0, b"GAME.DAT;1"),
    ];
    let mut dir = [0u8; 2048];
    let mut offs = 0;
    for rec in &records {
        dir[offs..offs + rec.len()].copy_from_slice(rec);
        offs += rec.len();
    }
    put_sector(&mut image, ROOT_LBA, &dir);

    image
}

/// Write the fixture as a cue/bin pair and load it back
///
/// The image is read fully into memory, so the temporary files may go
/// away once this returns.
fn fixture_disc() -> DiscImage {
    let bin_file = Builder::new()
        .prefix("ssrx_it_")
        .suffix(".bin")
        .tempfile()
        .unwrap();
    let bin_path = bin_file.path();
    let bin_name = bin_path.file_name().unwrap().to_str().unwrap();

    let cue_file = Builder::new()
        .prefix("ssrx_it_")
        .suffix(".cue")
        .tempfile()
        .unwrap();
    let cue_path = cue_file.path();

    let cue_content = format!(
        r#"FILE "{}" BINARY
  TRACK 01 MODE1/2352
    INDEX 01 00:00:00
"#,
        bin_name
    );
    std::fs::write(cue_path, cue_content).unwrap();
    std::fs::write(bin_path, fixture_image()).unwrap();

    DiscImage::load(cue_path.to_str().unwrap()).unwrap()
}

/// Issue one command through the registers and pump until it completes
fn run_cmd(cdb: &mut CdBlock, mut ts: i64, words: [u16; 4]) -> i64 {
    ts = cdb.write_register(ts, 0x2, !Hirq::CMOK.bits());
    ts = cdb.write_register(ts, 0x6, words[0]);
    ts = cdb.write_register(ts, 0x7, words[1]);
    ts = cdb.write_register(ts, 0x8, words[2]);
    ts = cdb.write_register(ts, 0x9, words[3]);
    for _ in 0..500_000 {
        ts = cdb.update(ts);
        if cdb.hirq().contains(Hirq::CMOK) {
            return ts;
        }
    }
    panic!("command 0x{:04X} was never acknowledged", words[0]);
}

/// Pump until all of `bits` are raised
fn wait_hirq(cdb: &mut CdBlock, mut ts: i64, bits: Hirq) -> i64 {
    for _ in 0..500_000 {
        ts = cdb.update(ts);
        if cdb.hirq().contains(bits) {
            return ts;
        }
    }
    panic!("{bits:?} never raised");
}

/// Acknowledge every interrupt status bit
fn ack_all(cdb: &mut CdBlock, ts: i64) -> i64 {
    cdb.write_register(ts, 0x2, 0)
}

/// Poll status until the drive rests in pause
fn wait_pause(cdb: &mut CdBlock, mut ts: i64) -> i64 {
    for _ in 0..10_000 {
        ts = run_cmd(cdb, ts, [0x0000, 0, 0, 0]);
        let r0 = cdb.read_register(0x6);
        let _ = cdb.read_register(0x9);
        if r0 >> 8 == u16::from(status::PAUSE) {
            return ts;
        }
    }
    panic!("drive never settled into pause");
}

/// Boot the block with the fixture disc: check the power-on greeting,
/// then wait out spin-up and the TOC read
fn booted_block() -> (CdBlock, i64) {
    let mut cdb = CdBlock::new();
    cdb.set_disc(false, Some(Box::new(fixture_disc())));

    let mut ts = 0;
    ts = wait_hirq(&mut cdb, ts, Hirq::CMOK);
    for (i, &word) in [0x0043u16, 0x4442, 0x4C4F, 0x434B].iter().enumerate() {
        assert_eq!(cdb.read_register(0x6 + i as u32), word, "greeting word {i}");
    }

    ts = wait_pause(&mut cdb, ts);
    (cdb, ts)
}

/// Authenticate the disc and buffer GAME.DAT into partition 0
fn block_with_buffered_file() -> (CdBlock, i64) {
    let (mut cdb, mut ts) = booted_block();

    ts = ack_all(&mut cdb, ts);
    ts = run_cmd(&mut cdb, ts, [0xE000, 0, 0, 0]);
    ts = wait_hirq(&mut cdb, ts, Hirq::EFLS);

    ts = run_cmd(&mut cdb, ts, [0x3000, 0, 0, 0]);

    ts = ack_all(&mut cdb, ts);
    ts = run_cmd(&mut cdb, ts, [0x7000, 0, 0x00FF, 0xFFFF]);
    ts = wait_hirq(&mut cdb, ts, Hirq::EFLS);

    ts = ack_all(&mut cdb, ts);
    ts = run_cmd(&mut cdb, ts, [0x7400, 0, 0, 2]);
    ts = wait_hirq(&mut cdb, ts, Hirq::EFLS);
    ts = wait_pause(&mut cdb, ts);

    (cdb, ts)
}

/// Drain the buffered file out of partition 0 and check every word
fn drain_and_verify_file(cdb: &mut CdBlock, mut ts: i64) -> i64 {
    ts = ack_all(cdb, ts);
    ts = run_cmd(cdb, ts, [0x6300, 0, 0, 0xFFFF]);
    let r0 = cdb.read_register(0x6);
    assert_ne!(r0 >> 8 & u16::from(status::DTREQ), 0);
    ts = wait_hirq(cdb, ts, Hirq::DRDY);

    let word_count = FILE_SIZE as usize / 2;
    for i in 0..word_count {
        let lba = FILE_LBA + (i / 1024) as u32;
        let offs = (i % 1024) * 2;
        let expect = u16::from_be_bytes([fill(lba, offs), fill(lba, offs + 1)]);
        assert_eq!(cdb.read_register(0x0), expect, "payload word {i}");
    }

    ts = run_cmd(cdb, ts, [0x0600, 0, 0, 0]);
    assert_eq!(cdb.read_register(0x7), word_count as u16);
    wait_hirq(cdb, ts, Hirq::EHST)
}

#[test]
fn test_cue_image_reports_the_layout() {
    let disc = fixture_disc();
    assert_eq!(disc.track_count(), 1);

    let toc = disc.read_toc();
    assert_eq!(toc.first_track, 1);
    assert_eq!(toc.last_track, 1);
    assert_eq!(toc.disc_type, 0x00);
    assert!(toc.tracks[1].valid);
    assert_eq!(toc.tracks[1].control, 0x4);
    assert_eq!(toc.tracks[1].lba, 0);
    assert_eq!(toc.tracks[LEADOUT_TRACK].lba, SECTORS);
}

#[test]
fn test_load_rejects_broken_images() {
    // A bin that is not a whole number of raw sectors
    let bin_file = Builder::new()
        .prefix("ssrx_it_")
        .suffix(".bin")
        .tempfile()
        .unwrap();
    let bin_name = bin_file.path().file_name().unwrap().to_str().unwrap();

    let cue_file = Builder::new()
        .prefix("ssrx_it_")
        .suffix(".cue")
        .tempfile()
        .unwrap();

    let cue_content = format!(
        r#"FILE "{}" BINARY
  TRACK 01 MODE1/2352
    INDEX 01 00:00:00
"#,
        bin_name
    );
    std::fs::write(cue_file.path(), &cue_content).unwrap();
    std::fs::write(bin_file.path(), vec![0u8; RAW_SECTOR_SIZE + 1]).unwrap();

    let err = DiscImage::load(cue_file.path().to_str().unwrap()).unwrap_err();
    assert!(matches!(err, DiscError::MisalignedData { .. }));

    // A cue sheet without a FILE directive
    std::fs::write(cue_file.path(), "TRACK 01 MODE1/2352\n").unwrap();
    let err = DiscImage::load(cue_file.path().to_str().unwrap()).unwrap_err();
    assert!(matches!(err, DiscError::MissingFileDirective));
}

#[test]
fn test_full_read_session() {
    let (mut cdb, mut ts) = booted_block();

    // Native disc authentication runs the boot-area check
    ts = ack_all(&mut cdb, ts);
    ts = run_cmd(&mut cdb, ts, [0xE000, 0, 0, 0]);
    ts = wait_hirq(&mut cdb, ts, Hirq::EFLS);
    ts = run_cmd(&mut cdb, ts, [0xE100, 0, 0, 0]);
    assert_eq!(cdb.read_register(0x7), 0x0004);

    ts = run_cmd(&mut cdb, ts, [0x3000, 0, 0, 0]);

    // Walk the root directory and inspect the published window
    ts = ack_all(&mut cdb, ts);
    ts = run_cmd(&mut cdb, ts, [0x7000, 0, 0x00FF, 0xFFFF]);
    ts = wait_hirq(&mut cdb, ts, Hirq::EFLS);

    ts = run_cmd(&mut cdb, ts, [0x7200, 0, 0, 0]);
    assert_eq!(cdb.read_register(0x7), 1);
    assert_eq!(cdb.read_register(0x8), 0x0100);
    assert_eq!(cdb.read_register(0x9), 2);

    ts = ack_all(&mut cdb, ts);
    ts = run_cmd(&mut cdb, ts, [0x7300, 0, 0, 2]);
    assert_eq!(cdb.read_register(0x7), 6);
    ts = wait_hirq(&mut cdb, ts, Hirq::DRDY);
    let info: Vec<u16> = (0..6).map(|_| cdb.read_register(0x0)).collect();
    assert_eq!(
        info,
        [0, (150 + FILE_LBA) as u16, 0, FILE_SIZE as u16, 0, 0]
    );
    ts = run_cmd(&mut cdb, ts, [0x0600, 0, 0, 0]);

    // Pull the file itself through the FIFO
    ts = ack_all(&mut cdb, ts);
    ts = run_cmd(&mut cdb, ts, [0x7400, 0, 0, 2]);
    ts = wait_hirq(&mut cdb, ts, Hirq::EFLS);
    ts = wait_pause(&mut cdb, ts);

    drain_and_verify_file(&mut cdb, ts);
}

#[test]
fn test_save_state_resumes_the_transfer() {
    let (cdb, ts) = block_with_buffered_file();
    let state = cdb.to_state();

    // A fresh block picks the session up from the snapshot
    let mut restored = CdBlock::new();
    restored.set_disc(false, Some(Box::new(fixture_disc())));
    restored.restore_from_state(&state).unwrap();
    assert_eq!(restored.hirq(), cdb.hirq());

    drain_and_verify_file(&mut restored, ts);
}
