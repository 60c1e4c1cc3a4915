// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut

//! Synthetic discs and driver-style helpers shared by the CD block tests
//!
//! The data disc built here is a minimal but structurally honest Saturn
//! disc: boot area with the console identifier, an ISO 9660 volume
//! descriptor set, a root directory with two files and a subdirectory,
//! and deterministic payload bytes everywhere else so transferred data
//! can be checked without carrying expected buffers around.

use super::super::*;
use crate::core::disc::{DiscImage, DiscReader, Track, TrackType};

/// Sectors in the synthetic data disc
pub const TEST_SECTORS: u32 = 30;

/// Root directory extent
pub const ROOT_DIR_LBA: u32 = 18;

/// "A.TXT;1", three sectors, carries an XA system use area
pub const FILE_A_LBA: u32 = 19;
pub const FILE_A_SIZE: u32 = 6000;

/// "B.BIN;1", two sectors, plain record
pub const FILE_B_LBA: u32 = 22;
pub const FILE_B_SIZE: u32 = 4096;

/// "SUB", directory holding C.DAT
pub const SUB_DIR_LBA: u32 = 24;

/// "C.DAT;1", single short extent
pub const FILE_C_LBA: u32 = 25;
pub const FILE_C_SIZE: u32 = 100;

/// Content byte at `offs` into the user data of `lba`
pub fn payload_byte(lba: u32, offs: usize) -> u8 {
    ((lba as usize * 2048 + offs) % 251) as u8
}

/// Write one raw mode 1 sector: sync run, BCD header, 2048 payload bytes
pub fn put_sector(image: &mut [u8], lba: u32, payload: &[u8]) {
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
///
/// `xa` appends a system use area carrying the given attribute and file
/// number bytes.
pub fn dir_record(lba: u32, size: u32, flags: u8, name: &[u8], xa: Option<(u8, u8)>) -> Vec<u8> {
    let su_offs = 33 + (name.len() | 1);
    let len = su_offs + if xa.is_some() { 14 } else { 0 };

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

    if let Some((attr, file_num)) = xa {
        let su = &mut rec[su_offs..];
        su[4] = attr;
        su[6] = b'X';
        su[7] = b'A';
        su[8] = file_num;
    }

    rec
}

/// Pack directory records into one sector payload, zero padded
fn dir_payload(records: &[Vec<u8>]) -> [u8; 2048] {
    let mut payload = [0u8; 2048];
    let mut offs = 0;
    for rec in records {
        payload[offs..offs + rec.len()].copy_from_slice(rec);
        offs += rec.len();
    }
    payload
}

/// Raw image behind [`test_disc`]
///
/// LBA 0 carries the boot identifier, 16 the primary volume descriptor,
/// 17 the set terminator, 18 the root directory and 24 the subdirectory.
/// Every other payload byte follows [`payload_byte`].
pub fn test_image() -> Vec<u8> {
    let mut image = vec![0u8; TEST_SECTORS as usize * RAW_SECTOR_SIZE];

    for lba in 0..TEST_SECTORS {
        let mut payload = [0u8; 2048];
        for (i, b) in payload.iter_mut().enumerate() {
            *b = payload_byte(lba, i);
        }
        put_sector(&mut image, lba, &payload);
    }

    let mut boot = [0u8; 2048];
    for (i, b) in boot.iter_mut().enumerate() {
        *b = payload_byte(0, i);
    }
    boot[..16].copy_from_slice(b"SEGA SEGASATURN ");
    put_sector(&mut image, 0, &boot);

    let mut pvd = [0u8; 2048];
    pvd[0] = 0x01;
    pvd[1..6].copy_from_slice(b"CD001");
    pvd[6] = 0x01;
    let root = dir_record(ROOT_DIR_LBA, 2048, FileRecord::ATTR_DIR, &[0x00], None);
    pvd[156..156 + root.len()].copy_from_slice(&root);
    put_sector(&mut image, 16, &pvd);

    let mut term = [0u8; 2048];
    term[0] = 0xFF;
    term[1..6].copy_from_slice(b"CD001");
    term[6] = 0x01;
    put_sector(&mut image, 17, &term);

    let root_dir = [
        dir_record(ROOT_DIR_LBA, 2048, FileRecord::ATTR_DIR, &[0x00], None),
        dir_record(ROOT_DIR_LBA, 2048, FileRecord::ATTR_DIR, &[0x01], None),
        dir_record(
            FILE_A_LBA,
            FILE_A_SIZE,
            0,
            b"A.TXT;1",
            Some((FileRecord::ATTR_XA_MODE2_FORM1, 0)),
        ),
        dir_record(FILE_B_LBA, FILE_B_SIZE, 0, b"B.BIN;1", None),
        dir_record(SUB_DIR_LBA, 2048, FileRecord::ATTR_DIR, b"SUB", None),
    ];
    put_sector(&mut image, ROOT_DIR_LBA, &dir_payload(&root_dir));

    let sub_dir = [
        dir_record(SUB_DIR_LBA, 2048, FileRecord::ATTR_DIR, &[0x00], None),
        dir_record(ROOT_DIR_LBA, 2048, FileRecord::ATTR_DIR, &[0x01], None),
        dir_record(FILE_C_LBA, FILE_C_SIZE, 0, b"C.DAT;1", None),
    ];
    put_sector(&mut image, SUB_DIR_LBA, &dir_payload(&sub_dir));

    image
}

fn single_data_track() -> Track {
    Track {
        number: 1,
        track_type: TrackType::Mode1_2352,
        start_lba: 0,
        length_sectors: 0,
        file_offset: 0,
    }
}

/// Bootable Saturn data disc used by most tests
pub fn test_disc() -> Box<dyn DiscReader> {
    Box::new(DiscImage::from_parts(vec![single_data_track()], test_image()).unwrap())
}

/// Data disc without the boot identifier
#[allow(dead_code)]
pub fn plain_data_disc() -> Box<dyn DiscReader> {
    let mut image = test_image();
    for i in 0..16 {
        image[16 + i] = payload_byte(0, i);
    }
    Box::new(DiscImage::from_parts(vec![single_data_track()], image).unwrap())
}

/// Ten-sector audio-only disc with counting sample bytes
#[allow(dead_code)]
pub fn audio_disc() -> Box<dyn DiscReader> {
    let mut image = vec![0u8; 10 * RAW_SECTOR_SIZE];
    for (i, b) in image.iter_mut().enumerate() {
        *b = i as u8;
    }
    let track = Track {
        number: 1,
        track_type: TrackType::Audio,
        start_lba: 0,
        length_sectors: 0,
        file_offset: 0,
    };
    Box::new(DiscImage::from_parts(vec![track], image).unwrap())
}

/// Fresh block with the synthetic data disc in the tray
pub fn block_with_disc() -> CdBlock {
    let mut cdb = CdBlock::new();
    cdb.set_disc(false, Some(test_disc()));
    cdb
}

/// Fresh block with the audio disc in the tray
#[allow(dead_code)]
pub fn block_with_audio_disc() -> CdBlock {
    let mut cdb = CdBlock::new();
    cdb.set_disc(false, Some(audio_disc()));
    cdb
}

/// Run the block until the drive rests in pause
///
/// Works both for the initial boot and for settling after a seek or
/// play command. Returns the timestamp the pause was observed at.
pub fn step_until_ready(cdb: &mut CdBlock) -> i64 {
    let mut ts = cdb.last_ts;
    for _ in 0..200_000 {
        ts = cdb.update(ts);
        if cdb.drive_phase == DrivePhase::Pause && cdb.pos.status == status::PAUSE {
            return ts;
        }
    }
    panic!("drive never settled into pause");
}

/// Issue one command and run until the processor acknowledges it
///
/// The command-complete bit is acknowledged before the write so the
/// wait below observes this command's completion, not a stale one.
pub fn run_command(cdb: &mut CdBlock, words: [u16; 4]) -> i64 {
    let mut ts = cdb.last_ts;
    ts = cdb.write_register(ts, 0x2, !Hirq::CMOK.bits());
    ts = cdb.write_register(ts, 0x6, words[0]);
    ts = cdb.write_register(ts, 0x7, words[1]);
    ts = cdb.write_register(ts, 0x8, words[2]);
    ts = cdb.write_register(ts, 0x9, words[3]);

    for _ in 0..200_000 {
        ts = cdb.update(ts);
        if cdb.hirq.contains(Hirq::CMOK) {
            return ts;
        }
    }
    panic!("command 0x{:04X} was never acknowledged", words[0]);
}

/// Result words as they stand, without marking them consumed
pub fn results(cdb: &CdBlock) -> [u16; 4] {
    cdb.results
}

/// Whether the result words report a rejected command
#[allow(dead_code)]
pub fn rejected(res: [u16; 4]) -> bool {
    res[0] >> 8 == u16::from(status::REJECTED)
}

/// Run until all of `bits` are raised
pub fn wait_hirq(cdb: &mut CdBlock, bits: Hirq) -> i64 {
    let mut ts = cdb.last_ts;
    for _ in 0..500_000 {
        ts = cdb.update(ts);
        if cdb.hirq.contains(bits) {
            return ts;
        }
    }
    panic!("{bits:?} never raised");
}

/// Acknowledge interrupt status bits
pub fn ack_hirq(cdb: &mut CdBlock, bits: Hirq) {
    let ts = cdb.last_ts;
    cdb.write_register(ts, 0x2, !bits.bits());
}

/// Drain `count` words from the transfer FIFO
#[allow(dead_code)]
pub fn drain_words(cdb: &mut CdBlock, count: usize) -> Vec<u16> {
    (0..count).map(|_| cdb.read_register(0x0)).collect()
}
