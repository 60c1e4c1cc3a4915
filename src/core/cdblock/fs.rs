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

//! Resumable ISO 9660 walker
//!
//! Services disc authentication and directory reads on behalf of the command
//! processor. A request owns one partition for its whole duration: the walker
//! points the device connection and one filter at the wanted address range,
//! seeks the drive, then consumes sectors out of the partition as they land.
//! Whenever the next byte is not buffered yet the walker returns to the
//! caller with its phase recorded, and the next pass resumes from exactly
//! that byte, so command servicing is never blocked behind disc latency.

use super::buffers::NUM_PARTITIONS;
use super::filter::{Filter, NO_FILTER};
use super::{CdBlock, Hirq};

/// User data bytes taken from each delivered sector
pub const PAYLOAD_SIZE: usize = 2048;

/// Identifier at the start of the boot sector of an authentic disc
const BOOT_ID: &[u8; 16] = b"SEGA SEGASATURN ";

/// Standard identifier carried by every ISO 9660 volume descriptor
const ISO_STANDARD_ID: &[u8; 5] = b"CD001";

/// Walker phase, persisted across yields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkPhase {
    /// No request in flight
    Idle,
    /// Waiting for the boot sector during authentication
    AuthRead,
    /// Waiting for the next volume descriptor sector
    DescriptorRead,
    /// Waiting for a directory record's length byte
    RecordLength,
    /// Waiting for the remainder of a directory record
    RecordBody,
}

impl WalkPhase {
    pub fn code(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::AuthRead => 1,
            Self::DescriptorRead => 2,
            Self::RecordLength => 3,
            Self::RecordBody => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Idle),
            1 => Some(Self::AuthRead),
            2 => Some(Self::DescriptorRead),
            3 => Some(Self::RecordLength),
            4 => Some(Self::RecordBody),
            _ => None,
        }
    }
}

/// One parsed directory record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute frame address of the extent
    pub fad: u32,

    /// Extent size in bytes
    pub size: u32,

    /// Interleave unit size
    pub unit_size: u8,

    /// Interleave gap size
    pub gap_size: u8,

    /// Coding file number from the XA extension
    pub file_num: u8,

    /// Attribute flags, see the `ATTR_*` constants
    pub attr: u8,
}

impl FileRecord {
    /// Entry is a directory
    pub const ATTR_DIR: u8 = 0x02;
    /// Extent holds mode 2 form 1 sectors
    pub const ATTR_XA_MODE2_FORM1: u8 = 0x08;
    /// Extent holds mode 2 form 2 sectors
    pub const ATTR_XA_MODE2_FORM2: u8 = 0x10;
    /// Extent is XA interleaved
    pub const ATTR_XA_INTERLEAVED: u8 = 0x20;
    /// Extent is CD-DA audio
    pub const ATTR_XA_CDDA: u8 = 0x40;
    /// Directory flag from the XA extension
    pub const ATTR_XA_DIR: u8 = 0x80;

    /// Decode a raw ISO 9660 directory record
    ///
    /// `rr` must hold at least 256 bytes. A record whose declared length
    /// exceeds its real size reads into the adjacent bytes, which is what the
    /// drive firmware does as well.
    pub fn parse(rr: &[u8]) -> Self {
        let rec_len = i32::from(rr[0]);
        let fi_len = i32::from(rr[32]);

        let mut rec = Self {
            fad: u32::from_be_bytes([rr[6], rr[7], rr[8], rr[9]]).wrapping_add(150),
            size: u32::from_be_bytes([rr[14], rr[15], rr[16], rr[17]]),
            unit_size: rr[26],
            gap_size: rr[27],
            file_num: 0,
            attr: rr[25] & Self::ATTR_DIR,
        };

        // XA system use area, padded to start on an even offset.
        let su_offs = 33 + (fi_len | 1);
        let su_len = rec_len - su_offs;

        if su_len >= 14 && su_offs + su_len <= 256 {
            let su = &rr[su_offs as usize..];
            if su[6] == b'X' && su[7] == b'A' {
                rec.attr |= su[4] & 0xF8;
                rec.file_num = su[8];
            }
        }

        rec
    }
}

/// Filesystem walker state
///
/// Holds both the in-flight request (phase, byte counters, partial record)
/// and the results it produces: the record window handed out by the
/// file-info commands, and the cached root directory record.
pub struct FsWalker {
    /// Current phase; `Idle` unless a request is in flight
    pub(super) phase: WalkPhase,

    /// A request has been accepted and not yet completed
    pub(super) active: bool,

    /// The request is an authentication, not a directory read
    pub(super) do_auth: bool,

    /// Cooperative cancel flag, honored on the next run
    pub(super) abort: bool,

    /// Partition (and filter) owned by the request
    pub(super) pnum: u8,

    /// First record index the window should start at
    pub(super) first_index: u32,

    /// Directory to read: window slot, or >= 256 for the root
    pub(super) dir_entry: u32,

    /// User data of the sector being consumed
    pub(super) payload: [u8; PAYLOAD_SIZE],

    /// Next unread byte of `payload`; 0 means a fresh sector is needed
    pub(super) payload_offs: u32,

    /// Bytes of the current record body already read
    pub(super) body_pos: u32,

    /// Directory bytes consumed so far
    pub(super) bytes_read: u32,

    /// Directory extent size in bytes
    pub(super) bytes_total: u32,

    /// Raw bytes of the record being assembled
    pub(super) record: [u8; 256],

    /// Index of the record being assembled within the directory
    pub(super) record_num: u32,

    /// Parsed records: slots 0 and 1 are self/parent, 2.. the window
    pub(super) records: [FileRecord; 256],

    /// The record window reflects a completed directory read
    pub(super) records_valid: bool,

    /// Directory index of the first windowed record
    pub(super) window_base: u32,

    /// Number of records held in the window
    pub(super) window_count: u8,

    /// The directory continues past the window
    pub(super) window_more: bool,

    /// Root directory record from the primary volume descriptor
    pub(super) root: FileRecord,

    /// `root` has been read from this disc
    pub(super) root_valid: bool,
}

impl FsWalker {
    pub fn new() -> Self {
        Self {
            phase: WalkPhase::Idle,
            active: false,
            do_auth: false,
            abort: false,
            pnum: 0,
            first_index: 0,
            dir_entry: 0,
            payload: [0; PAYLOAD_SIZE],
            payload_offs: 0,
            body_pos: 0,
            bytes_read: 0,
            bytes_total: 0,
            record: [0; 256],
            record_num: 0,
            records: [FileRecord::default(); 256],
            records_valid: false,
            window_base: 0,
            window_count: 0,
            window_more: false,
            root: FileRecord::default(),
            root_valid: false,
        }
    }

    /// Drop any request in flight and invalidate the cached filesystem info
    ///
    /// Record window and root record contents are retained; only their
    /// validity is withdrawn.
    pub fn reset(&mut self) {
        self.phase = WalkPhase::Idle;
        self.active = false;
        self.do_auth = false;
        self.abort = false;
        self.pnum = 0;
        self.first_index = 0;
        self.dir_entry = 0;
        self.payload = [0; PAYLOAD_SIZE];
        self.payload_offs = 0;
        self.body_pos = 0;
        self.bytes_read = 0;
        self.bytes_total = 0;
        self.record = [0; 256];
        self.record_num = 0;
        self.records_valid = false;
        self.root_valid = false;
    }

    /// Big-endian word of the packed record window, as the transfer engine
    /// streams it
    ///
    /// Each record occupies six words: address, size, interleave parameters,
    /// file number and attributes.
    pub(super) fn record_table_word(&self, word_offs: u32) -> u16 {
        let rec = &self.records[((word_offs / 6) & 0xFF) as usize];
        match word_offs % 6 {
            0 => (rec.fad >> 16) as u16,
            1 => rec.fad as u16,
            2 => (rec.size >> 16) as u16,
            3 => rec.size as u16,
            4 => u16::from_be_bytes([rec.unit_size, rec.gap_size]),
            _ => u16::from_be_bytes([rec.file_num, rec.attr]),
        }
    }

    /// Check restored state for impossible indices
    pub fn sanity_ok(&self) -> bool {
        (self.pnum as usize) < NUM_PARTITIONS && (self.payload_offs as usize) < PAYLOAD_SIZE
    }
}

impl Default for FsWalker {
    fn default() -> Self {
        Self::new()
    }
}

impl CdBlock {
    /// Advance the walker as far as the buffered sectors allow
    ///
    /// # Returns
    ///
    /// `true` when a request completed (or was aborted) during this call;
    /// the caller owes the host a filesystem-done interrupt.
    pub(super) fn fs_run(&mut self) -> bool {
        if self.fs.abort {
            // Aborting always leaves the owned partition empty, no matter
            // how far the request got.
            self.pool.clear_partition(self.fs.pnum);
            self.fs_cleanup();
            return true;
        }

        loop {
            match self.fs.phase {
                WalkPhase::Idle => {
                    if !self.fs.active {
                        return false;
                    }
                    if self.fs.do_auth {
                        self.fs_begin_auth();
                    } else {
                        self.fs_begin_browse();
                    }
                }

                WalkPhase::AuthRead => {
                    if !self.fs_grab_sector() {
                        return false;
                    }

                    self.auth_disc_type = if self.fs.payload[..16] == *BOOT_ID {
                        0x04
                    } else {
                        0x02
                    };
                    log::debug!(
                        "CD Block: disc authenticated, type 0x{:02X}",
                        self.auth_disc_type
                    );

                    self.filters.set_device_conn(NO_FILTER);
                    self.start_seek(0x80_0000 | 0x96, 0x80_0000, 0, Hirq::empty(), false);
                    return self.fs_finish();
                }

                WalkPhase::DescriptorRead => {
                    if !self.fs_grab_sector() {
                        return false;
                    }

                    if self.fs.payload[1..6] != *ISO_STANDARD_ID || self.fs.payload[0] == 0xFF {
                        // Descriptor chain ended without a primary volume
                        // descriptor; not a readable filesystem.
                        return self.fs_finish();
                    }
                    if self.fs.payload[0] == 0x01 {
                        self.fs.root = FileRecord::parse(&self.fs.payload[156..412]);
                        self.fs.root_valid = true;
                        self.fs_begin_dir_read();
                    }
                }

                WalkPhase::RecordLength => {
                    if self.fs.bytes_read >= self.fs.bytes_total {
                        return self.fs_finish_dir_read();
                    }
                    if self.fs.payload_offs == 0 && !self.fs_grab_sector() {
                        return false;
                    }

                    self.fs.record = [0; 256];
                    self.fs.record[0] = self.fs.payload[self.fs.payload_offs as usize];
                    self.fs.payload_offs = (self.fs.payload_offs + 1) % PAYLOAD_SIZE as u32;
                    self.fs.bytes_read += 1;

                    if self.fs.record[0] != 0 {
                        self.fs.body_pos = 0;
                        self.fs.phase = WalkPhase::RecordBody;
                    }
                    // A zero length byte is sector padding; keep scanning.
                }

                WalkPhase::RecordBody => {
                    let body_len = u32::from(self.fs.record[0]).saturating_sub(1);

                    while self.fs.body_pos < body_len {
                        if self.fs.payload_offs == 0 && !self.fs_grab_sector() {
                            return false;
                        }
                        let slot = (1 + self.fs.body_pos as usize) & 0xFF;
                        self.fs.record[slot] = self.fs.payload[self.fs.payload_offs as usize];
                        self.fs.payload_offs =
                            (self.fs.payload_offs + 1) % PAYLOAD_SIZE as u32;
                        self.fs.bytes_read += 1;
                        self.fs.body_pos += 1;
                    }

                    let rec = self.fs.record_num;
                    if rec < 2 {
                        self.fs.records[rec as usize] = FileRecord::parse(&self.fs.record);
                    } else if rec >= self.fs.first_index {
                        if rec == self.fs.first_index {
                            self.fs.window_base = rec;
                            self.fs.window_count = 0;
                            self.fs.window_more = false;
                        } else if self.fs.window_count == 0xFE {
                            // Window full. The record was consumed from the
                            // stream but is dropped; later entries are only
                            // flagged as available.
                            self.fs.window_more = true;
                            return self.fs_finish_dir_read();
                        }

                        let slot = (2 + self.fs.window_count as usize) & 0xFF;
                        self.fs.records[slot] = FileRecord::parse(&self.fs.record);
                        self.fs.window_count = self.fs.window_count.wrapping_add(1);
                    }
                    self.fs.record_num = self.fs.record_num.wrapping_add(1);
                    self.fs.phase = WalkPhase::RecordLength;
                }
            }
        }
    }

    /// Take the oldest sector of the owned partition and keep its user data
    ///
    /// # Returns
    ///
    /// - `true` - Payload copied, buffer freed
    /// - `false` - Partition empty; the walker must yield and retry
    fn fs_grab_sector(&mut self) -> bool {
        let pnum = self.fs.pnum;
        if self.pool.partition(pnum).count == 0 {
            return false;
        }

        let index = self.pool.partition(pnum).first;
        let data = self.pool.data(index);
        // Mode 2 sectors carry an 8 byte subheader before the user data.
        let offs = if data[15] == 0x02 { 24 } else { 16 };
        self.fs.payload
            .copy_from_slice(&data[offs..offs + PAYLOAD_SIZE]);

        self.pool.unlink(pnum, index);
        self.pool.free(index);
        self.check_buf_pause_resume();
        true
    }

    /// Point the graph at the owned partition and seek to the boot sector
    fn fs_begin_auth(&mut self) {
        let pnum = self.fs.pnum;
        self.filters.set_device_conn(pnum);
        self.filters.filter_mut(pnum).true_conn = pnum;
        self.filters.connect_false(pnum, NO_FILTER);

        let f = self.filters.filter_mut(pnum);
        f.fad = 0;
        f.range = 0;
        f.mode = 0;

        self.auth_disc_type = 0xFF;
        self.start_seek(0x80_0000 | 0x96, 0, 0, Hirq::empty(), false);
        self.fs.phase = WalkPhase::AuthRead;
    }

    /// Start a directory read, via the volume descriptors when the root
    /// record is not cached yet
    fn fs_begin_browse(&mut self) {
        let pnum = self.fs.pnum;
        self.filters.set_device_conn(pnum);
        self.filters.filter_mut(pnum).true_conn = pnum;
        self.filters.connect_false(pnum, NO_FILTER);

        if !self.fs.root_valid {
            let f = self.filters.filter_mut(pnum);
            f.fad = 0;
            f.range = 0;
            f.mode = 0;

            self.start_seek(0x80_0000 | 0xA6, 0, 0, Hirq::empty(), false);
            self.fs.phase = WalkPhase::DescriptorRead;
        } else {
            self.fs_begin_dir_read();
        }
    }

    /// Restrict the owned filter to the directory extent and start streaming
    /// its records
    fn fs_begin_dir_read(&mut self) {
        let fi = if self.fs.dir_entry >= 256 {
            self.fs.root
        } else {
            self.fs.records[self.fs.dir_entry as usize]
        };
        let pnum = self.fs.pnum;

        self.pool.clear_partition(pnum);

        let f = self.filters.filter_mut(pnum);
        f.fad = fi.fad;
        f.range = fi.size.wrapping_add(2047) >> 11;
        f.mode = Filter::COND_FAD_RANGE;
        f.file = fi.file_num;
        f.channel = 0;
        f.sub_mode = 0;
        f.sub_mode_mask = 0;
        f.coding_info = 0;
        f.coding_info_mask = 0;

        self.fs.bytes_total = fi.size;
        self.start_seek(0x80_0000 | fi.fad, 0, 0, Hirq::empty(), false);

        self.fs.bytes_read = 0;
        self.fs.payload_offs = 0;
        self.fs.record_num = 0;
        self.fs.records_valid = false;
        self.fs.phase = WalkPhase::RecordLength;
    }

    /// Publish the record window and finish the request
    fn fs_finish_dir_read(&mut self) -> bool {
        if self.fs.record_num <= 2 {
            self.fs.window_base = 0;
            self.fs.window_count = 0;
            self.fs.window_more = false;
        }
        self.fs.records_valid = true;
        log::trace!(
            "CD Block: directory walk done, {} records windowed at {}",
            self.fs.window_count,
            self.fs.window_base
        );
        self.fs_finish()
    }

    /// Release the owned partition and return the walker to idle
    fn fs_finish(&mut self) -> bool {
        self.pool.clear_partition(self.fs.pnum);
        self.fs_cleanup();
        true
    }

    fn fs_cleanup(&mut self) {
        self.fs.active = false;
        self.fs.do_auth = false;
        self.fs.abort = false;
        self.fs.phase = WalkPhase::Idle;

        // Leave the drive configured to pause wherever it is.
        self.play_end_irq = Hirq::empty();
        self.cur_play_end = 0x80_0000;
        self.cur_play_repeat = 0;
    }
}
