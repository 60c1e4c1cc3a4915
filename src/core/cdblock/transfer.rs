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

//! Host data transfer engine
//!
//! Streams 16-bit words between the host FIFO port and a list of sector
//! buffers, or one of the virtual sources (TOC buffer, subcode snapshots,
//! file-record table). The active sector-length mode decides where each
//! sector's payload starts and how many words it contributes; the engine
//! crosses buffer boundaries transparently as the host drains the FIFO.

use super::buffers::{NUM_BUFFERS, RAW_SECTOR_SIZE};
use super::filter::NUM_FILTERS;
use super::CdBlock;

/// Transfer FIFO depth in words
pub const FIFO_DEPTH: usize = 6;

/// Words in the translated TOC buffer (0xCC)
pub const TOC_WORDS: u32 = 0xCC;

/// FIFO words prefilled when a sector read-out starts
const READ_PREFILL: usize = 5;

/// Host-visible sector length mode
///
/// Selects how much of each raw sector a transfer moves and where the
/// payload starts. The 2048 mode additionally depends on the sector's own
/// header: mode 1 sectors have no subheader, and mode 2 form 2 sectors carry
/// a longer payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorLength {
    /// User data only (2048 bytes, form-dependent)
    Data2048,
    /// Subheader + user data (2336 bytes)
    Data2336,
    /// Header + subheader + user data (2340 bytes)
    Data2340,
    /// Whole raw sector (2352 bytes)
    Data2352,
}

impl SectorLength {
    /// Decode the wire code used by the set-sector-length command
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Data2048),
            1 => Some(Self::Data2336),
            2 => Some(Self::Data2340),
            3 => Some(Self::Data2352),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Data2048 => 0,
            Self::Data2336 => 1,
            Self::Data2340 => 2,
            Self::Data2352 => 3,
        }
    }

    /// Payload word offset and word count for reading out one sector
    pub fn read_layout(self, data: &[u8; RAW_SECTOR_SIZE]) -> (u32, u32) {
        match self {
            Self::Data2048 => {
                if data[15] == 0x1 {
                    // Mode 1: no subheader
                    (8, 1024)
                } else if (data[18] & 0x20) != 0 {
                    // Mode 2 form 2: long payload
                    (12, 1162)
                } else {
                    (12, 1024)
                }
            }
            Self::Data2336 => (8, 1168),
            Self::Data2340 => (6, 1170),
            Self::Data2352 => (0, 1176),
        }
    }

    /// Payload word offset and word count for writing one sector
    pub fn write_layout(self) -> (u32, u32) {
        match self {
            Self::Data2048 => (12, 1024),
            Self::Data2336 => (8, 1168),
            Self::Data2340 => (6, 1170),
            Self::Data2352 => (0, 1176),
        }
    }
}

/// Data transfer engine state
pub struct DataTransfer {
    /// A transfer session is open
    pub(super) active: bool,

    /// Host-to-buffer direction (put-sector-data)
    pub(super) writing: bool,

    /// Free the listed buffers when the session ends (get-then-delete)
    pub(super) free_on_end: bool,

    /// Index of the buffer currently streaming
    pub(super) cur_index: u8,

    /// Number of entries in `buf_list`
    pub(super) buf_count: u8,

    /// Word offset within the current buffer
    pub(super) word_offs: u32,

    /// Words remaining in the current buffer
    pub(super) words_left: u32,

    /// Total words moved this session
    pub(super) total_words: u32,

    /// Destination filter for write sessions
    pub(super) filter: u8,

    /// Transfer FIFO
    pub(super) fifo: [u16; FIFO_DEPTH],
    pub(super) fifo_rp: u8,
    pub(super) fifo_wp: u8,
    pub(super) fifo_len: u8,

    /// Ordered buffer list (slot indices or virtual source markers)
    pub(super) buf_list: [u8; NUM_BUFFERS],
}

impl DataTransfer {
    /// Virtual source marker: translated TOC buffer
    pub const SRC_TOC: u8 = 0xFF;
    /// Virtual source marker: subcode Q snapshot
    pub const SRC_SUBQ: u8 = 0xFE;
    /// Virtual source marker: subcode R..W snapshot
    pub const SRC_SUBRW: u8 = 0xFD;
    /// Virtual source marker: file-record table
    pub const SRC_FILE_INFO: u8 = 0xF0;

    pub fn new() -> Self {
        Self {
            active: false,
            writing: false,
            free_on_end: false,
            cur_index: 0,
            buf_count: 0,
            word_offs: 0,
            words_left: 0,
            total_words: 0,
            filter: 0,
            fifo: [0; FIFO_DEPTH],
            fifo_rp: 0,
            fifo_wp: 0,
            fifo_len: 0,
            buf_list: [0; NUM_BUFFERS],
        }
    }

    /// Drop any open session without touching buffers
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn clear_fifo(&mut self) {
        self.fifo_rp = 0;
        self.fifo_wp = 0;
        self.fifo_len = 0;
    }

    /// Check restored state for impossible indices
    pub fn sanity_ok(&self) -> bool {
        if (self.filter as usize) >= NUM_FILTERS {
            return false;
        }
        if (self.fifo_rp as usize) >= FIFO_DEPTH
            || (self.fifo_wp as usize) >= FIFO_DEPTH
            || (self.fifo_len as usize) > FIFO_DEPTH
        {
            return false;
        }
        if self.active {
            if (self.buf_count as usize) > NUM_BUFFERS {
                return false;
            }
            // Write targets, free-on-end lists and multi-unit lists must hold
            // real buffer slots; a virtual source only ever travels alone.
            if self.writing || self.free_on_end || self.buf_count > 1 {
                for i in 0..self.buf_count as usize {
                    if (self.buf_list[i] as usize) >= NUM_BUFFERS {
                        return false;
                    }
                }
            }
            if self.words_left > 0 {
                if self.cur_index >= self.buf_count {
                    return false;
                }
                let cap = match self.buf_list[self.cur_index as usize] {
                    entry if (entry as usize) < NUM_BUFFERS => (RAW_SECTOR_SIZE / 2) as u32,
                    Self::SRC_FILE_INFO => 6 * 256,
                    Self::SRC_SUBRW => 12,
                    Self::SRC_SUBQ => 5,
                    Self::SRC_TOC => TOC_WORDS,
                    _ => return false,
                };
                if self.word_offs >= cap
                    || self.words_left > cap
                    || self.word_offs + self.words_left > cap
                {
                    return false;
                }
            }
        }
        true
    }
}

impl Default for DataTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl CdBlock {
    /// Fetch the big-endian word a source entry holds at a word offset
    fn dt_source_word(&self, source: u8, word_offs: u32) -> u16 {
        let byte = (word_offs << 1) as usize;
        match source {
            DataTransfer::SRC_TOC => {
                u16::from_be_bytes([self.toc_buffer[byte], self.toc_buffer[byte + 1]])
            }
            DataTransfer::SRC_SUBQ => u16::from_be_bytes([
                self.subcode.q_snapshot[byte],
                self.subcode.q_snapshot[byte + 1],
            ]),
            DataTransfer::SRC_SUBRW => u16::from_be_bytes([
                self.subcode.rw_snapshot[byte],
                self.subcode.rw_snapshot[byte + 1],
            ]),
            DataTransfer::SRC_FILE_INFO => self.fs.record_table_word(word_offs),
            index => {
                let data = self.pool.data(index);
                u16::from_be_bytes([data[byte], data[byte + 1]])
            }
        }
    }

    /// Move one word from the current source into the FIFO
    fn dt_refill_word(&mut self) {
        if self.dt.words_left == 0 {
            return;
        }

        let source = self.dt.buf_list[self.dt.cur_index as usize];
        let word = self.dt_source_word(source, self.dt.word_offs);

        let wp = self.dt.fifo_wp as usize;
        self.dt.fifo[wp] = word;
        self.dt.fifo_wp = (self.dt.fifo_wp + 1) % FIFO_DEPTH as u8;
        self.dt.fifo_len += 1;

        self.dt.word_offs += 1;
        self.dt.words_left -= 1;
        self.dt.total_words += 1;

        if self.dt.words_left == 0 {
            self.dt.cur_index += 1;
            if self.dt.cur_index < self.dt.buf_count {
                let next = self.dt.buf_list[self.dt.cur_index as usize];
                let (offs, count) = self.get_sec_len.read_layout(self.pool.data(next));
                self.dt.word_offs = offs;
                self.dt.words_left = count;
            }
        }
    }

    /// Host read of the data FIFO port
    pub(super) fn dt_read_word(&mut self) -> u16 {
        if !self.dt.active || self.dt.writing {
            return 0;
        }

        if self.dt.words_left > 0 {
            self.dt_refill_word();
        }

        let word = self.dt.fifo[self.dt.fifo_rp as usize];
        self.dt.fifo_rp = (self.dt.fifo_rp + 1) % FIFO_DEPTH as u8;
        if self.dt.fifo_len > 0 {
            self.dt.fifo_len -= 1;
        }
        word
    }

    /// Host write of the data FIFO port
    pub(super) fn dt_write_word(&mut self, value: u16) {
        if !self.dt.active || !self.dt.writing || self.dt.words_left == 0 {
            return;
        }

        let wp = self.dt.fifo_wp as usize;
        self.dt.fifo[wp] = value;
        self.dt.fifo_wp = (self.dt.fifo_wp + 1) % FIFO_DEPTH as u8;
        self.dt.fifo_len += 1;

        let word = self.dt.fifo[self.dt.fifo_rp as usize];
        self.dt.fifo_rp = (self.dt.fifo_rp + 1) % FIFO_DEPTH as u8;
        self.dt.fifo_len -= 1;

        let index = self.dt.buf_list[self.dt.cur_index as usize];
        let byte = (self.dt.word_offs << 1) as usize;
        let data = self.pool.data_mut(index);
        data[byte..byte + 2].copy_from_slice(&word.to_be_bytes());

        self.dt.word_offs += 1;
        self.dt.words_left -= 1;
        self.dt.total_words += 1;

        if self.dt.words_left == 0 {
            self.dt.cur_index += 1;
            if self.dt.cur_index < self.dt.buf_count {
                let (offs, count) = self.put_sec_len.write_layout();
                self.dt.word_offs = offs;
                self.dt.words_left = count;
            }
        }
    }

    /// Open a read session over a single virtual source
    pub(super) fn dt_start_virtual(&mut self, source: u8, word_offs: u32, word_count: u32) {
        self.dt.active = true;
        self.dt.writing = false;
        self.dt.free_on_end = false;
        self.dt.cur_index = 0;
        self.dt.buf_count = 1;
        self.dt.buf_list[0] = source;
        self.dt.word_offs = word_offs;
        self.dt.words_left = word_count;
        self.dt.total_words = 0;
        self.dt.clear_fifo();
    }

    /// Open a read session over a list of sector buffers
    ///
    /// The payload window of each buffer follows the get-side sector length.
    /// The FIFO is primed a few words ahead of the first host read.
    pub(super) fn dt_start_read(&mut self, bufs: &[u8], free_on_end: bool) {
        self.dt.active = true;
        self.dt.writing = false;
        self.dt.free_on_end = free_on_end;
        self.dt.cur_index = 0;
        self.dt.buf_count = bufs.len() as u8;
        self.dt.buf_list[..bufs.len()].copy_from_slice(bufs);
        self.dt.total_words = 0;
        self.dt.clear_fifo();

        let (offs, count) = self.get_sec_len.read_layout(self.pool.data(bufs[0]));
        self.dt.word_offs = offs;
        self.dt.words_left = count;

        for _ in 0..READ_PREFILL {
            self.dt_refill_word();
        }
    }

    /// Open a write session into freshly allocated buffers
    pub(super) fn dt_start_write(&mut self, bufs: &[u8], filter: u8) {
        self.dt.active = true;
        self.dt.writing = true;
        self.dt.free_on_end = false;
        self.dt.cur_index = 0;
        self.dt.buf_count = bufs.len() as u8;
        self.dt.buf_list[..bufs.len()].copy_from_slice(bufs);
        self.dt.filter = filter;
        self.dt.total_words = 0;
        self.dt.clear_fifo();

        let (offs, count) = self.put_sec_len.write_layout();
        self.dt.word_offs = offs;
        self.dt.words_left = count;
    }
}
