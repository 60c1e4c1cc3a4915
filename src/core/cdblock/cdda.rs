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

//! CD-DA sample ring buffer
//!
//! Audio sectors are decoded into stereo sample pairs here for the sound
//! mixer to drain at 44.1 kHz. The first fill after running dry pre-pads a
//! few silent pairs to absorb pipeline latency; once full, further samples
//! are dropped.

use super::buffers::RAW_SECTOR_SIZE;

/// Silent pairs inserted when filling from empty
pub const CDDA_PREFILL: usize = 4;

/// Sample pairs in one audio sector
pub const CDDA_PAIRS_PER_SECTOR: usize = RAW_SECTOR_SIZE / 4;

/// Ring capacity in sample pairs
pub const CDDA_CAPACITY: usize = CDDA_PREFILL + CDDA_PAIRS_PER_SECTOR + CDDA_PREFILL;

/// Fixed-capacity ring of stereo CD-DA sample pairs
pub struct CddaRing {
    /// Sample storage, always `CDDA_CAPACITY` entries
    pub(super) samples: Vec<(i16, i16)>,

    /// Read position
    pub(super) read_pos: u16,

    /// Write position
    pub(super) write_pos: u16,

    /// Pairs currently buffered
    pub(super) count: u16,
}

impl CddaRing {
    pub fn new() -> Self {
        Self {
            samples: vec![(0, 0); CDDA_CAPACITY],
            read_pos: 0,
            write_pos: 0,
            count: 0,
        }
    }

    /// Pairs currently buffered
    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Drop all buffered samples
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.count = 0;
    }

    fn push(&mut self, pair: (i16, i16)) {
        if (self.count as usize) < CDDA_CAPACITY {
            self.samples[self.write_pos as usize] = pair;
            self.write_pos = (self.write_pos + 1) % CDDA_CAPACITY as u16;
            self.count += 1;
        }
    }

    /// Buffer one audio sector's samples
    ///
    /// # Arguments
    ///
    /// * `data` - Raw 2352-byte audio sector (little-endian stereo pairs)
    /// * `shift` - Arithmetic right shift applied per sample (scan playback
    ///   attenuates by two bits)
    pub fn push_sector(&mut self, data: &[u8; RAW_SECTOR_SIZE], shift: u8) {
        if self.count == 0 {
            for _ in 0..CDDA_PREFILL {
                self.push((0, 0));
            }
        }
        for i in 0..CDDA_PAIRS_PER_SECTOR {
            let left = i16::from_le_bytes([data[i * 4], data[i * 4 + 1]]) >> shift;
            let right = i16::from_le_bytes([data[i * 4 + 2], data[i * 4 + 3]]) >> shift;
            self.push((left, right));
        }
    }

    /// Pop the next sample pair, or silence when empty
    pub fn pop(&mut self) -> (i16, i16) {
        if self.count == 0 {
            return (0, 0);
        }
        let pair = self.samples[self.read_pos as usize];
        self.read_pos = (self.read_pos + 1) % CDDA_CAPACITY as u16;
        self.count -= 1;
        pair
    }
}

impl Default for CddaRing {
    fn default() -> Self {
        Self::new()
    }
}
