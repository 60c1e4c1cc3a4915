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

//! Sector filter graph
//!
//! Each of the 24 filters tests incoming sectors against a configurable
//! condition set (FAD range, file number, channel, submode, coding info) and
//! routes them to a true/false successor. The true successor lands the sector
//! in the partition of the same number; the false successor chains to another
//! filter. Routing walks are bounded by the filter count so a misconfigured
//! cyclic graph still terminates.

use super::buffers::{BufferPool, RAW_SECTOR_SIZE};
use super::position::amsf_to_fad;

/// Connection value meaning "no filter / discard"
pub const NO_FILTER: u8 = 0xFF;

/// Number of filters (same namespace as partitions)
pub const NUM_FILTERS: usize = 24;

/// Condition kinds a filter can activate, in evaluation order
///
/// The FAD range check runs first and a miss is never inverted; the subheader
/// checks that follow all honor the invert flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Condition {
    FadRange,
    FileNumber,
    Channel,
    SubMode,
    CodingInfo,
}

const EVAL_ORDER: [Condition; 5] = [
    Condition::FadRange,
    Condition::FileNumber,
    Condition::Channel,
    Condition::SubMode,
    Condition::CodingInfo,
];

/// Subheader fields of a sector, zeroed for sectors without a subheader
#[derive(Debug, Clone, Copy, Default)]
struct SubheaderFields {
    file: u8,
    channel: u8,
    sub_mode: u8,
    coding_info: u8,
}

impl SubheaderFields {
    /// Extract the subheader from a raw sector
    ///
    /// Only mode 2 sectors carry a subheader; everything else tests against
    /// all-zero fields.
    fn from_sector(data: &[u8; RAW_SECTOR_SIZE]) -> Self {
        if data[15] == 0x2 {
            Self {
                file: data[16],
                channel: data[17],
                sub_mode: data[18],
                coding_info: data[19],
            }
        } else {
            Self::default()
        }
    }
}

/// One filter node
#[derive(Debug, Clone, Copy)]
pub struct Filter {
    /// Active-condition bitmask (see the `COND_*` constants)
    pub mode: u8,

    /// Routing target when the condition holds (partition / chained filter)
    pub true_conn: u8,

    /// Routing target when the condition fails (another filter or discard)
    pub false_conn: u8,

    /// FAD range start
    pub fad: u32,

    /// FAD range length
    pub range: u32,

    /// Channel number condition
    pub channel: u8,

    /// File number condition
    pub file: u8,

    /// Submode condition value and mask
    pub sub_mode: u8,
    pub sub_mode_mask: u8,

    /// Coding information condition value and mask
    pub coding_info: u8,
    pub coding_info_mask: u8,
}

impl Filter {
    /// Condition bit: match the subheader file number
    pub const COND_FILE: u8 = 0x01;
    /// Condition bit: match the subheader channel number
    pub const COND_CHANNEL: u8 = 0x02;
    /// Condition bit: match masked subheader submode bits
    pub const COND_SUB_MODE: u8 = 0x04;
    /// Condition bit: match masked subheader coding information
    pub const COND_CODING_INFO: u8 = 0x08;
    /// Condition bit: invert the subheader condition outcome
    pub const COND_INVERT: u8 = 0x10;
    /// Condition bit: restrict to the configured FAD range
    pub const COND_FAD_RANGE: u8 = 0x40;
    /// Mode write flag: reset all conditions of this filter
    pub const MODE_INIT: u8 = 0x80;

    /// Clear the condition settings, leaving connections alone
    pub fn reset_conditions(&mut self) {
        self.mode = 0;
        self.fad = 0;
        self.range = 0;
        self.channel = 0;
        self.file = 0;
        self.sub_mode = 0;
        self.sub_mode_mask = 0;
        self.coding_info = 0;
        self.coding_info_mask = 0;
    }

    /// Whether the subheader-condition outcome is inverted
    ///
    /// The invert flag only applies when at least one subheader condition is
    /// active; it never touches the FAD range check.
    fn inverted(&self) -> bool {
        (self.mode & Self::COND_INVERT) != 0 && (self.mode & 0x0F) != 0
    }

    fn condition_active(&self, cond: Condition) -> bool {
        let bit = match cond {
            Condition::FadRange => Self::COND_FAD_RANGE,
            Condition::FileNumber => Self::COND_FILE,
            Condition::Channel => Self::COND_CHANNEL,
            Condition::SubMode => Self::COND_SUB_MODE,
            Condition::CodingInfo => Self::COND_CODING_INFO,
        };
        (self.mode & bit) != 0
    }

    fn condition_holds(&self, cond: Condition, fad: u32, sh: &SubheaderFields) -> bool {
        match cond {
            Condition::FadRange => fad >= self.fad && fad < self.fad.wrapping_add(self.range),
            Condition::FileNumber => sh.file == self.file,
            Condition::Channel => sh.channel == self.channel,
            Condition::SubMode => (sh.sub_mode & self.sub_mode_mask) == self.sub_mode,
            Condition::CodingInfo => (sh.coding_info & self.coding_info_mask) == self.coding_info,
        }
    }

    /// Test a raw sector against this filter's active conditions
    pub fn test_sector(&self, data: &[u8; RAW_SECTOR_SIZE]) -> bool {
        let fad = amsf_to_fad(data[12], data[13], data[14]);
        let sh = SubheaderFields::from_sector(data);

        for cond in EVAL_ORDER {
            if !self.condition_active(cond) {
                continue;
            }
            if !self.condition_holds(cond, fad, &sh) {
                // A FAD range miss always fails, invert flag or not
                return match cond {
                    Condition::FadRange => false,
                    _ => self.inverted(),
                };
            }
        }
        !self.inverted()
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            mode: 0,
            true_conn: NO_FILTER,
            false_conn: NO_FILTER,
            fad: 0,
            range: 0,
            channel: 0,
            file: 0,
            sub_mode: 0,
            sub_mode_mask: 0,
            coding_info: 0,
            coding_info_mask: 0,
        }
    }
}

/// The filter graph plus its drive-side entry point
pub struct FilterSet {
    /// Filter nodes
    pub(super) filters: [Filter; NUM_FILTERS],

    /// Filter receiving sectors fresh off the drive (0xFF = none)
    pub(super) device_conn: u8,

    /// Filter that accepted the most recent routed sector (0xFF = discarded)
    pub(super) last_dest: u8,
}

impl FilterSet {
    pub fn new() -> Self {
        let mut set = Self {
            filters: [Filter::default(); NUM_FILTERS],
            device_conn: NO_FILTER,
            last_dest: NO_FILTER,
        };
        set.reset();
        set
    }

    /// Restore the power-on filter configuration
    ///
    /// Every filter's true output feeds its own partition, false outputs are
    /// disconnected, and all conditions are cleared.
    pub fn reset(&mut self) {
        for (i, f) in self.filters.iter_mut().enumerate() {
            f.reset_conditions();
            f.true_conn = i as u8;
            f.false_conn = NO_FILTER;
        }
        self.device_conn = NO_FILTER;
        self.last_dest = NO_FILTER;
    }

    pub fn filter(&self, fnum: u8) -> &Filter {
        &self.filters[fnum as usize]
    }

    pub fn filter_mut(&mut self, fnum: u8) -> &mut Filter {
        &mut self.filters[fnum as usize]
    }

    pub fn device_conn(&self) -> u8 {
        self.device_conn
    }

    pub fn last_dest(&self) -> u8 {
        self.last_dest
    }

    /// Remove a filter from every input path
    ///
    /// Clears the device connection and any false output naming this filter,
    /// so no stale route can feed it.
    pub fn disconnect_input(&mut self, fnum: u8) {
        if fnum == NO_FILTER {
            return;
        }
        if self.device_conn == fnum {
            self.device_conn = NO_FILTER;
        }
        for f in self.filters.iter_mut() {
            if f.false_conn == fnum {
                f.false_conn = NO_FILTER;
            }
        }
    }

    /// Point the drive's sector stream at a filter
    ///
    /// The target is first detached from any false-output chain so the drive
    /// becomes its only source.
    pub fn set_device_conn(&mut self, fnum: u8) {
        if fnum != NO_FILTER {
            for f in self.filters.iter_mut() {
                if f.false_conn == fnum {
                    f.false_conn = NO_FILTER;
                }
            }
        }
        self.device_conn = fnum;
    }

    /// Set a filter's false output, detaching the target from other sources
    pub fn connect_false(&mut self, fnum: u8, target: u8) {
        self.disconnect_input(target);
        self.filters[fnum as usize].false_conn = target;
    }

    /// Route a buffered sector through the graph
    ///
    /// Walks from `entry`, landing the buffer in the partition behind the
    /// first accepting filter's true output. A sector no node accepts is
    /// discarded back to the free pool. The walk is capped at one hop per
    /// filter so connection cycles cannot hang the drive.
    ///
    /// # Returns
    ///
    /// The number of the filter that accepted the buffer, or `NO_FILTER` if
    /// it was discarded.
    pub fn route(&self, pool: &mut BufferPool, entry: u8, index: u8) -> u8 {
        let mut cur = entry;
        let mut hops = NUM_FILTERS;

        // Any out-of-range connection counts as disconnected
        while (cur as usize) < NUM_FILTERS && hops > 0 {
            hops -= 1;
            let f = &self.filters[cur as usize];
            if f.test_sector(pool.data(index)) {
                if f.true_conn != NO_FILTER {
                    pool.link(f.true_conn, index);
                    return cur;
                }
                cur = NO_FILTER;
            } else {
                cur = f.false_conn;
            }
        }

        pool.free(index);
        NO_FILTER
    }
}

impl Default for FilterSet {
    fn default() -> Self {
        Self::new()
    }
}
