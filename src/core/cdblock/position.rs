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

//! Disc position tracking and subcode Q decoding
//!
//! The drive reads the 96-byte subchannel alongside every sector. The Q bits
//! are repacked into a 12-byte timing record, validated with the CRC, and
//! only a checksum-clean record is promoted to the "safe" copy that seek and
//! play-end decisions trust. A corrupt read keeps the previous safe record,
//! so a single glitch cannot cause a spurious track jump.

/// Drive status byte values and flag bits
pub mod status {
    /// Servicing a command or transitioning between operations
    pub const BUSY: u8 = 0x00;
    /// Paused with the pickup held in place
    pub const PAUSE: u8 = 0x01;
    /// Spindle stopped
    pub const STANDBY: u8 = 0x02;
    /// Playing data or audio
    pub const PLAY: u8 = 0x03;
    /// Seeking to a target
    pub const SEEK: u8 = 0x04;
    /// Fast-forward / rewind scan
    pub const SCAN: u8 = 0x05;
    /// Tray open
    pub const OPEN: u8 = 0x06;
    /// Tray closed, no disc
    pub const NODISC: u8 = 0x07;
    /// Retrying a read
    pub const RETRY: u8 = 0x08;
    /// Read error
    pub const ERROR: u8 = 0x09;
    /// Fatal drive error
    pub const FATAL: u8 = 0x0A;

    /// Flag: status produced by the periodic report timer
    pub const PERIODIC: u8 = 0x20;
    /// Flag: a data transfer is requested / in progress
    pub const DTREQ: u8 = 0x40;
    /// Flag: command deferred, retry later
    pub const WAIT: u8 = 0x80;
    /// Whole-byte value: command rejected
    pub const REJECTED: u8 = 0xFF;
}

/// Subchannel bytes accompanying one raw sector
pub const SUBCODE_SIZE: usize = 96;

/// Sentinel for an unknown 24-bit disc address
pub const UNKNOWN_FAD: u32 = 0xFF_FFFF;

/// Convert a BCD byte to binary
pub fn bcd_to_dec(v: u8) -> u8 {
    (v >> 4) * 10 + (v & 0x0F)
}

/// Convert a binary byte (0-99) to BCD
pub fn dec_to_bcd(v: u8) -> u8 {
    ((v / 10) << 4) | (v % 10)
}

/// Convert a BCD minute/second/frame triple to an absolute FAD
pub fn amsf_to_fad(m: u8, s: u8, f: u8) -> u32 {
    (bcd_to_dec(m) as u32 * 60 + bcd_to_dec(s) as u32) * 75 + bcd_to_dec(f) as u32
}

/// CRC-16/CCITT over the first ten bytes of a Q record
fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Validate a 12-byte Q record against its stored checksum
///
/// The CRC is stored complemented in the last two bytes.
pub fn subq_checksum_ok(q: &[u8; 12]) -> bool {
    let crc = crc16_ccitt(&q[0..10]);
    !crc == ((q[10] as u16) << 8 | q[11] as u16)
}

/// Compute and store the complemented checksum of a Q record
///
/// Used when synthesizing subchannel data for disc images without subcode.
pub fn subq_store_checksum(q: &mut [u8; 12]) {
    let crc = !crc16_ccitt(&q[0..10]);
    q[10] = (crc >> 8) as u8;
    q[11] = crc as u8;
}

/// Current pickup position as reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionInfo {
    /// Drive status byte (see [`status`])
    pub status: u8,

    /// Absolute sector address
    pub fad: u32,

    /// Address relative to the current track start
    pub rel_fad: u32,

    /// Control/ADR nibbles of the current track
    pub ctrl_adr: u8,

    /// Index number within the track
    pub idx: u8,

    /// Track number (0xAA in the lead-out)
    pub tno: u8,

    /// Whether the pickup is over CD-ROM data (clear during gaps/audio)
    pub is_cdrom: bool,

    /// Repeat counter reported in the status word
    pub repcount: u8,
}

impl PositionInfo {
    /// Wipe the address fields to their unknown sentinels
    ///
    /// Status, rotating flag, and repeat count are left for the caller,
    /// since the open-tray, stop, and power-on paths each publish different
    /// values there.
    pub fn clear_address(&mut self) {
        self.fad = UNKNOWN_FAD;
        self.rel_fad = UNKNOWN_FAD;
        self.ctrl_adr = 0xFF;
        self.idx = 0xFF;
        self.tno = 0xFF;
    }
}

impl Default for PositionInfo {
    fn default() -> Self {
        Self {
            status: status::OPEN,
            fad: UNKNOWN_FAD,
            rel_fad: UNKNOWN_FAD,
            ctrl_adr: 0xFF,
            idx: 0xFF,
            tno: 0xFF,
            is_cdrom: false,
            repcount: 0,
        }
    }
}

/// Decoded subcode state
///
/// `q_raw` follows every plausible Q record (correct ADR, checksum or not);
/// `q_safe` only advances on a clean checksum and is what navigation trusts.
/// The two snapshot buffers feed the get-subcode transfer sources and the
/// periodic report.
pub struct SubcodeTracker {
    /// Latest position-mode Q record, unvalidated
    pub(super) q_raw: [u8; 12],

    /// Latest checksum-valid Q record
    pub(super) q_safe: [u8; 12],

    /// Whether `q_safe` reflects the current pickup location
    pub(super) safe_valid: bool,

    /// 10-byte Q snapshot refreshed by the periodic report
    pub(super) q_snapshot: [u8; 10],

    /// 24-byte R..W snapshot for the get-subcode command
    pub(super) rw_snapshot: [u8; 24],
}

impl SubcodeTracker {
    pub fn new() -> Self {
        Self {
            q_raw: [0; 12],
            q_safe: [0; 12],
            safe_valid: false,
            q_snapshot: [0; 10],
            rw_snapshot: [0; 24],
        }
    }

    /// Decode the Q bits out of a raw 96-byte subchannel read
    ///
    /// # Returns
    ///
    /// `true` if the record carried position data with a clean checksum and
    /// the safe copy was updated.
    pub fn decode(&mut self, subpw: &[u8]) -> bool {
        let mut q = [0u8; 12];
        for (i, &b) in subpw.iter().take(SUBCODE_SIZE).enumerate() {
            q[i >> 3] |= ((b & 0x40) >> 6) << (7 - (i & 0x7));
        }

        // Only ADR 1 records carry position data
        if (q[0] & 0x0F) == 1 {
            self.q_raw = q;
            if subq_checksum_ok(&q) {
                self.q_safe = q;
                self.safe_valid = true;
                return true;
            }
        }
        false
    }

    /// Drop confidence in the safe copy (pickup moved, seek started)
    pub fn invalidate(&mut self) {
        self.safe_valid = false;
    }

    /// Latest checksum-valid Q record
    pub fn safe_q(&self) -> &[u8; 12] {
        &self.q_safe
    }

    pub fn safe_valid(&self) -> bool {
        self.safe_valid
    }
}

impl Default for SubcodeTracker {
    fn default() -> Self {
        Self::new()
    }
}
