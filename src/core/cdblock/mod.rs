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

//! CD block emulation for Sega Saturn
//!
//! This module emulates the Saturn's CD block, the subsystem built around
//! an SH-1 microcontroller that sits between the CD drive and the rest of
//! the machine. It covers:
//! - Command processing over four 16-bit command/result register pairs
//! - A 200-sector buffer pool divided into 24 selector partitions
//! - Stream routing through 24 chainable filters
//! - Drive mechanism timing (spin-up, seek, play, scan, backpressure)
//! - ISO9660 directory walking for the file-level commands
//! - Data transfer to and from the host through a 16-bit FIFO port
//! - CD-DA sample buffering for the sound subsystem
//!
//! # Register Map
//!
//! Registers are addressed by word offset:
//!
//! | Offset | Read                     | Write                     |
//! |--------|--------------------------|---------------------------|
//! | 0x0    | Data transfer word       | Data transfer word        |
//! | 0x2    | HIRQ status              | HIRQ acknowledge          |
//! | 0x3    | HIRQ mask                | HIRQ mask                 |
//! | 0x6    | Result word 1            | Command word 1            |
//! | 0x7    | Result word 2            | Command word 2            |
//! | 0x8    | Result word 3            | Command word 3            |
//! | 0x9    | Result word 4            | Command word 4            |
//!
//! HIRQ status bits are acknowledged by writing them as 0. A full-width
//! write to command word 4 latches the four command words for execution.
//! Reading result word 4 marks the result set as consumed, after which the
//! periodic status report is allowed to overwrite it.
//!
//! # Timing
//!
//! Internal scheduling runs in drive clock units (44.1 kHz x 256 per
//! second) held as 32.32 fixed point. The host supplies timestamps in its
//! own clock domain and [`CdBlock::set_clock_ratio`] establishes the
//! conversion. [`CdBlock::update`] advances emulation to a timestamp and
//! returns the deadline by which it wants to run again; register writes
//! update internally and return a possibly earlier deadline.
//!
//! # Example
//!
//! ```rust
//! use ssrx::core::cdblock::CdBlock;
//!
//! let mut cdb = CdBlock::new();
//!
//! // Power-on initialization takes a while; nothing is ready yet.
//! assert_eq!(cdb.read_register(0x2), 0);
//!
//! // Run to the block's own deadline and the init report appears.
//! let next = cdb.update(0);
//! cdb.update(next);
//! assert_ne!(cdb.read_register(0x2) & 0x0001, 0); // CMOK
//! ```

use bitflags::bitflags;

use crate::core::disc::{DiscReader, Toc, LEADOUT_TRACK};

mod buffers;
mod cdda;
mod commands;
mod drive;
mod filter;
mod fs;
mod position;
mod state;
mod transfer;

#[cfg(test)]
mod tests;

pub use buffers::{
    BufferPool, Partition, NO_BUFFER, NUM_BUFFERS, NUM_PARTITIONS, RAW_SECTOR_SIZE,
};
pub use cdda::CddaRing;
pub use commands::{opcode, CmdPhase, FadSearch};
pub use drive::{DrivePhase, ScanDirection, UNITS_PER_SECOND};
pub use filter::{Filter, FilterSet, NO_FILTER, NUM_FILTERS};
pub use fs::{FileRecord, FsWalker, WalkPhase};
pub use position::{
    bcd_to_dec, dec_to_bcd, status, subq_checksum_ok, subq_store_checksum, PositionInfo,
    SubcodeTracker, SUBCODE_SIZE, UNKNOWN_FAD,
};
pub use state::{
    BufferPoolState, CdBlockState, CddaState, DataTransferState, FileRecordState, FilterState,
    FsWalkerState, PositionState, SubcodeState,
};
pub use transfer::{DataTransfer, SectorLength};

bitflags! {
    /// HIRQ interrupt status bits
    ///
    /// Each bit latches until the host acknowledges it through the HIRQ
    /// register; the masked OR of all bits drives the outgoing interrupt
    /// line.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Hirq: u16 {
        /// Command processing finished, results available
        const CMOK = 0x0001;
        /// Data transfer ready
        const DRDY = 0x0002;
        /// A sector finished being stored
        const CSCT = 0x0004;
        /// Buffer pool went full
        const BFUL = 0x0008;
        /// End of play reached
        const PEND = 0x0010;
        /// Disc change detected
        const DCHG = 0x0020;
        /// Selector operation finished
        const ESEL = 0x0040;
        /// Host transfer operation finished
        const EHST = 0x0080;
        /// Copy or move operation finished
        const ECPY = 0x0100;
        /// Filesystem operation finished
        const EFLS = 0x0200;
        /// Subcode Q report updated
        const SCDQ = 0x0400;
        /// MPEG operation finished
        const MPED = 0x0800;
        /// MPEG action uncertain
        const MPCM = 0x1000;
        /// MPEG interrupt status reported
        const MPST = 0x2000;
    }
}

/// Power-on self test time in drive clock units
const POWER_ON_DELAY: i64 = 4_880_000;

/// Raw table of contents mirror: 99 track entries plus the A0, A1 and
/// lead-out points, four bytes each
const TOC_BUFFER_SIZE: usize = (99 + 3) * 4;

/// Fallback host clock, the NTSC Saturn system clock in Hz
pub const DEFAULT_HOST_CLOCK_HZ: u32 = 28_636_360;

/// Scheduling ratio for a host clock frequency
///
/// The result is drive clock units per host clock in 32.32 fixed point.
/// Host clocks slower than the drive unit rate (11.2896 MHz) saturate.
pub fn clock_ratio_from_hz(hz: u32) -> u32 {
    (((UNITS_PER_SECOND as u64) << 32) / u64::from(hz.max(1))).min(u64::from(u32::MAX)) as u32
}

/// Saturn CD block
///
/// Owns the complete state of the subsystem: host registers, the command
/// processor, the drive mechanism, the sector buffer pool with its filter
/// graph, the filesystem walker, the data transfer engine and the CD-DA
/// ring. Host access goes through the register interface plus
/// [`CdBlock::update`].
pub struct CdBlock {
    // Host registers
    /// Latched interrupt status bits
    hirq: Hirq,
    /// Interrupt enable mask
    hirq_mask: Hirq,
    /// Level of the outgoing interrupt line
    irq_out: bool,
    /// Command words as last written by the host
    cdata: [u16; 4],
    /// Command words latched at dispatch
    ctr: [u16; 4],
    /// Result words
    results: [u16; 4],
    /// The host has consumed the current result set
    results_read: bool,
    /// A latched command is waiting for the processor
    command_pending: bool,

    // Command processor
    /// Current state of the command machine
    cmd_phase: CmdPhase,
    /// Clock account of the command machine in 32.32 drive units; work
    /// performed is charged here and the machine sleeps while negative
    command_clock_counter: i64,
    /// Interrupt bits to raise once the current command's delay elapses
    cmd_irq_pending: Hirq,
    /// Add BFUL to the delayed bits if the pool is full by then
    cmd_irq_bful: bool,
    /// Re-examine buffer backpressure after the delayed interrupt
    cmd_irq_resume: bool,
    /// Partition flags of a selector reset still being applied
    reset_sel_pending: u8,
    /// A software reset was scheduled by the initialization command
    sw_reset_pending: bool,
    /// Interrupt bits a software reset owes the next result delivery
    sw_reset_hirq_deferred: Hirq,

    // Scheduling
    /// Host timestamp of the last update
    last_ts: i64,
    /// Drive clock units per host clock, 32.32 fixed point
    clock_ratio: u32,
    /// Drive mechanism countdown, 32.32 drive units
    drive_counter: i64,
    /// Periodic response countdown, 32.32 drive units
    periodic_counter: i64,

    // Drive mechanism
    /// Current state of the drive state machine
    drive_phase: DrivePhase,
    tray_open: bool,
    disc: Option<Box<dyn DiscReader>>,
    /// Table of contents of the loaded disc
    toc: Toc,
    /// Raw TOC mirror streamed by the TOC transfer
    toc_buffer: [u8; TOC_BUFFER_SIZE],
    /// Sector under the pickup, in absolute frames
    cur_sector: i32,
    /// Seek index acquisition stage
    seek_index_phase: u8,
    /// Staging copy of the raw sector under the pickup
    sec_pre_buf: [u8; RAW_SECTOR_SIZE],
    /// Subcode read along with the staged sector
    sec_pre_sub: [u8; SUBCODE_SIZE],
    /// Positive when a sector is staged, negative while the pickup settles
    sec_pre_buf_in: i8,
    /// Countdown from pause to standby
    pause_counter: i32,
    /// Commanded standby timeout parameter
    standby_time: u16,
    /// Commanded ECC behavior parameter
    ecc_enable: u8,
    /// Commanded retry behavior parameter
    retry_count: u8,
    /// The staged sector was already routed into the pool
    play_sector_processed: bool,

    // Playback control
    /// Resolved start of the active play span
    cur_play_start: u32,
    /// Resolved end of the active play span
    cur_play_end: u32,
    /// Commanded repeat limit of the active span
    cur_play_repeat: u8,
    /// Repeats performed so far, top bit while a restart is in flight
    play_repeat_counter: u8,
    /// Start parameter of the last play command, kept for repeats
    play_cmd_start: u32,
    /// End parameter of the last play command
    play_cmd_end: u32,
    /// Repeat parameter of the last play command
    play_cmd_rep: u8,
    /// Interrupt bits owed when the play span ends
    play_end_irq: Hirq,
    /// Active scan direction, if scanning
    scan_mode: Option<ScanDirection>,
    /// Sectors until the next scan jump
    scan_counter: i32,

    // Reported position
    /// Position and status as last reported to the host
    pos: PositionInfo,
    /// Subcode state decoded from the disc
    subcode: SubcodeTracker,

    // Buffer pool and selectors
    pool: BufferPool,
    filters: FilterSet,
    /// Sector length used when reading buffers out
    get_sec_len: SectorLength,
    /// Sector length used when the host writes buffers in
    put_sec_len: SectorLength,
    /// Result of the last actual-size calculation, in 16-bit words
    calced_actual_size: u32,
    /// Saved FAD search result
    fad_search: FadSearch,

    // Host data transfer
    dt: DataTransfer,

    // Filesystem walker
    fs: FsWalker,
    /// Disc type resolved by authentication
    auth_disc_type: u8,

    // Audio
    /// CD-DA samples awaiting the sound subsystem
    cdda: CddaRing,
}

impl CdBlock {
    pub fn new() -> Self {
        let mut cdb = Self {
            hirq: Hirq::empty(),
            hirq_mask: Hirq::empty(),
            irq_out: false,
            cdata: [0; 4],
            ctr: [0; 4],
            results: [0; 4],
            results_read: false,
            command_pending: false,
            cmd_phase: CmdPhase::Poll,
            command_clock_counter: 0,
            cmd_irq_pending: Hirq::empty(),
            cmd_irq_bful: false,
            cmd_irq_resume: false,
            reset_sel_pending: 0,
            sw_reset_pending: false,
            sw_reset_hirq_deferred: Hirq::empty(),
            last_ts: 0,
            clock_ratio: clock_ratio_from_hz(DEFAULT_HOST_CLOCK_HZ),
            drive_counter: 0,
            periodic_counter: 0,
            drive_phase: DrivePhase::Stopped,
            tray_open: false,
            disc: None,
            toc: Toc::default(),
            toc_buffer: [0; TOC_BUFFER_SIZE],
            cur_sector: 0,
            seek_index_phase: 0,
            sec_pre_buf: [0; RAW_SECTOR_SIZE],
            sec_pre_sub: [0; SUBCODE_SIZE],
            sec_pre_buf_in: 0,
            pause_counter: 0,
            standby_time: 0,
            ecc_enable: 0,
            retry_count: 0,
            play_sector_processed: false,
            cur_play_start: 0,
            cur_play_end: 0,
            cur_play_repeat: 0,
            play_repeat_counter: 0,
            play_cmd_start: 0,
            play_cmd_end: 0,
            play_cmd_rep: 0,
            play_end_irq: Hirq::empty(),
            scan_mode: None,
            scan_counter: 0,
            pos: PositionInfo::default(),
            subcode: SubcodeTracker::new(),
            pool: BufferPool::new(),
            filters: FilterSet::new(),
            get_sec_len: SectorLength::Data2048,
            put_sec_len: SectorLength::Data2048,
            calced_actual_size: 0,
            fad_search: FadSearch::default(),
            dt: DataTransfer::new(),
            fs: FsWalker::new(),
            auth_disc_type: 0,
            cdda: CddaRing::new(),
        };
        cdb.reset(true);
        cdb
    }

    /// Hard reset
    ///
    /// `powering_up` additionally clears everything the real block only
    /// loses with power: buffer memory, selector configuration, host
    /// registers and the cached filesystem information.
    pub fn reset(&mut self, powering_up: bool) {
        if powering_up {
            self.auth_disc_type = 0;
            self.calced_actual_size = 0;
            self.cdata = [0; 4];
            self.ctr = [0; 4];
            self.results = [0; 4];
            self.results_read = false;
            self.command_pending = false;
            self.command_clock_counter = 0;
            self.cmd_irq_pending = Hirq::empty();
            self.cmd_irq_bful = false;
            self.cmd_irq_resume = false;
            self.reset_sel_pending = 0;
            self.sw_reset_pending = false;
            self.sw_reset_hirq_deferred = Hirq::empty();
            self.get_sec_len = SectorLength::Data2048;
            self.put_sec_len = SectorLength::Data2048;
            self.filters = FilterSet::new();
            self.pool.reset();
            self.dt.reset();
            self.fad_search = FadSearch::default();
            self.drive_phase = DrivePhase::Stopped;
            self.drive_counter = 0;
            self.periodic_counter = 0;
            self.standby_time = 0;
            self.ecc_enable = 0;
            self.retry_count = 0;
            self.cur_sector = 0;
            self.seek_index_phase = 0;
            self.sec_pre_buf = [0; RAW_SECTOR_SIZE];
            self.sec_pre_sub = [0; SUBCODE_SIZE];
            self.sec_pre_buf_in = 0;
            self.pause_counter = 0;
            self.play_sector_processed = false;
            self.cur_play_start = 0;
            self.cur_play_end = 0;
            self.cur_play_repeat = 0;
            self.play_repeat_counter = 0;
            self.play_cmd_start = 0;
            self.play_cmd_end = 0;
            self.play_cmd_rep = 0;
            self.play_end_irq = Hirq::empty();
            self.scan_mode = None;
            self.scan_counter = 0;
            self.cdda.clear();
            self.toc_buffer = [0; TOC_BUFFER_SIZE];
            self.pos = PositionInfo {
                status: status::BUSY,
                fad: 0,
                rel_fad: 0,
                ctrl_adr: 0,
                idx: 0,
                tno: 0,
                is_cdrom: false,
                repcount: 0,
            };
            self.subcode = SubcodeTracker::new();
            self.fs = FsWalker::new();
        }

        self.hirq = Hirq::empty();
        self.hirq_mask = Hirq::empty();
        self.recalc_irq();
        self.reset_cd();
    }

    /// Restart the microcontroller side
    ///
    /// The command machine begins its power-on sequence; drive and
    /// periodic timers hold until that sequence reprograms them.
    fn reset_cd(&mut self) {
        self.periodic_counter = i64::MAX;
        self.drive_phase = DrivePhase::Resetting;
        self.drive_counter = i64::MAX;
        self.results = [0; 4];
        self.results_read = true;
        self.cmd_phase = CmdPhase::PowerOn;
        self.command_clock_counter = -(POWER_ON_DELAY << 32);
    }

    /// Software reset performed by the initialization sequence
    ///
    /// Selector, transfer and filesystem request state return to their
    /// power-on configuration. The drive keeps spinning and the reported
    /// position is untouched.
    pub(super) fn sw_reset(&mut self) {
        self.get_sec_len = SectorLength::Data2048;
        self.put_sec_len = SectorLength::Data2048;
        self.filters.reset();
        self.dt.reset();
        self.pool.reset();
        self.fad_search = FadSearch::default();
        self.calced_actual_size = 0;
        self.cur_play_end = 0x80_0000;
        self.cur_play_repeat = 0;
        self.clear_pending_sectors();
        self.fs.reset();
        log::debug!("CD Block: software reset");
    }

    /// Load or remove the disc and reflect the tray state
    ///
    /// An open tray always presents as no disc. Removal outside a
    /// microcontroller reset starts the eject sequence; insertion reads
    /// the table of contents immediately.
    pub fn set_disc(&mut self, tray_open: bool, disc: Option<Box<dyn DiscReader>>) {
        self.tray_open = tray_open;
        self.disc = if tray_open { None } else { disc };

        if let Some(disc) = self.disc.as_mut() {
            self.toc = disc.read_toc();
            log::info!(
                "CD Block: disc inserted, tracks {}..={}",
                self.toc.first_track,
                self.toc.last_track
            );
        } else if self.drive_phase != DrivePhase::Resetting {
            self.auth_disc_type = 0;
            self.drive_phase = DrivePhase::EjectClear;
            self.drive_counter = 1000 << 32;
        }
    }

    /// Program the host clock conversion, as produced by
    /// [`clock_ratio_from_hz`]
    pub fn set_clock_ratio(&mut self, ratio: u32) {
        self.clock_ratio = ratio;
    }

    /// Rebase the host clock; the next update measures from timestamp zero
    pub fn reset_timestamp(&mut self) {
        self.last_ts = 0;
    }

    /// Rebuild the raw TOC mirror from the disc's table of contents
    ///
    /// The layout is 99 four-byte track entries (control/ADR, then a
    /// three-byte frame address) followed by the A0, A1 and lead-out
    /// points.
    pub(super) fn translate_toc(&mut self) {
        let mut off = 0;

        for i in 1..100 {
            let t = self.toc.tracks[i];
            if t.valid {
                let fad = t.lba + 150;
                self.toc_buffer[off] = (t.control << 4) | t.adr;
                self.toc_buffer[off + 1] = (fad >> 16) as u8;
                self.toc_buffer[off + 2] = (fad >> 8) as u8;
                self.toc_buffer[off + 3] = fad as u8;
            } else {
                self.toc_buffer[off..off + 4].fill(0xFF);
            }
            off += 4;
        }

        let first = self.toc.tracks[self.toc.first_track as usize];
        self.toc_buffer[off] = (first.control << 4) | first.adr;
        self.toc_buffer[off + 1] = self.toc.first_track;
        self.toc_buffer[off + 2] = self.toc.disc_type;
        self.toc_buffer[off + 3] = 0;
        off += 4;

        let last = self.toc.tracks[self.toc.last_track as usize];
        self.toc_buffer[off] = (last.control << 4) | last.adr;
        self.toc_buffer[off + 1] = self.toc.last_track;
        self.toc_buffer[off + 2] = 0;
        self.toc_buffer[off + 3] = 0;
        off += 4;

        let leadout = self.toc.tracks[LEADOUT_TRACK];
        let fad = leadout.lba + 150;
        self.toc_buffer[off] = (leadout.control << 4) | leadout.adr;
        self.toc_buffer[off + 1] = (fad >> 16) as u8;
        self.toc_buffer[off + 2] = (fad >> 8) as u8;
        self.toc_buffer[off + 3] = fad as u8;
    }

    /// Raise interrupt status bits
    pub(super) fn trigger_irq(&mut self, bits: Hirq) {
        self.hirq |= bits;
        self.recalc_irq();
    }

    fn recalc_irq(&mut self) {
        self.irq_out = self.hirq.intersects(self.hirq_mask);
    }

    /// Level of the outgoing interrupt line
    pub fn irq_asserted(&self) -> bool {
        self.irq_out
    }

    /// Current interrupt status bits
    pub fn hirq(&self) -> Hirq {
        self.hirq
    }

    /// Current tray state
    pub fn tray_open(&self) -> bool {
        self.tray_open
    }

    /// Pop one CD-DA sample pair for the sound subsystem, silence when
    /// the ring is empty
    pub fn get_cdda(&mut self) -> (i16, i16) {
        self.cdda.pop()
    }

    /// Read a CD block register by word offset
    ///
    /// Reads do not advance emulation time; they observe state as of the
    /// last update.
    pub fn read_register(&mut self, offset: u32) -> u16 {
        match offset {
            0x0 => self.dt_read_word(),
            0x2 => self.hirq.bits(),
            0x3 => self.hirq_mask.bits(),
            0x6 => self.results[0],
            0x7 => self.results[1],
            0x8 => self.results[2],
            0x9 => {
                self.results_read = true;
                self.results[3]
            }
            _ => 0,
        }
    }

    /// Write a CD block register by word offset
    ///
    /// Returns the timestamp by which the block wants its next update.
    pub fn write_register(&mut self, timestamp: i64, offset: u32, value: u16) -> i64 {
        self.write_register_masked(timestamp, offset, value, 0xFFFF)
    }

    /// Write a CD block register with explicit byte enables
    ///
    /// `mask` carries the enabled bits of the host access; only masked
    /// bits take effect. A command is queued only by a full-width write
    /// to command word 4.
    pub fn write_register_masked(
        &mut self,
        timestamp: i64,
        offset: u32,
        value: u16,
        mask: u16,
    ) -> i64 {
        let mut next = self.update(timestamp);

        match offset {
            0x0 => self.dt_write_word(value),
            0x2 => {
                self.hirq &= Hirq::from_bits_retain(value | !mask);
                self.recalc_irq();
            }
            0x3 => {
                let merged = (self.hirq_mask.bits() & !mask) | (value & mask);
                self.hirq_mask = Hirq::from_bits_retain(merged);
                self.recalc_irq();
            }
            0x6 => self.cdata[0] = (self.cdata[0] & !mask) | (value & mask),
            0x7 => self.cdata[1] = (self.cdata[1] & !mask) | (value & mask),
            0x8 => self.cdata[2] = (self.cdata[2] & !mask) | (value & mask),
            0x9 => {
                self.cdata[3] = (self.cdata[3] & !mask) | (value & mask);
                if mask == 0xFFFF {
                    self.command_pending = true;
                    next = timestamp + 1;
                }
            }
            _ => {}
        }

        next
    }

    /// Advance emulation to `timestamp` and return the next deadline
    ///
    /// Host clocks are converted through the programmed ratio into 32.32
    /// drive units. The drive mechanism runs first, then the command
    /// machine catches up on its clock account.
    pub fn update(&mut self, timestamp: i64) -> i64 {
        let clocks = (timestamp - self.last_ts).max(0) * i64::from(self.clock_ratio);
        self.last_ts = timestamp;

        self.drive_run(clocks);

        self.command_clock_counter += clocks;
        self.command_run();

        let mut net = -self.command_clock_counter;
        if self.drive_counter < net {
            net = self.drive_counter;
        }
        if self.periodic_counter < net {
            net = self.periodic_counter;
        }

        timestamp + (net + i64::from(self.clock_ratio) - 1) / i64::from(self.clock_ratio)
    }
}

impl Default for CdBlock {
    fn default() -> Self {
        Self::new()
    }
}
