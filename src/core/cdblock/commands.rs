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

//! Host command processor
//!
//! Commands arrive as four 16-bit words latched when the host writes the
//! last register; the opcode lives in the upper byte of the first word. The
//! processor runs as an explicit state machine clocked by a signed debt
//! counter: executing a command charges the counter negative, gained clocks
//! pay it back, and a state whose charge is still outstanding simply returns
//! until enough time has passed. An idle processor polls for work every 500
//! drive units and lends its time to the filesystem walker between commands.

use super::buffers::{NUM_BUFFERS, NUM_PARTITIONS};
use super::drive::{DrivePhase, ScanDirection, PERIODIC_RELOAD};
use super::filter::{Filter, NO_FILTER, NUM_FILTERS};
use super::fs::FileRecord;
use super::position::{amsf_to_fad, status};
use super::transfer::{DataTransfer, SectorLength, TOC_WORDS};
use super::{CdBlock, Hirq};
use crate::core::disc::LEADOUT_TRACK;

/// Command opcodes, from the upper byte of the first command word
pub mod opcode {
    pub const GET_STATUS: u8 = 0x00;
    pub const GET_HW_INFO: u8 = 0x01;
    pub const GET_TOC: u8 = 0x02;
    pub const GET_SESSION_INFO: u8 = 0x03;
    pub const INIT: u8 = 0x04;
    pub const END_TRANSFER: u8 = 0x06;

    pub const PLAY: u8 = 0x10;
    pub const SEEK: u8 = 0x11;
    pub const SCAN: u8 = 0x12;

    pub const GET_SUBCODE: u8 = 0x20;

    pub const SET_DEVICE_CONN: u8 = 0x30;
    pub const GET_DEVICE_CONN: u8 = 0x31;
    pub const GET_LAST_DEST: u8 = 0x32;

    pub const SET_FILTER_RANGE: u8 = 0x40;
    pub const GET_FILTER_RANGE: u8 = 0x41;
    pub const SET_FILTER_SUBHEADER: u8 = 0x42;
    pub const GET_FILTER_SUBHEADER: u8 = 0x43;
    pub const SET_FILTER_MODE: u8 = 0x44;
    pub const GET_FILTER_MODE: u8 = 0x45;
    pub const SET_FILTER_CONN: u8 = 0x46;
    pub const GET_FILTER_CONN: u8 = 0x47;
    pub const RESET_SELECTOR: u8 = 0x48;

    pub const GET_BUFFER_SIZE: u8 = 0x50;
    pub const GET_SECTOR_COUNT: u8 = 0x51;
    pub const CALC_ACTUAL_SIZE: u8 = 0x52;
    pub const GET_ACTUAL_SIZE: u8 = 0x53;
    pub const GET_SECTOR_INFO: u8 = 0x54;
    pub const EXEC_FAD_SEARCH: u8 = 0x55;
    pub const GET_FAD_SEARCH: u8 = 0x56;

    pub const SET_SECTOR_LENGTH: u8 = 0x60;
    pub const GET_SECTOR_DATA: u8 = 0x61;
    pub const DELETE_SECTOR_DATA: u8 = 0x62;
    pub const GET_THEN_DELETE_SECTOR_DATA: u8 = 0x63;
    pub const PUT_SECTOR_DATA: u8 = 0x64;
    pub const COPY_SECTOR_DATA: u8 = 0x65;
    pub const MOVE_SECTOR_DATA: u8 = 0x66;
    pub const GET_COPY_ERROR: u8 = 0x67;

    pub const CHANGE_DIR: u8 = 0x70;
    pub const READ_DIR: u8 = 0x71;
    pub const GET_FS_SCOPE: u8 = 0x72;
    pub const GET_FILE_INFO: u8 = 0x73;
    pub const READ_FILE: u8 = 0x74;
    pub const ABORT_FILE: u8 = 0x75;

    pub const AUTH_DISC: u8 = 0xE0;
    pub const GET_AUTH_STATUS: u8 = 0xE1;
}

/// Command processor state
///
/// States whose entry charged the clock counter begin by checking the debt
/// and return while it is outstanding; the surplus of an overshoot carries
/// into the next charge. `Yield` is the one interruptible wait: resuming
/// from it discards the remaining debt so a freshly written command is
/// picked up immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdPhase {
    /// Boot-time self test delay
    PowerOn,
    /// Idle between polls
    Yield,
    /// Look for a pending command or walker work
    Poll,
    /// Walker finished; delay before its interrupt
    FsEfls,
    /// Trailing delay after the walker interrupt
    FsDone,
    /// Decode delay before running the latched command
    Dispatch,
    /// Command-specific completion delay, then the stashed interrupt
    CmdIrq,
    /// Init command's delay before arming the software reset
    SwResetArm,
    /// Deferred selector-reset delay
    ResetSelApply,
    /// Software reset settle time
    SwResetSettle,
}

impl CmdPhase {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::PowerOn => 0,
            Self::Yield => 1,
            Self::Poll => 2,
            Self::FsEfls => 3,
            Self::FsDone => 4,
            Self::Dispatch => 5,
            Self::CmdIrq => 6,
            Self::SwResetArm => 7,
            Self::ResetSelApply => 8,
            Self::SwResetSettle => 9,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::PowerOn),
            1 => Some(Self::Yield),
            2 => Some(Self::Poll),
            3 => Some(Self::FsEfls),
            4 => Some(Self::FsDone),
            5 => Some(Self::Dispatch),
            6 => Some(Self::CmdIrq),
            7 => Some(Self::SwResetArm),
            8 => Some(Self::ResetSelApply),
            9 => Some(Self::SwResetSettle),
            _ => None,
        }
    }
}

/// Saved result of the FAD search command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FadSearch {
    pub fad: u32,
    pub spos: u16,
    pub pnum: u8,
}

impl CdBlock {
    /// Status byte for the first result word
    ///
    /// Rejection overrides everything; an open tray or missing disc
    /// overrides the drive status. `hb` carries the high flag bits
    /// (periodic, data-transfer request, wait).
    pub(super) fn make_base_status(&self, rejected: bool, hb: u8) -> u8 {
        if rejected {
            return status::REJECTED;
        }

        let base = if self.tray_open {
            status::OPEN
        } else if self.disc.is_none() {
            status::NODISC
        } else {
            self.pos.status
        };

        base | hb
    }

    /// Fill the result words with a position report
    pub(super) fn make_report(&mut self, rejected: bool, hb: u8) {
        let base = self.make_base_status(rejected, hb);

        self.results[0] = (u16::from(base) << 8)
            | (u16::from(self.pos.is_cdrom) << 7)
            | u16::from(self.pos.repcount & 0x7F);
        self.results[1] = (u16::from(self.pos.ctrl_adr) << 8) | u16::from(self.pos.tno);
        self.results[2] = (u16::from(self.pos.idx) << 8) | ((self.pos.fad >> 16) as u16 & 0xFF);
        self.results[3] = self.pos.fad as u16;
    }

    /// Post a position report as the command's results and acknowledge it
    fn cd_status_results(&mut self, rejected: bool, hb: u8) {
        self.make_report(rejected, hb);
        self.results_read = false;
        self.command_pending = false;

        let irq = Hirq::CMOK | self.sw_reset_hirq_deferred;
        self.sw_reset_hirq_deferred = Hirq::empty();
        self.trigger_irq(irq);
    }

    /// Post explicit result words and acknowledge the command
    ///
    /// Both result paths also release any interrupt bits a software reset
    /// deferred, collapsing its acknowledge into this one.
    fn basic_results(&mut self, r0: u16, r1: u16, r2: u16, r3: u16) {
        self.results = [r0, r1, r2, r3];
        self.results_read = false;
        self.command_pending = false;

        let irq = Hirq::CMOK | self.sw_reset_hirq_deferred;
        self.sw_reset_hirq_deferred = Hirq::empty();
        self.trigger_irq(irq);
    }

    fn cmd_charge(&mut self, units: i64) {
        self.command_clock_counter -= units << 32;
    }

    /// Charge a completion delay and stash the interrupt to raise after it
    ///
    /// `bful` additionally raises the buffer-full interrupt if the pool is
    /// exhausted when the delay expires; `resume` releases backpressure
    /// afterwards.
    fn finish_with_irq(&mut self, units: i64, irq: Hirq, bful: bool, resume: bool) {
        self.cmd_charge(units);
        self.cmd_irq_pending = irq;
        self.cmd_irq_bful = bful;
        self.cmd_irq_resume = resume;
        self.cmd_phase = CmdPhase::CmdIrq;
    }

    /// Deferred per-command work after the results are posted
    ///
    /// A pending selector reset is applied here so it lands between
    /// commands, and an armed software reset begins its settle period.
    fn command_epilogue(&mut self) {
        if self.reset_sel_pending != 0 {
            let rflags = self.reset_sel_pending;
            self.reset_sel_pending = 0;
            self.apply_selector_reset(rflags);
        }

        if self.sw_reset_pending {
            self.sw_reset_pending = false;
            self.sw_reset();
            self.cmd_charge(8192 - 180);
            self.cmd_phase = CmdPhase::SwResetSettle;
            return;
        }

        self.cmd_phase = CmdPhase::Poll;
    }

    fn apply_selector_reset(&mut self, rflags: u8) {
        for pnum in 0..NUM_FILTERS as u8 {
            if (rflags & 0x04) != 0 {
                self.pool.clear_partition(pnum);
            }

            if (rflags & 0x10) != 0 {
                self.filters.filter_mut(pnum).reset_conditions();
            }

            if (rflags & 0x20) != 0 {
                if self.filters.device_conn() == pnum {
                    self.filters.set_device_conn(NO_FILTER);
                }
                if self.filters.filter(pnum).false_conn < NUM_FILTERS as u8 {
                    self.filters.filter_mut(pnum).false_conn = NO_FILTER;
                }
            }

            if (rflags & 0x40) != 0 {
                self.filters.filter_mut(pnum).true_conn = pnum;
            }

            if (rflags & 0x80) != 0 {
                self.filters.filter_mut(pnum).false_conn = NO_FILTER;
            }
        }

        self.trigger_irq(Hirq::ESEL);
        self.check_buf_pause_resume();
    }

    /// Advance the command processor as far as the clock debt allows
    pub(super) fn command_run(&mut self) {
        loop {
            match self.cmd_phase {
                CmdPhase::PowerOn => {
                    if self.command_clock_counter < 0 {
                        return;
                    }
                    self.power_on_init();
                    self.cmd_phase = CmdPhase::Poll;
                }

                CmdPhase::Yield => {
                    if self.command_clock_counter < 0 {
                        if !self.command_pending {
                            return;
                        }
                        // An early wake forgives the rest of the idle period.
                        self.command_clock_counter = 0;
                    }
                    self.cmd_phase = CmdPhase::Poll;
                }

                CmdPhase::Poll => {
                    if self.command_pending {
                        self.ctr = self.cdata;
                        self.cmd_charge(84);
                        self.cmd_phase = CmdPhase::Dispatch;
                    } else if self.fs_run() {
                        self.cmd_charge(60);
                        self.cmd_phase = CmdPhase::FsEfls;
                    } else {
                        self.cmd_charge(500);
                        self.cmd_phase = CmdPhase::Yield;
                        return;
                    }
                }

                CmdPhase::FsEfls => {
                    if self.command_clock_counter < 0 {
                        return;
                    }
                    self.trigger_irq(Hirq::EFLS);
                    self.cmd_charge(60);
                    self.cmd_phase = CmdPhase::FsDone;
                }

                CmdPhase::FsDone => {
                    if self.command_clock_counter < 0 {
                        return;
                    }
                    self.cmd_phase = CmdPhase::Poll;
                }

                CmdPhase::Dispatch => {
                    if self.command_clock_counter < 0 {
                        return;
                    }
                    self.run_command();
                }

                CmdPhase::CmdIrq => {
                    if self.command_clock_counter < 0 {
                        return;
                    }
                    let mut irq = self.cmd_irq_pending;
                    if self.cmd_irq_bful && self.pool.free_count() == 0 {
                        irq |= Hirq::BFUL;
                    }
                    self.trigger_irq(irq);
                    if self.cmd_irq_resume {
                        self.check_buf_pause_resume();
                    }
                    self.command_epilogue();
                }

                CmdPhase::SwResetArm => {
                    if self.command_clock_counter < 0 {
                        return;
                    }
                    self.sw_reset_pending = true;
                    if self.command_pending {
                        // Service the interposed command first; the reset
                        // fires in its epilogue.
                        self.cmd_phase = CmdPhase::Poll;
                    } else {
                        self.command_epilogue();
                    }
                }

                CmdPhase::ResetSelApply => {
                    if self.command_clock_counter < 0 {
                        return;
                    }
                    // Some titles read the device connection they expect
                    // this reset to clear; answer the query first and apply
                    // the reset in its epilogue.
                    if (self.reset_sel_pending & 0x3C) > 0x20
                        && self.command_pending
                        && (self.cdata[0] >> 8) as u8 == opcode::GET_DEVICE_CONN
                    {
                        self.cmd_phase = CmdPhase::Poll;
                    } else {
                        self.command_epilogue();
                    }
                }

                CmdPhase::SwResetSettle => {
                    if self.command_clock_counter < 0 {
                        return;
                    }
                    self.sw_reset_hirq_deferred = Hirq::MPED
                        | Hirq::EFLS
                        | Hirq::ECPY
                        | Hirq::EHST
                        | Hirq::ESEL
                        | Hirq::CMOK;
                    if !self.command_pending {
                        let irq = self.sw_reset_hirq_deferred;
                        self.sw_reset_hirq_deferred = Hirq::empty();
                        self.trigger_irq(irq);
                    }
                    self.cmd_phase = CmdPhase::Poll;
                }
            }
        }
    }

    /// One-time init after the boot self test
    fn power_on_init(&mut self) {
        self.standby_time = 0;
        self.ecc_enable = 0xFF;
        self.retry_count = 1;
        self.command_pending = false;
        self.sw_reset_pending = false;
        self.sw_reset_hirq_deferred = Hirq::empty();
        self.reset_sel_pending = 0;
        self.results_read = true;

        self.dt.reset();

        self.play_cmd_start = 0;
        self.play_cmd_end = 0;
        self.play_cmd_rep = 0;

        self.cur_play_repeat = 0;
        self.play_repeat_counter = 0;

        self.scan_mode = None;
        self.scan_counter = 0;

        self.drive_counter = 1000 << 32;
        self.drive_phase = DrivePhase::AwaitDisc;

        self.toc_buffer.fill(0xFF);

        self.auth_disc_type = 0;
        self.fs.records_valid = false;
        self.fs.root_valid = false;
        self.periodic_counter = PERIODIC_RELOAD;

        self.pos.status = status::OPEN;
        self.pos.is_cdrom = false;
        self.pos.clear_address();

        self.cdda.clear();

        self.sw_reset();

        self.pos.status = status::BUSY;
        self.pos.is_cdrom = false;
        self.cur_sector = 0;

        // "CDBLOCK" in the result words
        self.results = [0x0043, 0x4442, 0x4C4F, 0x434B];
        self.results_read = false;
        self.trigger_irq(
            Hirq::CMOK
                | Hirq::DCHG
                | Hirq::ESEL
                | Hirq::EHST
                | Hirq::MPED
                | Hirq::ECPY
                | Hirq::EFLS,
        );
    }

    /// Decode and run the latched command
    fn run_command(&mut self) {
        let op = (self.ctr[0] >> 8) as u8;

        log::trace!("CD Block: command 0x{:02X}", op);

        // While disc authentication runs, every command is answered with
        // all-ones and otherwise ignored.
        if self.fs.active && self.fs.do_auth {
            self.basic_results(0xFFFF, 0xFFFF, 0xFFFF, 0xFFFF);
            self.command_epilogue();
            return;
        }

        match op {
            opcode::GET_STATUS => {
                self.cd_status_results(false, 0);
                self.command_epilogue();
            }

            opcode::GET_HW_INFO => {
                let r0 = u16::from(self.make_base_status(false, 0)) << 8;
                self.basic_results(r0, 0x0002, 0x0000, 0x0600);
                self.command_epilogue();
            }

            opcode::GET_TOC => self.cmd_get_toc(),
            opcode::GET_SESSION_INFO => self.cmd_get_session_info(),
            opcode::INIT => self.cmd_init(),
            opcode::END_TRANSFER => self.cmd_end_transfer(),

            opcode::PLAY => self.cmd_play(),
            opcode::SEEK => self.cmd_seek(),
            opcode::SCAN => self.cmd_scan(),

            opcode::GET_SUBCODE => self.cmd_get_subcode(),

            opcode::SET_DEVICE_CONN => {
                let fnum = (self.ctr[2] >> 8) as u8;
                if fnum >= NUM_FILTERS as u8 && fnum != NO_FILTER {
                    self.cd_status_results(true, 0);
                    self.command_epilogue();
                } else {
                    self.filters.set_device_conn(fnum);
                    self.cd_status_results(false, 0);
                    self.finish_with_irq(96, Hirq::ESEL, false, false);
                }
            }

            opcode::GET_DEVICE_CONN => {
                let r0 = u16::from(self.make_base_status(false, 0)) << 8;
                let r2 = u16::from(self.filters.device_conn()) << 8;
                self.basic_results(r0, 0, r2, 0);
                self.command_epilogue();
            }

            opcode::GET_LAST_DEST => {
                let r0 = u16::from(self.make_base_status(false, 0)) << 8;
                let r2 = u16::from(self.filters.last_dest()) << 8;
                self.basic_results(r0, 0, r2, 0);
                self.command_epilogue();
            }

            opcode::SET_FILTER_RANGE => {
                let fnum = (self.ctr[2] >> 8) as u8;
                if fnum >= NUM_FILTERS as u8 {
                    self.cd_status_results(true, 0);
                    self.command_epilogue();
                } else {
                    let fad = (u32::from(self.ctr[0] & 0xFF) << 16) | u32::from(self.ctr[1]);
                    let range = (u32::from(self.ctr[2] & 0xFF) << 16) | u32::from(self.ctr[3]);
                    let f = self.filters.filter_mut(fnum);
                    f.fad = fad;
                    f.range = range;
                    self.cd_status_results(false, 0);
                    self.finish_with_irq(96, Hirq::ESEL, false, false);
                }
            }

            opcode::GET_FILTER_RANGE => {
                let fnum = (self.ctr[2] >> 8) as u8;
                if fnum >= NUM_FILTERS as u8 {
                    self.cd_status_results(true, 0);
                } else {
                    let f = self.filters.filter(fnum);
                    let (fad, range) = (f.fad, f.range);
                    let r0 =
                        (u16::from(self.make_base_status(false, 0)) << 8) | ((fad >> 16) as u16);
                    let r2 = (u16::from(fnum) << 8) | ((range >> 16) as u16);
                    self.basic_results(r0, fad as u16, r2, range as u16);
                }
                self.command_epilogue();
            }

            opcode::SET_FILTER_SUBHEADER => {
                let fnum = (self.ctr[2] >> 8) as u8;
                if fnum >= NUM_FILTERS as u8 {
                    self.cd_status_results(true, 0);
                    self.command_epilogue();
                } else {
                    let ctr = self.ctr;
                    let f = self.filters.filter_mut(fnum);
                    f.channel = ctr[0] as u8;
                    f.sub_mode_mask = (ctr[1] >> 8) as u8;
                    f.coding_info_mask = ctr[1] as u8;
                    f.file = ctr[2] as u8;
                    f.sub_mode = (ctr[3] >> 8) as u8;
                    f.coding_info = ctr[3] as u8;
                    self.cd_status_results(false, 0);
                    self.finish_with_irq(96, Hirq::ESEL, false, false);
                }
            }

            opcode::GET_FILTER_SUBHEADER => {
                let fnum = (self.ctr[2] >> 8) as u8;
                if fnum >= NUM_FILTERS as u8 {
                    self.cd_status_results(true, 0);
                } else {
                    let f = *self.filters.filter(fnum);
                    let r0 =
                        (u16::from(self.make_base_status(false, 0)) << 8) | u16::from(f.channel);
                    let r1 = (u16::from(f.sub_mode_mask) << 8) | u16::from(f.coding_info_mask);
                    let r2 = (u16::from(fnum) << 8) | u16::from(f.file);
                    let r3 = (u16::from(f.sub_mode) << 8) | u16::from(f.coding_info);
                    self.basic_results(r0, r1, r2, r3);
                }
                self.command_epilogue();
            }

            opcode::SET_FILTER_MODE => {
                let fnum = (self.ctr[2] >> 8) as u8;
                if fnum >= NUM_FILTERS as u8 {
                    self.cd_status_results(true, 0);
                    self.command_epilogue();
                } else {
                    let mode = self.ctr[0] as u8;
                    let f = self.filters.filter_mut(fnum);
                    f.mode = mode;
                    if (mode & Filter::MODE_INIT) != 0 {
                        f.reset_conditions();
                    }
                    self.cd_status_results(false, 0);
                    self.finish_with_irq(96, Hirq::ESEL, false, false);
                }
            }

            opcode::GET_FILTER_MODE => {
                let fnum = (self.ctr[2] >> 8) as u8;
                if fnum >= NUM_FILTERS as u8 {
                    self.cd_status_results(true, 0);
                } else {
                    let mode = self.filters.filter(fnum).mode;
                    let r0 = (u16::from(self.make_base_status(false, 0)) << 8) | u16::from(mode);
                    self.basic_results(r0, 0, u16::from(fnum) << 8, 0);
                }
                self.command_epilogue();
            }

            opcode::SET_FILTER_CONN => self.cmd_set_filter_conn(),

            opcode::GET_FILTER_CONN => {
                let fnum = (self.ctr[2] >> 8) as u8;
                if fnum >= NUM_FILTERS as u8 {
                    self.cd_status_results(true, 0);
                } else {
                    let f = self.filters.filter(fnum);
                    let r1 = (u16::from(f.true_conn) << 8) | u16::from(f.false_conn);
                    let r0 = u16::from(self.make_base_status(false, 0)) << 8;
                    self.basic_results(r0, r1, u16::from(fnum) << 8, 0);
                }
                self.command_epilogue();
            }

            opcode::RESET_SELECTOR => self.cmd_reset_selector(),

            opcode::GET_BUFFER_SIZE => {
                let r0 = u16::from(self.make_base_status(false, 0)) << 8;
                self.basic_results(
                    r0,
                    u16::from(self.pool.free_count()),
                    (NUM_FILTERS as u16) << 8,
                    NUM_BUFFERS as u16,
                );
                self.command_epilogue();
            }

            opcode::GET_SECTOR_COUNT => {
                let pnum = (self.ctr[2] >> 8) as u8;
                if pnum >= NUM_PARTITIONS as u8 {
                    self.cd_status_results(true, 0);
                } else {
                    let r0 = u16::from(self.make_base_status(false, 0)) << 8;
                    let count = u16::from(self.pool.partition(pnum).count);
                    self.basic_results(r0, 0, 0, count);
                }
                self.command_epilogue();
            }

            opcode::CALC_ACTUAL_SIZE => self.cmd_calc_actual_size(),

            opcode::GET_ACTUAL_SIZE => {
                let r0 = (u16::from(self.make_base_status(false, 0)) << 8)
                    | ((self.calced_actual_size >> 16) as u16);
                self.basic_results(r0, self.calced_actual_size as u16, 0, 0);
                self.command_epilogue();
            }

            opcode::GET_SECTOR_INFO => self.cmd_get_sector_info(),
            opcode::EXEC_FAD_SEARCH => self.cmd_exec_fad_search(),

            opcode::GET_FAD_SEARCH => {
                let r0 = u16::from(self.make_base_status(false, 0)) << 8;
                let r2 =
                    (u16::from(self.fad_search.pnum) << 8) | ((self.fad_search.fad >> 16) as u16);
                self.basic_results(r0, self.fad_search.spos, r2, self.fad_search.fad as u16);
                self.command_epilogue();
            }

            opcode::SET_SECTOR_LENGTH => self.cmd_set_sector_length(),

            opcode::GET_SECTOR_DATA
            | opcode::DELETE_SECTOR_DATA
            | opcode::GET_THEN_DELETE_SECTOR_DATA => self.cmd_sector_data(op),

            opcode::PUT_SECTOR_DATA => self.cmd_put_sector_data(),

            opcode::COPY_SECTOR_DATA | opcode::MOVE_SECTOR_DATA => self.cmd_copy_move(op),

            opcode::GET_COPY_ERROR => {
                let r0 = u16::from(self.make_base_status(false, 0)) << 8;
                self.basic_results(r0, 0, 0, 0);
                self.command_epilogue();
            }

            opcode::CHANGE_DIR => self.cmd_change_dir(),
            opcode::READ_DIR => self.cmd_read_dir(),
            opcode::GET_FS_SCOPE => self.cmd_get_fs_scope(),
            opcode::GET_FILE_INFO => self.cmd_get_file_info(),
            opcode::READ_FILE => self.cmd_read_file(),

            opcode::ABORT_FILE => {
                self.cd_status_results(false, 0);
                self.fs.abort = true;
                self.command_epilogue();
            }

            opcode::AUTH_DISC => self.cmd_auth_disc(),

            opcode::GET_AUTH_STATUS => {
                if self.fs.active && self.fs.do_auth {
                    self.cd_status_results(true, 0);
                } else {
                    let r0 = u16::from(self.make_base_status(false, 0)) << 8;
                    self.basic_results(r0, u16::from(self.auth_disc_type), 0, 0);
                }
                self.command_epilogue();
            }

            _ => {
                // Unhandled opcodes swallow the command without posting
                // results or acknowledging; the host is left to time out.
                log::warn!("CD Block: unhandled command 0x{:02X}", op);
                self.results_read = false;
                self.command_pending = false;
                self.command_epilogue();
            }
        }
    }

    fn cmd_get_toc(&mut self) {
        if self.drive_phase == DrivePhase::SpinUp || self.dt.active {
            self.cd_status_results(false, status::WAIT);
            self.command_epilogue();
            return;
        }

        let r0 = u16::from(self.make_base_status(false, status::DTREQ)) << 8;
        self.basic_results(r0, TOC_WORDS as u16, 0, 0);
        self.dt_start_virtual(DataTransfer::SRC_TOC, 0, TOC_WORDS);
        self.finish_with_irq(128, Hirq::DRDY, false, false);
    }

    fn cmd_get_session_info(&mut self) {
        if self.drive_phase == DrivePhase::SpinUp {
            self.cd_status_results(false, status::WAIT);
            self.command_epilogue();
            return;
        }

        let session = self.ctr[0] as u8;
        let (rsw, fad): (u16, u32) = match session {
            0 => (0x01, 150 + self.toc.tracks[LEADOUT_TRACK].lba),
            1 => (0x01, 0),
            _ => (0xFF, 0xFF_FFFF),
        };

        let r0 = u16::from(self.make_base_status(false, 0)) << 8;
        self.basic_results(r0, 0, (rsw << 8) | ((fad >> 16) as u16), fad as u16);
        self.command_epilogue();
    }

    fn cmd_init(&mut self) {
        self.clear_pending_sectors();
        self.cur_play_end = 0x80_0000;
        self.cur_play_repeat = 0;
        self.pos.status = status::BUSY;

        // Drive tuning parameters, each with a keep-current sentinel.
        if self.ctr[1] != 0xFFFF {
            self.standby_time = self.ctr[1];
        }
        if (self.ctr[2] >> 8) != 0xFF {
            self.ecc_enable = (self.ctr[2] >> 8) as u8;
        }
        if (self.ctr[2] & 0xFF) != 0xFF {
            self.retry_count = self.ctr[2] as u8;
        }

        self.cd_status_results(false, 0);

        if (self.ctr[0] & 0x1) != 0 {
            self.cmd_charge(180);
            self.cmd_phase = CmdPhase::SwResetArm;
        } else {
            self.command_epilogue();
        }
    }

    fn cmd_end_transfer(&mut self) {
        if !self.dt.active {
            let r0 = (u16::from(self.make_base_status(false, 0)) << 8) | 0xFF;
            self.basic_results(r0, 0xFFFF, 0, 0);
            self.command_epilogue();
            return;
        }

        self.dt.active = false;

        let total = self.dt.total_words;
        let r0 = (u16::from(self.make_base_status(false, 0)) << 8) | ((total >> 16) as u16);
        self.basic_results(r0, total as u16, 0, 0);

        if self.dt.writing {
            let filter = self.dt.filter;
            self.filters.disconnect_input(filter);
            for i in 0..self.dt.buf_count as usize {
                let index = self.dt.buf_list[i];
                self.filters.route(&mut self.pool, filter, index);
            }
            self.finish_with_irq(270, Hirq::EHST, true, true);
        } else {
            if self.dt.free_on_end {
                for i in 0..self.dt.buf_count as usize {
                    self.pool.free(self.dt.buf_list[i]);
                }
            }
            if (self.dt.buf_list[0] as usize) < NUM_BUFFERS {
                self.finish_with_irq(130, Hirq::EHST, false, true);
            } else {
                // Virtual sources have no buffers to hand back.
                self.check_buf_pause_resume();
                self.command_epilogue();
            }
        }
    }

    fn cmd_play(&mut self) {
        let mut psp = (u32::from(self.ctr[0] & 0xFF) << 16) | u32::from(self.ctr[1]);
        let mut pep = (u32::from(self.ctr[2] & 0xFF) << 16) | u32::from(self.ctr[3]);
        let pm = (self.ctr[2] >> 8) as u8;

        if psp == 0xFF_FFFF {
            psp = self.play_cmd_start;
        }

        if pep == 0xFF_FFFF {
            pep = self.play_cmd_end;
        } else if (psp & 0x80_0000) != 0 && (pep & 0x80_0000) != 0 {
            // In FAD form the end argument is a sector count.
            pep = 0x80_0000 | (psp.wrapping_add(pep) & 0x7F_FFFF);
        }

        // Mixed track/FAD addressing is refused.
        if ((psp ^ pep) & 0x80_0000) != 0 && pep != 0 {
            self.cd_status_results(true, 0);
            self.command_epilogue();
            return;
        }

        self.play_cmd_start = psp;
        self.play_cmd_end = pep;
        if (pm & 0x70) == 0 {
            self.play_cmd_rep = pm & 0x0F;
        }

        self.pos.status = status::BUSY;
        self.cd_status_results(false, 0);
        let rep = self.play_cmd_rep;
        self.start_seek(psp, pep, rep, Hirq::PEND, (pm & 0x80) != 0);
        self.command_epilogue();
    }

    fn cmd_seek(&mut self) {
        let target = (u32::from(self.ctr[0] & 0xFF) << 16) | u32::from(self.ctr[1]);

        self.pos.status = status::BUSY;
        self.cd_status_results(false, 0);

        if target == 0 {
            // Stop: spin down where the pickup sits.
            self.clear_pending_sectors();
            self.pos.is_cdrom = true;
            self.pos.repcount = 0x7F;
            self.pos.clear_address();
            self.drive_phase = DrivePhase::Stopped;
            self.drive_counter = 380_000 << 32;
        } else if target == 0xFF_FFFF {
            // Pause in place.
            if self.drive_phase == DrivePhase::Stopped {
                self.start_seek(0x80_0096, 0x80_0000, 0, Hirq::empty(), false);
            }
            self.sec_pre_buf_in = -self.sec_pre_buf_in.abs();
            self.play_end_irq = Hirq::empty();
            self.cur_play_end = 0x80_0000;
            self.cur_play_repeat = 0;
        } else {
            self.start_seek(target, 0x80_0000, 0, Hirq::empty(), false);
        }

        self.command_epilogue();
    }

    fn cmd_scan(&mut self) {
        let dir = match self.ctr[0] as u8 {
            0 => ScanDirection::Forward,
            1 => ScanDirection::Backward,
            _ => {
                self.cd_status_results(true, 0);
                self.command_epilogue();
                return;
            }
        };

        self.pos.status = status::BUSY;
        self.cd_status_results(false, 0);
        self.start_scan(dir);
        self.command_epilogue();
    }

    fn cmd_get_subcode(&mut self) {
        if self.dt.active {
            self.cd_status_results(false, status::WAIT);
            self.command_epilogue();
            return;
        }

        match self.ctr[0] as u8 {
            0 => {
                let r0 = u16::from(self.make_base_status(false, status::DTREQ)) << 8;
                self.basic_results(r0, 5, 0, 0);
                self.dt_start_virtual(DataTransfer::SRC_SUBQ, 0, 5);
            }
            1 => {
                let r0 = u16::from(self.make_base_status(false, status::DTREQ)) << 8;
                self.basic_results(r0, 12, 0, 0);
                // R..W decoding is not implemented; hand back all-ones.
                self.subcode.rw_snapshot = [0xFF; 24];
                self.dt_start_virtual(DataTransfer::SRC_SUBRW, 0, 12);
            }
            _ => {
                self.cd_status_results(true, 0);
                self.command_epilogue();
                return;
            }
        }

        self.finish_with_irq(128, Hirq::DRDY, false, false);
    }

    fn cmd_set_filter_conn(&mut self) {
        let fnum = (self.ctr[2] >> 8) as u8;
        let fcflags = self.ctr[0] as u8;
        let tconn = (self.ctr[1] >> 8) as u8;
        let fconn = self.ctr[1] as u8;

        let bad_true = (fcflags & 0x1) != 0 && tconn >= NUM_FILTERS as u8 && tconn != NO_FILTER;
        let bad_false = (fcflags & 0x2) != 0 && fconn >= NUM_FILTERS as u8 && fconn != NO_FILTER;

        if fnum >= NUM_FILTERS as u8 || bad_true || bad_false {
            self.cd_status_results(true, 0);
            self.command_epilogue();
            return;
        }

        if (fcflags & 0x1) != 0 {
            self.filters.filter_mut(fnum).true_conn = tconn;
        }
        if (fcflags & 0x2) != 0 {
            self.filters.connect_false(fnum, fconn);
        }

        self.cd_status_results(false, 0);
        self.finish_with_irq(96, Hirq::ESEL, false, false);
    }

    fn cmd_reset_selector(&mut self) {
        let rflags = self.ctr[0] as u8;

        if rflags == 0 {
            let pnum = (self.ctr[2] >> 8) as u8;
            if pnum >= NUM_PARTITIONS as u8 {
                self.cd_status_results(true, 0);
                self.command_epilogue();
            } else {
                self.pool.clear_partition(pnum);
                self.cd_status_results(false, 0);
                self.finish_with_irq(150, Hirq::ESEL, false, true);
            }
            return;
        }

        self.cd_status_results(false, 0);
        self.reset_sel_pending = rflags;
        self.cmd_charge(if (rflags & 0xAC) != 0 { 400 } else { 300 });
        self.cmd_phase = CmdPhase::ResetSelApply;
    }

    fn cmd_calc_actual_size(&mut self) {
        let pnum = (self.ctr[2] >> 8) as u8;
        if pnum >= NUM_PARTITIONS as u8 {
            self.cd_status_results(true, 0);
            self.command_epilogue();
            return;
        }

        let (offs, numsec) = self.resolve_span(pnum);
        let count = i32::from(self.pool.partition(pnum).count);

        if (self.dt.active && self.dt.writing)
            || numsec <= 0
            || offs < 0
            || offs + numsec > count
        {
            self.cd_status_results(false, status::WAIT);
            self.command_epilogue();
            return;
        }

        self.cd_status_results(false, 0);

        let mut total = 0u32;
        for index in self
            .pool
            .iter_partition(pnum)
            .skip(offs as usize)
            .take(numsec as usize)
        {
            let sd = self.pool.data(index);
            total += match self.get_sec_len {
                SectorLength::Data2048 => {
                    // Mode 2 Form 2 carries 2324 bytes of user data.
                    if sd[15] == 0x2 && (sd[18] & 0x20) != 0 {
                        1162
                    } else {
                        1024
                    }
                }
                SectorLength::Data2336 => 1168,
                SectorLength::Data2340 => 1170,
                SectorLength::Data2352 => 1176,
            };
        }
        self.calced_actual_size = total;

        self.finish_with_irq(240, Hirq::ESEL, false, false);
    }

    fn cmd_get_sector_info(&mut self) {
        let offs = self.ctr[1];
        let pnum = (self.ctr[2] >> 8) as u8;

        if pnum >= NUM_PARTITIONS as u8
            || (offs != 0xFFFF && u32::from(offs) >= u32::from(self.pool.partition(pnum).count))
            || self.pool.partition(pnum).count == 0
        {
            self.cd_status_results(true, 0);
            self.command_epilogue();
            return;
        }

        let index = if offs == 0xFFFF {
            self.pool.partition(pnum).last
        } else {
            let members: Vec<u8> = self.pool.iter_partition(pnum).collect();
            members[offs as usize]
        };

        let sd = self.pool.data(index);
        let fad = amsf_to_fad(sd[12], sd[13], sd[14]);
        let (file, chan, sub_mode, cinfo) = if sd[15] == 0x2 {
            (sd[16], sd[17], sd[18], sd[19])
        } else {
            (0, 0, 0, 0)
        };

        let r0 = (u16::from(self.make_base_status(false, 0)) << 8) | ((fad >> 16) as u16);
        let r2 = (u16::from(file) << 8) | u16::from(chan);
        let r3 = (u16::from(sub_mode) << 8) | u16::from(cinfo);
        self.basic_results(r0, fad as u16, r2, r3);
        self.command_epilogue();
    }

    fn cmd_exec_fad_search(&mut self) {
        let offs = self.ctr[1];
        let pnum = (self.ctr[2] >> 8) as u8;
        let sfad = (u32::from(self.ctr[2] & 0xFF) << 16) | u32::from(self.ctr[3]);

        if pnum >= NUM_PARTITIONS as u8
            || (offs != 0xFFFF && u32::from(offs) >= u32::from(self.pool.partition(pnum).count))
            || self.pool.partition(pnum).count == 0
        {
            self.cd_status_results(true, 0);
            self.command_epilogue();
            return;
        }

        self.fad_search.spos = 0xFFFF;
        self.fad_search.pnum = pnum;
        self.fad_search.fad = 0;

        let effoffs: i32 = if offs == 0xFFFF {
            i32::from(self.pool.partition(pnum).count) - 1
        } else {
            i32::from(offs)
        };

        // Pick the largest FAD at or below the target, earliest slot on ties.
        let mut match_made = false;
        for (counter, index) in self.pool.iter_partition(pnum).enumerate() {
            if (counter as i32) >= effoffs {
                let sd = self.pool.data(index);
                let fad = amsf_to_fad(sd[12], sd[13], sd[14]);

                if fad <= sfad && fad >= self.fad_search.fad + u32::from(match_made) {
                    self.fad_search.spos = counter as u16;
                    self.fad_search.fad = fad;
                    match_made = true;
                }
            }
        }

        self.cd_status_results(false, 0);
        self.finish_with_irq(300, Hirq::ESEL, false, false);
    }

    fn cmd_set_sector_length(&mut self) {
        let new_get = self.ctr[0] as u8;
        let new_put = (self.ctr[1] >> 8) as u8;

        let get_bad = new_get != 0xFF && SectorLength::from_code(new_get).is_none();
        let put_bad = new_put != 0xFF && SectorLength::from_code(new_put).is_none();

        if get_bad || put_bad {
            self.cd_status_results(true, 0);
            self.command_epilogue();
            return;
        }

        if let Some(len) = SectorLength::from_code(new_get) {
            self.get_sec_len = len;
        }
        if let Some(len) = SectorLength::from_code(new_put) {
            self.put_sec_len = len;
        }

        self.cd_status_results(false, 0);
        self.trigger_irq(Hirq::ESEL);
        self.command_epilogue();
    }

    fn cmd_sector_data(&mut self, op: u8) {
        let pnum = (self.ctr[2] >> 8) as u8;
        if pnum >= NUM_PARTITIONS as u8 {
            self.cd_status_results(true, 0);
            self.command_epilogue();
            return;
        }

        let (offs, numsec) = self.resolve_span(pnum);
        let count = i32::from(self.pool.partition(pnum).count);

        if (self.dt.active && op != opcode::DELETE_SECTOR_DATA)
            || numsec <= 0
            || offs < 0
            || offs + numsec > count
        {
            self.cd_status_results(false, status::WAIT);
            self.command_epilogue();
            return;
        }

        let window: Vec<u8> = self
            .pool
            .iter_partition(pnum)
            .skip(offs as usize)
            .take(numsec as usize)
            .collect();

        if op == opcode::DELETE_SECTOR_DATA {
            self.cd_status_results(false, 0);
            for &index in &window {
                self.pool.unlink(pnum, index);
                self.pool.free(index);
            }
            self.finish_with_irq(485, Hirq::EHST, false, true);
        } else {
            if op == opcode::GET_THEN_DELETE_SECTOR_DATA {
                for &index in &window {
                    self.pool.unlink(pnum, index);
                }
            }
            self.cd_status_results(false, status::DTREQ);
            self.dt_start_read(&window, op == opcode::GET_THEN_DELETE_SECTOR_DATA);
            self.finish_with_irq(460, Hirq::DRDY, false, false);
        }
    }

    fn cmd_put_sector_data(&mut self) {
        let fnum = (self.ctr[2] >> 8) as u8;
        let numsec = self.ctr[3];

        if fnum >= NUM_FILTERS as u8 {
            self.cd_status_results(true, 0);
            self.command_epilogue();
            return;
        }
        if numsec == 0 || u32::from(numsec) > u32::from(self.pool.free_count()) || self.dt.active {
            self.cd_status_results(false, status::WAIT);
            self.command_epilogue();
            return;
        }

        self.filters.disconnect_input(fnum);
        self.cd_status_results(false, status::DTREQ);

        let mut bufs = Vec::with_capacity(numsec as usize);
        for _ in 0..numsec {
            bufs.push(self.pool.allocate(true));
        }
        self.dt_start_write(&bufs, fnum);

        self.finish_with_irq(300, Hirq::DRDY, false, false);
    }

    fn cmd_copy_move(&mut self, op: u8) {
        let dst_fnum = self.ctr[0] as u8;
        let src_pnum = (self.ctr[2] >> 8) as u8;

        if src_pnum >= NUM_PARTITIONS as u8 || dst_fnum >= NUM_FILTERS as u8 {
            self.cd_status_results(true, 0);
            self.command_epilogue();
            return;
        }

        let (offs, numsec) = self.resolve_span(src_pnum);
        let count = i32::from(self.pool.partition(src_pnum).count);
        let need_free = op != opcode::MOVE_SECTOR_DATA;

        if self.dt.active
            || numsec <= 0
            || (need_free && numsec > i32::from(self.pool.free_count()))
            || offs < 0
            || offs + numsec > count
        {
            self.cd_status_results(false, status::WAIT);
            self.command_epilogue();
            return;
        }

        self.filters.disconnect_input(dst_fnum);

        let window: Vec<u8> = self
            .pool
            .iter_partition(src_pnum)
            .skip(offs as usize)
            .take(numsec as usize)
            .collect();

        for &index in &window {
            if op == opcode::MOVE_SECTOR_DATA {
                self.pool.unlink(src_pnum, index);
                self.filters.route(&mut self.pool, dst_fnum, index);
            } else {
                let copy = self.pool.allocate(false);
                let data = *self.pool.data(index);
                *self.pool.data_mut(copy) = data;
                self.filters.route(&mut self.pool, dst_fnum, copy);
            }
        }

        self.cd_status_results(false, 0);
        self.finish_with_irq(300, Hirq::ECPY, true, false);
    }

    fn cmd_change_dir(&mut self) {
        let fnum = (self.ctr[2] >> 8) as u8;
        let fileid = (u32::from(self.ctr[2] & 0xFF) << 16) | u32::from(self.ctr[3]);

        let mut reject = fnum >= NUM_FILTERS as u8;

        if fileid != 0xFF_FFFF {
            if !self.fs.records_valid {
                reject = true;
            } else if self.file_window_misses(fileid) {
                reject = true;
            } else if (self.fs.records[self.file_window_slot(fileid)].attr & FileRecord::ATTR_DIR)
                == 0
            {
                reject = true;
            }
        }

        if self.fs.active {
            self.cd_status_results(false, status::WAIT);
        } else if reject {
            self.cd_status_results(true, 0);
        } else if fileid == 0 {
            // Entering file 0 re-selects the current directory.
            self.cd_status_results(false, 0);
            self.finish_with_irq(400, Hirq::EFLS, false, false);
            return;
        } else {
            self.cd_status_results(false, 0);
            self.fs.first_index = 2;
            self.fs.dir_entry = if fileid == 0xFF_FFFF {
                0xFF_FFFF
            } else {
                self.file_window_slot(fileid) as u32
            };
            self.fs.pnum = fnum;
            self.fs.do_auth = false;
            self.fs.active = true;
        }

        self.command_epilogue();
    }

    fn cmd_read_dir(&mut self) {
        let fnum = (self.ctr[2] >> 8) as u8;
        let start = ((u32::from(self.ctr[2] & 0xFF) << 16) | u32::from(self.ctr[3])).max(2);

        if self.fs.active {
            self.cd_status_results(false, status::WAIT);
        } else if fnum >= NUM_FILTERS as u8 || !self.fs.records_valid {
            self.cd_status_results(true, 0);
        } else {
            self.cd_status_results(false, 0);
            self.fs.first_index = start;
            self.fs.dir_entry = 0;
            self.fs.pnum = fnum;
            self.fs.do_auth = false;
            self.fs.active = true;
        }

        self.command_epilogue();
    }

    fn cmd_get_fs_scope(&mut self) {
        if self.fs.active {
            self.cd_status_results(false, status::WAIT);
        } else if !self.fs.records_valid {
            self.cd_status_results(true, 0);
        } else {
            let r0 = u16::from(self.make_base_status(false, 0)) << 8;
            let r2 = (u16::from(!self.fs.window_more) << 8) | ((self.fs.window_base >> 16) as u16);
            self.basic_results(r0, u16::from(self.fs.window_count), r2, self.fs.window_base as u16);
        }

        self.command_epilogue();
    }

    fn cmd_get_file_info(&mut self) {
        let fileid = (u32::from(self.ctr[2] & 0xFF) << 16) | u32::from(self.ctr[3]);

        let reject = !self.fs.records_valid
            || (fileid != 0xFF_FFFF && self.file_window_misses(fileid))
            || (fileid == 0xFF_FFFF && self.fs.window_count == 0);

        if self.fs.active || self.dt.active {
            self.cd_status_results(false, status::WAIT);
            self.command_epilogue();
            return;
        }
        if reject {
            self.cd_status_results(true, 0);
            self.command_epilogue();
            return;
        }

        let (word_offs, words) = if fileid == 0xFF_FFFF {
            (6 * 2, 6 * u32::from(self.fs.window_count))
        } else {
            (6 * self.file_window_slot(fileid) as u32, 6)
        };

        self.dt_start_virtual(DataTransfer::SRC_FILE_INFO, word_offs, words);

        let r0 = u16::from(self.make_base_status(false, status::DTREQ)) << 8;
        self.basic_results(r0, words as u16, 0, 0);
        self.finish_with_irq(128, Hirq::DRDY, false, false);
    }

    fn cmd_read_file(&mut self) {
        let offset = (u32::from(self.ctr[0] & 0xFF) << 16) | u32::from(self.ctr[1]);
        let fileid = (u32::from(self.ctr[2] & 0xFF) << 16) | u32::from(self.ctr[3]);
        let fnum = (self.ctr[2] >> 8) as u8;

        if self.fs.active {
            self.cd_status_results(false, status::WAIT);
            self.command_epilogue();
            return;
        }
        if fnum >= NUM_FILTERS as u8 || !self.fs.records_valid || self.file_window_misses(fileid) {
            self.cd_status_results(true, 0);
            self.command_epilogue();
            return;
        }

        self.cd_status_results(false, 0);
        self.pool.clear_partition(fnum);

        let rec = self.fs.records[self.file_window_slot(fileid)];
        let start_fad = rec.fad.wrapping_add(offset) & 0xFF_FFFF;
        let sec_count = (rec.size.wrapping_add(2047) >> 11).wrapping_sub(offset);

        self.filters.set_device_conn(fnum);
        self.filters.filter_mut(fnum).true_conn = fnum;
        self.filters.connect_false(fnum, NO_FILTER);

        let f = self.filters.filter_mut(fnum);
        f.fad = start_fad;
        f.range = sec_count;
        f.mode = Filter::COND_FAD_RANGE | Filter::COND_FILE;
        f.file = rec.file_num;
        f.channel = 0;
        f.sub_mode = 0;
        f.sub_mode_mask = 0;
        f.coding_info = 0;
        f.coding_info_mask = 0;

        self.start_seek(
            0x80_0000 | start_fad,
            0x80_0000 | (start_fad.wrapping_add(sec_count) & 0x7F_FFFF),
            0,
            Hirq::EFLS,
            false,
        );
        self.command_epilogue();
    }

    fn cmd_auth_disc(&mut self) {
        let fnum = (self.ctr[2] >> 8) as u8;

        if fnum >= NUM_FILTERS as u8 {
            self.cd_status_results(true, 0);
            self.command_epilogue();
            return;
        }
        if self.fs.active {
            self.cd_status_results(false, status::WAIT);
            self.command_epilogue();
            return;
        }

        self.cd_status_results(false, 0);

        if (self.toc.tracks[1].control & 0x4) == 0 {
            // Audio disc: nothing to verify.
            self.auth_disc_type = 0x01;
            self.finish_with_irq(200, Hirq::EFLS, false, false);
        } else {
            self.fs.pnum = fnum;
            self.fs.do_auth = true;
            self.fs.active = true;
            self.command_epilogue();
        }
    }

    /// Resolve the offset/count arguments shared by the sector-data commands
    ///
    /// An all-ones offset means the newest sector, an all-ones count means
    /// everything from the offset on. Returned values may be out of range;
    /// callers validate against the partition count.
    fn resolve_span(&self, pnum: u8) -> (i32, i32) {
        let count = i32::from(self.pool.partition(pnum).count);

        let offs = if self.ctr[1] == 0xFFFF {
            count - 1
        } else {
            i32::from(self.ctr[1])
        };

        let numsec = if self.ctr[3] == 0xFFFF {
            count - offs
        } else {
            i32::from(self.ctr[3])
        };

        (offs, numsec)
    }

    /// Whether a file identifier falls outside the cached record window
    fn file_window_misses(&self, fileid: u32) -> bool {
        fileid >= 2
            && (fileid < self.fs.window_base
                || fileid >= self.fs.window_base + u32::from(self.fs.window_count))
    }

    /// Record-table slot for an in-window file identifier
    fn file_window_slot(&self, fileid: u32) -> usize {
        if fileid < 2 {
            fileid as usize
        } else {
            (2 + fileid - self.fs.window_base) as usize
        }
    }
}
