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

//! Drive mechanism state machine
//!
//! Models the physical side of the CD block: tray events, spin-up, seeks
//! with index acquisition, playback, scan jumps, and the pause states used
//! for both commanded pauses and buffer-full backpressure. Time advances in
//! drive clock units (44.1 kHz x 256 per second) held as 32.32 fixed point,
//! and a separate periodic counter drives end-of-play detection, status
//! report refresh, and the subcode Q interrupt.

use super::position::{bcd_to_dec, status, SUBCODE_SIZE};
use super::{CdBlock, Hirq};
use crate::core::disc::LEADOUT_TRACK;

/// Drive clock units per second
pub const UNITS_PER_SECOND: i64 = 44_100 * 256;

/// Sector period at double speed (CD-ROM data)
const SECTOR_PERIOD_2X: i64 = UNITS_PER_SECOND / 150;

/// Sector period at single speed (CD-DA)
const SECTOR_PERIOD_1X: i64 = UNITS_PER_SECOND / 75;

/// Idle time between periodic status refreshes, 32.32 fixed point
pub(super) const PERIODIC_RELOAD: i64 = 187_065 << 32;

/// Periodic holdoff applied while a fetched sector is still in flight
const SECTOR_PERIODIC_HOLDOFF: i64 = 17_712 << 32;

/// Drive units between committing a seek target and exposing it to the host
///
/// Closer to 600 on hardware; 500 keeps titles with tight status polling
/// loops working under imprecise host CPU timing.
pub(super) const SEEK_CPI_UPDATE_DELAY: i64 = 500;

/// Subcode acquisition window granted to a fresh seek
const SEEK_ACQUIRE_WINDOW: i64 = 256_000;

/// Scan jump direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Backward,
}

/// Mechanical state of the drive
///
/// The three `Seek*` stages split one commanded seek into target
/// resolution, pickup preparation, and sled motion; `Seek` itself is the
/// subcode acquisition loop that follows. `Pause` covers commanded pauses,
/// end-of-play stops, and buffer-full backpressure alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrivePhase {
    Stopped,
    Play,
    Pause,
    SeekResolve,
    SeekPrepare,
    SeekMotion,
    Seek,
    EjectClear,
    EjectNotify,
    AwaitDisc,
    SpinUp,
    Resetting,
}

impl DrivePhase {
    /// Stable wire value for save states
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Play => 1,
            Self::Pause => 2,
            Self::SeekResolve => 3,
            Self::SeekPrepare => 4,
            Self::SeekMotion => 5,
            Self::Seek => 6,
            Self::EjectClear => 7,
            Self::EjectNotify => 8,
            Self::AwaitDisc => 9,
            Self::SpinUp => 10,
            Self::Resetting => 11,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Stopped),
            1 => Some(Self::Play),
            2 => Some(Self::Pause),
            3 => Some(Self::SeekResolve),
            4 => Some(Self::SeekPrepare),
            5 => Some(Self::SeekMotion),
            6 => Some(Self::Seek),
            7 => Some(Self::EjectClear),
            8 => Some(Self::EjectNotify),
            9 => Some(Self::AwaitDisc),
            10 => Some(Self::SpinUp),
            11 => Some(Self::Resetting),
            _ => None,
        }
    }
}

impl ScanDirection {
    pub(crate) fn code(opt: Option<Self>) -> u8 {
        match opt {
            None => 0xFF,
            Some(Self::Forward) => 0,
            Some(Self::Backward) => 1,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Option<Self>> {
        match code {
            0xFF => Some(None),
            0 => Some(Some(Self::Forward)),
            1 => Some(Some(Self::Backward)),
            _ => None,
        }
    }
}

impl CdBlock {
    /// Sector period for the current track type, 32.32 fixed point
    fn sector_period(&self) -> i64 {
        if (self.subcode.safe_q()[0] & 0x40) != 0 {
            SECTOR_PERIOD_2X << 32
        } else {
            SECTOR_PERIOD_1X << 32
        }
    }

    /// Advance the drive mechanism by `clocks` 32.32 drive units
    pub(super) fn drive_run(&mut self, clocks: i64) {
        self.drive_counter -= clocks;
        self.periodic_counter -= clocks;

        while self.drive_counter <= 0 {
            match self.drive_phase {
                DrivePhase::EjectClear => {
                    self.toc_buffer.fill(0xFF);

                    self.auth_disc_type = 0;
                    self.fs.records_valid = false;
                    self.fs.root_valid = false;

                    self.pos.status = status::OPEN;
                    self.pos.clear_address();
                    self.pos.is_cdrom = true;
                    self.pos.repcount = 0x7F;
                    self.trigger_irq(Hirq::DCHG);

                    self.drive_phase = DrivePhase::EjectNotify;
                    self.drive_counter = 4000 << 32;
                }

                DrivePhase::EjectNotify => {
                    self.trigger_irq(Hirq::EFLS);
                    self.drive_phase = DrivePhase::AwaitDisc;
                    self.drive_counter = 1 << 32;
                }

                DrivePhase::AwaitDisc => {
                    if self.disc.is_some() {
                        self.pos.status = status::BUSY;
                        self.drive_phase = DrivePhase::SpinUp;
                        self.drive_counter = UNITS_PER_SECOND << 32;
                    } else {
                        self.drive_counter = 1000 << 32;
                    }
                }

                DrivePhase::SpinUp => {
                    self.translate_toc();
                    self.start_seek(0x80_0096, 0x80_0000, 0, Hirq::empty(), false);
                }

                DrivePhase::Stopped => {
                    self.pos.status = status::STANDBY;
                    self.drive_counter += 2000 << 32;
                }

                DrivePhase::SeekResolve => {
                    self.seek_resolve_target();
                    self.seek_prepare(SEEK_CPI_UPDATE_DELAY);
                }

                DrivePhase::SeekPrepare => {
                    self.seek_prepare(SEEK_CPI_UPDATE_DELAY);
                }

                DrivePhase::SeekMotion => {
                    let fad_delta = self.pos.fad as i32 - self.cur_sector;

                    let mut seek_time = 12 * SECTOR_PERIOD_2X;
                    seek_time +=
                        fad_delta.abs() as i64 * if fad_delta < 0 { 28 } else { 26 };
                    if fad_delta < 0 || fad_delta >= 150 {
                        seek_time += SECTOR_PERIOD_2X;
                    }

                    self.pos.status = status::SEEK;
                    self.drive_phase = DrivePhase::Seek;
                    self.drive_counter += seek_time << 32;
                    self.cur_sector = self.pos.fad as i32;
                    self.subcode.invalidate();
                }

                DrivePhase::Seek => self.drive_seek_acquire(),

                DrivePhase::Play => {
                    self.drive_play_sector();
                    self.drive_fetch_next();
                }

                DrivePhase::Pause => {
                    self.drive_fetch_next();
                }

                DrivePhase::Resetting => {
                    self.drive_counter = i64::MAX;
                }
            }
        }

        if self.periodic_counter <= 0 {
            self.drive_periodic();
        }
    }

    /// One pass of the subcode acquisition loop after sled motion
    ///
    /// Reads subchannel data only, creeping forward until a CRC-clean Q
    /// arrives. Track/index seeks then compare the decoded position against
    /// the target and nudge the pickup in coarse outward and fine inward
    /// steps until the index is reached.
    fn drive_seek_acquire(&mut self) {
        let mut pwbuf = [0u8; SUBCODE_SIZE];
        if let Some(disc) = self.disc.as_mut() {
            disc.read_subcode(self.cur_sector - 150, &mut pwbuf);
        }

        let old_safe_valid = self.subcode.safe_valid();
        self.subcode.decode(&pwbuf);

        if !self.subcode.safe_valid() {
            self.cur_sector += 1;
            self.drive_counter += SECTOR_PERIOD_2X << 32;
            return;
        }

        let mut index_ok = true;

        if !old_safe_valid {
            self.cur_sector = self.pos.fad as i32;
        }

        if (self.cur_play_start & 0x80_0000) == 0 {
            let start_track = (((self.cur_play_start >> 8) & 0xFF) as u8)
                .clamp(self.toc.first_track, self.toc.last_track);
            let start_index = ((self.cur_play_start & 0xFF) as u8).clamp(1, 99);

            let q = self.subcode.safe_q();
            let sq_idx = bcd_to_dec(q[2]);
            let sq_tno = if q[1] >= 0xA0 { q[1] } else { bcd_to_dec(q[1]) };

            if sq_idx < start_index && sq_tno <= start_track {
                index_ok = false;
                if self.seek_index_phase == 2 {
                    self.cur_sector += 4;
                } else {
                    self.cur_sector += 128;
                    self.seek_index_phase = 1;
                }
                self.drive_counter += SECTOR_PERIOD_2X << 32;
            } else if self.seek_index_phase == 1 {
                index_ok = false;
                self.cur_sector -= 124;
                self.drive_counter += SECTOR_PERIOD_2X << 32;
                self.seek_index_phase = 2;
            }
        }

        if index_ok {
            self.play_sector_processed = false;
            self.drive_phase = DrivePhase::Play;
            self.drive_counter += self.sector_period();
        }
    }

    /// Consume the prefetched sector while playing
    ///
    /// CD-DA sectors stream into the audio ring (attenuated during scans);
    /// data sectors are admitted to the buffer pool and routed through the
    /// filter graph, but only once disc authentication has passed. A data
    /// sector with no free buffer stays in the prefetch slot, which stalls
    /// the pickup until the periodic check drops the drive into pause.
    fn drive_play_sector(&mut self) {
        if self.sec_pre_buf_in <= 0 {
            return;
        }

        let audio_sector = (self.subcode.safe_q()[0] & 0x40) == 0;

        if self.scan_mode.is_some() {
            if audio_sector {
                self.cdda.push_sector(&self.sec_pre_buf, 2);
            }
            self.pos.is_cdrom = false;
            self.sec_pre_buf_in = 0;
        } else if audio_sector {
            self.cdda.push_sector(&self.sec_pre_buf, 0);
            self.pos.is_cdrom = false;
            self.sec_pre_buf_in = 0;
        } else {
            self.pos.is_cdrom = true;

            if self.pool.free_count() > 0 {
                if self.auth_disc_type != 0 {
                    let index = self.pool.allocate(false);
                    self.pool.data_mut(index).copy_from_slice(&self.sec_pre_buf);

                    let entry = self.filters.device_conn();
                    self.filters.last_dest = self.filters.route(&mut self.pool, entry, index);
                }
                self.sec_pre_buf_in = 0;
                self.trigger_irq(Hirq::CSCT);
                if self.pool.free_count() == 0 {
                    self.trigger_irq(Hirq::BFUL);
                }
            }
        }

        if self.sec_pre_buf_in == 0 {
            self.play_sector_processed = true;

            if let Some(dir) = self.scan_mode {
                self.scan_counter += if audio_sector { 2 } else { 1 };
                if self.scan_counter >= 6 {
                    self.scan_counter = 0;

                    match dir {
                        ScanDirection::Forward => {
                            let jump =
                                ((1_773_936u64 * self.cur_sector as u64 + (1 << 31)) >> 32) as i32;
                            self.cur_sector += 102 + jump;
                        }
                        ScanDirection::Backward => {
                            let jump = 104
                                + ((2_180_000u64 * self.cur_sector as u64 + (1 << 31)) >> 32)
                                    as i32;
                            self.cur_sector -= jump.min(self.cur_sector);
                        }
                    }

                    if let Some(disc) = self.disc.as_mut() {
                        disc.hint(self.cur_sector - 150);
                    }
                } else {
                    self.cur_sector += 1;
                }
            } else {
                self.cur_sector += 1;
            }
        }
    }

    /// Prefetch the next sector and update the reported position
    ///
    /// Shared by play and pause: a paused drive keeps re-reading the sector
    /// under the pickup so position reports and subcode stay live.
    fn drive_fetch_next(&mut self) {
        self.periodic_counter = SECTOR_PERIODIC_HOLDOFF;

        if self.sec_pre_buf_in == 0 {
            if let Some(disc) = self.disc.as_mut() {
                disc.read_sector(self.cur_sector - 150, &mut self.sec_pre_buf, &mut self.sec_pre_sub);
            }
            self.sec_pre_buf_in = 1;

            self.pos.fad = self.cur_sector as u32;
            if self.subcode.decode(&self.sec_pre_sub) {
                let q = &self.subcode.q_raw;
                self.pos.rel_fad = (bcd_to_dec(q[3]) as u32 * 60 + bcd_to_dec(q[4]) as u32) * 75
                    + bcd_to_dec(q[5]) as u32;
                self.pos.tno = if q[1] >= 0xA0 { q[1] } else { bcd_to_dec(q[1]) };
                self.pos.idx = bcd_to_dec(q[2]);
            }
        }

        self.drive_counter += self.sector_period();
    }

    /// Periodic housekeeping: end-of-play handling, pause sequencing,
    /// report refresh, and the subcode Q interrupt
    fn drive_periodic(&mut self) {
        self.periodic_counter = PERIODIC_RELOAD;

        if self.sec_pre_buf_in != 0
            && matches!(self.drive_phase, DrivePhase::Play | DrivePhase::Pause)
        {
            let end_met = self.check_end_met();

            if self.drive_phase == DrivePhase::Pause {
                self.sec_pre_buf_in = 0;

                if self.pause_counter == 1 {
                    self.pos.status = status::PAUSE;

                    if end_met && !self.play_end_irq.is_empty() {
                        // No IRQ if we have repeated and no non-end sector
                        // has played since.
                        if (self.play_repeat_counter & 0x80) == 0 {
                            self.trigger_irq(self.play_end_irq);
                        }
                        self.play_end_irq = Hirq::empty();
                    }
                    self.pause_counter = -1;
                } else if self.pause_counter == -1 {
                    self.pos.status = status::PAUSE;

                    if !end_met && self.pool.free_count() > 0 {
                        self.pos.status = status::BUSY;
                        self.drive_phase = DrivePhase::SeekPrepare;
                        self.drive_counter = SEEK_CPI_UPDATE_DELAY << 32;
                    }
                } else {
                    self.pause_counter += 1;
                }
            } else if end_met {
                self.sec_pre_buf_in = 0;

                if self.play_repeat_counter >= self.cur_play_repeat {
                    self.cur_sector = self.pos.fad as i32;
                    self.pos.status = status::BUSY;
                    self.drive_phase = DrivePhase::Pause;
                    self.pause_counter = if self.play_end_irq.is_empty() { 1 } else { 0 };
                } else {
                    if self.play_repeat_counter < 0xE {
                        self.play_repeat_counter += 1;
                    }
                    self.play_repeat_counter |= 0x80;

                    self.seek_resolve_target();
                    self.seek_prepare(0);
                }
            } else if (self.subcode.safe_q()[0] & 0x40) != 0 && self.pool.free_count() == 0 {
                self.sec_pre_buf_in = 0;
                self.pos.status = status::BUSY;
                self.drive_phase = DrivePhase::Pause;
                self.pause_counter = 0;
            } else {
                self.play_repeat_counter &= !0x80;

                if self.play_sector_processed {
                    self.pos.status = if self.scan_mode.is_some() {
                        status::SCAN
                    } else {
                        status::PLAY
                    };
                    self.play_sector_processed = false;
                }
            }
        }

        if self.results_read {
            if self.fs.active && self.fs.do_auth {
                self.results[0] = 0x00FF | ((status::PERIODIC as u16) << 8);
                self.results[1] = 0xFFFF;
                self.results[2] = 0xFFFF;
                self.results[3] = 0xFFFF;
            } else {
                self.make_report(false, status::PERIODIC);
            }
        }

        let q = &mut self.subcode.q_snapshot;
        q[0] = self.pos.ctrl_adr;
        q[1] = self.pos.tno;
        q[2] = self.pos.idx;
        q[3] = (self.pos.rel_fad >> 16) as u8;
        q[4] = (self.pos.rel_fad >> 8) as u8;
        q[5] = self.pos.rel_fad as u8;
        q[6] = 0;
        q[7] = (self.pos.fad >> 16) as u8;
        q[8] = (self.pos.fad >> 8) as u8;
        q[9] = self.pos.fad as u8;

        self.trigger_irq(Hirq::SCDQ);
    }

    /// Resolve the commanded start position into a reported position
    ///
    /// FAD targets clamp to the program area and pick up track attributes
    /// from the table of contents; track/index targets clamp to the disc's
    /// track range.
    pub(super) fn seek_resolve_target(&mut self) {
        if (self.cur_play_start & 0x80_0000) != 0 {
            let leadout_fad = 150 + self.toc.tracks[LEADOUT_TRACK].lba as i32;
            let mut fad_target = (self.cur_play_start & 0x7F_FFFF) as i32;
            let mut tt = 1;

            if fad_target < 150 {
                fad_target = 150;
            } else if fad_target >= leadout_fad {
                fad_target = leadout_fad;
            }

            for track in 1..=LEADOUT_TRACK {
                let t = &self.toc.tracks[track];
                if !t.valid {
                    continue;
                }
                if fad_target < 150 + t.lba as i32 {
                    break;
                }
                tt = track;
            }

            let t = &self.toc.tracks[tt];
            self.pos.tno = if tt == LEADOUT_TRACK { 0xAA } else { tt as u8 };
            self.pos.idx = 1;
            self.pos.fad = fad_target as u32;
            self.pos.rel_fad = (fad_target - (150 + t.lba as i32)) as u32;
            self.pos.ctrl_adr = (t.control << 4) | t.adr;
        } else {
            let track_target = (((self.cur_play_start >> 8) & 0xFF) as u8)
                .clamp(self.toc.first_track, self.toc.last_track);
            let index_target = ((self.cur_play_start & 0xFF) as u8).clamp(1, 99);

            let t = &self.toc.tracks[track_target as usize];
            self.pos.tno = track_target;
            self.pos.idx = index_target;
            self.pos.fad = 150 + t.lba;
            self.pos.rel_fad = 0;
            self.pos.ctrl_adr = (t.control << 4) | t.adr;
        }
    }

    /// Ready the pickup for sled motion toward the resolved target
    pub(super) fn seek_prepare(&mut self, delay_sub: i64) {
        self.pos.status = status::BUSY;
        self.pos.is_cdrom = false;
        self.pos.repcount = self.play_repeat_counter & 0xF;
        self.drive_phase = DrivePhase::SeekMotion;

        if let Some(disc) = self.disc.as_mut() {
            disc.hint(self.pos.fad as i32 - 150);
        }

        self.drive_counter = (SEEK_ACQUIRE_WINDOW - delay_sub) << 32;
        self.seek_index_phase = 0;
    }

    /// Complete a seek startup still sitting in its pre-motion stages
    ///
    /// A new seek or scan command lands while the previous one has not
    /// resolved yet; finish the old one instantly rather than interleaving
    /// two startups.
    fn force_complete_seek_startup(&mut self) {
        if self.drive_phase == DrivePhase::SeekResolve {
            self.seek_resolve_target();
            self.seek_prepare(0);
        } else if self.drive_phase == DrivePhase::SeekPrepare {
            self.seek_prepare(0);
        }
    }

    /// Commit a new play window and begin seeking toward its start
    ///
    /// `no_pickup` keeps the pickup and pending sector state where they are
    /// when the drive is already playing; the window change alone takes
    /// effect. An `end` of zero disables end detection entirely, and an end
    /// FAD of zero (0x800000) makes every sector count as past-the-end.
    pub(super) fn start_seek(
        &mut self,
        target: u32,
        end: u32,
        repeat: u8,
        end_irq: Hirq,
        no_pickup: bool,
    ) {
        if self.disc.is_none() {
            return;
        }

        self.force_complete_seek_startup();

        self.play_repeat_counter = 0;

        if !no_pickup {
            self.clear_pending_sectors();
        }

        self.cur_play_start = target;
        self.cur_play_end = end;
        self.cur_play_repeat = repeat;
        self.play_end_irq = end_irq;

        if no_pickup && self.drive_phase == DrivePhase::Play && self.scan_mode.is_none() {
            return;
        }

        log::trace!(
            "CD Block: seek start=0x{:06X} end=0x{:06X} repeat={}",
            target,
            end,
            repeat
        );

        self.scan_mode = None;
        self.pos.status = status::BUSY;
        self.drive_phase = if no_pickup {
            DrivePhase::SeekPrepare
        } else {
            DrivePhase::SeekResolve
        };
        self.periodic_counter = PERIODIC_RELOAD;
        self.drive_counter = SEEK_CPI_UPDATE_DELAY << 32;
    }

    /// Begin a fast-forward or fast-reverse scan from the current position
    pub(super) fn start_scan(&mut self, dir: ScanDirection) {
        if self.disc.is_none() {
            return;
        }

        self.force_complete_seek_startup();

        self.clear_pending_sectors();
        self.play_sector_processed = false;

        log::debug!("CD Block: scan {:?}", dir);

        self.scan_mode = Some(dir);
        self.scan_counter = 0;

        self.pos.status = status::BUSY;
        self.cur_play_repeat = 0;
        self.periodic_counter = PERIODIC_RELOAD;

        if self.drive_phase != DrivePhase::Play {
            self.drive_phase = DrivePhase::SeekPrepare;
            self.drive_counter = SEEK_CPI_UPDATE_DELAY << 32;
        }
    }

    /// Whether the reported position has left the play window
    ///
    /// Lead-out always counts as past-the-end. The start-side check guards
    /// against the pickup drifting backwards out of the window, which would
    /// otherwise let a repeat play from before the commanded start.
    pub(super) fn check_end_met(&self) -> bool {
        let mut end_met = self.pos.tno == 0xAA;

        if self.cur_play_end != 0 {
            if (self.cur_play_end & 0x80_0000) != 0 {
                end_met |= self.pos.fad >= (self.cur_play_end & 0x7F_FFFF);
            } else {
                let end_track = (((self.cur_play_end >> 8) & 0xFF) as u8)
                    .clamp(self.toc.first_track, self.toc.last_track);
                let end_index = ((self.cur_play_end & 0xFF) as u8).clamp(1, 99);

                end_met |= self.pos.tno > end_track
                    || (self.pos.tno == end_track && self.pos.idx > end_index);
            }
        }

        if (self.cur_play_start & 0x80_0000) != 0 {
            end_met |= self.pos.fad < (self.cur_play_start & 0x7F_FFFF);
        } else {
            let start_track = (((self.cur_play_start >> 8) & 0xFF) as u8)
                .clamp(self.toc.first_track, self.toc.last_track);

            end_met |= self.pos.tno < start_track;
        }

        end_met
    }

    /// Resume a backpressure-paused drive once buffers free up
    pub(super) fn check_buf_pause_resume(&mut self) {
        if self.drive_phase != DrivePhase::Pause {
            return;
        }

        if !self.check_end_met() && self.pool.free_count() > 0 {
            self.sec_pre_buf_in = 0;
            self.pos.status = status::BUSY;
            self.drive_phase = DrivePhase::SeekPrepare;
            self.drive_counter = SEEK_CPI_UPDATE_DELAY << 32;
            self.periodic_counter = PERIODIC_RELOAD;
        }
    }

    /// Drop the prefetched sector, pending end interrupt, and audio ring
    pub(super) fn clear_pending_sectors(&mut self) {
        self.play_end_irq = Hirq::empty();
        self.sec_pre_buf_in = 0;
        self.cdda.clear();
    }
}
