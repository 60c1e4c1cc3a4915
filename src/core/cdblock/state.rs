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

//! Serializable CD block snapshot
//!
//! [`CdBlockState`] mirrors every live field of [`CdBlock`] in plain
//! serializable types: bitflags become raw bits, enums become byte codes,
//! and arrays too large for serde derives become `Vec`s of checked length.
//! The disc image itself, the host clock ratio, and the tray switch are
//! not part of a snapshot; the frontend re-attaches those after a load.
//!
//! [`apply`](CdBlockState::apply) validates before it touches anything
//! that could index out of range: malformed container shapes fail the
//! whole restore, while merely inconsistent machine state (broken buffer
//! links, a mid-air transfer with impossible cursors) resets the affected
//! unit the same way the real firmware recovers from a glitched RAM image.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::core::error::SaveStateError;

use super::buffers::{Partition, NUM_BUFFERS, NUM_PARTITIONS, RAW_SECTOR_SIZE};
use super::cdda::CDDA_CAPACITY;
use super::commands::{CmdPhase, FadSearch};
use super::drive::{DrivePhase, ScanDirection};
use super::filter::{Filter, NO_FILTER, NUM_FILTERS};
use super::fs::{FileRecord, WalkPhase, PAYLOAD_SIZE};
use super::position::{PositionInfo, SUBCODE_SIZE};
use super::transfer::{SectorLength, FIFO_DEPTH};
use super::{CdBlock, Hirq, TOC_BUFFER_SIZE};

/// Snapshot of one routing filter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Encode, Decode)]
pub struct FilterState {
    pub mode: u8,
    pub true_conn: u8,
    pub false_conn: u8,
    pub fad: u32,
    pub range: u32,
    pub channel: u8,
    pub file: u8,
    pub sub_mode: u8,
    pub sub_mode_mask: u8,
    pub coding_info: u8,
    pub coding_info_mask: u8,
}

/// Snapshot of the sector buffer pool
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct BufferPoolState {
    /// All buffer payloads back to back, `NUM_BUFFERS * RAW_SECTOR_SIZE` bytes
    pub data: Vec<u8>,
    /// Backward links, one byte per buffer
    pub prev: Vec<u8>,
    /// Forward links, one byte per buffer
    pub next: Vec<u8>,
    pub partition_first: [u8; NUM_PARTITIONS],
    pub partition_last: [u8; NUM_PARTITIONS],
    pub partition_count: [u8; NUM_PARTITIONS],
    pub first_free: u8,
    pub free_count: u8,
}

/// Snapshot of the host transfer engine
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct DataTransferState {
    pub active: bool,
    pub writing: bool,
    pub free_on_end: bool,
    pub cur_index: u8,
    pub buf_count: u8,
    pub word_offs: u32,
    pub words_left: u32,
    pub total_words: u32,
    pub filter: u8,
    pub fifo: [u16; FIFO_DEPTH],
    pub fifo_rp: u8,
    pub fifo_wp: u8,
    pub fifo_len: u8,
    /// Transfer buffer sequence, `NUM_BUFFERS` bytes
    pub buf_list: Vec<u8>,
}

/// Snapshot of one parsed directory record
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Encode, Decode)]
pub struct FileRecordState {
    pub fad: u32,
    pub size: u32,
    pub unit_size: u8,
    pub gap_size: u8,
    pub file_num: u8,
    pub attr: u8,
}

impl FileRecordState {
    fn capture(r: &FileRecord) -> Self {
        Self {
            fad: r.fad,
            size: r.size,
            unit_size: r.unit_size,
            gap_size: r.gap_size,
            file_num: r.file_num,
            attr: r.attr,
        }
    }

    fn restore(&self) -> FileRecord {
        FileRecord {
            fad: self.fad,
            size: self.size,
            unit_size: self.unit_size,
            gap_size: self.gap_size,
            file_num: self.file_num,
            attr: self.attr,
        }
    }
}

/// Snapshot of the filesystem walker
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct FsWalkerState {
    pub phase: u8,
    pub active: bool,
    pub do_auth: bool,
    pub abort: bool,
    pub pnum: u8,
    pub first_index: u32,
    pub dir_entry: u32,
    /// Staged sector payload, `PAYLOAD_SIZE` bytes
    pub payload: Vec<u8>,
    pub payload_offs: u32,
    pub body_pos: u32,
    pub bytes_read: u32,
    pub bytes_total: u32,
    /// Directory record accumulator, 256 bytes
    pub record: Vec<u8>,
    pub record_num: u32,
    /// Parsed record window, 256 entries
    pub records: Vec<FileRecordState>,
    pub records_valid: bool,
    pub window_base: u32,
    pub window_count: u8,
    pub window_more: bool,
    pub root: FileRecordState,
    pub root_valid: bool,
}

/// Snapshot of the reported pickup position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Encode, Decode)]
pub struct PositionState {
    pub status: u8,
    pub fad: u32,
    pub rel_fad: u32,
    pub ctrl_adr: u8,
    pub idx: u8,
    pub tno: u8,
    pub is_cdrom: bool,
    pub repcount: u8,
}

/// Snapshot of the subcode tracker
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct SubcodeState {
    pub q_raw: [u8; 12],
    pub q_safe: [u8; 12],
    pub safe_valid: bool,
    pub q_snapshot: [u8; 10],
    pub rw_snapshot: [u8; 24],
}

/// Snapshot of the CD-DA ring
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct CddaState {
    /// Sample pairs, `CDDA_CAPACITY` entries
    pub samples: Vec<(i16, i16)>,
    pub read_pos: u16,
    pub write_pos: u16,
    pub count: u16,
}

/// Complete serializable CD block state
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct CdBlockState {
    // Host registers
    pub hirq: u16,
    pub hirq_mask: u16,
    pub cdata: [u16; 4],
    pub ctr: [u16; 4],
    pub results: [u16; 4],
    pub results_read: bool,
    pub command_pending: bool,

    // Command processor
    pub cmd_phase: u8,
    pub command_clock_counter: i64,
    pub cmd_irq_pending: u16,
    pub cmd_irq_bful: bool,
    pub cmd_irq_resume: bool,
    pub reset_sel_pending: u8,
    pub sw_reset_pending: bool,
    pub sw_reset_hirq_deferred: u16,

    // Scheduling
    pub last_ts: i64,
    pub drive_counter: i64,
    pub periodic_counter: i64,

    // Drive mechanism
    pub drive_phase: u8,
    /// Translated TOC, `TOC_BUFFER_SIZE` bytes
    pub toc_buffer: Vec<u8>,
    pub cur_sector: i32,
    pub seek_index_phase: u8,
    /// Staged raw sector, `RAW_SECTOR_SIZE` bytes
    pub sec_pre_buf: Vec<u8>,
    /// Staged subcode, `SUBCODE_SIZE` bytes
    pub sec_pre_sub: Vec<u8>,
    pub sec_pre_buf_in: i8,
    pub pause_counter: i32,
    pub standby_time: u16,
    pub ecc_enable: u8,
    pub retry_count: u8,
    pub play_sector_processed: bool,

    // Playback control
    pub cur_play_start: u32,
    pub cur_play_end: u32,
    pub cur_play_repeat: u8,
    pub play_repeat_counter: u8,
    pub play_cmd_start: u32,
    pub play_cmd_end: u32,
    pub play_cmd_rep: u8,
    pub play_end_irq: u16,
    pub scan_mode: u8,
    pub scan_counter: i32,

    // Reported position
    pub pos: PositionState,
    pub subcode: SubcodeState,

    // Buffer pool and selectors
    pub pool: BufferPoolState,
    /// Routing filters, `NUM_FILTERS` entries
    pub filters: Vec<FilterState>,
    pub device_conn: u8,
    pub last_dest: u8,
    pub get_sec_len: u8,
    pub put_sec_len: u8,
    pub calced_actual_size: u32,
    pub fad_search_fad: u32,
    pub fad_search_spos: u16,
    pub fad_search_pnum: u8,

    // Host data transfer
    pub dt: DataTransferState,

    // Filesystem walker
    pub fs: FsWalkerState,
    pub auth_disc_type: u8,

    // Audio
    pub cdda: CddaState,
}

fn check_len(what: &str, got: usize, want: usize) -> Result<(), SaveStateError> {
    if got != want {
        return Err(SaveStateError::Corrupt(format!(
            "{what}: expected {want} entries, got {got}"
        )));
    }
    Ok(())
}

fn decode_enum<T>(what: &str, decoded: Option<T>, code: u8) -> Result<T, SaveStateError> {
    decoded.ok_or_else(|| SaveStateError::Corrupt(format!("{what}: unknown code {code:#04x}")))
}

/// Floor a routing connection that would index out of range
fn sane_conn(conn: u8) -> u8 {
    if conn != NO_FILTER && (conn as usize) >= NUM_FILTERS {
        NO_FILTER
    } else {
        conn
    }
}

impl CdBlockState {
    /// Snapshot the complete CD block
    pub fn capture(cdb: &CdBlock) -> Self {
        let mut pool_data = Vec::with_capacity(NUM_BUFFERS * RAW_SECTOR_SIZE);
        let mut pool_prev = Vec::with_capacity(NUM_BUFFERS);
        let mut pool_next = Vec::with_capacity(NUM_BUFFERS);
        for buf in &cdb.pool.buffers {
            pool_data.extend_from_slice(&buf.data);
            pool_prev.push(buf.prev);
            pool_next.push(buf.next);
        }

        let mut partition_first = [0u8; NUM_PARTITIONS];
        let mut partition_last = [0u8; NUM_PARTITIONS];
        let mut partition_count = [0u8; NUM_PARTITIONS];
        for (i, part) in cdb.pool.partitions.iter().enumerate() {
            partition_first[i] = part.first;
            partition_last[i] = part.last;
            partition_count[i] = part.count;
        }

        let filters = cdb
            .filters
            .filters
            .iter()
            .map(|f| FilterState {
                mode: f.mode,
                true_conn: f.true_conn,
                false_conn: f.false_conn,
                fad: f.fad,
                range: f.range,
                channel: f.channel,
                file: f.file,
                sub_mode: f.sub_mode,
                sub_mode_mask: f.sub_mode_mask,
                coding_info: f.coding_info,
                coding_info_mask: f.coding_info_mask,
            })
            .collect();

        Self {
            hirq: cdb.hirq.bits(),
            hirq_mask: cdb.hirq_mask.bits(),
            cdata: cdb.cdata,
            ctr: cdb.ctr,
            results: cdb.results,
            results_read: cdb.results_read,
            command_pending: cdb.command_pending,

            cmd_phase: cdb.cmd_phase.code(),
            command_clock_counter: cdb.command_clock_counter,
            cmd_irq_pending: cdb.cmd_irq_pending.bits(),
            cmd_irq_bful: cdb.cmd_irq_bful,
            cmd_irq_resume: cdb.cmd_irq_resume,
            reset_sel_pending: cdb.reset_sel_pending,
            sw_reset_pending: cdb.sw_reset_pending,
            sw_reset_hirq_deferred: cdb.sw_reset_hirq_deferred.bits(),

            last_ts: cdb.last_ts,
            drive_counter: cdb.drive_counter,
            periodic_counter: cdb.periodic_counter,

            drive_phase: cdb.drive_phase.code(),
            toc_buffer: cdb.toc_buffer.to_vec(),
            cur_sector: cdb.cur_sector,
            seek_index_phase: cdb.seek_index_phase,
            sec_pre_buf: cdb.sec_pre_buf.to_vec(),
            sec_pre_sub: cdb.sec_pre_sub.to_vec(),
            sec_pre_buf_in: cdb.sec_pre_buf_in,
            pause_counter: cdb.pause_counter,
            standby_time: cdb.standby_time,
            ecc_enable: cdb.ecc_enable,
            retry_count: cdb.retry_count,
            play_sector_processed: cdb.play_sector_processed,

            cur_play_start: cdb.cur_play_start,
            cur_play_end: cdb.cur_play_end,
            cur_play_repeat: cdb.cur_play_repeat,
            play_repeat_counter: cdb.play_repeat_counter,
            play_cmd_start: cdb.play_cmd_start,
            play_cmd_end: cdb.play_cmd_end,
            play_cmd_rep: cdb.play_cmd_rep,
            play_end_irq: cdb.play_end_irq.bits(),
            scan_mode: ScanDirection::code(cdb.scan_mode),
            scan_counter: cdb.scan_counter,

            pos: PositionState {
                status: cdb.pos.status,
                fad: cdb.pos.fad,
                rel_fad: cdb.pos.rel_fad,
                ctrl_adr: cdb.pos.ctrl_adr,
                idx: cdb.pos.idx,
                tno: cdb.pos.tno,
                is_cdrom: cdb.pos.is_cdrom,
                repcount: cdb.pos.repcount,
            },
            subcode: SubcodeState {
                q_raw: cdb.subcode.q_raw,
                q_safe: cdb.subcode.q_safe,
                safe_valid: cdb.subcode.safe_valid,
                q_snapshot: cdb.subcode.q_snapshot,
                rw_snapshot: cdb.subcode.rw_snapshot,
            },

            pool: BufferPoolState {
                data: pool_data,
                prev: pool_prev,
                next: pool_next,
                partition_first,
                partition_last,
                partition_count,
                first_free: cdb.pool.first_free,
                free_count: cdb.pool.free_count,
            },
            filters,
            device_conn: cdb.filters.device_conn,
            last_dest: cdb.filters.last_dest,
            get_sec_len: cdb.get_sec_len.code(),
            put_sec_len: cdb.put_sec_len.code(),
            calced_actual_size: cdb.calced_actual_size,
            fad_search_fad: cdb.fad_search.fad,
            fad_search_spos: cdb.fad_search.spos,
            fad_search_pnum: cdb.fad_search.pnum,

            dt: DataTransferState {
                active: cdb.dt.active,
                writing: cdb.dt.writing,
                free_on_end: cdb.dt.free_on_end,
                cur_index: cdb.dt.cur_index,
                buf_count: cdb.dt.buf_count,
                word_offs: cdb.dt.word_offs,
                words_left: cdb.dt.words_left,
                total_words: cdb.dt.total_words,
                filter: cdb.dt.filter,
                fifo: cdb.dt.fifo,
                fifo_rp: cdb.dt.fifo_rp,
                fifo_wp: cdb.dt.fifo_wp,
                fifo_len: cdb.dt.fifo_len,
                buf_list: cdb.dt.buf_list.to_vec(),
            },

            fs: FsWalkerState {
                phase: cdb.fs.phase.code(),
                active: cdb.fs.active,
                do_auth: cdb.fs.do_auth,
                abort: cdb.fs.abort,
                pnum: cdb.fs.pnum,
                first_index: cdb.fs.first_index,
                dir_entry: cdb.fs.dir_entry,
                payload: cdb.fs.payload.to_vec(),
                payload_offs: cdb.fs.payload_offs,
                body_pos: cdb.fs.body_pos,
                bytes_read: cdb.fs.bytes_read,
                bytes_total: cdb.fs.bytes_total,
                record: cdb.fs.record.to_vec(),
                record_num: cdb.fs.record_num,
                records: cdb.fs.records.iter().map(FileRecordState::capture).collect(),
                records_valid: cdb.fs.records_valid,
                window_base: cdb.fs.window_base,
                window_count: cdb.fs.window_count,
                window_more: cdb.fs.window_more,
                root: FileRecordState::capture(&cdb.fs.root),
                root_valid: cdb.fs.root_valid,
            },
            auth_disc_type: cdb.auth_disc_type,

            cdda: CddaState {
                samples: cdb.cdda.samples.clone(),
                read_pos: cdb.cdda.read_pos,
                write_pos: cdb.cdda.write_pos,
                count: cdb.cdda.count,
            },
        }
    }

    /// Restore a snapshot into a CD block
    ///
    /// The disc, tray state, and clock ratio are left alone; callers
    /// re-attach the disc themselves. On a `Corrupt` error the target is
    /// not modified.
    pub fn apply(&self, cdb: &mut CdBlock) -> Result<(), SaveStateError> {
        check_len("pool data", self.pool.data.len(), NUM_BUFFERS * RAW_SECTOR_SIZE)?;
        check_len("pool prev links", self.pool.prev.len(), NUM_BUFFERS)?;
        check_len("pool next links", self.pool.next.len(), NUM_BUFFERS)?;
        check_len("filters", self.filters.len(), NUM_FILTERS)?;
        check_len("transfer buffer list", self.dt.buf_list.len(), NUM_BUFFERS)?;
        check_len("walker payload", self.fs.payload.len(), PAYLOAD_SIZE)?;
        check_len("walker record", self.fs.record.len(), 256)?;
        check_len("walker record window", self.fs.records.len(), 256)?;
        check_len("TOC buffer", self.toc_buffer.len(), TOC_BUFFER_SIZE)?;
        check_len("staged sector", self.sec_pre_buf.len(), RAW_SECTOR_SIZE)?;
        check_len("staged subcode", self.sec_pre_sub.len(), SUBCODE_SIZE)?;
        check_len("CD-DA ring", self.cdda.samples.len(), CDDA_CAPACITY)?;

        let cmd_phase = decode_enum(
            "command phase",
            CmdPhase::from_code(self.cmd_phase),
            self.cmd_phase,
        )?;
        let drive_phase = decode_enum(
            "drive phase",
            DrivePhase::from_code(self.drive_phase),
            self.drive_phase,
        )?;
        let scan_mode = decode_enum(
            "scan mode",
            ScanDirection::from_code(self.scan_mode),
            self.scan_mode,
        )?;
        let get_sec_len = decode_enum(
            "get sector length",
            SectorLength::from_code(self.get_sec_len),
            self.get_sec_len,
        )?;
        let put_sec_len = decode_enum(
            "put sector length",
            SectorLength::from_code(self.put_sec_len),
            self.put_sec_len,
        )?;
        let walk_phase = decode_enum(
            "walker phase",
            WalkPhase::from_code(self.fs.phase),
            self.fs.phase,
        )?;

        cdb.hirq = Hirq::from_bits_retain(self.hirq);
        cdb.hirq_mask = Hirq::from_bits_retain(self.hirq_mask);
        cdb.cdata = self.cdata;
        cdb.ctr = self.ctr;
        cdb.results = self.results;
        cdb.results_read = self.results_read;
        cdb.command_pending = self.command_pending;

        cdb.cmd_phase = cmd_phase;
        cdb.command_clock_counter = self.command_clock_counter;
        cdb.cmd_irq_pending = Hirq::from_bits_retain(self.cmd_irq_pending);
        cdb.cmd_irq_bful = self.cmd_irq_bful;
        cdb.cmd_irq_resume = self.cmd_irq_resume;
        cdb.reset_sel_pending = self.reset_sel_pending;
        cdb.sw_reset_pending = self.sw_reset_pending;
        cdb.sw_reset_hirq_deferred = Hirq::from_bits_retain(self.sw_reset_hirq_deferred);

        cdb.last_ts = self.last_ts;
        cdb.drive_counter = self.drive_counter;
        cdb.periodic_counter = self.periodic_counter;

        cdb.drive_phase = drive_phase;
        cdb.toc_buffer.copy_from_slice(&self.toc_buffer);
        cdb.cur_sector = self.cur_sector;
        cdb.seek_index_phase = self.seek_index_phase;
        cdb.sec_pre_buf.copy_from_slice(&self.sec_pre_buf);
        cdb.sec_pre_sub.copy_from_slice(&self.sec_pre_sub);
        cdb.sec_pre_buf_in = self.sec_pre_buf_in;
        cdb.pause_counter = self.pause_counter;
        cdb.standby_time = self.standby_time;
        cdb.ecc_enable = self.ecc_enable;
        cdb.retry_count = self.retry_count;
        cdb.play_sector_processed = self.play_sector_processed;

        cdb.cur_play_start = self.cur_play_start;
        cdb.cur_play_end = self.cur_play_end;
        cdb.cur_play_repeat = self.cur_play_repeat;
        cdb.play_repeat_counter = self.play_repeat_counter;
        cdb.play_cmd_start = self.play_cmd_start;
        cdb.play_cmd_end = self.play_cmd_end;
        cdb.play_cmd_rep = self.play_cmd_rep;
        cdb.play_end_irq = Hirq::from_bits_retain(self.play_end_irq);
        cdb.scan_mode = scan_mode;
        cdb.scan_counter = self.scan_counter;

        cdb.pos = PositionInfo {
            status: self.pos.status,
            fad: self.pos.fad,
            rel_fad: self.pos.rel_fad,
            ctrl_adr: self.pos.ctrl_adr,
            idx: self.pos.idx,
            tno: self.pos.tno,
            is_cdrom: self.pos.is_cdrom,
            repcount: self.pos.repcount,
        };
        cdb.subcode.q_raw = self.subcode.q_raw;
        cdb.subcode.q_safe = self.subcode.q_safe;
        cdb.subcode.safe_valid = self.subcode.safe_valid;
        cdb.subcode.q_snapshot = self.subcode.q_snapshot;
        cdb.subcode.rw_snapshot = self.subcode.rw_snapshot;

        for (i, buf) in cdb.pool.buffers.iter_mut().enumerate() {
            let offs = i * RAW_SECTOR_SIZE;
            buf.data
                .copy_from_slice(&self.pool.data[offs..offs + RAW_SECTOR_SIZE]);
            buf.prev = self.pool.prev[i];
            buf.next = self.pool.next[i];
        }
        for (i, part) in cdb.pool.partitions.iter_mut().enumerate() {
            *part = Partition {
                first: self.pool.partition_first[i],
                last: self.pool.partition_last[i],
                count: self.pool.partition_count[i],
            };
        }
        cdb.pool.first_free = self.pool.first_free;
        cdb.pool.free_count = self.pool.free_count.min(NUM_BUFFERS as u8);

        for (f, s) in cdb.filters.filters.iter_mut().zip(self.filters.iter()) {
            *f = Filter {
                mode: s.mode,
                true_conn: sane_conn(s.true_conn),
                false_conn: sane_conn(s.false_conn),
                fad: s.fad,
                range: s.range,
                channel: s.channel,
                file: s.file,
                sub_mode: s.sub_mode,
                sub_mode_mask: s.sub_mode_mask,
                coding_info: s.coding_info,
                coding_info_mask: s.coding_info_mask,
            };
        }
        cdb.filters.device_conn = sane_conn(self.device_conn);
        cdb.filters.last_dest = self.last_dest;
        cdb.get_sec_len = get_sec_len;
        cdb.put_sec_len = put_sec_len;
        cdb.calced_actual_size = self.calced_actual_size;
        cdb.fad_search = FadSearch {
            fad: self.fad_search_fad,
            spos: self.fad_search_spos,
            pnum: self.fad_search_pnum,
        };

        cdb.dt.active = self.dt.active;
        cdb.dt.writing = self.dt.writing;
        cdb.dt.free_on_end = self.dt.free_on_end;
        cdb.dt.cur_index = self.dt.cur_index;
        cdb.dt.buf_count = self.dt.buf_count;
        cdb.dt.word_offs = self.dt.word_offs;
        cdb.dt.words_left = self.dt.words_left;
        cdb.dt.total_words = self.dt.total_words;
        cdb.dt.filter = self.dt.filter;
        cdb.dt.fifo = self.dt.fifo;
        cdb.dt.fifo_rp = self.dt.fifo_rp;
        cdb.dt.fifo_wp = self.dt.fifo_wp;
        cdb.dt.fifo_len = self.dt.fifo_len;
        cdb.dt.buf_list.copy_from_slice(&self.dt.buf_list);

        cdb.fs.phase = walk_phase;
        cdb.fs.active = self.fs.active;
        cdb.fs.do_auth = self.fs.do_auth;
        cdb.fs.abort = self.fs.abort;
        cdb.fs.pnum = self.fs.pnum;
        cdb.fs.first_index = self.fs.first_index;
        cdb.fs.dir_entry = self.fs.dir_entry;
        cdb.fs.payload.copy_from_slice(&self.fs.payload);
        cdb.fs.payload_offs = self.fs.payload_offs;
        cdb.fs.body_pos = self.fs.body_pos;
        cdb.fs.bytes_read = self.fs.bytes_read;
        cdb.fs.bytes_total = self.fs.bytes_total;
        cdb.fs.record.copy_from_slice(&self.fs.record);
        cdb.fs.record_num = self.fs.record_num;
        for (r, s) in cdb.fs.records.iter_mut().zip(self.fs.records.iter()) {
            *r = s.restore();
        }
        cdb.fs.records_valid = self.fs.records_valid;
        // File identifiers are 24-bit on the wire and the window never holds
        // more than 254 entries; clamping keeps slot arithmetic in range.
        cdb.fs.window_base = self.fs.window_base & 0x00FF_FFFF;
        cdb.fs.window_count = self.fs.window_count.min(0xFE);
        cdb.fs.window_more = self.fs.window_more;
        cdb.fs.root = self.fs.root.restore();
        cdb.fs.root_valid = self.fs.root_valid;
        cdb.auth_disc_type = self.auth_disc_type;

        cdb.cdda.samples.copy_from_slice(&self.cdda.samples);
        cdb.cdda.read_pos = self.cdda.read_pos % CDDA_CAPACITY as u16;
        cdb.cdda.write_pos = self.cdda.write_pos % CDDA_CAPACITY as u16;
        cdb.cdda.count = self.cdda.count.min(CDDA_CAPACITY as u16);

        // Inconsistent machine state resets the unit it belongs to rather
        // than failing the load.
        if !cdb.fs.active {
            cdb.fs.phase = WalkPhase::Idle;
        }
        if !cdb.pool.links_valid() {
            log::warn!("CD Block: restored buffer links are inconsistent, resetting pool");
            cdb.pool.reset();
        }
        if !cdb.dt.sanity_ok() {
            log::warn!("CD Block: restored transfer state is inconsistent, aborting transfer");
            cdb.dt.reset();
        }
        if !cdb.fs.sanity_ok() {
            log::warn!("CD Block: restored walker state is inconsistent, cancelling walk");
            cdb.fs.phase = WalkPhase::Idle;
            cdb.fs.active = false;
            cdb.fs.do_auth = false;
            cdb.fs.abort = false;
            cdb.fs.pnum = 0;
            cdb.fs.first_index = 0;
            cdb.fs.dir_entry = 0;
            cdb.fs.payload = [0; PAYLOAD_SIZE];
            cdb.fs.payload_offs = 0;
            cdb.fs.body_pos = 0;
            cdb.fs.bytes_read = 0;
            cdb.fs.bytes_total = 0;
            cdb.fs.record = [0; 256];
            cdb.fs.record_num = 0;
        }

        cdb.recalc_irq();
        Ok(())
    }
}
