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

//! Disc image loading and access
//!
//! This module loads CD images from .cue/.bin pairs, exposes their table
//! of contents, and serves raw 2352-byte sector reads with synthesized
//! subchannel data. The CD block consumes discs through the [`DiscReader`]
//! trait, so alternative image formats can be plugged in.

use crate::core::cdblock::{dec_to_bcd, subq_store_checksum, RAW_SECTOR_SIZE, SUBCODE_SIZE};
use crate::core::error::DiscError;

/// Table of contents index of the lead-out entry
pub const LEADOUT_TRACK: usize = 100;

/// Single entry in a [`Toc`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TocEntry {
    /// The entry describes a recorded track
    pub valid: bool,

    /// Q ADR field of the entry
    pub adr: u8,

    /// Q control field; 0x4 marks a data track
    pub control: u8,

    /// Start of the track as a zero-based sector number
    pub lba: u32,
}

/// Table of contents
///
/// Indices 1 through 99 hold tracks and index [`LEADOUT_TRACK`] holds the
/// lead-out point. Index 0 is unused.
#[derive(Debug, Clone)]
pub struct Toc {
    /// First track number on the disc
    pub first_track: u8,

    /// Last track number on the disc
    pub last_track: u8,

    /// Disc type byte reported in the A0 point (0x00 CD-DA or CD-ROM,
    /// 0x20 CD-ROM XA)
    pub disc_type: u8,

    /// Track entries
    pub tracks: [TocEntry; 101],
}

impl Default for Toc {
    fn default() -> Self {
        Self {
            first_track: 0,
            last_track: 0,
            disc_type: 0,
            tracks: [TocEntry::default(); 101],
        }
    }
}

/// Access to a loaded disc
///
/// Reads are infallible: requests outside the recorded range return
/// synthesized content (zero payload, coherent subchannel) the way a real
/// drive keeps producing frames wherever the pickup lands.
pub trait DiscReader: Send {
    /// Table of contents of this disc
    fn read_toc(&self) -> Toc;

    /// Read the raw 2352-byte sector and its 96-byte subchannel data at
    /// `lba`
    fn read_sector(&mut self, lba: i32, data: &mut [u8], subcode: &mut [u8]);

    /// Read only the 96-byte subchannel data at `lba`
    fn read_subcode(&mut self, lba: i32, subcode: &mut [u8]);

    /// Advise that `lba` is about to be read
    fn hint(&mut self, _lba: i32) {}
}

/// CD track type
///
/// Specifies the format of data stored in a track. Only raw 2352-byte
/// layouts are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    /// Data track, 2352 bytes per sector (Mode 1)
    Mode1_2352,
    /// XA track, 2352 bytes per sector (Mode 2)
    Mode2_2352,
    /// CD-DA audio, 2352 bytes per sector
    Audio,
}

impl TrackType {
    /// Q control field for tracks of this type
    pub fn control(self) -> u8 {
        match self {
            TrackType::Audio => 0x0,
            TrackType::Mode1_2352 | TrackType::Mode2_2352 => 0x4,
        }
    }
}

/// Single track parsed from a cue sheet
#[derive(Debug, Clone)]
pub struct Track {
    /// Track number (1-99)
    pub number: u8,

    /// Track type
    pub track_type: TrackType,

    /// Start of the track's INDEX 01 as a zero-based sector number
    pub start_lba: u32,

    /// Length in sectors
    pub length_sectors: u32,

    /// Byte offset of the track start in the .bin file
    pub file_offset: u64,
}

/// Disc image loaded from .bin/.cue files
///
/// Holds the raw sector data in memory together with the parsed track
/// list and the table of contents derived from it.
///
/// # Example
///
/// ```no_run
/// use ssrx::core::disc::DiscImage;
///
/// let disc = DiscImage::load("game.cue").unwrap();
/// println!("{} tracks", disc.track_count());
/// ```
#[derive(Debug)]
pub struct DiscImage {
    /// Tracks on the disc
    tracks: Vec<Track>,

    /// Raw sector data from the .bin file
    data: Vec<u8>,

    /// Table of contents derived from the track list
    toc: Toc,
}

impl DiscImage {
    /// Load a disc image from a .cue file
    ///
    /// Parses the cue sheet for track layout and reads the referenced
    /// .bin file into memory.
    ///
    /// # Arguments
    ///
    /// * `cue_path` - Path to the .cue file
    ///
    /// # Returns
    ///
    /// - `Ok(DiscImage)` if loading succeeded
    /// - `Err(DiscError)` if the cue sheet or data file is unusable
    pub fn load(cue_path: &str) -> Result<Self, DiscError> {
        let cue_data = std::fs::read_to_string(cue_path)?;
        let bin_path = Self::bin_path_from_cue(cue_path, &cue_data)?;

        let tracks = Self::parse_cue(&cue_data)?;
        let data = std::fs::read(&bin_path).map_err(|e| {
            DiscError::LoadError(format!("failed to read bin file '{}': {}", bin_path, e))
        })?;

        let disc = Self::from_parts(tracks, data)?;

        log::info!(
            "Loaded disc image: {} tracks, {} MB",
            disc.tracks.len(),
            disc.data.len() / 1024 / 1024
        );

        Ok(disc)
    }

    /// Build a disc from an already parsed track list and raw data
    ///
    /// Track lengths are recomputed from the data size, and the table of
    /// contents is derived. This is also the entry point for synthetic
    /// in-memory discs.
    pub fn from_parts(mut tracks: Vec<Track>, data: Vec<u8>) -> Result<Self, DiscError> {
        if tracks.is_empty() {
            return Err(DiscError::NoTracks);
        }
        if data.len() % RAW_SECTOR_SIZE != 0 {
            return Err(DiscError::MisalignedData { size: data.len() });
        }

        tracks.sort_by_key(|t| t.start_lba);
        Self::calculate_track_lengths(&mut tracks, data.len());
        let toc = Self::build_toc(&tracks, data.len())?;

        Ok(Self { tracks, data, toc })
    }

    /// Extract the .bin file path from the cue sheet's FILE directive
    fn bin_path_from_cue(cue_path: &str, cue_data: &str) -> Result<String, DiscError> {
        for line in cue_data.lines() {
            let line = line.trim();
            if line.starts_with("FILE") {
                if let Some(start) = line.find('"') {
                    if let Some(end) = line[start + 1..].find('"') {
                        let bin_filename = &line[start + 1..start + 1 + end];

                        let cue_path_obj = std::path::Path::new(cue_path);
                        let bin_path = if let Some(parent) = cue_path_obj.parent() {
                            parent.join(bin_filename)
                        } else {
                            std::path::PathBuf::from(bin_filename)
                        };

                        return Ok(bin_path.to_string_lossy().to_string());
                    }
                }
            }
        }

        Err(DiscError::MissingFileDirective)
    }

    /// Parse cue sheet content into a track list
    ///
    /// Only single-file layouts are supported; INDEX 01 times are file
    /// offsets in MM:SS:FF.
    pub(crate) fn parse_cue(cue_data: &str) -> Result<Vec<Track>, DiscError> {
        let mut tracks = Vec::new();
        let mut current_track: Option<Track> = None;

        for line in cue_data.lines() {
            let line = line.trim();

            if line.starts_with("TRACK") {
                if let Some(track) = current_track.take() {
                    tracks.push(track);
                }

                let parts: Vec<&str> = line.split_whitespace().collect();
                let track_num = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(1);
                let track_type_str = parts.get(2).unwrap_or(&"MODE1/2352");

                current_track = Some(Track {
                    number: track_num,
                    track_type: Self::parse_track_type(track_type_str)?,
                    start_lba: 0,
                    length_sectors: 0,
                    file_offset: 0,
                });
            } else if line.starts_with("INDEX 01") {
                if let Some(ref mut track) = current_track {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    if let Some(time_str) = parts.get(2) {
                        track.start_lba = Self::parse_msf(time_str)?;
                        track.file_offset = u64::from(track.start_lba) * RAW_SECTOR_SIZE as u64;
                    }
                }
            }
        }

        if let Some(track) = current_track {
            tracks.push(track);
        }

        Ok(tracks)
    }

    /// Parse an MM:SS:FF time string into a frame count
    pub(crate) fn parse_msf(msf: &str) -> Result<u32, DiscError> {
        let parts: Vec<&str> = msf.split(':').collect();
        if parts.len() != 3 {
            return Err(DiscError::InvalidMsf(msf.to_string()));
        }

        let minute: u32 = parts[0]
            .parse()
            .map_err(|_| DiscError::InvalidMsf(msf.to_string()))?;
        let second: u32 = parts[1]
            .parse()
            .map_err(|_| DiscError::InvalidMsf(msf.to_string()))?;
        let frame: u32 = parts[2]
            .parse()
            .map_err(|_| DiscError::InvalidMsf(msf.to_string()))?;

        if second >= 60 || frame >= 75 {
            return Err(DiscError::InvalidMsf(msf.to_string()));
        }

        Ok(minute * 60 * 75 + second * 75 + frame)
    }

    /// Parse a cue sheet track type string
    fn parse_track_type(s: &str) -> Result<TrackType, DiscError> {
        match s {
            "MODE1/2352" => Ok(TrackType::Mode1_2352),
            "MODE2/2352" => Ok(TrackType::Mode2_2352),
            "AUDIO" => Ok(TrackType::Audio),
            other => Err(DiscError::LoadError(format!(
                "unsupported track type '{}'",
                other
            ))),
        }
    }

    /// Compute track lengths from start positions and the data size
    fn calculate_track_lengths(tracks: &mut [Track], file_size: usize) {
        let total_sectors = (file_size / RAW_SECTOR_SIZE) as u32;
        for i in 0..tracks.len() {
            let end = if i + 1 < tracks.len() {
                tracks[i + 1].start_lba
            } else {
                total_sectors
            };
            tracks[i].length_sectors = end.saturating_sub(tracks[i].start_lba);
        }
    }

    /// Derive the table of contents from the track list
    fn build_toc(tracks: &[Track], data_len: usize) -> Result<Toc, DiscError> {
        let mut toc = Toc::default();
        let mut first = 100u8;
        let mut last = 0u8;
        let mut any_xa = false;

        for t in tracks {
            if t.number == 0 || t.number > 99 {
                return Err(DiscError::InvalidTrackNumber(t.number));
            }
            toc.tracks[t.number as usize] = TocEntry {
                valid: true,
                adr: 1,
                control: t.track_type.control(),
                lba: t.start_lba,
            };
            first = first.min(t.number);
            last = last.max(t.number);
            any_xa |= t.track_type == TrackType::Mode2_2352;
        }

        toc.first_track = first;
        toc.last_track = last;
        toc.disc_type = if any_xa { 0x20 } else { 0x00 };

        // Lead-out inherits the last track's control field.
        let last_control = toc.tracks[last as usize].control;
        toc.tracks[LEADOUT_TRACK] = TocEntry {
            valid: true,
            adr: 1,
            control: last_control,
            lba: (data_len / RAW_SECTOR_SIZE) as u32,
        };

        Ok(toc)
    }

    /// Get the number of tracks on the disc
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Get track information by track number
    pub fn get_track(&self, track_num: u8) -> Option<&Track> {
        self.tracks.iter().find(|t| t.number == track_num)
    }

    /// Synthesize the 96-byte subchannel read for `lba`
    ///
    /// Disc images carry no subcode, so Q position records are generated
    /// from the track layout with BCD addresses and a complemented
    /// CRC-16. The output is PW interleaved, one bit of each channel per
    /// byte with P in bit 7 and Q in bit 6.
    fn synth_subcode(&self, lba: i32, out: &mut [u8]) {
        let q = self.synth_q(lba);

        out[..SUBCODE_SIZE].fill(0);
        for (i, b) in out[..SUBCODE_SIZE].iter_mut().enumerate() {
            let bit = (q[i >> 3] >> (7 - (i & 7))) & 1;
            *b |= bit << 6;
        }

        // P flags the transition areas outside the program area.
        let leadout = (self.data.len() / RAW_SECTOR_SIZE) as i32;
        if lba < 0 || lba >= leadout {
            for b in out[..SUBCODE_SIZE].iter_mut() {
                *b |= 0x80;
            }
        }
    }

    /// Build the Q position record for `lba`
    fn synth_q(&self, lba: i32) -> [u8; 12] {
        let leadout = (self.data.len() / RAW_SECTOR_SIZE) as i32;
        let first_start = self.tracks[0].start_lba as i32;

        let (tno_byte, control, index, rel) = if lba >= leadout {
            let control = self.toc.tracks[LEADOUT_TRACK].control;
            (0xAA, control, 0x01, (lba - leadout) as u32)
        } else if lba < first_start {
            // Pregap of the first track: index 0, relative address
            // counting down.
            let t = &self.tracks[0];
            (
                dec_to_bcd(t.number),
                t.track_type.control(),
                0x00,
                (first_start - lba) as u32,
            )
        } else {
            let t = self
                .tracks
                .iter()
                .rev()
                .find(|t| t.start_lba as i32 <= lba)
                .unwrap_or(&self.tracks[0]);
            (
                dec_to_bcd(t.number),
                t.track_type.control(),
                0x01,
                (lba - t.start_lba as i32) as u32,
            )
        };

        let fad = (lba + 150).max(0) as u32;

        let mut q = [0u8; 12];
        q[0] = (control << 4) | 0x1;
        q[1] = tno_byte;
        q[2] = index;
        q[3] = dec_to_bcd((rel / (60 * 75)) as u8);
        q[4] = dec_to_bcd(((rel / 75) % 60) as u8);
        q[5] = dec_to_bcd((rel % 75) as u8);
        q[6] = 0;
        q[7] = dec_to_bcd((fad / (60 * 75)) as u8);
        q[8] = dec_to_bcd(((fad / 75) % 60) as u8);
        q[9] = dec_to_bcd((fad % 75) as u8);
        subq_store_checksum(&mut q);
        q
    }
}

impl DiscReader for DiscImage {
    fn read_toc(&self) -> Toc {
        self.toc.clone()
    }

    fn read_sector(&mut self, lba: i32, data: &mut [u8], subcode: &mut [u8]) {
        let total = (self.data.len() / RAW_SECTOR_SIZE) as i32;

        if lba >= 0 && lba < total {
            let offset = lba as usize * RAW_SECTOR_SIZE;
            data[..RAW_SECTOR_SIZE].copy_from_slice(&self.data[offset..offset + RAW_SECTOR_SIZE]);
        } else {
            data[..RAW_SECTOR_SIZE].fill(0);
        }

        self.synth_subcode(lba, subcode);
    }

    fn read_subcode(&mut self, lba: i32, subcode: &mut [u8]) {
        self.synth_subcode(lba, subcode);
    }
}
