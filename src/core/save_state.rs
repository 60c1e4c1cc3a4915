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

//! Save state serialization for the CD block
//!
//! This module provides functionality to snapshot the complete CD block and
//! restore it later, so a frontend can suspend and resume a session at any
//! point, including mid-command and mid-transfer.
//!
//! # Save State Format
//!
//! Save states are serialized using bincode for efficient binary encoding.
//! The state includes:
//! - Metadata (timestamp, disc title, host clock, playtime)
//! - Host interface registers (HIRQ, mask, command and result words)
//! - Command processor state (phase, deferred interrupts, clock debt)
//! - Drive mechanism state (phase, pickup position, staged sector)
//! - Sector buffer pool (all 200 payloads plus list links)
//! - Filter and partition routing configuration
//! - Host data transfer state (FIFO, buffer sequence, cursors)
//! - Filesystem walker state (directory window, read progress)
//! - CD-DA ring buffer contents
//!
//! The disc image itself is not stored; the frontend re-attaches it before
//! applying a loaded state.
//!
//! # Version Compatibility
//!
//! Save states include a version number to ensure compatibility.
//! Loading a save state with a different version will fail with an error.
//!
//! # Example
//!
//! ```no_run
//! use ssrx::core::save_state::SaveState;
//! use ssrx::core::CdBlock;
//!
//! // Create the CD block and run emulation
//! let mut cdb = CdBlock::new();
//! // ... run emulation ...
//!
//! // Create save state
//! let state = SaveState::from_cdblock(&cdb);
//!
//! // Save to file
//! state.save_to_file("save.state").unwrap();
//!
//! // Later: load from file and apply
//! let loaded = SaveState::load_from_file("save.state").unwrap();
//! loaded.apply(&mut cdb).unwrap();
//! ```

use bincode::{config, Decode, Encode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::core::cdblock::{CdBlock, CdBlockState, NUM_BUFFERS, RAW_SECTOR_SIZE};
use crate::core::error::SaveStateError;

/// Save state version for compatibility checking
///
/// This version number should be incremented whenever the save state format
/// changes in a way that breaks backward compatibility.
pub const SAVE_STATE_VERSION: u32 = 1;

/// Complete save state
///
/// This structure contains everything needed to restore the CD block to a
/// specific point in time, plus metadata describing when it was taken.
#[derive(Serialize, Deserialize, Encode, Decode)]
pub struct SaveState {
    /// Version number for compatibility checking
    pub version: u32,

    /// Save state metadata
    pub metadata: SaveStateMetadata,

    /// CD block state
    pub cdblock: CdBlockState,
}

/// Save state metadata
///
/// Contains information about when and under what configuration the save
/// state was created.
#[derive(Serialize, Deserialize, Encode, Decode)]
#[bincode(encode_bounds = "", decode_bounds = "")]
pub struct SaveStateMetadata {
    /// Timestamp when the save state was created
    #[bincode(with_serde)]
    pub timestamp: DateTime<Utc>,

    /// Title of the inserted disc, if known
    pub disc_title: String,

    /// Host clock rate the block was driven at, in Hz
    pub host_clock_hz: u32,

    /// Playtime in seconds
    pub playtime: u64,
}

impl SaveState {
    /// Create a new save state from the current CD block state
    ///
    /// Metadata is filled with the current time and defaults; callers set
    /// the disc title and playtime themselves.
    ///
    /// # Arguments
    ///
    /// * `cdb` - Reference to the CD block to snapshot
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use ssrx::core::{save_state::SaveState, CdBlock};
    /// # let cdb = CdBlock::new();
    /// let state = SaveState::from_cdblock(&cdb);
    /// ```
    pub fn from_cdblock(cdb: &CdBlock) -> Self {
        Self {
            version: SAVE_STATE_VERSION,
            metadata: SaveStateMetadata {
                timestamp: Utc::now(),
                disc_title: String::new(),
                host_clock_hz: 0,
                playtime: 0,
            },
            cdblock: cdb.to_state(),
        }
    }

    /// Restore this save state into a CD block
    ///
    /// The frontend re-attaches the disc image before calling this, since
    /// disc contents are not part of the state.
    ///
    /// # Errors
    ///
    /// Returns [`SaveStateError::VersionMismatch`] if the state was written
    /// by an incompatible format version, or [`SaveStateError::Corrupt`] if
    /// its contents fail validation. On error the target is not modified.
    pub fn apply(&self, cdb: &mut CdBlock) -> Result<(), SaveStateError> {
        if self.version != SAVE_STATE_VERSION {
            return Err(SaveStateError::VersionMismatch {
                expected: SAVE_STATE_VERSION,
                got: self.version,
            });
        }
        cdb.restore_from_state(&self.cdblock)
    }

    /// Save state to file
    ///
    /// Serializes the save state to a binary file using bincode.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to save file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be created
    /// - Serialization fails
    /// - Write operation fails
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use ssrx::core::{save_state::SaveState, CdBlock};
    /// # let state = SaveState::from_cdblock(&CdBlock::new());
    /// state.save_to_file("save.state").unwrap();
    /// ```
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SaveStateError> {
        let config = config::standard();
        let encoded = bincode::encode_to_vec(self, config)
            .map_err(|e| SaveStateError::Encode(e.to_string()))?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Load state from file
    ///
    /// Deserializes a save state from a binary file and verifies version
    /// compatibility.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to save file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be opened or read
    /// - Deserialization fails
    /// - Version is incompatible
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use ssrx::core::save_state::SaveState;
    /// let state = SaveState::load_from_file("save.state").unwrap();
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SaveStateError> {
        let mut file = File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        let config = config::standard();
        let (state, _): (SaveState, usize) = bincode::decode_from_slice(&buffer, config)
            .map_err(|e| SaveStateError::Decode(e.to_string()))?;

        if state.version != SAVE_STATE_VERSION {
            return Err(SaveStateError::VersionMismatch {
                expected: SAVE_STATE_VERSION,
                got: state.version,
            });
        }

        Ok(state)
    }

    /// Get estimated file size for this save state
    ///
    /// Returns approximate size in bytes of the serialized save state.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use ssrx::core::{save_state::SaveState, CdBlock};
    /// # let state = SaveState::from_cdblock(&CdBlock::new());
    /// let size = state.estimated_size();
    /// println!("Save state will be approximately {} KB", size / 1024);
    /// ```
    pub fn estimated_size(&self) -> usize {
        // Buffer pool: 200 * 2352 bytes
        // Walker: sector payload + record accumulator + 256 records
        // Other state: registers, links, FIFO, CD-DA ring
        NUM_BUFFERS * RAW_SECTOR_SIZE + 16 * 1024
    }
}

impl Default for SaveState {
    fn default() -> Self {
        Self::from_cdblock(&CdBlock::new())
    }
}

/// Trait for components that can be saved and restored
///
/// Implemented by every component that appears in save states. Restoring
/// is fallible because a state blob may fail validation.
///
/// # Example
///
/// ```no_run
/// use ssrx::core::save_state::StateSave;
/// use ssrx::core::error::SaveStateError;
///
/// struct Counter {
///     value: u32,
/// }
///
/// impl StateSave for Counter {
///     type State = u32;
///
///     fn to_state(&self) -> u32 {
///         self.value
///     }
///
///     fn restore_from_state(&mut self, state: &u32) -> Result<(), SaveStateError> {
///         self.value = *state;
///         Ok(())
///     }
/// }
/// ```
pub trait StateSave {
    /// The state type for this component
    type State: Serialize + for<'de> Deserialize<'de>;

    /// Convert this component to a saveable state
    fn to_state(&self) -> Self::State;

    /// Restore this component from a saved state
    ///
    /// # Errors
    ///
    /// Returns [`SaveStateError::Corrupt`] if the state fails validation.
    fn restore_from_state(&mut self, state: &Self::State) -> Result<(), SaveStateError>;
}

impl StateSave for CdBlock {
    type State = CdBlockState;

    fn to_state(&self) -> CdBlockState {
        CdBlockState::capture(self)
    }

    fn restore_from_state(&mut self, state: &CdBlockState) -> Result<(), SaveStateError> {
        state.apply(self)
    }
}
