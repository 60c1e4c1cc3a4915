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

/// Emulator error types
use thiserror::Error;

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Main error type for the emulator
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Disc error: {0}")]
    Disc(#[from] DiscError),

    #[error("Save state error: {0}")]
    SaveState(#[from] SaveStateError),

    #[error("Host protocol error: {0}")]
    Host(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Audio error: {0}")]
    Audio(String),
}

/// Disc image error types
#[derive(Error, Debug)]
pub enum DiscError {
    #[error("Cue sheet has no FILE directive")]
    MissingFileDirective,

    #[error("Cue sheet defines no tracks")]
    NoTracks,

    #[error("Invalid MSF time: '{0}'")]
    InvalidMsf(String),

    #[error("Invalid track number: {0}")]
    InvalidTrackNumber(u8),

    #[error("Track data not sector aligned: {size} bytes")]
    MisalignedData { size: usize },

    #[error("Disc load error: {0}")]
    LoadError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Save state error types
#[derive(Error, Debug)]
pub enum SaveStateError {
    #[error("Save state version {got} unsupported (expected {expected})")]
    VersionMismatch { expected: u32, got: u32 },

    #[error("Save state is corrupt: {0}")]
    Corrupt(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
