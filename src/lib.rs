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

//! Sega Saturn CD block emulator library
//!
//! This library provides the CD block subsystem of a Sega Saturn emulator:
//! the command processor, drive mechanism, sector buffer pool, filter
//! routing graph, filesystem walker, and host data transfer engine.
//!
//! # Example
//!
//! ```
//! use ssrx::core::CdBlock;
//!
//! let mut cdb = CdBlock::new();
//!
//! // Attach a disc image, then run the block event by event
//! // let disc = ssrx::core::DiscImage::load("game.cue").unwrap();
//! // cdb.set_disc(false, Some(Box::new(disc)));
//! let next = cdb.update(0);
//! cdb.update(next);
//! ```

pub mod config;
pub mod core;
