// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut

//! Unit tests for the CD block, organized by category
//!
//! - `basic`: power-on, boot seek and the register interface
//! - `buffers`: sector buffer pool accounting
//! - `filters`: routing conditions and graph connections
//! - `drive`: seek, play, scan and backpressure behavior
//! - `commands`: command forms, rejection and selector state
//! - `transfer`: host transfer sessions over buffers and virtual sources
//! - `filesystem`: disc authentication and directory walking
//! - `timing`: clock conversion and report cadence

pub mod helpers;

mod filters;
mod timing;
mod transfer;
