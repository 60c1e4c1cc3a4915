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

//! Emulator configuration
//!
//! Settings the binaries read at startup, loadable from an optional TOML
//! file. Every field has a default, so a missing file or a file with only
//! some keys set both work.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::cdblock::DEFAULT_HOST_CLOCK_HZ;
use crate::core::error::{EmulatorError, Result};

/// Emulator configuration that can be saved/loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Log filter passed to env_logger (e.g. "info", "ssrx=debug")
    pub log_filter: String,

    /// Disc image loaded when none is given on the command line
    pub disc_path: Option<String>,

    /// Directory save states are written to
    pub save_state_dir: String,

    /// Whether to open an audio output stream
    pub audio: bool,

    /// Host clock rate the CD block is driven at, in Hz
    pub host_clock_hz: u32,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            disc_path: None,
            save_state_dir: ".".to_string(),
            audio: false,
            host_clock_hz: DEFAULT_HOST_CLOCK_HZ,
        }
    }
}

impl EmulatorConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| EmulatorError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from `path` if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| EmulatorError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = EmulatorConfig::default();
        assert_eq!(config.log_filter, "info");
        assert!(config.disc_path.is_none());
        assert!(!config.audio);
        assert_eq!(config.host_clock_hz, DEFAULT_HOST_CLOCK_HZ);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: EmulatorConfig = toml::from_str("audio = true").unwrap();
        assert!(config.audio);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.host_clock_hz, DEFAULT_HOST_CLOCK_HZ);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssrx.toml");

        let mut config = EmulatorConfig::default();
        config.disc_path = Some("game.cue".to_string());
        config.audio = true;
        config.save(&path).unwrap();

        let loaded = EmulatorConfig::load(&path).unwrap();
        assert_eq!(loaded.disc_path.as_deref(), Some("game.cue"));
        assert!(loaded.audio);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = EmulatorConfig::load_or_default("does_not_exist.toml").unwrap();
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "log_filter = [not toml").unwrap();

        assert!(matches!(
            EmulatorConfig::load(&path),
            Err(EmulatorError::Config(_))
        ));
    }
}
