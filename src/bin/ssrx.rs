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

use std::path::Path;

use clap::Parser;
use log::{error, info, warn};

use ssrx::config::EmulatorConfig;
use ssrx::core::cdblock::{clock_ratio_from_hz, status, FileRecord, Hirq};
use ssrx::core::error::{EmulatorError, Result};
use ssrx::core::{CdBlock, DiscImage, SaveState};

/// Sega Saturn CD block emulator
#[derive(Parser)]
#[command(name = "ssrx")]
#[command(about = "Saturn CD block emulator", long_about = None)]
struct Args {
    /// Path to CD image cue sheet (.cue)
    disc_file: Option<String>,

    /// Path to a TOML configuration file
    #[arg(short, long, default_value = "ssrx.toml")]
    config: String,

    /// Identifier of a root directory file to read off the disc
    #[arg(short = 'r', long)]
    read_file: Option<u32>,

    /// Write the bytes fetched by --read-file to this path
    #[arg(short, long)]
    out: Option<String>,

    /// Write a save state of the block to this path before exiting
    #[arg(short, long)]
    save_state: Option<String>,
}

/// Upper bound on event steps while waiting for a single interrupt
const WAIT_STEPS: u32 = 400_000;

/// Upper bound on status polls while the drive spins up
const SETTLE_POLLS: u32 = 10_000;

/// Upper bound on poll rounds while streaming a file out of the buffer pool
const READ_ROUNDS: u32 = 4_000_000;

/// Bus-side driver for the block
///
/// Issues commands, acknowledges interrupts and advances emulation one
/// scheduled event at a time, the way a Saturn CD driver talks to the real
/// chip.
struct Host {
    cdb: CdBlock,
    now: i64,
}

impl Host {
    fn new(cdb: CdBlock) -> Self {
        Self { cdb, now: 0 }
    }

    /// Advance emulation to its next scheduled event
    fn step(&mut self) {
        self.now = self.cdb.update(self.now);
    }

    /// Clear interrupt status bits
    fn ack(&mut self, bits: Hirq) {
        self.cdb.write_register(self.now, 0x2, !bits.bits());
    }

    /// Step until all of `bits` are raised
    fn wait(&mut self, bits: Hirq) -> Result<()> {
        for _ in 0..WAIT_STEPS {
            if self.cdb.hirq().contains(bits) {
                return Ok(());
            }
            self.step();
        }
        Err(EmulatorError::Host(format!(
            "timed out waiting for {:?}",
            bits
        )))
    }

    /// Issue one command and collect its four result words
    fn command(&mut self, words: [u16; 4]) -> Result<[u16; 4]> {
        self.ack(Hirq::CMOK);
        self.cdb.write_register(self.now, 0x6, words[0]);
        self.cdb.write_register(self.now, 0x7, words[1]);
        self.cdb.write_register(self.now, 0x8, words[2]);
        self.cdb.write_register(self.now, 0x9, words[3]);
        self.wait(Hirq::CMOK)?;
        Ok([
            self.cdb.read_register(0x6),
            self.cdb.read_register(0x7),
            self.cdb.read_register(0x8),
            self.cdb.read_register(0x9),
        ])
    }

    /// Current drive status byte
    fn drive_status(&mut self) -> Result<u8> {
        let res = self.command([0x0000, 0, 0, 0])?;
        Ok((res[0] >> 8) as u8)
    }

    /// Pull 16-bit words out of the transfer FIFO, big-endian
    fn drain(&mut self, words: usize, out: &mut Vec<u8>) {
        for _ in 0..words {
            let w = self.cdb.read_register(0x0);
            out.push((w >> 8) as u8);
            out.push(w as u8);
        }
    }

    /// Close the open transfer and return the number of words it moved
    fn end_transfer(&mut self) -> Result<u32> {
        let res = self.command([0x0600, 0, 0, 0])?;
        Ok((u32::from(res[0] & 0xFF) << 16) | u32::from(res[1]))
    }
}

/// Whole-byte rejected status in a command's first result word
fn rejected(res: &[u16; 4]) -> bool {
    res[0] >> 8 == u16::from(status::REJECTED)
}

/// One decoded root directory entry
struct FileEntry {
    id: u32,
    fad: u32,
    size: u32,
    attr: u8,
}

/// Decode the 12-byte records of a drained file info transfer
fn parse_records(bytes: &[u8], base: u32) -> Vec<FileEntry> {
    bytes
        .chunks_exact(12)
        .enumerate()
        .map(|(i, rec)| FileEntry {
            id: base + i as u32,
            fad: u32::from_be_bytes([rec[0], rec[1], rec[2], rec[3]]),
            size: u32::from_be_bytes([rec[4], rec[5], rec[6], rec[7]]),
            attr: rec[11],
        })
        .collect()
}

fn main() -> Result<()> {
    // Load .env overrides when present
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Parse command line arguments
    let args = Args::parse();

    let config = match EmulatorConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            return Err(e);
        }
    };

    // Initialize logger with the configured default level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_filter.as_str()),
    )
    .init();

    info!("ssrx v{}", env!("CARGO_PKG_VERSION"));
    info!("Saturn CD block emulator");

    let Some(disc_path) = args.disc_file.clone().or_else(|| config.disc_path.clone()) else {
        error!(
            "No disc image given on the command line or in {}",
            args.config
        );
        return Err(EmulatorError::Config("no disc image path".into()));
    };

    // Create the block and insert the disc
    let mut cdb = CdBlock::new();
    cdb.set_clock_ratio(clock_ratio_from_hz(config.host_clock_hz));

    info!("Loading disc image from: {}", disc_path);
    let disc = DiscImage::load(&disc_path).map_err(|e| {
        error!("Failed to load disc image: {}", e);
        EmulatorError::Disc(e)
    })?;
    cdb.set_disc(false, Some(Box::new(disc)));

    let mut host = Host::new(cdb);

    // Enable every interrupt source
    host.cdb.write_register(host.now, 0x3, 0xFFFF);

    // GetHardwareInfo answers before the drive settles
    let hw = host.command([0x0100, 0, 0, 0])?;
    info!("HW flag 0x{:04X}, version 0x{:04X}", hw[1], hw[3]);

    // Wait out spin-up and the TOC read
    info!("Waiting for the drive to settle...");
    let mut settled = false;
    for _ in 0..SETTLE_POLLS {
        let st = host.drive_status()?;
        if st & 0x0F == status::PAUSE && st & status::WAIT == 0 {
            settled = true;
            break;
        }
        host.step();
    }
    if !settled {
        error!("Drive did not settle");
        return Err(EmulatorError::Host("drive did not settle".into()));
    }

    // GetToc streams the 102-entry table over the FIFO
    let toc_res = host.command([0x0200, 0, 0, 0])?;
    let toc_words = usize::from(toc_res[1]);
    host.wait(Hirq::DRDY)?;
    let mut toc_bytes = Vec::with_capacity(toc_words * 2);
    host.drain(toc_words, &mut toc_bytes);
    host.end_transfer()?;
    host.ack(Hirq::DRDY);

    let first_track = toc_bytes[99 * 4 + 1];
    let last_track = toc_bytes[100 * 4 + 1];
    let leadout = u32::from_be_bytes([0, toc_bytes[405], toc_bytes[406], toc_bytes[407]]);
    info!(
        "TOC: tracks {}..={}, lead-out FAD {}",
        first_track, last_track, leadout
    );

    // AuthenticateDevice walks the filesystem on a data disc
    info!("Authenticating disc...");
    host.ack(Hirq::EFLS);
    let res = host.command([0xE000, 0, 0, 0])?;
    if rejected(&res) {
        error!("Authentication rejected");
        return Err(EmulatorError::Host("authentication rejected".into()));
    }
    host.wait(Hirq::EFLS)?;
    host.ack(Hirq::EFLS);

    let auth = host.command([0xE100, 0, 0, 0])?;
    info!("Disc authenticated, type 0x{:02X}", auth[1]);

    // ChangeDirectory to the root, reading through filter 0
    host.ack(Hirq::EFLS);
    let res = host.command([0x7000, 0, 0x00FF, 0xFFFF])?;
    if rejected(&res) {
        error!("ChangeDirectory rejected");
        return Err(EmulatorError::Host("change directory rejected".into()));
    }
    host.wait(Hirq::EFLS)?;
    host.ack(Hirq::EFLS);

    let scope = host.command([0x7200, 0, 0, 0])?;
    let entry_count = scope[1];
    let window_base = (u32::from(scope[2] & 0xFF) << 16) | u32::from(scope[3]);
    info!("Root directory holds {} entries", entry_count);

    // GetFileInfo for the whole window, 6 words per record
    let mut listing = Vec::new();
    if entry_count > 0 {
        let info_res = host.command([0x7300, 0, 0x00FF, 0xFFFF])?;
        let words = usize::from(info_res[1]);
        host.wait(Hirq::DRDY)?;
        let mut bytes = Vec::with_capacity(words * 2);
        host.drain(words, &mut bytes);
        host.end_transfer()?;
        host.ack(Hirq::DRDY);

        listing = parse_records(&bytes, window_base);
        for f in &listing {
            info!(
                "  file {:3}: FAD {:6}, {:9} bytes{}",
                f.id,
                f.fad,
                f.size,
                if f.attr & FileRecord::ATTR_DIR != 0 {
                    "  <dir>"
                } else {
                    ""
                }
            );
        }
    }

    if let Some(fileid) = args.read_file {
        let Some(entry) = listing.iter().find(|f| f.id == fileid) else {
            error!("File {} is not in the root directory listing", fileid);
            return Err(EmulatorError::Host(format!("no such file {}", fileid)));
        };
        if entry.attr & FileRecord::ATTR_DIR != 0 {
            error!("File {} is a directory", fileid);
            return Err(EmulatorError::Host(format!(
                "file {} is a directory",
                fileid
            )));
        }
        let size = entry.size as usize;

        // ReadFile streams the extent into filter 0's partition; drain it
        // with GetThenDeleteSectorData until the play-end interrupt
        info!("Reading file {} ({} bytes)...", fileid, size);
        host.ack(Hirq::EFLS);
        let res = host.command([0x7400, 0, ((fileid >> 16) as u16) & 0x00FF, fileid as u16])?;
        if rejected(&res) {
            error!("ReadFile rejected");
            return Err(EmulatorError::Host("read file rejected".into()));
        }

        let mut bytes: Vec<u8> = Vec::with_capacity(size);
        let mut finished = false;
        for _ in 0..READ_ROUNDS {
            let cnt = host.command([0x5100, 0, 0, 0])?;
            let sectors = cnt[3];

            if sectors > 0 {
                let res = host.command([0x6300, 0, 0, sectors])?;
                if (res[0] >> 8) as u8 & status::WAIT != 0 {
                    // Transfer engine still busy, poll again
                    host.step();
                    continue;
                }
                host.wait(Hirq::DRDY)?;
                host.drain(usize::from(sectors) * 1024, &mut bytes);
                let moved = host.end_transfer()?;
                if moved != u32::from(sectors) * 1024 {
                    warn!(
                        "Transfer moved {} words, expected {}",
                        moved,
                        u32::from(sectors) * 1024
                    );
                }
                host.wait(Hirq::EHST)?;
                host.ack(Hirq::DRDY | Hirq::EHST | Hirq::BFUL);
            } else if host.cdb.hirq().contains(Hirq::EFLS) {
                finished = true;
                break;
            } else {
                host.step();
            }
        }
        if !finished {
            error!("File read did not finish");
            return Err(EmulatorError::Host("file read did not finish".into()));
        }
        host.ack(Hirq::EFLS);

        bytes.truncate(size);
        if let Some(out_path) = &args.out {
            std::fs::write(out_path, &bytes)?;
            info!("Wrote {} bytes to {}", bytes.len(), out_path);
        } else {
            info!("Read {} bytes from file {}", bytes.len(), fileid);
        }
    }

    if let Some(state_path) = &args.save_state {
        let mut state = SaveState::from_cdblock(&host.cdb);
        state.metadata.disc_title = Path::new(&disc_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        state.metadata.host_clock_hz = config.host_clock_hz;
        state.metadata.playtime = host.now.max(0) as u64 / u64::from(config.host_clock_hz.max(1));

        let full_path = Path::new(&config.save_state_dir).join(state_path);
        state.save_to_file(&full_path).map_err(|e| {
            error!("Failed to write save state: {}", e);
            EmulatorError::SaveState(e)
        })?;
        info!(
            "Save state written to {} ({})",
            full_path.display(),
            serde_json::to_string(&state.metadata).unwrap_or_default()
        );
    }

    info!("Session complete at host clock {}", host.now);
    Ok(())
}
