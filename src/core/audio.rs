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

//! Audio output backend using cpal
//!
//! This module provides real-time playback of the CD block's CD-DA output,
//! handling sample buffering and output stream management. The block
//! produces one stereo pair per 44.1 kHz tick; the frontend drains those
//! into this backend's queue and the cpal callback consumes them.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::core::error::EmulatorError;

/// Audio output backend
///
/// Manages the output stream and sample buffering for real-time CD-DA
/// playback. Uses cpal for cross-platform audio output.
///
/// # Example
///
/// ```no_run
/// use ssrx::core::audio::AudioBackend;
///
/// let mut audio = AudioBackend::new().unwrap();
/// let samples = vec![(100, 100); 100]; // 100 stereo samples
/// audio.queue_samples(&samples);
/// ```
pub struct AudioBackend {
    /// cpal audio output stream
    #[allow(dead_code)]
    stream: cpal::Stream,
    /// Queue of stereo samples (left, right) to be played
    sample_queue: Arc<Mutex<VecDeque<(i16, i16)>>>,
    /// Sample rate of the output device
    sample_rate: u32,
}

impl AudioBackend {
    /// Create a new audio backend
    ///
    /// Initializes the default audio output device and starts the playback
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - No audio output device is available
    /// - Failed to get device configuration
    /// - Failed to build output stream
    pub fn new() -> Result<Self, EmulatorError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EmulatorError::Audio("No audio output device available".into()))?;

        let config = device
            .default_output_config()
            .map_err(|e| EmulatorError::Audio(e.to_string()))?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        if channels != 2 {
            return Err(EmulatorError::Audio(format!(
                "stereo output required, but device '{}' default config has {} channels",
                device.name().unwrap_or_else(|_| "Unknown".to_string()),
                channels
            )));
        }

        // CD-DA is fixed at 44.1 kHz; any other device rate will drift.
        if sample_rate != 44_100 {
            log::warn!(
                "Audio: Device sample rate is {} Hz (expected 44100 Hz). Audio timing may drift.",
                sample_rate
            );
        }

        log::info!(
            "Audio: Using device '{}' at {} Hz, {} channels",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate,
            channels
        );

        let sample_queue = Arc::new(Mutex::new(VecDeque::new()));
        let queue_clone = sample_queue.clone();

        // Build output stream with f32 samples
        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut queue = queue_clone.lock().unwrap();

                    // Fill output buffer with samples from queue
                    for frame in data.chunks_mut(2) {
                        if let Some((left, right)) = queue.pop_front() {
                            // Convert i16 to f32 in range [-1.0, 1.0]
                            frame[0] = left as f32 / 32768.0;
                            frame[1] = right as f32 / 32768.0;
                        } else {
                            // Output silence if queue is empty
                            frame[0] = 0.0;
                            frame[1] = 0.0;
                        }
                    }
                },
                |err| eprintln!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| EmulatorError::Audio(e.to_string()))?;

        stream
            .play()
            .map_err(|e| EmulatorError::Audio(e.to_string()))?;

        Ok(Self {
            stream,
            sample_queue,
            sample_rate,
        })
    }

    /// Queue audio samples for playback
    ///
    /// Adds stereo samples to the playback queue. Samples are consumed by
    /// the audio output stream in real-time.
    ///
    /// # Arguments
    ///
    /// * `samples` - Slice of stereo samples (left, right) in i16 format
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ssrx::core::audio::AudioBackend;
    ///
    /// let mut audio = AudioBackend::new().unwrap();
    ///
    /// // Queue 100 stereo samples
    /// let samples = vec![(100, 100); 100];
    /// audio.queue_samples(&samples);
    /// ```
    pub fn queue_samples(&mut self, samples: &[(i16, i16)]) {
        let mut queue = self.sample_queue.lock().unwrap();
        queue.extend(samples.iter());
    }

    /// Pull `count` samples from a source and queue them
    ///
    /// The CD block hands out one stereo pair per output tick, so frontends
    /// drain it with a closure rather than building a slice first.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ssrx::core::audio::AudioBackend;
    /// use ssrx::core::CdBlock;
    ///
    /// let mut audio = AudioBackend::new().unwrap();
    /// let mut cdb = CdBlock::new();
    ///
    /// // Queue one sector's worth of CD-DA output
    /// audio.pump(588, || cdb.get_cdda());
    /// ```
    pub fn pump<F>(&mut self, count: usize, mut source: F)
    where
        F: FnMut() -> (i16, i16),
    {
        let mut queue = self.sample_queue.lock().unwrap();
        for _ in 0..count {
            queue.push_back(source());
        }
    }

    /// Get current buffer level
    ///
    /// Returns the number of stereo samples currently queued for playback.
    /// This can be used to detect buffer underruns or monitor playback
    /// latency.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ssrx::core::audio::AudioBackend;
    ///
    /// let audio = AudioBackend::new().unwrap();
    /// let level = audio.buffer_level();
    ///
    /// if level < 512 {
    ///     println!("Warning: Audio buffer running low");
    /// }
    /// ```
    pub fn buffer_level(&self) -> usize {
        self.sample_queue.lock().unwrap().len()
    }

    /// Get the sample rate of the audio output device
    ///
    /// # Returns
    ///
    /// Sample rate in Hz (typically 44100 or 48000)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
