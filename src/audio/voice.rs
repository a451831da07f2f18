// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Timed playback voices.
//!
//! A voice is one scheduled playback of a sample buffer with its own gain
//! envelope and playback rate. The device consumes the voice; the submitter
//! keeps a handle that can silence it before or during playback.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::synth::SampleBuffer;

/// The near-zero gain floor. Ramps start and end here rather than at zero,
/// mirroring how exponential-style envelopes avoid a true zero endpoint.
pub const MIN_GAIN: f32 = 1e-4;

static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(0);

/// A piecewise-linear gain curve in device-clock seconds: floor until
/// `start`, up to `peak` by `peak_at`, back to the floor by `end`.
#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    start: f64,
    peak_at: f64,
    end: f64,
    peak: f32,
}

impl Envelope {
    pub fn new(start: f64, peak_at: f64, end: f64, peak: f32) -> Envelope {
        Envelope {
            start,
            peak_at,
            end,
            peak,
        }
    }

    /// Returns the target gain.
    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// Returns the gain at the given device-clock time.
    pub fn value_at(&self, time: f64) -> f32 {
        if time <= self.start || time >= self.end {
            return MIN_GAIN;
        }
        if time < self.peak_at {
            let progress = (time - self.start) / (self.peak_at - self.start);
            MIN_GAIN + (self.peak - MIN_GAIN) * progress as f32
        } else {
            let progress = (time - self.peak_at) / (self.end - self.peak_at);
            self.peak + (MIN_GAIN - self.peak) * progress as f32
        }
    }
}

/// One scheduled playback of a sample buffer. Consumed by the device on
/// submission.
pub struct Voice {
    id: u64,
    buffer: Arc<SampleBuffer>,
    start_time: f64,
    rate: f64,
    envelope: Envelope,
    halted: Arc<AtomicBool>,
}

impl Voice {
    /// Creates a voice that plays `buffer` starting exactly at `start_time`
    /// on the device clock, resampled by `rate`.
    pub fn new(buffer: Arc<SampleBuffer>, start_time: f64, rate: f64, envelope: Envelope) -> Voice {
        Voice {
            id: NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed),
            buffer,
            start_time,
            rate,
            envelope,
            halted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the unique voice ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the sample buffer.
    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    /// Returns the device-clock time playback starts.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Returns the playback rate multiplier.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Returns the gain envelope.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Returns true once the voice has been halted through its handle.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }

    /// Returns a handle that can silence this voice.
    pub fn handle(&self) -> VoiceHandle {
        VoiceHandle {
            id: self.id,
            start_time: self.start_time,
            halted: Arc::clone(&self.halted),
        }
    }
}

/// Cancellation handle to an in-flight voice. Halting a voice that already
/// finished is a harmless no-op.
#[derive(Clone)]
pub struct VoiceHandle {
    id: u64,
    start_time: f64,
    halted: Arc<AtomicBool>,
}

impl VoiceHandle {
    /// Returns the voice ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the device-clock time the voice starts.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Silences the voice immediately, without waiting for envelope decay.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Relaxed);
    }

    /// Returns true if the voice has been halted.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }
}
