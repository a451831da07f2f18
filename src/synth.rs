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

//! Procedural click sample synthesis.
//!
//! All three timbres are rendered up front into short mono buffers so playback
//! never synthesizes under a deadline. The noise and phase terms are drawn from
//! a caller-supplied generator; pass a seeded one for reproducible buffers.

use std::error::Error;
use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;
use serde::Deserialize;
use tracing::debug;

/// Nominal click duration, in seconds.
const CLICK_DURATION: f64 = 0.06;
/// Nominal beep duration, in seconds.
const BEEP_DURATION: f64 = 0.12;
/// Nominal woodblock duration, in seconds.
const WOOD_DURATION: f64 = 0.09;

/// The built-in click timbres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundKind {
    /// A bright 1200 Hz tick with a short burst of noise.
    Click,
    /// A softer 440 Hz tone with its second harmonic.
    Beep,
    /// A woodblock built from six inharmonic partials.
    Wood,
}

impl SoundKind {
    /// All timbres, in display order.
    pub const ALL: [SoundKind; 3] = [SoundKind::Click, SoundKind::Beep, SoundKind::Wood];

    /// The nominal duration of this timbre in seconds.
    pub fn duration(self) -> f64 {
        match self {
            SoundKind::Click => CLICK_DURATION,
            SoundKind::Beep => BEEP_DURATION,
            SoundKind::Wood => WOOD_DURATION,
        }
    }

    /// Convert to string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            SoundKind::Click => "click",
            SoundKind::Beep => "beep",
            SoundKind::Wood => "wood",
        }
    }
}

impl FromStr for SoundKind {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "click" => Ok(SoundKind::Click),
            "beep" => Ok(SoundKind::Beep),
            "wood" => Ok(SoundKind::Wood),
            _ => Err(format!("unknown sound kind: {}", s).into()),
        }
    }
}

impl fmt::Display for SoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A rendered mono sample, immutable once built.
pub struct SampleBuffer {
    /// The amplitude samples.
    samples: Vec<f32>,
    /// The rate the samples were rendered at.
    sample_rate: u32,
    /// The nominal duration the buffer was rendered for, in seconds.
    duration: f64,
}

impl SampleBuffer {
    /// Builds a buffer directly from samples, for tests that need exact
    /// values.
    #[cfg(test)]
    pub(crate) fn from_samples(samples: Vec<f32>, sample_rate: u32) -> SampleBuffer {
        let duration = samples.len() as f64 / f64::from(sample_rate);
        SampleBuffer {
            samples,
            sample_rate,
            duration,
        }
    }

    /// Returns the samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the sample rate the buffer was rendered at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the nominal duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Reads the buffer at a fractional sample position with linear
    /// interpolation. Positions at or beyond the final sample return None.
    pub fn interpolate(&self, position: f64) -> Option<f32> {
        if position < 0.0 {
            return Some(0.0);
        }
        let index = position as usize;
        if index + 1 >= self.samples.len() {
            // The final sample is played as-is.
            return self.samples.get(index).copied();
        }
        let frac = (position - index as f64) as f32;
        Some(self.samples[index] * (1.0 - frac) + self.samples[index + 1] * frac)
    }
}

/// One cached buffer per timbre, rendered for a single device sample rate.
/// Built once when the device comes up and shared for its lifetime.
pub struct SampleBank {
    click: Arc<SampleBuffer>,
    beep: Arc<SampleBuffer>,
    wood: Arc<SampleBuffer>,
    sample_rate: u32,
}

impl SampleBank {
    /// Renders all timbres at the given sample rate.
    pub fn generate(sample_rate: u32) -> SampleBank {
        SampleBank::generate_with(sample_rate, &mut rand::thread_rng())
    }

    /// Renders all timbres using the supplied random source. Seed the source
    /// when reproducible buffers are needed.
    pub fn generate_with<R: Rng>(sample_rate: u32, rng: &mut R) -> SampleBank {
        let bank = SampleBank {
            click: Arc::new(render(SoundKind::Click, sample_rate, rng)),
            beep: Arc::new(render(SoundKind::Beep, sample_rate, rng)),
            wood: Arc::new(render(SoundKind::Wood, sample_rate, rng)),
            sample_rate,
        };
        debug!(sample_rate, "Rendered sample bank");
        bank
    }

    /// Returns the buffer for the given timbre.
    pub fn buffer(&self, kind: SoundKind) -> Arc<SampleBuffer> {
        match kind {
            SoundKind::Click => self.click.clone(),
            SoundKind::Beep => self.beep.clone(),
            SoundKind::Wood => self.wood.clone(),
        }
    }

    /// Returns the sample rate the bank was rendered for.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Renders one timbre at the given sample rate.
pub fn render<R: Rng>(kind: SoundKind, sample_rate: u32, rng: &mut R) -> SampleBuffer {
    let duration = kind.duration();
    let len = (sample_rate as f64 * duration).round() as usize;
    let samples = match kind {
        SoundKind::Click => render_click(len, sample_rate, rng),
        SoundKind::Beep => render_beep(len, sample_rate),
        SoundKind::Wood => render_wood(len, sample_rate, rng),
    };

    let mut buffer = SampleBuffer {
        samples,
        sample_rate,
        duration,
    };
    apply_linear_decay(&mut buffer);
    buffer
}

/// 1200 Hz sine with a fast exponential decay plus a quieter, faster-decaying
/// noise burst for the transient.
fn render_click<R: Rng>(len: usize, sample_rate: u32, rng: &mut R) -> Vec<f32> {
    let freq = 1200.0;
    (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            let tone = (TAU * freq * t).sin() * (-40.0 * t).exp();
            let noise = (rng.gen::<f64>() * 2.0 - 1.0) * (-60.0 * t).exp() * 0.1;
            (tone + noise) as f32
        })
        .collect()
}

/// A4 fundamental plus its second harmonic at half amplitude.
fn render_beep(len: usize, sample_rate: u32) -> Vec<f32> {
    let a4 = 440.0;
    (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            let tone = (TAU * a4 * t).sin() + 0.5 * (TAU * a4 * 2.0 * t).sin();
            (tone * (-8.0 * t).exp()) as f32
        })
        .collect()
}

/// Six stacked partials at 200 + 60h Hz with random phases and 1/(h+1)
/// amplitudes, which lands close enough to a woodblock.
fn render_wood<R: Rng>(len: usize, sample_rate: u32, rng: &mut R) -> Vec<f32> {
    let partials: Vec<(f64, f64)> = (0..6)
        .map(|h| {
            let freq = 200.0 + h as f64 * 60.0;
            let phase = rng.gen::<f64>() * TAU;
            (freq, phase)
        })
        .collect();

    (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            let mut val = 0.0;
            for (h, (freq, phase)) in partials.iter().enumerate() {
                val += (TAU * freq * t + phase).sin() * (1.0 / (h as f64 + 1.0));
            }
            (val * (-20.0 * t).exp()) as f32
        })
        .collect()
}

/// Fades the buffer linearly to zero over its full window so the tail can
/// never end on a discontinuity.
fn apply_linear_decay(buffer: &mut SampleBuffer) {
    let sample_rate = buffer.sample_rate as f64;
    let duration = buffer.duration;
    for (i, sample) in buffer.samples.iter_mut().enumerate() {
        let t = i as f64 / sample_rate;
        *sample *= (1.0 - t / duration).max(0.0) as f32;
    }
}
