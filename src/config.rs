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

//! Shared tempo configuration.
//!
//! Fields are stored as independent atomics. The scheduler, dispatcher, and
//! poller each sample them once per tick and tolerate one cadence interval of
//! staleness, which keeps all readers lock-free.

use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use serde::Deserialize;

use crate::synth::SoundKind;

/// The slowest supported tempo.
pub const MIN_BPM: u32 = 40;
/// The fastest supported tempo.
pub const MAX_BPM: u32 = 240;

const DEFAULT_BPM: u32 = 120;
const DEFAULT_VOLUME: f32 = 0.7;

/// Beats per measure. Only these four groupings are supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u32")]
pub enum Subdivision {
    Two,
    Three,
    #[default]
    Four,
    Six,
}

impl Subdivision {
    /// The number of beats in the measure.
    pub fn beats(self) -> u32 {
        match self {
            Subdivision::Two => 2,
            Subdivision::Three => 3,
            Subdivision::Four => 4,
            Subdivision::Six => 6,
        }
    }
}

impl TryFrom<u32> for Subdivision {
    type Error = Box<dyn Error>;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Subdivision::Two),
            3 => Ok(Subdivision::Three),
            4 => Ok(Subdivision::Four),
            6 => Ok(Subdivision::Six),
            _ => Err(format!("unsupported subdivision: {} (expected 2, 3, 4, or 6)", value).into()),
        }
    }
}

impl FromStr for Subdivision {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s
            .parse()
            .map_err(|e| format!("invalid subdivision {}: {}", s, e))?;
        Subdivision::try_from(value)
    }
}

impl fmt::Display for Subdivision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.beats())
    }
}

/// The live metronome parameters. One instance is shared between the
/// presentation layer, the scheduler, the dispatcher, and the poller.
/// Out-of-range writes are clamped here so downstream readers never see an
/// invalid value.
pub struct TempoConfig {
    bpm: AtomicU32,
    subdivision: AtomicU8,
    sound: AtomicU8,
    volume: AtomicU32,
    accent: AtomicBool,
}

impl Default for TempoConfig {
    fn default() -> TempoConfig {
        TempoConfig {
            bpm: AtomicU32::new(DEFAULT_BPM),
            subdivision: AtomicU8::new(Subdivision::default().beats() as u8),
            sound: AtomicU8::new(encode_sound(SoundKind::Click)),
            volume: AtomicU32::new(DEFAULT_VOLUME.to_bits()),
            accent: AtomicBool::new(true),
        }
    }
}

impl TempoConfig {
    pub fn new() -> TempoConfig {
        TempoConfig::default()
    }

    /// Returns the tempo in beats per minute.
    pub fn bpm(&self) -> u32 {
        self.bpm.load(Ordering::Relaxed)
    }

    /// Sets the tempo, clamped to the supported range.
    pub fn set_bpm(&self, bpm: u32) {
        self.bpm
            .store(bpm.clamp(MIN_BPM, MAX_BPM), Ordering::Relaxed);
    }

    /// Returns the subdivision.
    pub fn subdivision(&self) -> Subdivision {
        Subdivision::try_from(self.subdivision.load(Ordering::Relaxed) as u32).unwrap_or_default()
    }

    /// Sets the subdivision.
    pub fn set_subdivision(&self, subdivision: Subdivision) {
        self.subdivision
            .store(subdivision.beats() as u8, Ordering::Relaxed);
    }

    /// Returns the click timbre.
    pub fn sound(&self) -> SoundKind {
        decode_sound(self.sound.load(Ordering::Relaxed))
    }

    /// Sets the click timbre.
    pub fn set_sound(&self, sound: SoundKind) {
        self.sound.store(encode_sound(sound), Ordering::Relaxed);
    }

    /// Returns the volume in `[0, 1]`.
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// Sets the volume, clamped to `[0, 1]`. NaN is stored as silence.
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Returns whether downbeats are accented.
    pub fn accent(&self) -> bool {
        self.accent.load(Ordering::Relaxed)
    }

    /// Sets whether downbeats are accented.
    pub fn set_accent(&self, accent: bool) {
        self.accent.store(accent, Ordering::Relaxed);
    }
}

fn encode_sound(sound: SoundKind) -> u8 {
    match sound {
        SoundKind::Click => 0,
        SoundKind::Beep => 1,
        SoundKind::Wood => 2,
    }
}

fn decode_sound(value: u8) -> SoundKind {
    match value {
        1 => SoundKind::Beep,
        2 => SoundKind::Wood,
        _ => SoundKind::Click,
    }
}

/// Optional settings parsed from a YAML file. Unset fields leave the
/// corresponding configuration value untouched.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    pub bpm: Option<u32>,
    pub subdivision: Option<Subdivision>,
    pub sound: Option<SoundKind>,
    pub volume: Option<f32>,
    pub accent: Option<bool>,
}

impl Settings {
    /// Parses settings from a YAML file.
    pub fn from_file(path: &Path) -> Result<Settings, Box<dyn Error>> {
        match serde_yml::from_str(&fs::read_to_string(path)?) {
            Ok(settings) => Ok(settings),
            Err(e) => Err(format!("error parsing file {}: {}", path.display(), e).into()),
        }
    }

    /// Applies every set field to the given configuration. Values pass
    /// through the clamping setters.
    pub fn apply(&self, config: &TempoConfig) {
        if let Some(bpm) = self.bpm {
            config.set_bpm(bpm);
        }
        if let Some(subdivision) = self.subdivision {
            config.set_subdivision(subdivision);
        }
        if let Some(sound) = self.sound {
            config.set_sound(sound);
        }
        if let Some(volume) = self.volume {
            config.set_volume(volume);
        }
        if let Some(accent) = self.accent {
            config.set_accent(accent);
        }
    }
}
