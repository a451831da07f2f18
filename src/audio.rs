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
use std::{error::Error, fmt, sync::Arc};

pub mod cpal;
pub mod mock;
pub mod render;
pub mod voice;

pub use voice::{Envelope, Voice, VoiceHandle};

/// Errors produced by audio device operations.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The device does not exist or cannot be opened.
    #[error("device unavailable: {0}")]
    Unavailable(String),
    /// The device exists but refused to start rendering.
    #[error("failed to resume device: {0}")]
    Resume(String),
    /// A submission or stream operation failed.
    #[error("stream error: {0}")]
    Stream(String),
}

pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// The device clock: seconds of audio rendered since the device came up.
    /// Advances only while the device is resumed.
    fn now(&self) -> f64;

    /// The output sample rate.
    fn sample_rate(&self) -> u32;

    /// Starts rendering. Returns once the device is actually running or has
    /// failed. Safe to call on a device that is already resumed.
    fn resume(&self) -> Result<(), DeviceError>;

    /// Stops rendering and freezes the clock.
    fn suspend(&self);

    /// Schedules a voice for playback at its start time. Returns a handle
    /// that can silence the voice.
    fn submit(&self, voice: Voice) -> Result<VoiceHandle, DeviceError>;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, DeviceError>;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets a device with the given name. Names starting with "mock" produce a
/// mock device.
pub fn get_device(name: &str) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(name)));
    };

    Ok(Arc::new(cpal::Device::get(name)?))
}
