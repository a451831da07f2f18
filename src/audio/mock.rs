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
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::debug;

use crate::audio::render::Renderer;
use crate::audio::voice::{Voice, VoiceHandle};
use crate::audio::DeviceError;

const SAMPLE_RATE: u32 = 44100;
const CHANNELS: u16 = 2;
const RENDER_CHUNK_FRAMES: usize = 256;

/// A mock device. Renders through the same pipeline as a real device, but
/// its clock only moves when a caller advances it, so timing is fully
/// deterministic.
#[derive(Clone)]
pub struct Device {
    name: String,
    sample_rate: u32,
    channels: u16,
    resumed: Arc<AtomicBool>,
    fail_resume: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    voice_tx: Sender<Voice>,
    renderer: Arc<Mutex<Renderer>>,
    submissions: Arc<Mutex<Vec<Submission>>>,
}

/// A record of one voice submission, kept for assertions.
#[derive(Clone)]
pub struct Submission {
    pub start_time: f64,
    pub rate: f64,
    pub peak_gain: f32,
    pub buffer_len: usize,
    pub handle: VoiceHandle,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        let frames = Arc::new(AtomicU64::new(0));
        let (voice_tx, voice_rx) = crossbeam_channel::unbounded();
        let renderer = Renderer::new(SAMPLE_RATE, CHANNELS, Arc::clone(&frames), voice_rx);

        Device {
            name: name.to_string(),
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            resumed: Arc::new(AtomicBool::new(false)),
            fail_resume: Arc::new(AtomicBool::new(false)),
            frames,
            voice_tx,
            renderer: Arc::new(Mutex::new(renderer)),
            submissions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Renders the given span of time through the device, advancing its
    /// clock. Returns the interleaved samples produced.
    pub fn advance(&self, duration: Duration) -> Vec<f32> {
        let total_frames =
            (duration.as_secs_f64() * f64::from(self.sample_rate)).round() as usize;
        let channels = usize::from(self.channels);
        let mut rendered = Vec::with_capacity(total_frames * channels);

        let mut renderer = self.renderer.lock();
        let mut remaining = total_frames;
        while remaining > 0 {
            let chunk = remaining.min(RENDER_CHUNK_FRAMES);
            let mut output = vec![0.0f32; chunk * channels];
            renderer.process(&mut output);
            rendered.extend_from_slice(&output);
            remaining -= chunk;
        }

        rendered
    }

    /// Returns true if the device has been resumed.
    #[cfg(test)]
    pub fn is_resumed(&self) -> bool {
        self.resumed.load(Ordering::Relaxed)
    }

    /// Makes the next resume call fail.
    #[cfg(test)]
    pub fn set_fail_resume(&self, fail: bool) {
        self.fail_resume.store(fail, Ordering::Relaxed);
    }

    /// Returns every submission made so far.
    #[cfg(test)]
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    /// Returns the number of voices the renderer is holding.
    #[cfg(test)]
    pub fn active_voices(&self) -> usize {
        self.renderer.lock().active_voices()
    }

    /// The channel count of the rendered stream.
    #[cfg(test)]
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl crate::audio::Device for Device {
    fn now(&self) -> f64 {
        self.frames.load(Ordering::Relaxed) as f64 / f64::from(self.sample_rate)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn resume(&self) -> Result<(), DeviceError> {
        if self.fail_resume.load(Ordering::Relaxed) {
            return Err(DeviceError::Resume(format!(
                "mock device {} refused to resume",
                self.name
            )));
        }
        self.resumed.store(true, Ordering::Relaxed);
        debug!(device = self.name, "Resumed mock device.");
        Ok(())
    }

    fn suspend(&self) {
        self.resumed.store(false, Ordering::Relaxed);
        debug!(device = self.name, "Suspended mock device.");
    }

    fn submit(&self, voice: Voice) -> Result<VoiceHandle, DeviceError> {
        if !self.resumed.load(Ordering::Relaxed) {
            return Err(DeviceError::Stream(format!(
                "mock device {} is suspended",
                self.name
            )));
        }

        let handle = voice.handle();
        self.submissions.lock().push(Submission {
            start_time: voice.start_time(),
            rate: voice.rate(),
            peak_gain: voice.envelope().peak(),
            buffer_len: voice.buffer().len(),
            handle: handle.clone(),
        });
        self.voice_tx
            .send(voice)
            .map_err(|e| DeviceError::Stream(e.to_string()))?;

        Ok(handle)
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, DeviceError> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::audio::voice::Envelope;
    use crate::audio::Device as _;
    use crate::synth::{render, SoundKind};

    fn test_voice(start_time: f64) -> Voice {
        let buffer = Arc::new(render(
            SoundKind::Click,
            SAMPLE_RATE,
            &mut StdRng::seed_from_u64(1),
        ));
        let envelope = Envelope::new(start_time - 0.01, start_time + 0.001, start_time + 0.12, 0.8);
        Voice::new(buffer, start_time, 1.0, envelope)
    }

    #[test]
    fn test_clock_advances_exactly() {
        let device = Device::get("mock");
        assert_eq!(device.now(), 0.0);

        device.advance(Duration::from_millis(250));
        assert!((device.now() - 0.25).abs() < 1e-9);

        device.advance(Duration::from_millis(750));
        assert!((device.now() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_resume_and_suspend() {
        let device = Device::get("mock");
        assert!(!device.is_resumed());

        device.resume().expect("resume failed");
        assert!(device.is_resumed());

        device.suspend();
        assert!(!device.is_resumed());
    }

    #[test]
    fn test_failed_resume() {
        let device = Device::get("mock");
        device.set_fail_resume(true);
        assert!(device.resume().is_err());
        assert!(!device.is_resumed());

        device.set_fail_resume(false);
        assert!(device.resume().is_ok());
    }

    #[test]
    fn test_submit_requires_resume() {
        let device = Device::get("mock");
        assert!(device.submit(test_voice(0.1)).is_err());

        device.resume().expect("resume failed");
        assert!(device.submit(test_voice(0.1)).is_ok());
        assert_eq!(device.submissions().len(), 1);
    }

    #[test]
    fn test_submitted_voice_renders_at_its_start_time() {
        let device = Device::get("mock");
        device.resume().expect("resume failed");
        device.submit(test_voice(0.1)).expect("submit failed");

        // Nothing sounds in the first 50ms.
        let early = device.advance(Duration::from_millis(50));
        assert!(early.iter().all(|s| *s == 0.0));

        // The click lands inside the next 100ms.
        let audible = device.advance(Duration::from_millis(100));
        assert!(audible.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn test_halted_submission_is_silent() {
        let device = Device::get("mock");
        device.resume().expect("resume failed");
        let handle = device.submit(test_voice(0.1)).expect("submit failed");
        handle.halt();

        let rendered = device.advance(Duration::from_millis(200));
        assert!(rendered.iter().all(|s| *s == 0.0));
        assert_eq!(device.active_voices(), 0);
    }
}
