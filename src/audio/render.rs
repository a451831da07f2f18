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
// Core voice rendering logic that can be used by both CPAL and test implementations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;

use super::voice::Voice;

/// Renders submitted voices into interleaved output buffers. The renderer is
/// owned by exactly one rendering thread; voices arrive over a channel so
/// submission never takes a lock against it. The frame counter it advances is
/// the device clock: time in seconds is frames rendered divided by the sample
/// rate.
pub struct Renderer {
    sample_rate: u32,
    channels: u16,
    /// Total frames rendered since the device came up. Shared with the
    /// device front-end, which derives the clock from it.
    frames: Arc<AtomicU64>,
    voice_rx: Receiver<Voice>,
    voices: Vec<ActiveVoice>,
}

/// A voice currently held by the renderer, with its playback cursor.
struct ActiveVoice {
    voice: Voice,
    /// The device-clock frame at which sample 0 plays. Fractional, so a
    /// start time between frames lands with sub-frame accuracy.
    start_frame: f64,
}

impl ActiveVoice {
    fn new(voice: Voice, sample_rate: u32) -> ActiveVoice {
        let start_frame = voice.start_time() * f64::from(sample_rate);
        ActiveVoice { voice, start_frame }
    }

    /// Mixes this voice into the interleaved buffer whose first frame is
    /// `base_frame`. Returns false once the voice has nothing further to
    /// contribute.
    fn mix_into(
        &mut self,
        output: &mut [f32],
        base_frame: u64,
        sample_rate: u32,
        channels: usize,
    ) -> bool {
        if self.voice.is_halted() {
            return false;
        }

        let rate = self.voice.rate();
        let envelope = *self.voice.envelope();
        let buffer = Arc::clone(self.voice.buffer());

        for (i, frame) in output.chunks_mut(channels).enumerate() {
            let abs_frame = base_frame + i as u64;
            let position = (abs_frame as f64 - self.start_frame) * rate;
            let sample = match buffer.interpolate(position) {
                Some(sample) => sample,
                // Past the end of the buffer.
                None => return false,
            };
            if sample == 0.0 {
                continue;
            }

            let time = abs_frame as f64 / f64::from(sample_rate);
            let value = sample * envelope.value_at(time);
            // The mono click feeds every output channel.
            for out in frame.iter_mut() {
                *out += value;
            }
        }

        true
    }
}

impl Renderer {
    pub fn new(
        sample_rate: u32,
        channels: u16,
        frames: Arc<AtomicU64>,
        voice_rx: Receiver<Voice>,
    ) -> Renderer {
        Renderer {
            sample_rate,
            channels,
            frames,
            voice_rx,
            voices: Vec::new(),
        }
    }

    /// Fills one interleaved output buffer, advancing the device clock by
    /// the number of frames it holds. Newly submitted voices join at the
    /// start of the pass; finished and halted voices are dropped.
    pub fn process(&mut self, output: &mut [f32]) {
        output.fill(0.0);

        for voice in self.voice_rx.try_iter() {
            self.voices.push(ActiveVoice::new(voice, self.sample_rate));
        }

        let channels = usize::from(self.channels);
        if channels == 0 {
            return;
        }

        let base_frame = self.frames.load(Ordering::Relaxed);
        let sample_rate = self.sample_rate;
        self.voices
            .retain_mut(|voice| voice.mix_into(output, base_frame, sample_rate, channels));

        let frames = (output.len() / channels) as u64;
        self.frames.store(base_frame + frames, Ordering::Relaxed);
    }

    /// The number of voices currently held.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::Sender;

    use super::*;
    use crate::audio::voice::Envelope;
    use crate::synth::SampleBuffer;

    // An envelope whose release is so long that its gain stays at the peak
    // for the duration of any test, within float tolerance.
    fn flat_envelope(peak: f32) -> Envelope {
        Envelope::new(-2.0, -1.0, 1e9, peak)
    }

    fn new_renderer(sample_rate: u32, channels: u16) -> (Renderer, Sender<Voice>, Arc<AtomicU64>) {
        let frames = Arc::new(AtomicU64::new(0));
        let (voice_tx, voice_rx) = crossbeam_channel::unbounded();
        let renderer = Renderer::new(sample_rate, channels, Arc::clone(&frames), voice_rx);
        (renderer, voice_tx, frames)
    }

    fn assert_near(actual: f32, expected: f32, context: &str) {
        assert!(
            (actual - expected).abs() < 1e-5,
            "{}: {} != {}",
            context,
            actual,
            expected
        );
    }

    #[test]
    fn test_clock_advances_with_frames() {
        let (mut renderer, _voice_tx, frames) = new_renderer(100, 2);

        let mut output = vec![0.0f32; 32];
        renderer.process(&mut output);
        renderer.process(&mut output);
        renderer.process(&mut output);

        // 3 passes of 16 frames each.
        assert_eq!(frames.load(Ordering::Relaxed), 48);
    }

    #[test]
    fn test_silence_before_start_time() {
        let (mut renderer, voice_tx, _) = new_renderer(100, 1);
        let buffer = Arc::new(SampleBuffer::from_samples(vec![0.5, 0.5, 0.5], 100));
        let voice = Voice::new(buffer, 1.0, 1.0, flat_envelope(1.0));
        voice_tx.send(voice).unwrap();

        // Frames 0..50 and 50..100 all precede the 1 second start time.
        let mut output = vec![1.0f32; 50];
        renderer.process(&mut output);
        assert!(output.iter().all(|s| *s == 0.0));
        renderer.process(&mut output);
        assert!(output.iter().all(|s| *s == 0.0));
        assert_eq!(renderer.active_voices(), 1);

        // The first sample lands exactly at frame 100.
        renderer.process(&mut output);
        assert_near(output[0], 0.5, "frame 100");
        assert_near(output[1], 0.5, "frame 101");
        assert_near(output[2], 0.5, "frame 102");
        assert_eq!(output[3], 0.0);
    }

    #[test]
    fn test_overlapping_voices_sum() {
        let (mut renderer, voice_tx, _) = new_renderer(100, 1);
        let buffer = Arc::new(SampleBuffer::from_samples(vec![0.25; 10], 100));
        voice_tx
            .send(Voice::new(Arc::clone(&buffer), 0.0, 1.0, flat_envelope(1.0)))
            .unwrap();
        voice_tx
            .send(Voice::new(buffer, 0.0, 1.0, flat_envelope(1.0)))
            .unwrap();

        let mut output = vec![0.0f32; 10];
        renderer.process(&mut output);
        for (i, sample) in output.iter().enumerate() {
            assert_near(*sample, 0.5, &format!("frame {}", i));
        }
    }

    #[test]
    fn test_rate_two_plays_every_other_sample() {
        let (mut renderer, voice_tx, _) = new_renderer(100, 1);
        let buffer = Arc::new(SampleBuffer::from_samples(
            vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
            100,
        ));
        voice_tx
            .send(Voice::new(buffer, 0.0, 2.0, flat_envelope(1.0)))
            .unwrap();

        let mut output = vec![0.0f32; 8];
        renderer.process(&mut output);

        // Positions 0, 2, 4 then the end of the buffer.
        assert_near(output[0], 0.1, "frame 0");
        assert_near(output[1], 0.3, "frame 1");
        assert_near(output[2], 0.5, "frame 2");
        assert_eq!(output[3], 0.0);
        assert_eq!(renderer.active_voices(), 0);
    }

    #[test]
    fn test_fractional_rate_interpolates() {
        let (mut renderer, voice_tx, _) = new_renderer(100, 1);
        let buffer = Arc::new(SampleBuffer::from_samples(vec![0.0, 1.0, 0.0], 100));
        voice_tx
            .send(Voice::new(buffer, 0.0, 0.5, flat_envelope(1.0)))
            .unwrap();

        let mut output = vec![0.0f32; 6];
        renderer.process(&mut output);

        // Positions 0, 0.5, 1, 1.5, 2 across the triangle.
        assert_near(output[0], 0.0, "frame 0");
        assert_near(output[1], 0.5, "frame 1");
        assert_near(output[2], 1.0, "frame 2");
        assert_near(output[3], 0.5, "frame 3");
        assert_near(output[4], 0.0, "frame 4");
    }

    #[test]
    fn test_envelope_scales_output() {
        let (mut renderer, voice_tx, _) = new_renderer(100, 1);
        let buffer = Arc::new(SampleBuffer::from_samples(vec![1.0; 4], 100));
        voice_tx
            .send(Voice::new(buffer, 0.0, 1.0, flat_envelope(0.25)))
            .unwrap();

        let mut output = vec![0.0f32; 4];
        renderer.process(&mut output);
        for (i, sample) in output.iter().enumerate() {
            assert_near(*sample, 0.25, &format!("frame {}", i));
        }
    }

    #[test]
    fn test_halted_voice_renders_nothing() {
        let (mut renderer, voice_tx, _) = new_renderer(100, 1);
        let buffer = Arc::new(SampleBuffer::from_samples(vec![1.0; 100], 100));
        let voice = Voice::new(buffer, 0.0, 1.0, flat_envelope(1.0));
        let handle = voice.handle();
        voice_tx.send(voice).unwrap();

        let mut output = vec![0.0f32; 10];
        renderer.process(&mut output);
        assert_near(output[0], 1.0, "frame 0");

        handle.halt();
        renderer.process(&mut output);
        assert!(output.iter().all(|s| *s == 0.0));
        assert_eq!(renderer.active_voices(), 0);
    }

    #[test]
    fn test_mono_voice_feeds_all_channels() {
        let (mut renderer, voice_tx, _) = new_renderer(100, 2);
        let buffer = Arc::new(SampleBuffer::from_samples(vec![0.5, 0.25], 100));
        voice_tx
            .send(Voice::new(buffer, 0.0, 1.0, flat_envelope(1.0)))
            .unwrap();

        let mut output = vec![0.0f32; 6];
        renderer.process(&mut output);

        assert_near(output[0], 0.5, "frame 0 left");
        assert_near(output[1], 0.5, "frame 0 right");
        assert_near(output[2], 0.25, "frame 1 left");
        assert_near(output[3], 0.25, "frame 1 right");
        assert_eq!(output[4], 0.0);
        assert_eq!(output[5], 0.0);
    }

    #[test]
    fn test_output_is_cleared_between_passes() {
        let (mut renderer, _voice_tx, _) = new_renderer(100, 1);
        let mut output = vec![0.7f32; 16];
        renderer.process(&mut output);
        assert!(output.iter().all(|s| *s == 0.0));
    }
}
