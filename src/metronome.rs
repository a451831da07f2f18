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

//! The metronome engine.
//!
//! One engine object owns the shared configuration, the playback state, and
//! the device handle. While running it drives two periodic loops: a scheduler
//! that queues beats against the device clock on a coarse cadence, and a
//! poller that recomputes the displayed beat from the same clock. Neither
//! loop ever blocks on the other.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{debug, error, info, span, warn, Level, Span};

use crate::audio::voice::{Envelope, Voice, VoiceHandle};
use crate::audio::{Device, DeviceError};
use crate::config::{Subdivision, TempoConfig};
use crate::playsync::CancelHandle;
use crate::sched::{self, Scheduler};
use crate::synth::{SampleBank, SoundKind};

/// How often the scheduler wakes to queue beats. Must stay well below the
/// lookahead window so a late wakeup cannot miss a beat.
const SCHEDULER_CADENCE: Duration = Duration::from_millis(10);
/// How often the displayed beat is recomputed, roughly one display frame.
const POLLER_CADENCE: Duration = Duration::from_millis(16);
/// Margin between transport start and beat 0, in seconds, so the first beat
/// is never scheduled in the past.
const START_DELAY: f64 = 0.06;
/// Voice bookkeeping older than this many seconds is pruned.
const PRUNE_AGE: f64 = 1.0;
/// The gain ramp starts this many seconds before the beat.
const RAMP_LEAD: f64 = 0.01;
/// The gain reaches its target this many seconds after the beat.
const RAMP_ATTACK: f64 = 0.001;
/// The gain is back at the floor this many seconds after the beat.
const RAMP_RELEASE: f64 = 0.12;
/// Priority for the scheduler thread.
const SCHEDULER_THREAD_PRIORITY: u8 = 70;

struct RunHandles {
    cancel: CancelHandle,
    scheduler: thread::JoinHandle<()>,
    poller: thread::JoinHandle<()>,
}

/// Drives timed click playback against an audio device.
pub struct Metronome {
    /// The device to play clicks through.
    device: Arc<dyn Device>,
    /// The live configuration, shared with the presentation layer.
    config: Arc<TempoConfig>,
    /// Sample buffers, rendered once for the device sample rate.
    samples: OnceLock<Arc<SampleBank>>,
    /// Handles for voices that may still need cancellation.
    active: Arc<Mutex<Vec<VoiceHandle>>>,
    /// The beat index published for display.
    beat_display: Arc<AtomicU32>,
    /// Whether the transport is running.
    running: Arc<AtomicBool>,
    /// Keeps track of the scheduler and poller joins while running.
    run: Mutex<Option<RunHandles>>,
    /// The logging span.
    span: Span,
}

impl Metronome {
    /// Creates a new metronome. The device clock is not started until the
    /// transport starts.
    pub fn new(device: Arc<dyn Device>, config: Arc<TempoConfig>) -> Metronome {
        Metronome {
            device,
            config,
            samples: OnceLock::new(),
            active: Arc::new(Mutex::new(Vec::new())),
            beat_display: Arc::new(AtomicU32::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            run: Mutex::new(None),
            span: span!(Level::INFO, "metronome"),
        }
    }

    /// Starts the transport: resumes the device, arms the scheduler and the
    /// display poller. Starting a running metronome is a no-op.
    pub fn start(&self) -> Result<(), DeviceError> {
        let _enter = self.span.enter();

        let mut run = self.run.lock().expect("Error getting lock");
        if run.is_some() {
            info!("Metronome is already running.");
            return Ok(());
        }

        // Resume before any state changes so a failure leaves the
        // transport stopped.
        self.device.resume()?;

        let samples = self
            .samples
            .get_or_init(|| Arc::new(SampleBank::generate(self.device.sample_rate())));

        let start_time = self.device.now() + START_DELAY;
        info!(
            device = %self.device,
            bpm = self.config.bpm(),
            subdivision = %self.config.subdivision(),
            sound = %self.config.sound(),
            start_time,
            "Starting metronome."
        );

        let cancel = CancelHandle::new();

        let scheduler = {
            let device = Arc::clone(&self.device);
            let config = Arc::clone(&self.config);
            let cancel = cancel.clone();
            let dispatcher = ClickDispatcher {
                device: Arc::clone(&self.device),
                config: Arc::clone(&self.config),
                samples: Arc::clone(samples),
                active: Arc::clone(&self.active),
            };
            thread::spawn(move || {
                raise_scheduler_priority();
                let mut scheduler = Scheduler::new(start_time);
                let mut last_now = device.now();
                loop {
                    let now = device.now();
                    if now - last_now > sched::LOOKAHEAD_SECS {
                        warn!(
                            gap = now - last_now,
                            "Scheduler wakeup lagged behind the lookahead window."
                        );
                    }
                    last_now = now;
                    scheduler.tick(now, &config, |time, accent| {
                        dispatcher.dispatch(time, accent)
                    });
                    if cancel.wait_timeout(SCHEDULER_CADENCE) {
                        break;
                    }
                }
            })
        };

        let poller = {
            let device = Arc::clone(&self.device);
            let config = Arc::clone(&self.config);
            let beat_display = Arc::clone(&self.beat_display);
            let cancel = cancel.clone();
            thread::spawn(move || loop {
                let elapsed = device.now() - start_time;
                if let Some(index) = sched::beat_index(elapsed, config.bpm(), config.subdivision())
                {
                    beat_display.store(index, Ordering::Relaxed);
                }
                if cancel.wait_timeout(POLLER_CADENCE) {
                    break;
                }
            })
        };

        *run = Some(RunHandles {
            cancel,
            scheduler,
            poller,
        });
        self.running.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Stops the transport. Beats that have not sounded yet are silenced;
    /// beats already past their start time play out. Stopping a stopped
    /// metronome is a no-op.
    pub fn stop(&self) {
        let _enter = self.span.enter();

        let handles = match self.run.lock().expect("Error getting lock").take() {
            Some(handles) => handles,
            None => {
                info!("Metronome is not running, nothing to stop.");
                return;
            }
        };

        info!("Stopping metronome.");
        handles.cancel.cancel();

        // Join the scheduler first: after this no new voice can be created.
        if handles.scheduler.join().is_err() {
            error!("Error while joining scheduler thread!");
        }

        let now = self.device.now();
        {
            let mut active = self.active.lock().expect("Error getting lock");
            for handle in active.iter() {
                if handle.start_time() > now {
                    handle.halt();
                }
            }
            active.clear();
        }

        if handles.poller.join().is_err() {
            error!("Error while joining poller thread!");
        }
        self.beat_display.store(0, Ordering::Relaxed);
        self.running.store(false, Ordering::Relaxed);
    }

    /// Stops the metronome if it is running, starts it otherwise.
    pub fn toggle(&self) -> Result<(), DeviceError> {
        if self.is_running() {
            self.stop();
            Ok(())
        } else {
            self.start()
        }
    }

    /// Returns true while the transport is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Returns the beat index currently shown, in `[0, subdivision)`.
    pub fn beat_index(&self) -> u32 {
        self.beat_display.load(Ordering::Relaxed)
    }

    /// Returns the shared configuration.
    pub fn config(&self) -> Arc<TempoConfig> {
        Arc::clone(&self.config)
    }

    /// Sets the tempo. Takes effect for beats not yet scheduled.
    pub fn set_bpm(&self, bpm: u32) {
        self.config.set_bpm(bpm);
    }

    /// Sets the subdivision. Takes effect for beats not yet scheduled.
    pub fn set_subdivision(&self, subdivision: Subdivision) {
        self.config.set_subdivision(subdivision);
    }

    /// Sets the click timbre. Takes effect for beats not yet scheduled.
    pub fn set_sound(&self, sound: SoundKind) {
        self.config.set_sound(sound);
    }

    /// Sets the volume. Takes effect for beats not yet scheduled.
    pub fn set_volume(&self, volume: f32) {
        self.config.set_volume(volume);
    }

    /// Sets whether downbeats are accented. Takes effect for beats not yet
    /// scheduled.
    pub fn set_accent(&self, accent: bool) {
        self.config.set_accent(accent);
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Submits individual beats to the device. Owned by the scheduler thread.
struct ClickDispatcher {
    device: Arc<dyn Device>,
    config: Arc<TempoConfig>,
    samples: Arc<SampleBank>,
    active: Arc<Mutex<Vec<VoiceHandle>>>,
}

impl ClickDispatcher {
    /// Schedules one beat for playback at the given device-clock time. The
    /// voice sounds at that time no matter how late this call runs.
    fn dispatch(&self, time: f64, accent: bool) {
        let accented = accent && self.config.accent();
        // Accents are shifted up four semitones and played louder.
        let rate = if accented {
            2f64.powf(4.0 / 12.0)
        } else {
            1.0
        };
        let peak = self.config.volume() * if accented { 1.4 } else { 0.6 };
        let envelope = Envelope::new(
            time - RAMP_LEAD,
            time + RAMP_ATTACK,
            time + RAMP_RELEASE,
            peak,
        );

        let buffer = self.samples.buffer(self.config.sound());
        let voice = Voice::new(buffer, time, rate, envelope);

        debug!(time, accent, rate, peak, "Dispatching beat.");
        match self.device.submit(voice) {
            Ok(handle) => {
                let mut active = self.active.lock().expect("Error getting lock");
                active.push(handle);
                let cutoff = self.device.now() - PRUNE_AGE;
                active.retain(|handle| handle.start_time() >= cutoff);
            }
            Err(e) => {
                error!(err = e.to_string(), time, accent, "Error submitting beat.");
            }
        }
    }
}

fn raise_scheduler_priority() {
    if let Ok(priority) = ThreadPriorityValue::try_from(SCHEDULER_THREAD_PRIORITY) {
        if set_current_thread_priority(ThreadPriority::Crossplatform(priority)).is_err() {
            warn!("Unable to raise scheduler thread priority.");
        }
    }
}
