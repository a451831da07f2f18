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

//! Lookahead beat scheduling.
//!
//! The scheduler is ticked on a coarse wall-clock cadence and queues every
//! beat that falls inside a lookahead window of the device clock. Each beat is
//! handed off with an exact device-clock timestamp, so audible timing depends
//! only on the device honoring that timestamp and not on when the tick ran.
//! The cadence must stay well below the window for late ticks to be harmless.

use crate::config::{Subdivision, TempoConfig};

/// How far ahead of the device clock beats are queued, in seconds.
pub const LOOKAHEAD_SECS: f64 = 0.2;

/// Tracks which beats have been handed off to the dispatcher. Owned by a
/// single scheduling loop; a fresh instance is created per transport start.
pub struct Scheduler {
    start_time: f64,
    next_event_time: f64,
    beat_counter: u64,
}

impl Scheduler {
    /// Creates a scheduler whose beat 0 lands at the given device-clock time.
    pub fn new(start_time: f64) -> Scheduler {
        Scheduler {
            start_time,
            next_event_time: start_time,
            beat_counter: 0,
        }
    }

    /// Returns the device-clock time of beat 0.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Returns the device-clock time of the next beat not yet handed off.
    /// Monotonically non-decreasing across ticks.
    pub fn next_event_time(&self) -> f64 {
        self.next_event_time
    }

    /// Returns the number of beats handed off so far.
    pub fn beat_counter(&self) -> u64 {
        self.beat_counter
    }

    /// Queues every beat that falls before `now` plus the lookahead window,
    /// calling `dispatch` with the beat's device-clock time and whether it is
    /// an accent. The tempo is re-read per beat, so a live bpm edit moves
    /// only beats that have not been handed off yet. Returns the number of
    /// beats dispatched; ticking again with the same `now` dispatches none.
    pub fn tick<F>(&mut self, now: f64, config: &TempoConfig, mut dispatch: F) -> usize
    where
        F: FnMut(f64, bool),
    {
        let window_end = now + LOOKAHEAD_SECS;
        let mut dispatched = 0;

        while self.next_event_time < window_end {
            let accent = self.beat_counter % u64::from(config.subdivision().beats()) == 0;
            dispatch(self.next_event_time, accent);

            self.beat_counter += 1;
            self.next_event_time += 60.0 / f64::from(config.bpm());
            dispatched += 1;
        }

        dispatched
    }
}

/// Derives the currently sounding beat index purely from elapsed device-clock
/// time. Returns None before beat 0 sounds. The poller and the scheduler both
/// compute beats from the same clock and formula, so the display can never
/// drift from the audio.
pub fn beat_index(elapsed: f64, bpm: u32, subdivision: Subdivision) -> Option<u32> {
    if elapsed < 0.0 {
        return None;
    }
    let beat_duration = 60.0 / f64::from(bpm);
    let beat = (elapsed / beat_duration).floor() as u64;
    Some((beat % u64::from(subdivision.beats())) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TempoConfig;

    fn collect(scheduler: &mut Scheduler, now: f64, config: &TempoConfig) -> Vec<(f64, bool)> {
        let mut beats = Vec::new();
        scheduler.tick(now, config, |time, accent| beats.push((time, accent)));
        beats
    }

    #[test]
    fn test_intervals_match_bpm() {
        for bpm in crate::config::MIN_BPM..=crate::config::MAX_BPM {
            let config = TempoConfig::new();
            config.set_bpm(bpm);

            let mut scheduler = Scheduler::new(0.0);
            let beats = collect(&mut scheduler, 10.0, &config);
            assert!(beats.len() >= 2, "bpm {} produced too few beats", bpm);

            let expected = 60.0 / f64::from(bpm);
            for pair in beats.windows(2) {
                let delta = pair[1].0 - pair[0].0;
                assert!(
                    (delta - expected).abs() < 1e-6,
                    "bpm {}: delta {} != {}",
                    bpm,
                    delta,
                    expected
                );
            }
        }
    }

    #[test]
    fn test_accent_iff_counter_multiple_of_subdivision() {
        for subdivision in [
            Subdivision::Two,
            Subdivision::Three,
            Subdivision::Four,
            Subdivision::Six,
        ] {
            let config = TempoConfig::new();
            config.set_bpm(240);
            config.set_subdivision(subdivision);

            let mut scheduler = Scheduler::new(0.0);
            let beats = collect(&mut scheduler, 20.0, &config);
            assert!(beats.len() > 2 * subdivision.beats() as usize);

            for (i, (_, accent)) in beats.iter().enumerate() {
                assert_eq!(
                    *accent,
                    i as u32 % subdivision.beats() == 0,
                    "subdivision {}: beat {}",
                    subdivision,
                    i
                );
            }
        }
    }

    #[test]
    fn test_half_second_grid_at_120() {
        let config = TempoConfig::new();
        config.set_bpm(120);
        config.set_subdivision(Subdivision::Four);

        let t0 = 100.0;
        let mut scheduler = Scheduler::new(t0);
        let mut beats = Vec::new();
        let mut now = t0;
        while beats.len() < 9 {
            scheduler.tick(now, &config, |time, accent| beats.push((time, accent)));
            now += 0.01;
        }

        for (i, (time, accent)) in beats.iter().take(9).enumerate() {
            let expected = t0 + i as f64 * 0.5;
            assert!(
                (time - expected).abs() < 1e-6,
                "beat {} at {} expected {}",
                i,
                time,
                expected
            );
            assert_eq!(*accent, i % 4 == 0, "beat {}", i);
        }
    }

    #[test]
    fn test_bpm_change_moves_only_unscheduled_beats() {
        let config = TempoConfig::new();
        config.set_bpm(120);

        let mut scheduler = Scheduler::new(0.0);
        let mut beats = collect(&mut scheduler, 0.0, &config);
        // Beat 0 is handed off and the next is already fixed at 0.5.
        assert_eq!(beats.len(), 1);
        assert_eq!(scheduler.next_event_time(), 0.5);

        config.set_bpm(240);
        beats.extend(collect(&mut scheduler, 0.4, &config));
        beats.extend(collect(&mut scheduler, 0.85, &config));

        // The beat computed before the edit keeps its time; the interval
        // after it uses the new tempo.
        let times: Vec<f64> = beats.iter().map(|(time, _)| *time).collect();
        assert_eq!(times, vec![0.0, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_second_tick_at_same_now_is_empty() {
        let config = TempoConfig::new();
        let mut scheduler = Scheduler::new(0.0);

        let first = scheduler.tick(5.0, &config, |_, _| {});
        assert!(first > 0);

        let second = scheduler.tick(5.0, &config, |_, _| {});
        assert_eq!(second, 0);
    }

    #[test]
    fn test_delayed_tick_catches_up() {
        let config = TempoConfig::new();
        config.set_bpm(120);

        // A tick that arrives two seconds late still queues every pending
        // beat in one pass.
        let mut scheduler = Scheduler::new(0.0);
        let beats = collect(&mut scheduler, 2.0, &config);
        let times: Vec<f64> = beats.iter().map(|(time, _)| *time).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_next_event_time_is_monotonic() {
        let config = TempoConfig::new();
        let mut scheduler = Scheduler::new(0.0);

        let mut previous = scheduler.next_event_time();
        let mut now = 0.0;
        for i in 0..200u32 {
            if i % 25 == 0 {
                config.set_bpm(40 + (i * 7) % 200);
            }
            scheduler.tick(now, &config, |_, _| {});
            assert!(scheduler.next_event_time() >= previous);
            previous = scheduler.next_event_time();
            now += 0.01;
        }
    }

    #[test]
    fn test_beat_counter_advances_once_per_dispatch() {
        let config = TempoConfig::new();
        let mut scheduler = Scheduler::new(0.0);

        let mut total = 0;
        for i in 0..50 {
            total += scheduler.tick(i as f64 * 0.1, &config, |_, _| {});
        }
        assert_eq!(scheduler.beat_counter(), total as u64);
    }

    #[test]
    fn test_beat_index_wraps_at_subdivision() {
        // 120 bpm, four beats per measure.
        assert_eq!(beat_index(0.0, 120, Subdivision::Four), Some(0));
        assert_eq!(beat_index(0.49, 120, Subdivision::Four), Some(0));
        assert_eq!(beat_index(0.5, 120, Subdivision::Four), Some(1));
        assert_eq!(beat_index(1.99, 120, Subdivision::Four), Some(3));
        assert_eq!(beat_index(2.0, 120, Subdivision::Four), Some(0));

        // 60 bpm, two beats per measure.
        assert_eq!(beat_index(1.0, 60, Subdivision::Two), Some(1));
        assert_eq!(beat_index(2.0, 60, Subdivision::Two), Some(0));
    }

    #[test]
    fn test_beat_index_before_start() {
        assert_eq!(beat_index(-0.01, 120, Subdivision::Four), None);
        assert_eq!(beat_index(-5.0, 240, Subdivision::Six), None);
    }
}
