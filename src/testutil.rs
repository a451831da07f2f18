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

#[cfg(test)]
use std::{
    thread,
    time::{Duration, SystemTime},
};


/// Wait for the given predicate to return true or fail.
#[inline]
#[cfg(test)]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed();
        if elapsed.is_err() {
            panic!("System time error");
        }
        let elapsed = elapsed.unwrap();

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}

#[cfg(test)]
mod tests {
    use super::audio_test_utils::{calculate_rms, find_onsets};

    #[test]
    fn test_calculate_rms() {
        assert_eq!(calculate_rms(&[]), 0.0);
        assert!((calculate_rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_find_onsets_splits_on_silence() {
        // Two stereo bursts with 30 quiet frames between them, against a
        // 10 frame gap at this sample rate.
        let mut samples = vec![0.0f32; 2 * 100];
        for frame in 20..25 {
            samples[2 * frame] = 0.5;
        }
        for frame in 55..60 {
            samples[2 * frame] = 0.5;
        }

        let onsets = find_onsets(&samples, 2, 1000);
        assert_eq!(onsets, vec![0.02, 0.055]);
    }

    #[test]
    fn test_find_onsets_ignores_short_gaps() {
        // A 5 frame dip inside a burst does not split it in two.
        let mut samples = vec![0.0f32; 100];
        for frame in 10..20 {
            samples[frame] = 0.5;
        }
        for frame in 25..35 {
            samples[frame] = 0.5;
        }

        let onsets = find_onsets(&samples, 1, 1000);
        assert_eq!(onsets, vec![0.01]);
    }
}
