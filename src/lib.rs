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

//! A metronome engine for live practice and performance.
//!
//! The engine schedules clicks against the audio device clock rather than
//! wall-clock timers, so beats stay sample-accurate no matter how coarsely
//! the scheduling threads are woken. Tempo, subdivision, sound, volume, and
//! accent are all adjustable while running.

pub mod audio;
pub mod config;
pub mod metronome;
pub mod playsync;
pub mod sched;
pub mod synth;
mod testutil;
