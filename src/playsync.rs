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
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Represents the current cancel state.
#[derive(PartialEq)]
enum CancelState {
    Untouched,
    Cancelled,
}

/// A cancel handle is shared with the periodic engine loops and with every in-flight
/// voice. It's the holder's responsibility to respect a cancel request.
#[derive(Clone)]
pub struct CancelHandle {
    /// Set to cancelled when the underlying operation should stop.
    cancelled: Arc<Mutex<CancelState>>,
    /// The condvar will handle notification of cancelling.
    condvar: Arc<Condvar>,
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle {
            cancelled: Arc::new(Mutex::new(CancelState::Untouched)),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Returns true if the holder has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().expect("Error getting lock") == CancelState::Cancelled
    }

    /// Waits for up to the given duration, returning early if cancelled.
    /// Returns true if the handle was cancelled. Periodic loops use this as
    /// their cadence so that cancellation wakes them immediately.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.cancelled.lock().expect("Error getting lock");
        let (guard, _) = self
            .condvar
            .wait_timeout_while(guard, timeout, |cancelled| {
                *cancelled == CancelState::Untouched
            })
            .expect("Error getting lock");
        *guard == CancelState::Cancelled
    }

    /// Cancel the underlying operation.
    pub fn cancel(&self) {
        let mut cancel_state = self.cancelled.lock().expect("Error getting lock");
        if *cancel_state == CancelState::Untouched {
            *cancel_state = CancelState::Cancelled;
            self.condvar.notify_all();
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        CancelHandle::new()
    }
}
