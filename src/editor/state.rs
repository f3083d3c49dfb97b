//! Editor lifecycle state and the readiness flag.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Lifecycle of the supervised editor process. Readiness is tracked
/// separately in [`ReadyState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditorProcessState {
    NotStarted,
    /// First launch, readiness not reached yet.
    Starting,
    Ready,
    /// Relaunched after a crash, readiness not reached yet.
    RunningNotReady,
    Stopped,
}

/// Readiness flag with broadcast on change. Any number of threads can wait
/// on it without spawning helpers.
#[derive(Debug, Default)]
pub struct ReadyState {
    ready: Mutex<bool>,
    changed: Condvar,
}

impl ReadyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> bool {
        match self.ready.lock() {
            Ok(ready) => *ready,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Wakes every waiter when the value changes.
    pub fn set(&self, value: bool) {
        let mut ready = match self.ready.lock() {
            Ok(ready) => ready,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *ready != value {
            *ready = value;
            self.changed.notify_all();
        }
    }

    /// Block until ready or `timeout` elapses. Returns the final value.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut ready = match self.ready.lock() {
            Ok(ready) => ready,
            Err(poisoned) => poisoned.into_inner(),
        };
        while !*ready {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            ready = match self.changed.wait_timeout(ready, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *ready
    }
}
