//! Shutdown signal listener
//!
//! SIGINT/SIGTERM are consumed by a `signal_hook` iterator on a dedicated
//! thread and forwarded over a channel, so the main loops can `select!` on
//! them next to their other completion signals. No state is kept in
//! process-wide statics.

use crate::config::types::{Result, SupervisorError};
use crossbeam_channel::{Receiver, Sender};
use log::info;
use nix::sys::signal::Signal;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Installed SIGINT/SIGTERM listener.
pub struct ShutdownSignals {
    rx: Receiver<i32>,
    handle: Handle,
    last: Arc<AtomicI32>,
}

impl ShutdownSignals {
    /// Register the handlers and start the forwarding thread.
    pub fn install() -> Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
            SupervisorError::Process(format!("failed to install signal handlers: {}", e))
        })?;
        let handle = signals.handle();
        let (tx, rx) = crossbeam_channel::unbounded();
        let last = Arc::new(AtomicI32::new(0));

        let last_seen = Arc::clone(&last);
        std::thread::Builder::new()
            .name("signals".into())
            .spawn(move || forward(signals.forever(), &tx, &last_seen))?;

        info!("signal handlers installed (SIGINT, SIGTERM)");
        Ok(Self { rx, handle, last })
    }

    /// Channel yielding every received signal number.
    pub fn receiver(&self) -> &Receiver<i32> {
        &self.rx
    }

    /// Last signal received, if any.
    pub fn last_signal(&self) -> Option<i32> {
        match self.last.load(Ordering::SeqCst) {
            0 => None,
            sig => Some(sig),
        }
    }
}

impl Drop for ShutdownSignals {
    fn drop(&mut self) {
        self.handle.close();
    }
}

fn forward(signals: impl Iterator<Item = i32>, tx: &Sender<i32>, last: &AtomicI32) {
    for sig in signals {
        last.store(sig, Ordering::SeqCst);
        if tx.send(sig).is_err() {
            break;
        }
    }
}

/// Human readable name of a signal number.
pub fn signal_name(sig: i32) -> String {
    Signal::try_from(sig)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {}", sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_records_last_signal() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let last = AtomicI32::new(0);
        forward(vec![SIGINT, SIGTERM].into_iter(), &tx, &last);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![SIGINT, SIGTERM]);
        assert_eq!(last.load(Ordering::SeqCst), SIGTERM);
    }

    #[test]
    fn forward_stops_when_receiver_is_gone() {
        let (tx, rx) = crossbeam_channel::unbounded::<i32>();
        drop(rx);
        let last = AtomicI32::new(0);
        forward(vec![SIGINT, SIGTERM].into_iter(), &tx, &last);
        assert_eq!(last.load(Ordering::SeqCst), SIGINT);
    }

    #[test]
    fn names_known_signals() {
        assert_eq!(signal_name(SIGTERM), "SIGTERM");
        assert_eq!(signal_name(4242), "signal 4242");
    }
}
