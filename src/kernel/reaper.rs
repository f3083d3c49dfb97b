//! Zombie reaper for the PID-1 role.
//!
//! Every SIGCHLD drains `waitpid(-1, WNOHANG)`; reaped statuses are published
//! on a small bounded channel so the init loop can recover the exit status
//! of a tracked child whose direct wait lost the race.

use crate::config::types::{ExitKind, Result, SupervisorError};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use signal_hook::consts::SIGCHLD;
use signal_hook::iterator::{Handle, Signals};

/// Capacity of the status channel. Statuses beyond it are dropped rather
/// than blocking the reaper.
pub const REAPED_CHANNEL_CAPACITY: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReapedChild {
    pub pid: i32,
    pub exit: ExitKind,
}

pub struct Reaper {
    rx: Receiver<ReapedChild>,
    handle: Handle,
}

impl Reaper {
    /// Start reaping. Returns `None` when not running as PID 1 and the
    /// check is not disabled.
    pub fn start(disable_pid1_check: bool) -> Result<Option<Self>> {
        if !disable_pid1_check && std::process::id() != 1 {
            log::debug!("not running as pid 1, zombie reaper disabled");
            return Ok(None);
        }

        let mut signals = Signals::new([SIGCHLD]).map_err(|e| {
            SupervisorError::Process(format!("failed to install SIGCHLD handler: {}", e))
        })?;
        let handle = signals.handle();
        let (tx, rx) = crossbeam_channel::bounded(REAPED_CHANNEL_CAPACITY);

        std::thread::Builder::new()
            .name("reaper".into())
            .spawn(move || {
                reap_all(&tx);
                for _ in signals.forever() {
                    reap_all(&tx);
                }
            })?;

        log::info!("zombie reaper started");
        Ok(Some(Self { rx, handle }))
    }

    pub fn statuses(&self) -> &Receiver<ReapedChild> {
        &self.rx
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.handle.close();
    }
}

/// Reap every child that has already exited.
fn reap_all(tx: &Sender<ReapedChild>) {
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
            Ok(status) => {
                if let Some(reaped) = to_reaped(status) {
                    log::debug!("reaped process {} ({})", reaped.pid, reaped.exit);
                    publish(tx, reaped);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(e) => {
                log::warn!("waitpid failed while reaping: {}", e);
                break;
            }
        }
    }
}

fn to_reaped(status: WaitStatus) -> Option<ReapedChild> {
    match status {
        WaitStatus::Exited(pid, code) => Some(ReapedChild {
            pid: pid.as_raw(),
            exit: ExitKind::Code(code),
        }),
        WaitStatus::Signaled(pid, signal, _) => Some(ReapedChild {
            pid: pid.as_raw(),
            exit: ExitKind::Signaled(signal as i32),
        }),
        _ => None,
    }
}

fn publish(tx: &Sender<ReapedChild>, reaped: ReapedChild) {
    match tx.try_send(reaped) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(_)) => {
            log::debug!("reaper status channel full, dropping status of {}", reaped.pid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;

    #[test]
    fn converts_wait_statuses() {
        let pid = Pid::from_raw(42);
        assert_eq!(
            to_reaped(WaitStatus::Exited(pid, 3)),
            Some(ReapedChild { pid: 42, exit: ExitKind::Code(3) })
        );
        assert_eq!(
            to_reaped(WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            Some(ReapedChild { pid: 42, exit: ExitKind::Signaled(9) })
        );
        assert_eq!(to_reaped(WaitStatus::StillAlive), None);
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (tx, rx) = crossbeam_channel::bounded(REAPED_CHANNEL_CAPACITY);
        for pid in 0..(REAPED_CHANNEL_CAPACITY as i32 + 5) {
            publish(&tx, ReapedChild { pid, exit: ExitKind::Code(0) });
        }
        assert_eq!(rx.len(), REAPED_CHANNEL_CAPACITY);
    }

    #[test]
    fn not_started_outside_pid1() {
        if std::process::id() != 1 {
            assert!(Reaper::start(false).unwrap().is_none());
        }
    }
}
