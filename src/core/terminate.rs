//! Termination coordinator
//!
//! SIGTERM, wait against a deadline, then SIGKILL. A forced kill is an
//! `Ok` outcome: the process is gone either way, callers only log it.
//! The shutdown sweep applies the coordinator to every process in the
//! container in parallel, all sharing one deadline.

use crate::config::types::Result;
use crate::core::shutdown_log::ShutdownLog;
use crate::kernel::procfs::{Delivery, ProcessTable};
use crossbeam_channel::{after, select, Receiver, TryRecvError};
use nix::sys::signal::Signal;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);
const KILL_CONFIRM_TIMEOUT: Duration = Duration::from_secs(1);
const SWEEP_ROUND_PAUSE: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// Gone before any signal was delivered.
    AlreadyGone,
    /// Already a zombie; nothing to deliver.
    Zombie,
    /// Exited after SIGTERM within the deadline.
    Terminated,
    /// Deadline expired and SIGKILL was sent.
    ForceKilled,
}

impl TerminateOutcome {
    pub fn was_forced(&self) -> bool {
        matches!(self, TerminateOutcome::ForceKilled)
    }
}

/// Terminate one process, escalating to SIGKILL at `deadline`.
pub fn terminate(
    table: &Arc<dyn ProcessTable>,
    pid: i32,
    deadline: Instant,
) -> Result<TerminateOutcome> {
    match table.inspect(pid)? {
        None => return Ok(TerminateOutcome::AlreadyGone),
        Some(info) if info.is_zombie() => return Ok(TerminateOutcome::Zombie),
        Some(_) => {}
    }

    if table.signal(pid, Signal::SIGTERM)? == Delivery::NoSuchProcess {
        return Ok(TerminateOutcome::AlreadyGone);
    }

    // Dropping `_stop` on return ends the watcher.
    let (_stop, stop_rx) = crossbeam_channel::bounded::<()>(0);
    let exited = watch_exit(Arc::clone(table), pid, stop_rx);
    let remaining = deadline.saturating_duration_since(Instant::now());

    select! {
        recv(exited) -> _ => Ok(TerminateOutcome::Terminated),
        recv(after(remaining)) -> _ => {
            if table.signal(pid, Signal::SIGKILL)? == Delivery::NoSuchProcess {
                return Ok(TerminateOutcome::Terminated);
            }
            let _ = exited.recv_timeout(KILL_CONFIRM_TIMEOUT);
            Ok(TerminateOutcome::ForceKilled)
        }
    }
}

/// Background exit watcher. Fires once the process is gone or a zombie.
/// Reaping is left to the process owner or the reaper. Failed inspections
/// keep the watcher polling; the deadline still bounds the wait.
fn watch_exit(table: Arc<dyn ProcessTable>, pid: i32, stop: Receiver<()>) -> Receiver<()> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut reported = false;
        loop {
            let exited = match table.inspect(pid) {
                Ok(Some(info)) => info.is_zombie(),
                Ok(None) => true,
                Err(e) => {
                    if !reported {
                        log::warn!("cannot inspect pid {} while waiting for exit: {}", pid, e);
                        reported = true;
                    }
                    false
                }
            };
            if exited {
                let _ = tx.send(());
                return;
            }
            if let Err(TryRecvError::Disconnected) = stop.try_recv() {
                return;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    });
    rx
}

/// Live, non-zombie pids other than `self_pid`.
fn remaining(table: &Arc<dyn ProcessTable>, self_pid: i32) -> Result<Vec<i32>> {
    let mut alive = Vec::new();
    for pid in table.pids()? {
        if pid == self_pid {
            continue;
        }
        if let Ok(Some(info)) = table.inspect(pid) {
            if !info.is_zombie() {
                alive.push(pid);
            }
        }
    }
    Ok(alive)
}

/// Terminate every process except `self_pid`, in parallel, repeating until
/// nothing else is left or `deadline` passes. Survivors past the deadline
/// get SIGKILL.
pub fn terminate_all(
    table: &Arc<dyn ProcessTable>,
    self_pid: i32,
    deadline: Instant,
    slog: &Arc<ShutdownLog>,
) -> Result<()> {
    loop {
        let pids = remaining(table, self_pid)?;
        if pids.is_empty() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            break;
        }

        let workers: Vec<_> = pids
            .into_iter()
            .map(|pid| {
                let table = Arc::clone(table);
                let slog = Arc::clone(slog);
                thread::spawn(move || terminate_logged(&table, pid, deadline, &slog))
            })
            .collect();
        for worker in workers {
            let _ = worker.join();
        }

        thread::sleep(SWEEP_ROUND_PAUSE);
    }

    kill_remaining(table, self_pid, slog)
}

/// Terminate one process and record what happened.
pub fn terminate_logged(
    table: &Arc<dyn ProcessTable>,
    pid: i32,
    deadline: Instant,
    slog: &ShutdownLog,
) -> Option<TerminateOutcome> {
    let description = match table.inspect(pid) {
        Ok(Some(info)) => info.describe(),
        _ => format!("pid={}", pid),
    };
    slog.log(format!("terminating process {}", description));

    match terminate(table, pid, deadline) {
        Ok(TerminateOutcome::ForceKilled) => {
            slog.log(format!(
                "process {} didn't finish before the deadline, sent SIGKILL",
                description
            ));
            Some(TerminateOutcome::ForceKilled)
        }
        Ok(outcome) => {
            slog.log(format!("process {} finished: {:?}", description, outcome));
            Some(outcome)
        }
        Err(e) => {
            slog.log(format!("failed to terminate process {}: {}", description, e));
            None
        }
    }
}

/// SIGKILL everything still alive besides `self_pid`.
pub fn kill_remaining(
    table: &Arc<dyn ProcessTable>,
    self_pid: i32,
    slog: &ShutdownLog,
) -> Result<()> {
    for pid in remaining(table, self_pid)? {
        let description = match table.inspect(pid) {
            Ok(Some(info)) => info.describe(),
            _ => format!("pid={}", pid),
        };
        match table.signal(pid, Signal::SIGKILL) {
            Ok(Delivery::Sent) => {
                slog.log(format!("grace period expired, sent SIGKILL to {}", description))
            }
            Ok(Delivery::NoSuchProcess) => {}
            Err(e) => slog.log(format!("failed to SIGKILL {}: {}", description, e)),
        }
    }
    Ok(())
}
