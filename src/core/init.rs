//! Init supervisor (PID-1 role)
//!
//! Starts `supervisor run` as its only direct child, reaps orphans, and on
//! SIGINT/SIGTERM drives a time-bounded shutdown of every process in the
//! container.

use crate::config::types::{ExitKind, Result, SupervisorError, SupervisorTunables, EXIT_CODE_CONFIG};
use crate::config::WorkspaceConfig;
use crate::core::diagnostics::extract_failure;
use crate::core::shutdown_log::{ShutdownLog, DEFAULT_SHUTDOWN_LOG_PATH};
use crate::core::terminate::{kill_remaining, terminate_all, terminate_logged};
use crate::kernel::procfs::{ProcFs, ProcessTable};
use crate::kernel::reaper::Reaper;
use crate::kernel::signal::signal_name;
use crate::observability::fatal::DEFAULT_TERMINATION_PATH;
use crossbeam_channel::{after, select, Receiver};
use log::{info, warn};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct InitOptions {
    /// Executable started as the run child.
    pub program: PathBuf,
    pub args: Vec<String>,
    /// argv[0] of the run child.
    pub arg0: String,
    /// Fatal-termination record written by the run child.
    pub termination_path: PathBuf,
    pub shutdown_log_path: PathBuf,
    /// Bound on the whole shutdown sweep.
    pub grace_period: Duration,
    pub tunables: SupervisorTunables,
    /// Reap orphans even when not PID 1.
    pub disable_pid1_check: bool,
    /// Fail fast when `git` is not on PATH.
    pub require_git: bool,
}

impl InitOptions {
    /// Options for the real container entrypoint. Configuration problems are
    /// logged and replaced by defaults; the run child reports them properly.
    pub fn for_entrypoint() -> Self {
        let workspace = match WorkspaceConfig::from_env() {
            Ok(workspace) => workspace,
            Err(e) => {
                info!("cannot load config: {}", e);
                WorkspaceConfig::default()
            }
        };
        let program = std::env::current_exe().unwrap_or_else(|e| {
            warn!("unable to find supervisor executable: {}", e);
            PathBuf::from("/usr/bin/supervisor")
        });

        Self {
            program,
            args: vec!["run".to_string()],
            arg0: "supervisor".to_string(),
            termination_path: PathBuf::from(DEFAULT_TERMINATION_PATH),
            shutdown_log_path: PathBuf::from(DEFAULT_SHUTDOWN_LOG_PATH),
            grace_period: workspace.termination_grace_period(),
            tunables: SupervisorTunables::from_env(),
            disable_pid1_check: false,
            require_git: true,
        }
    }
}

pub struct InitSupervisor {
    options: InitOptions,
    table: Arc<dyn ProcessTable>,
}

impl InitSupervisor {
    pub fn new(options: InitOptions) -> Self {
        Self::with_table(options, Arc::new(ProcFs::default()))
    }

    pub fn with_table(options: InitOptions, table: Arc<dyn ProcessTable>) -> Self {
        Self { options, table }
    }

    /// Run until the child exits or a shutdown signal has been handled.
    pub fn run(&self, signals: &Receiver<i32>) -> Result<()> {
        if self.options.require_git {
            which::which("git").map_err(|e| {
                SupervisorError::Config(format!(
                    "cannot find git executable, make sure it is installed in the workspace image: {}",
                    e
                ))
            })?;
        }

        let reaper = Reaper::start(self.options.disable_pid1_check)?;

        let child = Command::new(&self.options.program)
            .arg0(&self.options.arg0)
            .args(&self.options.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| SupervisorError::Process(format!("unable to start supervisor: {}", e)))?;
        let child_pid = child.id() as i32;
        info!("started supervisor run (pid {})", child_pid);

        let reaped = reaper.as_ref().map(|r| forward_reaped(r.statuses().clone(), child_pid));
        let done = spawn_waiter(child, reaped, self.options.tunables.reaper_wait_timeout);

        select! {
            recv(done) -> exit => {
                let result = self.handle_run_exit(exit.ok().flatten(), false);
                info!("supervisor has ended (run process exited)");
                result
            }
            recv(signals) -> sig => {
                let sig = sig.unwrap_or(libc::SIGTERM);
                self.shutdown(sig, child_pid);
                let exit = done.recv_timeout(self.options.tunables.shutdown_settle).ok().flatten();
                self.handle_run_exit(exit, true)
            }
        }
    }

    /// Apply the exit code policy to the run child's exit.
    fn handle_run_exit(&self, exit: Option<ExitKind>, ignore_unexpected: bool) -> Result<()> {
        let Some(exit) = exit else {
            return Ok(());
        };
        match exit {
            ExitKind::Code(0) => Ok(()),
            ExitKind::Code(EXIT_CODE_CONFIG) => Err(SupervisorError::Config(
                self.failure_summary(exit),
            )),
            ExitKind::Code(code) if ignore_unexpected => {
                info!("ignoring exit code {} of supervisor run during shutdown", code);
                Ok(())
            }
            ExitKind::Code(_) => Err(SupervisorError::Fatal(format!(
                "supervisor run error with unexpected exit code: {}",
                self.failure_summary(exit)
            ))),
            ExitKind::Signaled(sig) => {
                warn!("supervisor run was terminated by {}", signal_name(sig));
                Ok(())
            }
        }
    }

    fn failure_summary(&self, exit: ExitKind) -> String {
        extract_failure(&self.options.termination_path)
            .unwrap_or_else(|| format!("supervisor run failed with {}", exit))
    }

    fn shutdown(&self, sig: i32, child_pid: i32) {
        let slog = Arc::new(ShutdownLog::create(&self.options.shutdown_log_path));
        slog.log(format!("received {}, initiating shutdown...", signal_name(sig)));

        shutdown_all(
            &self.table,
            std::process::id() as i32,
            Some(child_pid),
            self.options.grace_period,
            self.options.tunables.shutdown_settle,
            &slog,
        );

        slog.log("all processes have been shut down");
    }
}

/// Terminate `primary` first, then sweep every other process except
/// `self_pid`, all within one `grace` window. Returns false when the grace
/// period ran out and survivors had to be SIGKILLed.
pub fn shutdown_all(
    table: &Arc<dyn ProcessTable>,
    self_pid: i32,
    primary: Option<i32>,
    grace: Duration,
    settle: Duration,
    slog: &Arc<ShutdownLog>,
) -> bool {
    let deadline = Instant::now() + grace;
    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);

    let sweep_table = Arc::clone(table);
    let sweep_log = Arc::clone(slog);
    thread::spawn(move || {
        if let Some(pid) = primary {
            terminate_logged(&sweep_table, pid, deadline, &sweep_log);
        }
        if let Err(e) = terminate_all(&sweep_table, self_pid, deadline, &sweep_log) {
            sweep_log.log(format!("cannot list processes: {}", e));
        }
        let _ = done_tx.send(());
    });

    select! {
        recv(done_rx) -> _ => true,
        recv(after(grace)) -> _ => {
            slog.log("grace period expired");
            if let Err(e) = kill_remaining(table, self_pid, slog) {
                slog.log(format!("cannot list processes: {}", e));
            }
            thread::sleep(settle);
            false
        }
    }
}

/// Deliver the reaper-observed exit of `pid`, if the reaper claims it.
fn forward_reaped(
    statuses: Receiver<crate::kernel::reaper::ReapedChild>,
    pid: i32,
) -> Receiver<ExitKind> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        for status in statuses.iter() {
            if status.pid != pid {
                continue;
            }
            let _ = tx.send(status.exit);
            return;
        }
    });
    rx
}

/// Wait for the run child. A direct wait can lose the race against the
/// reaper (ECHILD); the reaper-delivered status is then awaited for a
/// bounded time.
fn spawn_waiter(
    mut child: Child,
    reaped: Option<Receiver<ExitKind>>,
    reaper_timeout: Duration,
) -> Receiver<Option<ExitKind>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let exit = match child.wait() {
            Ok(status) => Some(ExitKind::from_std(status)),
            Err(e) if e.raw_os_error() == Some(libc::ECHILD) => match &reaped {
                Some(reaped) => match reaped.recv_timeout(reaper_timeout) {
                    Ok(exit) => Some(exit),
                    Err(_) => {
                        warn!("timed out waiting for reaper to clean up the process");
                        None
                    }
                },
                None => None,
            },
            Err(e) => {
                log::error!("supervisor run error: {}", e);
                None
            }
        };
        let _ = tx.send(exit);
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(dir: &tempfile::TempDir, script: &str) -> InitOptions {
        InitOptions {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            arg0: "supervisor".to_string(),
            termination_path: dir.path().join("termination"),
            shutdown_log_path: dir.path().join("supervisor-termination"),
            grace_period: Duration::from_secs(5),
            tunables: SupervisorTunables::default(),
            disable_pid1_check: false,
            require_git: false,
        }
    }

    #[test]
    fn clean_exit_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = crossbeam_channel::unbounded();
        assert!(InitSupervisor::new(options(&dir, "exit 0")).run(&rx).is_ok());
    }

    #[test]
    fn config_exit_carries_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("termination"),
            "{\"message\":\"cannot load editor config\",\"error\":\"no such file\"}\n",
        )
        .unwrap();
        let (_tx, rx) = crossbeam_channel::unbounded();
        let err = InitSupervisor::new(options(&dir, "exit 2")).run(&rx).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("cannot load editor config: no such file"));
    }

    #[test]
    fn unexpected_exit_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = crossbeam_channel::unbounded();
        let err = InitSupervisor::new(options(&dir, "exit 3")).run(&rx).unwrap_err();
        assert!(matches!(err, SupervisorError::Fatal(_)));
        assert!(err.to_string().contains("unexpected exit code"));
    }

    #[test]
    fn exit_codes_during_shutdown_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let sup = InitSupervisor::new(options(&dir, "exit 0"));
        assert!(sup.handle_run_exit(Some(ExitKind::Code(137)), true).is_ok());
        assert!(sup.handle_run_exit(Some(ExitKind::Code(2)), true).is_err());
        assert!(sup.handle_run_exit(Some(ExitKind::Signaled(15)), false).is_ok());
        assert!(sup.handle_run_exit(None, false).is_ok());
    }
}
