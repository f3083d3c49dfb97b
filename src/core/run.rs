//! Run host (`supervisor run`)
//!
//! Loads configuration, then hosts the editor watchdog and the local
//! endpoint until a shutdown signal arrives or the editor fails before
//! becoming ready. Failures are written to the fatal-termination record so
//! the init process can surface them.

use crate::config::types::{Result, SupervisorError};
use crate::config::Config;
use crate::editor::{watchdog_from_config, EditorWatchdog};
use crate::kernel::cgroup::DEFAULT_CGROUP_ROOT;
use crate::kernel::signal::signal_name;
use crate::observability::fatal::{FatalRecorder, DEFAULT_TERMINATION_PATH};
use crate::service::resource::default_monitor;
use crate::service::{standard_registry, Endpoint};
use crate::utils::cancel::CancelToken;
use crossbeam_channel::{select, Receiver};
use log::{error, info};
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub termination_path: PathBuf,
    pub cgroup_root: PathBuf,
    pub proc_root: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            termination_path: PathBuf::from(DEFAULT_TERMINATION_PATH),
            cgroup_root: PathBuf::from(DEFAULT_CGROUP_ROOT),
            proc_root: PathBuf::from("/proc"),
        }
    }
}

/// Load configuration. Every failure is reported as a configuration error
/// so the init process exits with the configuration exit code.
pub fn load_config(fatal: &FatalRecorder) -> Result<Config> {
    Config::load().map_err(|e| {
        fatal.record_best_effort("cannot load config", Some(&e.to_string()));
        match e {
            SupervisorError::Config(msg) => SupervisorError::Config(msg),
            other => SupervisorError::Config(other.to_string()),
        }
    })
}

pub struct RunHost {
    config: Config,
    options: RunOptions,
    fatal: FatalRecorder,
    cancel: CancelToken,
}

impl RunHost {
    pub fn new(config: Config, options: RunOptions) -> Self {
        let fatal = FatalRecorder::new(&options.termination_path);
        Self {
            config,
            options,
            fatal,
            cancel: CancelToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Host the editor and the endpoint until `signals` fires or the editor
    /// fails for good.
    pub fn run(&self, signals: &Receiver<i32>) -> Result<()> {
        let watchdog = match watchdog_from_config(&self.config) {
            Ok(watchdog) => Arc::new(watchdog),
            Err(e) => {
                self.fatal
                    .record_best_effort("cannot configure editor", Some(&e.to_string()));
                return Err(e);
            }
        };

        let monitor = default_monitor(
            &self.options.cgroup_root,
            &self.options.proc_root,
            self.config.tunables.cpu_sample_interval,
        );
        let registry = Arc::new(standard_registry(&self.config, monitor));
        let endpoint = match Endpoint::bind(self.config.static_config.api_endpoint_port, registry) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.fatal
                    .record_best_effort("cannot start endpoint", Some(&e.to_string()));
                return Err(e);
            }
        };

        let endpoint_cancel = self.cancel.clone();
        let endpoint_thread = thread::Builder::new()
            .name("endpoint".to_string())
            .spawn(move || endpoint.serve(&endpoint_cancel))?;

        let (editor_tx, editor_rx) = crossbeam_channel::bounded(1);
        let editor_cancel = self.cancel.clone();
        let editor = Arc::clone(&watchdog);
        let editor_thread = thread::Builder::new()
            .name("editor".to_string())
            .spawn(move || {
                let result = editor.run(&editor_cancel);
                let _ = editor_tx.send(result);
            })?;

        let editor_result = select! {
            recv(signals) -> sig => {
                if let Ok(sig) = sig {
                    info!("received {}, stopping editor {}", signal_name(sig), watchdog.name());
                }
                self.cancel.cancel();
                editor_rx.recv().ok()
            }
            recv(editor_rx) -> result => result.ok(),
        };
        self.cancel.cancel();

        if editor_thread.join().is_err() {
            return Err(self.fatal_error("editor watchdog panicked", None));
        }
        match endpoint_thread.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("endpoint failed: {}", e),
            Err(_) => error!("endpoint panicked"),
        }

        self.finish(&watchdog, editor_result)
    }

    fn finish(&self, watchdog: &EditorWatchdog, result: Option<Result<()>>) -> Result<()> {
        match result {
            Some(Ok(())) | None => {
                info!(
                    "editor {} stopped after {} restart(s)",
                    watchdog.name(),
                    watchdog.restarts()
                );
                Ok(())
            }
            Some(Err(e)) => {
                let message = match &e {
                    SupervisorError::EditorFailedBeforeReady(_) => "editor failed to start",
                    _ => "editor supervision failed",
                };
                self.fatal.record_best_effort(message, Some(&e.to_string()));
                Err(e)
            }
        }
    }

    fn fatal_error(&self, message: &str, err: Option<&str>) -> SupervisorError {
        self.fatal.record_best_effort(message, err);
        SupervisorError::Fatal(message.to_string())
    }
}

/// Run `f`, turning a panic into a fatal error. The panic message and a
/// backtrace are logged and written to the termination record.
pub fn guard_panics<F, T>(fatal: &FatalRecorder, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let recorder = fatal.clone();
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let backtrace = Backtrace::force_capture();
        let thread = thread::current();
        let name = thread.name().unwrap_or("<unnamed>");
        recorder.record_best_effort(
            &format!("panic in thread {}", name),
            Some(&format!("{}\n{}", info, backtrace)),
        );
    }));

    let result = panic::catch_unwind(AssertUnwindSafe(f));
    panic::set_hook(previous);

    match result {
        Ok(result) => result,
        Err(_) => Err(SupervisorError::Fatal("supervisor panicked".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::SupervisorTunables;
    use std::time::Duration;

    fn options(dir: &tempfile::TempDir) -> RunOptions {
        RunOptions {
            termination_path: dir.path().join("termination"),
            cgroup_root: dir.path().join("no-cgroup"),
            proc_root: dir.path().join("no-proc"),
        }
    }

    fn config(entrypoint: &str, args: &[&str]) -> Config {
        let mut config = Config::default();
        config.static_config.api_endpoint_port = 0;
        config.editor.name = "fake-ide".to_string();
        config.editor.entrypoint = entrypoint.to_string();
        config.editor.entrypoint_args = args.iter().map(|a| a.to_string()).collect();
        config.tunables = SupervisorTunables {
            editor_shutdown_budget: Duration::from_secs(2),
            output_retention_bytes: 0,
            ..SupervisorTunables::default()
        };
        config
    }

    #[test]
    fn editor_failing_before_ready_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config("/bin/sh", &["-c", "exit 4"]);
        // Never ready: nothing listens on this port.
        cfg.editor.readiness_probe.probe_type = crate::config::editor::ReadinessProbeType::Http;
        cfg.editor.readiness_probe.http.port = 1;
        let host = RunHost::new(cfg, options(&dir));
        let (_tx, rx) = crossbeam_channel::unbounded();

        let err = host.run(&rx).unwrap_err();
        assert!(matches!(err, SupervisorError::EditorFailedBeforeReady(_)));

        let record = std::fs::read_to_string(dir.path().join("termination")).unwrap();
        let summary = crate::core::diagnostics::extract_failure_from(&record).unwrap();
        assert!(summary.starts_with("editor failed to start: "));
        assert!(summary.contains("exit status 4"));
    }

    #[test]
    fn signal_stops_editor_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let host = RunHost::new(config("/bin/sleep", &["30"]), options(&dir));
        let (tx, rx) = crossbeam_channel::unbounded();

        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            tx.send(libc::SIGTERM).unwrap();
        });
        assert!(host.run(&rx).is_ok());
        sender.join().unwrap();
        assert!(!dir.path().join("termination").exists());
    }

    #[test]
    fn panics_become_fatal_errors() {
        let dir = tempfile::tempdir().unwrap();
        let fatal = FatalRecorder::new(dir.path().join("termination"));
        let result: Result<()> = guard_panics(&fatal, || panic!("boom"));
        assert!(matches!(result, Err(SupervisorError::Fatal(_))));

        let record = std::fs::read_to_string(fatal.path()).unwrap();
        assert!(record.contains("boom"));
    }
}
