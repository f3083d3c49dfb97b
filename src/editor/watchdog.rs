//! Editor watchdog
//!
//! Keeps exactly one editor process alive. A crash after the editor became
//! ready is restarted after killing the whole process group; a crash before
//! readiness ends the workspace.

use crate::config::types::{
    ExitKind, Result, SupervisorError, SupervisorTunables, EXIT_CODE_FAILURE,
};
use crate::editor::readiness::ReadinessProbe;
use crate::editor::state::{EditorProcessState, ReadyState};
use crate::utils::cancel::CancelToken;
use crate::utils::output::{self, SharedRing};
use crate::utils::ring_buffer::RingBuffer;
use crossbeam_channel::{after, select, Receiver};
use log::{debug, error, info, warn};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Time a force-killed group gets to be observed as exited.
const KILL_SETTLE: Duration = Duration::from_secs(1);

/// How long an exited editor's output pumps get to flush into the retained
/// tail before the exit is reported.
const OUTPUT_SETTLE: Duration = Duration::from_millis(200);

/// A running editor instance.
pub struct LaunchedEditor {
    pub pid: i32,
    /// Yields exactly one value when the process exits.
    pub exited: Receiver<ExitKind>,
}

/// Process-level operations the watchdog needs.
pub trait EditorLauncher: Send + Sync {
    fn launch(&self) -> Result<LaunchedEditor>;

    /// Signal the process group led by `pid`. A group that is already gone
    /// is not an error.
    fn signal_group(&self, pid: i32, signal: Signal) -> Result<()>;

    /// Recently retained output, when the launcher keeps any.
    fn output_tail(&self) -> Option<String> {
        None
    }
}

/// Launches the configured entrypoint in its own process group.
pub struct CommandLauncher {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// kb/sec, 0 disables limiting.
    pub log_rate_limit: u64,
    retained: Option<SharedRing>,
}

impl CommandLauncher {
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        env: BTreeMap<String, String>,
        log_rate_limit: u64,
        retention_bytes: usize,
    ) -> Self {
        let retained = RingBuffer::new(retention_bytes)
            .ok()
            .map(|ring| Arc::new(Mutex::new(ring)));
        Self {
            program: program.into(),
            args,
            env,
            log_rate_limit,
            retained,
        }
    }
}

impl EditorLauncher for CommandLauncher {
    fn launch(&self) -> Result<LaunchedEditor> {
        let direct = self.log_rate_limit == 0 && self.retained.is_none();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .process_group(0);
        if direct {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let mut child = cmd.spawn().map_err(|e| {
            SupervisorError::Process(format!(
                "failed to start editor {}: {}",
                self.program.display(),
                e
            ))
        })?;
        let pid = child.id() as i32;

        if let Some(ring) = &self.retained {
            if let Ok(mut ring) = ring.lock() {
                ring.reset();
            }
        }

        let mut pumps = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let sink = output::limited_sink(Box::new(std::io::stdout()), self.log_rate_limit);
            pumps.push(output::pump("editor-stdout", stdout, sink, self.retained.clone())?);
        }
        if let Some(stderr) = child.stderr.take() {
            let sink = output::limited_sink(Box::new(std::io::stderr()), self.log_rate_limit);
            pumps.push(output::pump("editor-stderr", stderr, sink, self.retained.clone())?);
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::Builder::new()
            .name("editor-wait".to_string())
            .spawn(move || {
                let exit = match child.wait() {
                    Ok(status) => ExitKind::from_std(status),
                    Err(e) => {
                        error!("cannot wait for editor process {}: {}", pid, e);
                        ExitKind::Code(EXIT_CODE_FAILURE)
                    }
                };
                // Descendants may still hold the pipes; never wait on them.
                if !output::drain(pumps, OUTPUT_SETTLE) {
                    debug!("editor {} output still open after exit", pid);
                }
                let _ = tx.send(exit);
            })?;

        Ok(LaunchedEditor { pid, exited: rx })
    }

    fn signal_group(&self, pid: i32, signal: Signal) -> Result<()> {
        match nix::sys::signal::killpg(Pid::from_raw(pid), signal) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn output_tail(&self) -> Option<String> {
        self.retained.as_ref().map(output::tail_text)
    }
}

pub struct EditorWatchdog {
    name: String,
    launcher: Box<dyn EditorLauncher>,
    probe: Arc<dyn ReadinessProbe>,
    ready: Arc<ReadyState>,
    state: Arc<Mutex<EditorProcessState>>,
    /// Bumped when a launch is torn down. Readiness is only recorded for
    /// the launch that is still current, under this lock.
    generation: Arc<Mutex<u64>>,
    restarts: AtomicU32,
    tunables: SupervisorTunables,
}

impl EditorWatchdog {
    pub fn new(
        name: impl Into<String>,
        launcher: Box<dyn EditorLauncher>,
        probe: Arc<dyn ReadinessProbe>,
        tunables: SupervisorTunables,
    ) -> Self {
        Self {
            name: name.into(),
            launcher,
            probe,
            ready: Arc::new(ReadyState::new()),
            state: Arc::new(Mutex::new(EditorProcessState::NotStarted)),
            generation: Arc::new(Mutex::new(0)),
            restarts: AtomicU32::new(0),
            tunables,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ready_state(&self) -> Arc<ReadyState> {
        Arc::clone(&self.ready)
    }

    pub fn state(&self) -> EditorProcessState {
        *lock(&self.state)
    }

    /// Number of relaunches after a crash.
    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }

    fn set_state(&self, next: EditorProcessState) {
        set_state(&self.state, next);
    }

    fn current_launch(&self) -> u64 {
        *lock(&self.generation)
    }

    /// Detach the probe of the current launch from the ready state.
    fn retire_launch(&self) {
        *lock(&self.generation) += 1;
    }

    /// Run the editor until `cancel` fires (Ok) or the editor fails before
    /// ever becoming ready (Err).
    pub fn run(&self, cancel: &CancelToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                self.set_state(EditorProcessState::Stopped);
                return Ok(());
            }

            let editor = self.launcher.launch()?;
            info!("started editor {} (pid {})", self.name, editor.pid);
            self.set_state(if self.restarts() == 0 {
                EditorProcessState::Starting
            } else {
                EditorProcessState::RunningNotReady
            });

            let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
            self.spawn_probe(self.current_launch(), stop_rx.clone());
            self.spawn_readiness_warning(stop_rx);

            select! {
                recv(editor.exited) -> exit => {
                    drop(stop_tx);
                    self.retire_launch();
                    let exit = exit.unwrap_or(ExitKind::Code(EXIT_CODE_FAILURE));
                    if cancel.is_cancelled() {
                        info!("editor {} exited during shutdown ({})", self.name, exit);
                        self.set_state(EditorProcessState::Stopped);
                        return Ok(());
                    }
                    self.handle_exit(&editor, exit)?;
                    if cancel.wait_timeout(self.tunables.restart_cooldown) {
                        self.set_state(EditorProcessState::Stopped);
                        return Ok(());
                    }
                    self.restarts.fetch_add(1, Ordering::SeqCst);
                    info!("restarting editor {} (restart #{})", self.name, self.restarts());
                }
                recv(cancel.receiver()) -> _ => {
                    drop(stop_tx);
                    self.retire_launch();
                    self.stop(&editor);
                    self.set_state(EditorProcessState::Stopped);
                    return Ok(());
                }
            }
        }
    }

    /// Decide what an unrequested exit means. Returns Err when the editor
    /// never became ready.
    fn handle_exit(&self, editor: &LaunchedEditor, exit: ExitKind) -> Result<()> {
        let was_ready = self.ready.get();
        let crashed = !matches!(exit, ExitKind::Code(0) | ExitKind::Signaled(libc::SIGTERM));
        let tail = self.launcher.output_tail().filter(|t| !t.trim().is_empty());

        if crashed && !was_ready {
            let mut message = format!("editor {} exited with {} before becoming ready", self.name, exit);
            if let Some(tail) = tail {
                message.push_str("\nrecent output:\n");
                message.push_str(tail.trim_end());
            }
            self.set_state(EditorProcessState::Stopped);
            return Err(SupervisorError::EditorFailedBeforeReady(message));
        }

        warn!("editor {} exited unexpectedly ({})", self.name, exit);
        if let Some(tail) = tail {
            warn!("recent editor output:\n{}", tail.trim_end());
        }
        self.ready.set(false);
        if let Err(e) = self.launcher.signal_group(editor.pid, Signal::SIGKILL) {
            warn!("cannot kill editor process group {}: {}", editor.pid, e);
        }
        Ok(())
    }

    /// Ask the editor group to exit, escalating to SIGKILL after the
    /// shutdown budget.
    fn stop(&self, editor: &LaunchedEditor) {
        info!("stopping editor {} (pid {})", self.name, editor.pid);
        if let Err(e) = self.launcher.signal_group(editor.pid, Signal::SIGTERM) {
            warn!("cannot signal editor process group {}: {}", editor.pid, e);
        }
        select! {
            recv(editor.exited) -> exit => {
                if let Ok(exit) = exit {
                    info!("editor {} stopped ({})", self.name, exit);
                }
            }
            recv(after(self.tunables.editor_shutdown_budget)) -> _ => {
                warn!("editor {} did not stop in time, sending SIGKILL", self.name);
                if let Err(e) = self.launcher.signal_group(editor.pid, Signal::SIGKILL) {
                    warn!("cannot kill editor process group {}: {}", editor.pid, e);
                }
                let _ = editor.exited.recv_timeout(KILL_SETTLE);
            }
        }
        self.ready.set(false);
    }

    fn spawn_probe(&self, generation: u64, stopped: Receiver<()>) {
        let probe = Arc::clone(&self.probe);
        let ready = Arc::clone(&self.ready);
        let state = Arc::clone(&self.state);
        let current_generation = Arc::clone(&self.generation);
        let name = self.name.clone();
        let spawned = thread::Builder::new()
            .name("editor-probe".to_string())
            .spawn(move || {
                if !probe.wait_ready(&stopped) {
                    return;
                }
                let current = lock(&current_generation);
                if *current == generation && is_running(&stopped) {
                    info!("editor {} is ready", name);
                    ready.set(true);
                    set_state(&state, EditorProcessState::Ready);
                }
            });
        if let Err(e) = spawned {
            error!("cannot start readiness probe: {}", e);
        }
    }

    fn spawn_readiness_warning(&self, stopped: Receiver<()>) {
        let ready = Arc::clone(&self.ready);
        let warn_after = self.tunables.readiness_warn_after;
        let name = self.name.clone();
        let _ = thread::Builder::new()
            .name("editor-ready-warn".to_string())
            .spawn(move || {
                if !ready.wait_timeout(warn_after) && is_running(&stopped) {
                    warn!("editor {} is not ready after {:?}", name, warn_after);
                }
            });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn set_state(state: &Mutex<EditorProcessState>, next: EditorProcessState) {
    let mut guard = lock(state);
    if *guard != next {
        debug!("editor state {:?} -> {:?}", *guard, next);
        *guard = next;
    }
}

/// The launch the receiver belongs to is still current.
fn is_running(stopped: &Receiver<()>) -> bool {
    matches!(stopped.try_recv(), Err(crossbeam_channel::TryRecvError::Empty))
}
