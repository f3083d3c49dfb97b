/// Core types shared across the supervisor
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Exit code the run child uses for configuration/environment failures.
/// InitSupervisor surfaces this code verbatim and never retries it.
pub const EXIT_CODE_CONFIG: i32 = 2;

/// Generic failure exit code.
pub const EXIT_CODE_FAILURE: i32 = 1;

/// Supervisor error taxonomy
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Cgroup error: {0}")]
    Cgroup(String),

    #[error("Resource accounting error: {0}")]
    Resource(String),

    #[error("Readiness probe error: {0}")]
    Probe(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Editor failed before becoming ready: {0}")]
    EditorFailedBeforeReady(String),

    #[error("{0}")]
    Fatal(String),
}

impl SupervisorError {
    /// Process exit code for this error when it terminates the supervisor.
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorError::Config(_) => EXIT_CODE_CONFIG,
            _ => EXIT_CODE_FAILURE,
        }
    }
}

impl From<nix::errno::Errno> for SupervisorError {
    fn from(err: nix::errno::Errno) -> Self {
        SupervisorError::Process(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Coarse classification of a resource usage percentage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warning,
    Danger,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        };
        f.write_str(label)
    }
}

/// Percentage thresholds (inclusive) for severity classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityThresholds {
    pub warning_percent: i64,
    pub danger_percent: i64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            warning_percent: 80,
            danger_percent: 95,
        }
    }
}

impl SeverityThresholds {
    pub fn classify(&self, percent: i64) -> Severity {
        if percent >= self.danger_percent {
            Severity::Danger
        } else if percent >= self.warning_percent {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }
}

/// Resource kinds reported by the resource monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Millicores
    Cpu,
    /// Bytes
    Memory,
    /// Bytes
    Disk,
}

/// Raw used/limit pair as read from the OS, before classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceUsage {
    pub used: i64,
    pub limit: i64,
}

/// Usage, limit and severity for one resource kind.
///
/// Severity is always derived from `used / limit`; it is never stored
/// independently of the two counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub used: i64,
    pub limit: i64,
    pub severity: Severity,
}

impl ResourceStatus {
    /// Classify a usage sample. A zero or negative limit is an error,
    /// never a "normal" status.
    pub fn classify(
        kind: ResourceKind,
        usage: ResourceUsage,
        thresholds: &SeverityThresholds,
    ) -> Result<Self> {
        if usage.limit <= 0 {
            return Err(SupervisorError::Resource(format!(
                "{:?} limit is unknown (limit={})",
                kind, usage.limit
            )));
        }

        let percent = (usage.used as f64 / usage.limit as f64 * 100.0) as i64;
        Ok(Self {
            used: usage.used,
            limit: usage.limit,
            severity: thresholds.classify(percent),
        })
    }
}

/// How an observed process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitKind {
    Code(i32),
    Signaled(i32),
}

impl ExitKind {
    pub fn from_std(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        match (status.code(), status.signal()) {
            (Some(code), _) => ExitKind::Code(code),
            (None, Some(sig)) => ExitKind::Signaled(sig),
            (None, None) => ExitKind::Code(EXIT_CODE_FAILURE),
        }
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitKind::Code(code) => write!(f, "exit status {}", code),
            ExitKind::Signaled(sig) => write!(f, "signal: {}", sig),
        }
    }
}

/// Timing knobs with their production defaults.
#[derive(Clone, Debug)]
pub struct SupervisorTunables {
    /// How long to wait for a reaper-delivered status after a direct wait
    /// failed with ECHILD.
    pub reaper_wait_timeout: Duration,
    /// Extra time granted after the grace period expired.
    pub shutdown_settle: Duration,
    /// Pause between killing a crashed editor group and relaunching it.
    pub restart_cooldown: Duration,
    /// Time the editor gets to exit on its own during shutdown.
    pub editor_shutdown_budget: Duration,
    /// Interval between HTTP readiness probes.
    pub readiness_interval: Duration,
    /// After this long without readiness a warning is logged.
    pub readiness_warn_after: Duration,
    /// Interval between the two CPU samples.
    pub cpu_sample_interval: Duration,
    pub severity: SeverityThresholds,
    /// Bytes of recent editor output retained for diagnostics.
    pub output_retention_bytes: usize,
}

impl SupervisorTunables {
    /// Defaults, with `SUPERVISOR_REAPER_WAIT_TIMEOUT_MS` applied when set.
    pub fn from_env() -> Self {
        let mut tunables = Self::default();
        if let Ok(raw) = std::env::var("SUPERVISOR_REAPER_WAIT_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => tunables.reaper_wait_timeout = Duration::from_millis(ms),
                Err(e) => log::warn!("ignoring SUPERVISOR_REAPER_WAIT_TIMEOUT_MS={:?}: {}", raw, e),
            }
        }
        tunables
    }
}

impl Default for SupervisorTunables {
    fn default() -> Self {
        Self {
            reaper_wait_timeout: Duration::from_secs(5),
            shutdown_settle: Duration::from_secs(1),
            restart_cooldown: Duration::from_secs(1),
            editor_shutdown_budget: Duration::from_secs(15),
            readiness_interval: Duration::from_millis(250),
            readiness_warn_after: Duration::from_secs(10),
            cpu_sample_interval: Duration::from_secs(1),
            severity: SeverityThresholds::default(),
            output_retention_bytes: 16 * 1024,
        }
    }
}
