//! Process table and host counters backed by `/proc`.
//!
//! The shutdown sweep and the termination coordinator only see processes
//! through [`ProcessTable`], so tests can substitute a fake or a table
//! scoped to their own children.

use crate::config::types::{Result, SupervisorError};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Scheduler state letter from `/proc/<pid>/stat`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcState {
    Running,
    Sleeping,
    Zombie,
    Other(char),
}

impl ProcState {
    pub fn from_char(c: char) -> Self {
        match c {
            'R' => ProcState::Running,
            'S' => ProcState::Sleeping,
            'Z' => ProcState::Zombie,
            other => ProcState::Other(other),
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            ProcState::Running => 'R',
            ProcState::Sleeping => 'S',
            ProcState::Zombie => 'Z',
            ProcState::Other(c) => *c,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: i32,
    pub comm: String,
    pub state: ProcState,
    pub cmdline: Vec<String>,
}

impl ProcessInfo {
    pub fn is_zombie(&self) -> bool {
        self.state == ProcState::Zombie
    }

    /// `comm`, state letter and command line, for shutdown log lines.
    pub fn describe(&self) -> String {
        format!(
            "pid={} comm={} state={} cmdline={:?}",
            self.pid,
            self.comm,
            self.state.as_char(),
            self.cmdline.join(" ")
        )
    }
}

/// Result of delivering a signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    NoSuchProcess,
}

pub trait ProcessTable: Send + Sync {
    /// Every pid currently visible.
    fn pids(&self) -> Result<Vec<i32>>;
    /// `None` when the process no longer exists.
    fn inspect(&self, pid: i32) -> Result<Option<ProcessInfo>>;
    fn signal(&self, pid: i32, signal: Signal) -> Result<Delivery>;
}

/// The real process table under `/proc`.
#[derive(Clone, Debug)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ProcessTable for ProcFs {
    fn pids(&self) -> Result<Vec<i32>> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            SupervisorError::Process(format!("cannot list {}: {}", self.root.display(), e))
        })?;
        let mut pids: Vec<i32> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn inspect(&self, pid: i32) -> Result<Option<ProcessInfo>> {
        let dir = self.root.join(pid.to_string());
        let stat = match fs::read_to_string(dir.join("stat")) {
            Ok(stat) => stat,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => return Ok(None),
            Err(e) => {
                return Err(SupervisorError::Process(format!(
                    "cannot read stat of {}: {}",
                    pid, e
                )))
            }
        };
        let (comm, state) = parse_stat(&stat).ok_or_else(|| {
            SupervisorError::Process(format!("malformed stat for {}: {:?}", pid, stat))
        })?;
        let cmdline = fs::read(dir.join("cmdline"))
            .map(|raw| parse_cmdline(&raw))
            .unwrap_or_default();

        Ok(Some(ProcessInfo {
            pid,
            comm,
            state,
            cmdline,
        }))
    }

    fn signal(&self, pid: i32, signal: Signal) -> Result<Delivery> {
        match kill(Pid::from_raw(pid), signal) {
            Ok(()) => Ok(Delivery::Sent),
            Err(Errno::ESRCH) => Ok(Delivery::NoSuchProcess),
            Err(e) => Err(SupervisorError::Process(format!(
                "failed to send {} to {}: {}",
                signal, pid, e
            ))),
        }
    }
}

/// Extract `comm` and the state letter. `comm` may itself contain
/// parentheses, so the last `)` terminates it.
fn parse_stat(stat: &str) -> Option<(String, ProcState)> {
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    if close < open {
        return None;
    }
    let comm = stat[open + 1..close].to_string();
    let state = stat[close + 1..].trim_start().chars().next()?;
    Some((comm, ProcState::from_char(state)))
}

fn parse_cmdline(raw: &[u8]) -> Vec<String> {
    raw.split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}

/// Seconds since boot from `<root>/uptime`.
pub fn read_uptime(root: &Path) -> Result<f64> {
    let path = root.join("uptime");
    let content = fs::read_to_string(&path)
        .map_err(|e| SupervisorError::Resource(format!("failed to read {}: {}", path.display(), e)))?;
    content
        .split_whitespace()
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| SupervisorError::Resource(format!("malformed {}: {:?}", path.display(), content)))
}

/// `MemTotal` from `<root>/meminfo`, in bytes.
pub fn read_mem_total(root: &Path) -> Result<i64> {
    let path = root.join("meminfo");
    let content = fs::read_to_string(&path)
        .map_err(|e| SupervisorError::Resource(format!("failed to read {}: {}", path.display(), e)))?;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let mut parts = rest.split_whitespace();
            let value = parts.next().and_then(|v| v.parse::<i64>().ok());
            let unit = parts.next().unwrap_or("");
            return match (value, unit) {
                (Some(v), "kB") => Ok(v * 1024),
                (Some(v), "") => Ok(v),
                _ => Err(SupervisorError::Resource(format!("malformed MemTotal line: {:?}", line))),
            };
        }
    }
    Err(SupervisorError::Resource(format!("no MemTotal in {}", path.display())))
}
