//! Read-only cgroup accounting abstraction for v1/v2 dual support.
//!
//! The supervisor never creates or configures cgroups; it only reads the
//! counters of the cgroup the container was placed in.

use crate::config::types::{Result, SupervisorError};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

pub trait CgroupBackend: Send + Sync {
    fn backend_name(&self) -> &str;
    /// Cumulative CPU time consumed by the cgroup, in nanoseconds.
    fn cpu_usage_ns(&self) -> Result<u64>;
    /// CPU limit in millicores: quota/period when a quota is set, else the
    /// number of accounted CPUs.
    fn cpu_limit_millicores(&self) -> Result<i64>;
    /// Raw memory usage in bytes, page cache included.
    fn memory_usage(&self) -> Result<u64>;
    /// Reclaimable inactive file-backed memory in bytes.
    fn memory_inactive_file(&self) -> Result<u64>;
    /// Memory limit in bytes, `None` when unlimited.
    fn memory_limit(&self) -> Result<Option<u64>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CgroupBackendType {
    V1,
    V2,
}

/// Detect the mounted hierarchy: v2 preferred, v1 fallback.
pub fn detect_cgroup_backend(root: &Path) -> Option<CgroupBackendType> {
    if root.join("cgroup.controllers").exists() {
        return Some(CgroupBackendType::V2);
    }
    if root.join("memory").exists() && (root.join("cpu").exists() || root.join("cpuacct").exists())
    {
        return Some(CgroupBackendType::V1);
    }
    None
}

pub fn create_cgroup_backend(root: &Path) -> Result<Box<dyn CgroupBackend>> {
    let detected = detect_cgroup_backend(root);
    log::debug!("cgroup backend detected under {}: {:?}", root.display(), detected);

    match detected {
        Some(CgroupBackendType::V2) => Ok(Box::new(crate::kernel::cgroup::v2::CgroupV2::new(root))),
        Some(CgroupBackendType::V1) => Ok(Box::new(crate::kernel::cgroup::v1::CgroupV1::new(root))),
        None => Err(SupervisorError::Cgroup(format!(
            "no cgroup hierarchy found under {}",
            root.display()
        ))),
    }
}

pub(crate) fn read_trimmed(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| SupervisorError::Cgroup(format!("failed to read {}: {}", path.display(), e)))
}

pub(crate) fn read_i64(path: &Path) -> Result<i64> {
    let content = read_trimmed(path)?;
    content.parse::<i64>().map_err(|e| {
        SupervisorError::Cgroup(format!("failed to parse {}: {:?}: {}", path.display(), content, e))
    })
}

pub(crate) fn read_u64(path: &Path) -> Result<u64> {
    let content = read_trimmed(path)?;
    content.parse::<u64>().map_err(|e| {
        SupervisorError::Cgroup(format!("failed to parse {}: {:?}: {}", path.display(), content, e))
    })
}

/// Look up `key` in a flat-keyed file such as `memory.stat` or `cpu.stat`.
pub(crate) fn read_keyed(path: &Path, key: &str) -> Result<u64> {
    let content = read_trimmed(path)?;
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        if parts.next() == Some(key) {
            return parts.next().and_then(|v| v.parse::<u64>().ok()).ok_or_else(|| {
                SupervisorError::Cgroup(format!("malformed {} entry in {}", key, path.display()))
            });
        }
    }
    Err(SupervisorError::Cgroup(format!("{} not found in {}", key, path.display())))
}

pub(crate) fn millicores(quota: i64, period: i64) -> Option<i64> {
    if quota > 0 && period > 0 {
        Some(quota * 1000 / period)
    } else {
        None
    }
}

pub(crate) fn join(root: &Path, parts: &[&str]) -> PathBuf {
    parts.iter().fold(root.to_path_buf(), |acc, p| acc.join(p))
}
