//! Resource accounting
//!
//! One [`ResourceMonitor`] interface with a cgroup-backed implementation for
//! real containers and a simulated one for hosts without cgroup support.
//! Only an authoritative monitor may drive severity-based decisions.

pub mod cgroup;
pub mod simulated;

pub use cgroup::CgroupMonitor;
pub use simulated::SimulatedMonitor;

use crate::config::types::{
    ResourceKind, ResourceStatus, ResourceUsage, Result, SeverityThresholds,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub trait ResourceMonitor: Send + Sync {
    /// CPU used and limit in millicores. Blocks for one sample interval.
    fn cpu(&self) -> Result<ResourceUsage>;
    /// Memory used (page cache excluded) and limit in bytes.
    fn memory(&self) -> Result<ResourceUsage>;
    /// Filesystem usage of `path` in bytes.
    fn disk(&self, path: &Path) -> Result<ResourceUsage>;
    /// False for placeholder implementations.
    fn is_authoritative(&self) -> bool;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesReport {
    pub flavor: String,
    pub cpu: ResourceStatus,
    pub memory: ResourceStatus,
    pub disk: ResourceStatus,
    pub authoritative: bool,
}

/// Sample all three resources and classify them with `thresholds`.
pub fn resources_status(
    monitor: &dyn ResourceMonitor,
    workspace_path: &Path,
    flavor: &str,
    thresholds: &SeverityThresholds,
) -> Result<ResourcesReport> {
    let memory = ResourceStatus::classify(ResourceKind::Memory, monitor.memory()?, thresholds)?;
    let cpu = ResourceStatus::classify(ResourceKind::Cpu, monitor.cpu()?, thresholds)?;
    let disk = ResourceStatus::classify(ResourceKind::Disk, monitor.disk(workspace_path)?, thresholds)?;

    Ok(ResourcesReport {
        flavor: flavor.to_string(),
        cpu,
        memory,
        disk,
        authoritative: monitor.is_authoritative(),
    })
}

/// Filesystem usage from statvfs: used = total - available to unprivileged
/// users.
pub fn disk_usage(path: &Path) -> Result<ResourceUsage> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(|e| {
        crate::config::types::SupervisorError::Resource(format!(
            "failed to stat filesystem of {}: {}",
            path.display(),
            e
        ))
    })?;
    let fragment = stat.fragment_size() as u64;
    let total = stat.blocks() as u64 * fragment;
    let available = stat.blocks_available() as u64 * fragment;
    Ok(ResourceUsage {
        used: total.saturating_sub(available) as i64,
        limit: total as i64,
    })
}

/// The cgroup monitor when a hierarchy is mounted, else the simulated one.
pub fn default_monitor(cgroup_root: &Path, proc_root: &Path, sample_interval: Duration) -> Box<dyn ResourceMonitor> {
    match CgroupMonitor::detect(cgroup_root, proc_root, sample_interval) {
        Ok(monitor) => Box::new(monitor),
        Err(e) => {
            log::warn!(
                "cgroup accounting unavailable ({}), resource status is simulated and not authoritative",
                e
            );
            Box::new(SimulatedMonitor::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::Severity;

    struct Fixed {
        cpu: ResourceUsage,
        memory: ResourceUsage,
        disk: ResourceUsage,
    }

    impl ResourceMonitor for Fixed {
        fn cpu(&self) -> Result<ResourceUsage> {
            Ok(self.cpu)
        }
        fn memory(&self) -> Result<ResourceUsage> {
            Ok(self.memory)
        }
        fn disk(&self, _path: &Path) -> Result<ResourceUsage> {
            Ok(self.disk)
        }
        fn is_authoritative(&self) -> bool {
            true
        }
    }

    #[test]
    fn classifies_each_resource_independently() {
        let monitor = Fixed {
            cpu: ResourceUsage { used: 790, limit: 1000 },
            memory: ResourceUsage { used: 80, limit: 100 },
            disk: ResourceUsage { used: 95, limit: 100 },
        };
        let report = resources_status(&monitor, Path::new("/"), "small", &SeverityThresholds::default()).unwrap();
        assert_eq!(report.flavor, "small");
        assert_eq!(report.cpu.severity, Severity::Normal);
        assert_eq!(report.memory.severity, Severity::Warning);
        assert_eq!(report.disk.severity, Severity::Danger);
        assert!(report.authoritative);
    }

    #[test]
    fn unknown_limit_fails_the_report() {
        let monitor = Fixed {
            cpu: ResourceUsage { used: 1, limit: 0 },
            memory: ResourceUsage { used: 1, limit: 10 },
            disk: ResourceUsage { used: 1, limit: 10 },
        };
        assert!(resources_status(&monitor, Path::new("/"), "", &SeverityThresholds::default()).is_err());
    }

    #[test]
    fn disk_usage_of_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let usage = disk_usage(dir.path()).unwrap();
        assert!(usage.limit > 0);
        assert!(usage.used >= 0 && usage.used <= usage.limit);
    }
}
