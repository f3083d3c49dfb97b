use crate::config::types::{ResourceUsage, Result, SupervisorError};
use crate::kernel::cgroup::{create_cgroup_backend, CgroupBackend};
use crate::kernel::procfs::{read_mem_total, read_uptime};
use crate::service::resource::{disk_usage, ResourceMonitor};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resource accounting from the container's own cgroup and `/proc`.
pub struct CgroupMonitor {
    backend: Box<dyn CgroupBackend>,
    proc_root: PathBuf,
    sample_interval: Duration,
}

#[derive(Clone, Copy, Debug)]
struct CpuSample {
    usage_secs: f64,
    uptime_secs: f64,
}

impl CgroupMonitor {
    pub fn new(backend: Box<dyn CgroupBackend>, proc_root: impl Into<PathBuf>, sample_interval: Duration) -> Self {
        Self {
            backend,
            proc_root: proc_root.into(),
            sample_interval,
        }
    }

    pub fn detect(cgroup_root: &Path, proc_root: &Path, sample_interval: Duration) -> Result<Self> {
        let backend = create_cgroup_backend(cgroup_root)?;
        log::info!("resource accounting via {}", backend.backend_name());
        Ok(Self::new(backend, proc_root, sample_interval))
    }

    fn sample(&self) -> Result<CpuSample> {
        Ok(CpuSample {
            usage_secs: self.backend.cpu_usage_ns()? as f64 * 1e-9,
            uptime_secs: read_uptime(&self.proc_root)?,
        })
    }
}

/// Millicores used between two samples.
fn cpu_millicores(first: CpuSample, second: CpuSample) -> Result<i64> {
    let elapsed = second.uptime_secs - first.uptime_secs;
    if elapsed <= 0.0 {
        return Err(SupervisorError::Resource(format!(
            "uptime did not advance between cpu samples ({} -> {})",
            first.uptime_secs, second.uptime_secs
        )));
    }
    let used = (second.usage_secs - first.usage_secs).max(0.0);
    Ok((used / elapsed * 1000.0) as i64)
}

impl ResourceMonitor for CgroupMonitor {
    fn cpu(&self) -> Result<ResourceUsage> {
        let first = self.sample()?;
        std::thread::sleep(self.sample_interval);
        let second = self.sample()?;

        Ok(ResourceUsage {
            used: cpu_millicores(first, second)?,
            limit: self.backend.cpu_limit_millicores()?,
        })
    }

    fn memory(&self) -> Result<ResourceUsage> {
        let mem_total = read_mem_total(&self.proc_root)?;
        let limit = match self.backend.memory_limit()? {
            Some(limit) if mem_total > 0 => (limit as i64).min(mem_total),
            Some(limit) => limit as i64,
            None => mem_total,
        };

        let usage = self.backend.memory_usage()?;
        let inactive = self.backend.memory_inactive_file()?;
        Ok(ResourceUsage {
            used: usage.saturating_sub(inactive) as i64,
            limit,
        })
    }

    fn disk(&self, path: &Path) -> Result<ResourceUsage> {
        disk_usage(path)
    }

    fn is_authoritative(&self) -> bool {
        true
    }
}
