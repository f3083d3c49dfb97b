/// Cgroup v2 accounting reader
/// Reads cpu.stat, cpu.max, memory.current, memory.max and memory.stat of
/// the unified hierarchy mounted at the container's cgroup root.
use crate::config::types::{Result, SupervisorError};
use crate::kernel::cgroup::backend::{millicores, read_keyed, read_trimmed, read_u64, CgroupBackend};
use std::path::PathBuf;

/// Cgroup v2 backend
pub struct CgroupV2 {
    base_path: PathBuf,
}

impl CgroupV2 {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        CgroupV2 {
            base_path: base_path.into(),
        }
    }

    /// Number of CPUs in `cpuset.cpus.effective` ("0-3,6"), falling back to
    /// the CPUs available to this process.
    fn effective_cpus(&self) -> Result<i64> {
        if let Ok(list) = read_trimmed(&self.base_path.join("cpuset.cpus.effective")) {
            if let Some(count) = count_cpu_list(&list) {
                return Ok(count);
            }
        }
        std::thread::available_parallelism()
            .map(|n| n.get() as i64)
            .map_err(|e| SupervisorError::Cgroup(format!("cannot determine CPU count: {}", e)))
    }
}

impl CgroupBackend for CgroupV2 {
    fn backend_name(&self) -> &str {
        "cgroup_v2"
    }

    fn cpu_usage_ns(&self) -> Result<u64> {
        let usec = read_keyed(&self.base_path.join("cpu.stat"), "usage_usec")?;
        Ok(usec.saturating_mul(1000))
    }

    fn cpu_limit_millicores(&self) -> Result<i64> {
        let cpu_max = self.base_path.join("cpu.max");
        if cpu_max.exists() {
            let content = read_trimmed(&cpu_max)?;
            let mut parts = content.split_whitespace();
            let quota = parts.next().unwrap_or("max");
            let period = parts.next().and_then(|p| p.parse::<i64>().ok()).unwrap_or(100_000);
            if quota != "max" {
                let quota = quota.parse::<i64>().map_err(|e| {
                    SupervisorError::Cgroup(format!("failed to parse cpu.max {:?}: {}", content, e))
                })?;
                if let Some(limit) = millicores(quota, period) {
                    return Ok(limit);
                }
            }
        }
        Ok(self.effective_cpus()? * 1000)
    }

    fn memory_usage(&self) -> Result<u64> {
        read_u64(&self.base_path.join("memory.current"))
    }

    fn memory_inactive_file(&self) -> Result<u64> {
        read_keyed(&self.base_path.join("memory.stat"), "inactive_file")
    }

    fn memory_limit(&self) -> Result<Option<u64>> {
        let path = self.base_path.join("memory.max");
        let content = read_trimmed(&path)?;
        if content == "max" {
            return Ok(None);
        }
        content.parse::<u64>().map(Some).map_err(|e| {
            SupervisorError::Cgroup(format!("failed to parse memory.max {:?}: {}", content, e))
        })
    }
}

/// Count CPUs in a kernel cpu list such as "0-3,6,8-9".
fn count_cpu_list(list: &str) -> Option<i64> {
    let mut count = 0;
    for range in list.split(',').filter(|r| !r.is_empty()) {
        match range.split_once('-') {
            Some((lo, hi)) => {
                let lo = lo.trim().parse::<i64>().ok()?;
                let hi = hi.trim().parse::<i64>().ok()?;
                if hi < lo {
                    return None;
                }
                count += hi - lo + 1;
            }
            None => {
                range.trim().parse::<i64>().ok()?;
                count += 1;
            }
        }
    }
    if count > 0 {
        Some(count)
    } else {
        None
    }
}
