//! Cgroup v1 accounting reader.
//!
//! Controllers are mounted as separate hierarchies (`cpu`, `cpuacct`,
//! `memory`); some distributions merge cpu and cpuacct into one directory,
//! so both locations are tried.

use crate::config::types::{Result, SupervisorError};
use crate::kernel::cgroup::backend::{join, millicores, read_i64, read_keyed, read_trimmed, read_u64, CgroupBackend};
use std::path::PathBuf;

/// Values at or above this in `memory.limit_in_bytes` mean "unlimited".
const V1_UNLIMITED: u64 = 0x7FFF_FFFF_FFFF_F000;

#[derive(Clone, Debug)]
pub struct CgroupV1 {
    root: PathBuf,
}

impl CgroupV1 {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// First existing path for `file` among the cpu/cpuacct hierarchies.
    fn cpu_file(&self, file: &str) -> PathBuf {
        let candidates = [
            join(&self.root, &["cpu", file]),
            join(&self.root, &["cpuacct", file]),
            join(&self.root, &["cpu,cpuacct", file]),
        ];
        candidates
            .iter()
            .find(|p| p.exists())
            .cloned()
            .unwrap_or_else(|| candidates[0].clone())
    }

    fn memory_file(&self, file: &str) -> PathBuf {
        join(&self.root, &["memory", file])
    }

    fn accounted_cpus(&self) -> Result<i64> {
        let path = self.cpu_file("cpuacct.usage_percpu");
        let content = read_trimmed(&path)?;
        let count = content.split_whitespace().count() as i64;
        if count == 0 {
            return Err(SupervisorError::Cgroup(format!(
                "no CPUs accounted in {}",
                path.display()
            )));
        }
        Ok(count)
    }
}

impl CgroupBackend for CgroupV1 {
    fn backend_name(&self) -> &str {
        "cgroup_v1"
    }

    fn cpu_usage_ns(&self) -> Result<u64> {
        read_u64(&self.cpu_file("cpuacct.usage"))
    }

    fn cpu_limit_millicores(&self) -> Result<i64> {
        let quota = read_i64(&self.cpu_file("cpu.cfs_quota_us"))?;
        if quota > 0 {
            let period = read_i64(&self.cpu_file("cpu.cfs_period_us"))?;
            if let Some(limit) = millicores(quota, period) {
                return Ok(limit);
            }
        }
        Ok(self.accounted_cpus()? * 1000)
    }

    fn memory_usage(&self) -> Result<u64> {
        read_u64(&self.memory_file("memory.usage_in_bytes"))
    }

    fn memory_inactive_file(&self) -> Result<u64> {
        let stat = self.memory_file("memory.stat");
        read_keyed(&stat, "total_inactive_file").or_else(|_| read_keyed(&stat, "inactive_file"))
    }

    fn memory_limit(&self) -> Result<Option<u64>> {
        let limit = read_u64(&self.memory_file("memory.limit_in_bytes"))?;
        if limit >= V1_UNLIMITED {
            Ok(None)
        } else {
            Ok(Some(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fake_v1() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("cpu")).unwrap();
        fs::create_dir_all(dir.path().join("memory")).unwrap();
        dir
    }

    fn write(dir: &tempfile::TempDir, rel: &str, content: &str) {
        fs::write(dir.path().join(rel), content).unwrap();
    }

    #[test]
    fn quota_gives_millicores() {
        let dir = fake_v1();
        write(&dir, "cpu/cpu.cfs_quota_us", "250000\n");
        write(&dir, "cpu/cpu.cfs_period_us", "100000\n");
        let cg = CgroupV1::new(dir.path());
        assert_eq!(cg.cpu_limit_millicores().unwrap(), 2500);
    }

    #[test]
    fn no_quota_counts_accounted_cpus() {
        let dir = fake_v1();
        write(&dir, "cpu/cpu.cfs_quota_us", "-1\n");
        write(&dir, "cpu/cpuacct.usage_percpu", "100 200 300 400 \n");
        let cg = CgroupV1::new(dir.path());
        assert_eq!(cg.cpu_limit_millicores().unwrap(), 4000);
    }

    #[test]
    fn unlimited_memory_is_none() {
        let dir = fake_v1();
        write(&dir, "memory/memory.limit_in_bytes", "9223372036854771712\n");
        assert_eq!(CgroupV1::new(dir.path()).memory_limit().unwrap(), None);
        write(&dir, "memory/memory.limit_in_bytes", "536870912\n");
        assert_eq!(CgroupV1::new(dir.path()).memory_limit().unwrap(), Some(536_870_912));
    }

    #[test]
    fn inactive_file_prefers_hierarchical_total() {
        let dir = fake_v1();
        write(&dir, "memory/memory.stat", "inactive_file 10\ntotal_inactive_file 30\n");
        assert_eq!(CgroupV1::new(dir.path()).memory_inactive_file().unwrap(), 30);
    }
}
