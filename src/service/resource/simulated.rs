use crate::config::types::{ResourceUsage, Result};
use crate::service::resource::ResourceMonitor;
use std::path::Path;

const GIB: i64 = 1024 * 1024 * 1024;

/// Fixed placeholder figures for development hosts without cgroups.
/// Never authoritative.
#[derive(Clone, Debug)]
pub struct SimulatedMonitor {
    pub cpu: ResourceUsage,
    pub memory: ResourceUsage,
    pub disk: ResourceUsage,
}

impl Default for SimulatedMonitor {
    fn default() -> Self {
        Self {
            cpu: ResourceUsage {
                used: 500,
                limit: 2000,
            },
            memory: ResourceUsage {
                used: 2 * GIB,
                limit: 8 * GIB,
            },
            disk: ResourceUsage {
                used: 10 * GIB,
                limit: 50 * GIB,
            },
        }
    }
}

impl ResourceMonitor for SimulatedMonitor {
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
        false
    }
}
