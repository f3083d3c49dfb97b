//! Workspace package catalogue.
//!
//! Packages come from the static config; install state is kept in memory
//! for the lifetime of the run process.

use crate::config::static_config::PackageSpec;
use crate::config::types::{Result, SupervisorError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub version: String,
    pub installed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Installed,
    AlreadyInstalled,
    Uninstalled,
    NotInstalled,
}

pub struct PackageService {
    packages: Mutex<BTreeMap<i64, PackageInfo>>,
}

impl PackageService {
    pub fn new(specs: &[PackageSpec]) -> Self {
        let packages = specs
            .iter()
            .map(|spec| {
                (
                    spec.id,
                    PackageInfo {
                        id: spec.id,
                        name: spec.name.clone(),
                        description: spec.description.clone(),
                        version: spec.version.clone(),
                        installed: false,
                    },
                )
            })
            .collect();
        Self {
            packages: Mutex::new(packages),
        }
    }

    fn with_packages<T>(&self, f: impl FnOnce(&mut BTreeMap<i64, PackageInfo>) -> T) -> T {
        match self.packages.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn list(&self) -> Vec<PackageInfo> {
        self.with_packages(|packages| packages.values().cloned().collect())
    }

    pub fn get(&self, id: i64) -> Result<PackageInfo> {
        self.with_packages(|packages| packages.get(&id).cloned())
            .ok_or_else(|| not_found(id))
    }

    pub fn install(&self, id: i64) -> Result<PackageStatus> {
        self.with_packages(|packages| {
            let package = packages.get_mut(&id).ok_or_else(|| not_found(id))?;
            if package.installed {
                return Ok(PackageStatus::AlreadyInstalled);
            }
            package.installed = true;
            log::info!("package {} ({}) installed", package.name, package.version);
            Ok(PackageStatus::Installed)
        })
    }

    pub fn uninstall(&self, id: i64) -> Result<PackageStatus> {
        self.with_packages(|packages| {
            let package = packages.get_mut(&id).ok_or_else(|| not_found(id))?;
            if !package.installed {
                return Ok(PackageStatus::NotInstalled);
            }
            package.installed = false;
            log::info!("package {} uninstalled", package.name);
            Ok(PackageStatus::Uninstalled)
        })
    }
}

fn not_found(id: i64) -> SupervisorError {
    SupervisorError::NotFound(format!("package {}", id))
}
