//! Thin wrappers around Linux kernel primitives.
//!
//! Dependency direction: signal -> procfs -> reaper -> cgroup

pub mod cgroup;
pub mod procfs;
pub mod reaper;
pub mod signal;
