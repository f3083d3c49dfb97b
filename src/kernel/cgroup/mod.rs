//! Cgroup resource accounting
//!
//! Read-only access to the container's cgroup counters with automatic
//! v1/v2 selection.

pub mod backend;
pub mod v1;
pub mod v2;

pub use backend::{create_cgroup_backend, CgroupBackend, DEFAULT_CGROUP_ROOT};
pub use v1::CgroupV1;
pub use v2::CgroupV2;
