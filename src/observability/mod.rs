//! Observability
//!
//! Logger setup and the fatal-termination record read back by the init
//! process.

pub mod fatal;
pub mod logging;
