//! Process supervision core.
//!
//! `init` owns the container's process tree as PID 1, `run` hosts the
//! editor watchdog and the local endpoint, and `terminate` implements the
//! SIGTERM then SIGKILL escalation both of them rely on.

pub mod diagnostics;
pub mod init;
pub mod run;
pub mod shutdown_log;
pub mod terminate;

pub use init::{shutdown_all, InitOptions, InitSupervisor};
pub use run::{RunHost, RunOptions};
pub use shutdown_log::ShutdownLog;
pub use terminate::{terminate, TerminateOutcome};
