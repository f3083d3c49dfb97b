//! wsvisor: init process and runtime supervisor for a containerized
//! development workspace.
//!
//! # Architecture
//!
//! ## Kernel Interfaces ([`kernel`])
//! - [`kernel::signal`]: SIGINT/SIGTERM listener
//! - [`kernel::reaper`]: zombie reaper for the PID-1 role
//! - [`kernel::procfs`]: process table and `/proc` counters
//! - [`kernel::cgroup`]: read-only cgroup v1/v2 accounting
//!
//! ## Supervision Core ([`core`])
//! - [`core::init`]: PID-1 loop, exit code policy, shutdown sweep
//! - [`core::terminate`]: SIGTERM, wait, SIGKILL escalation
//! - [`core::run`]: host for the editor watchdog and the endpoint
//! - [`core::shutdown_log`]: elapsed-time shutdown record
//!
//! ## Editor ([`editor`])
//! - [`editor::watchdog`]: launch, readiness, crash-restart, graceful stop
//! - [`editor::readiness`]: process and HTTP readiness probes
//!
//! ## Services ([`service`])
//! - [`service::resource`]: CPU, memory and disk usage with severity
//! - [`service::endpoint`]: newline-delimited JSON over loopback TCP
//!
//! ## Utilities ([`utils`])
//! - [`utils::rate_limit`]: token bucket and rate-capped writer
//! - [`utils::ring_buffer`]: fixed-capacity output retention
//!
//! # Processes
//!
//! `supervisor init` runs as PID 1 and starts `supervisor run` as its only
//! direct child. The run child hosts the editor and the endpoint; the init
//! process only keeps the process tree clean and drives shutdown.

// Kernel Interfaces
pub mod kernel;

// Supervision Core
pub mod core;

// Editor Supervision
pub mod editor;

// Service Layer
pub mod service;

// Observability
pub mod observability;

// Configuration
pub mod config;

// Utilities
pub mod utils;

// CLI entrypoint wiring for the supervisor binary.
pub mod cli;

pub use config::types::*;
