use crate::config::types::SupervisorError;
use crate::core::init::{InitOptions, InitSupervisor};
use crate::core::run::{guard_panics, load_config, RunHost, RunOptions};
use crate::kernel::signal::ShutdownSignals;
use crate::observability::fatal::FatalRecorder;
use crate::observability::logging::{self, LogOptions};
use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "supervisor", author, version, about = "Workspace init process and editor supervisor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the workspace as container init (PID 1)
    Init {
        /// Reap orphaned processes even when not running as PID 1
        #[arg(long, hide = true)]
        disable_pid1_check: bool,
        /// Skip the git availability check
        #[arg(long, hide = true)]
        skip_git_check: bool,
    },
    /// Supervise the editor and serve the local endpoint (started by `init`)
    Run,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init {
            disable_pid1_check,
            skip_git_check,
        }) => run_init(disable_pid1_check, !skip_git_check),
        Some(Commands::Run) => run_run(),
        None => {
            println!("supervisor: use `supervisor init` as the container entrypoint");
            println!("run `supervisor --help` for details");
            Ok(())
        }
    }
}

fn run_init(disable_pid1_check: bool, require_git: bool) -> Result<()> {
    logging::init(&LogOptions::default());

    let mut options = InitOptions::for_entrypoint();
    options.disable_pid1_check = disable_pid1_check;
    options.require_git = require_git;

    let signals = ShutdownSignals::install()?;
    let result = InitSupervisor::new(options).run(signals.receiver());
    if let Some(sig) = signals.last_signal() {
        log::info!(
            "init finished after {}",
            crate::kernel::signal::signal_name(sig)
        );
    }
    if let Err(e) = &result {
        log::error!("supervisor init failed: {}", e);
    }
    result.map_err(anyhow::Error::from)
}

fn run_run() -> Result<()> {
    logging::init(&LogOptions {
        json: true,
        ..LogOptions::default()
    });

    let fatal = FatalRecorder::default();
    let result = guard_panics(&fatal, || {
        let config = load_config(&fatal)?;
        let signals = ShutdownSignals::install()?;
        RunHost::new(config, RunOptions::default()).run(signals.receiver())
    });
    result.map_err(anyhow::Error::from)
}

/// Process exit code for an error returned by [`run`].
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<SupervisorError>()
        .map(SupervisorError::exit_code)
        .unwrap_or(crate::config::types::EXIT_CODE_FAILURE)
}
