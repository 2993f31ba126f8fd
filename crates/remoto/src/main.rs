//! remoto: relay main binary
//!
//! Usage:
//!   remoto            - Start the supervisor, which runs and restarts a worker
//!   remoto --worker   - Run the relay worker in this process
//!   remoto --help     - Show help

mod cli;
mod supervisor;

use remoto_core::Config;
use std::io::IsTerminal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli::{CliArgs, RunMode};
use crate::supervisor::Supervisor;

#[tokio::main]
async fn main() {
    let args = match cli::parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("remoto: {}", e);
            std::process::exit(2);
        }
    };

    match args.mode {
        RunMode::Help => {
            cli::print_help();
            return;
        }
        RunMode::Version => {
            println!("remoto {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        _ => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let result = match args.mode {
        RunMode::Worker => run_worker(&args).await,
        _ => run_supervisor(&args).await,
    };

    if let Err(e) = result {
        let backtrace = std::backtrace::Backtrace::force_capture();
        report_fatal(&format!("{:#}", e), &backtrace.to_string());
        std::process::exit(1);
    }
}

/// Run the relay in this process
async fn run_worker(args: &CliArgs) -> anyhow::Result<()> {
    install_panic_hook();

    let config = Config::load(&args.overrides)?;
    tracing::info!("Worker {} starting on port {}", std::process::id(), config.port);

    remoto_relay::start_relay_server(&config).await?;
    Ok(())
}

/// Keep a worker process alive until Ctrl+C
async fn run_supervisor(args: &CliArgs) -> anyhow::Result<()> {
    // fail fast on a broken config instead of crash-looping the worker
    let config = Config::load(&args.overrides)?;
    tracing::info!("Supervising relay workers on port {}", config.port);

    let supervisor = Supervisor::for_current_exe(args.worker_args())?;
    let generations = supervisor.run().await?;

    tracing::info!("Supervisor stopped after {} worker(s)", generations);
    Ok(())
}

/// Any panic in the worker is fatal: log it and exit so the supervisor restarts us
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        report_fatal(&info.to_string(), &backtrace.to_string());
        std::process::exit(1);
    }));
}

fn report_fatal(message: &str, trace: &str) {
    tracing::error!("{} uncaught error: {}", chrono::Utc::now().to_rfc2822(), message);
    tracing::error!("stack backtrace:\n{}", trace);
}
