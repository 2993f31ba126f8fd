//! Command line parsing
//!
//! Flags map onto [`ConfigOverrides`]; everything except `--worker` is
//! forwarded verbatim to the worker process the supervisor spawns.

use anyhow::{anyhow, bail, Context};
use remoto_core::ConfigOverrides;
use std::path::PathBuf;

/// Flag that turns a process into a worker
pub const WORKER_FLAG: &str = "--worker";

/// Run mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Spawn and babysit a worker process
    Supervisor,
    /// Bind the port and run the relay
    Worker,
    /// Show help
    Help,
    /// Show version
    Version,
}

/// Parsed command line
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub mode: RunMode,
    pub overrides: ConfigOverrides,
    /// Arguments handed on to the worker process
    pub forwarded: Vec<String>,
}

/// Parse arguments (without the program name)
pub fn parse_args<I, S>(args: I) -> anyhow::Result<CliArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut mode = RunMode::Supervisor;
    let mut overrides = ConfigOverrides::default();
    let mut forwarded = Vec::new();

    let mut args = args.into_iter().map(Into::into);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            WORKER_FLAG => {
                mode = RunMode::Worker;
                continue;
            }
            "--help" | "-h" => return Ok(CliArgs::info(RunMode::Help)),
            "--version" | "-v" => return Ok(CliArgs::info(RunMode::Version)),
            "--port" => {
                let value = value_for(&arg, args.next())?;
                overrides.port = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid port: {}", value))?,
                );
                forwarded.extend([arg.clone(), value]);
            }
            "-u" | "--user" => {
                let value = value_for(&arg, args.next())?;
                overrides.user = Some(value.clone());
                forwarded.extend([arg.clone(), value]);
            }
            "-p" | "--password" => {
                let value = value_for(&arg, args.next())?;
                overrides.password = Some(value.clone());
                forwarded.extend([arg.clone(), value]);
            }
            "--static" => {
                let value = value_for(&arg, args.next())?;
                overrides.static_dir = Some(PathBuf::from(&value));
                forwarded.extend([arg.clone(), value]);
            }
            "--config" | "-c" => {
                let value = value_for(&arg, args.next())?;
                overrides.config_path = Some(PathBuf::from(&value));
                forwarded.extend([arg.clone(), value]);
            }
            other => bail!("Unknown argument: {} (see --help)", other),
        }
    }

    Ok(CliArgs {
        mode,
        overrides,
        forwarded,
    })
}

impl CliArgs {
    fn info(mode: RunMode) -> Self {
        Self {
            mode,
            overrides: ConfigOverrides::default(),
            forwarded: Vec::new(),
        }
    }

    /// Argument list for a freshly spawned worker
    pub fn worker_args(&self) -> Vec<String> {
        std::iter::once(WORKER_FLAG.to_string())
            .chain(self.forwarded.iter().cloned())
            .collect()
    }
}

fn value_for(flag: &str, value: Option<String>) -> anyhow::Result<String> {
    value.ok_or_else(|| anyhow!("Missing value for {}", flag))
}

/// Print help message
pub fn print_help() {
    println!("remoto - WebSocket relay between terminals and remotes");
    println!();
    println!("Usage:");
    println!("  remoto [options]          Start the supervisor (spawns and restarts a worker)");
    println!("  remoto --worker [options] Run the relay worker directly");
    println!("  remoto --help             Show this help message");
    println!("  remoto --version          Show version");
    println!();
    println!("Options:");
    println!("  --port <port>             Listening port (default: 8080)");
    println!("  -u, --user <user>         Basic-auth user");
    println!("  -p, --password <pass>     Basic-auth password");
    println!("  --static <dir>            Static file directory (default: public)");
    println!("  -c, --config <file>       Config file (default: remoto.toml or remoto.json)");
    println!();
    println!("Environment Variables:");
    println!("  PORT                      Listening port");
    println!("  REMOTO_USER               Basic-auth user");
    println!("  REMOTO_PASSWORD           Basic-auth password");
    println!("  REMOTO_STATIC_DIR         Static file directory");
    println!("  REMOTO_SWEEP_INTERVAL     Seconds between liveness sweeps (0 disables)");
    println!("  RUST_LOG                  Log filter (default: info)");
}
