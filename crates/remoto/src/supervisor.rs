//! Worker process supervisor
//!
//! Keeps exactly one worker alive. Whatever way a worker exits, a replacement
//! is spawned straight away; there is no backoff and no restart limit. Workers
//! share nothing, so every restart starts with an empty registry.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Spawns and respawns one worker process
#[derive(Debug, Clone)]
pub struct Supervisor {
    program: PathBuf,
    args: Vec<OsString>,
}

impl Supervisor {
    pub fn new<P, I, S>(program: P, args: I) -> Self
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Supervise the running executable itself with the given worker arguments
    pub fn for_current_exe(args: Vec<String>) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, args))
    }

    fn spawn_worker(&self) -> io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }

    /// Supervise until Ctrl+C
    pub async fn run(&self) -> io::Result<u64> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Supervise until `shutdown` resolves, then kill the current worker
    ///
    /// Returns how many workers were spawned. Only a failure to spawn or reap
    /// a worker ends supervision early.
    pub async fn run_until<F>(&self, shutdown: F) -> io::Result<u64>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut generations = 0;

        loop {
            let mut child = self.spawn_worker()?;
            generations += 1;
            let pid = child.id().unwrap_or_default();
            info!("Spawned worker {}", pid);

            tokio::select! {
                status = child.wait() => {
                    let status = status?;
                    warn!("Worker {} died ({}), restarting...", pid, status);
                }
                _ = &mut shutdown => {
                    info!("Stopping worker {}", pid);
                    child.kill().await?;
                    return Ok(generations);
                }
            }
        }
    }
}
