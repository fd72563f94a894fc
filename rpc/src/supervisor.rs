//! Supervision of the external CLI server process.
//!
//! One [`ServerProcess::spawn`] call produces one OS process running the
//! CLI's `start-rpc-server` subcommand, its stdio piped for the channel and
//! its environment tailored to the session. Retry policy lives in the
//! gateway, never here.

use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::oneshot;

use nimbus_types::{EnvironmentTier, Region};

use crate::error::RpcError;

/// Subcommand the CLI exposes for stdio RPC serving.
const RPC_SUBCOMMAND: &str = "start-rpc-server";

/// Grace period between a kill request and SIGKILL.
const KILL_GRACE: std::time::Duration = std::time::Duration::from_secs(2);

/// How to launch the CLI for this session.
#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    /// Executable name or path; resolved against PATH when bare.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub region: Region,
    pub environment: EnvironmentTier,
    /// Short-lived token the CLI uses to bootstrap its own auth state.
    pub bootstrap_token: String,
    #[serde(default)]
    pub feature_flags: Vec<String>,
}

/// A spawned CLI server: its stdio streams plus the process handle.
///
/// The channel takes the streams; the session keeps the handle.
pub struct SpawnedServer {
    pub stdin: tokio::process::ChildStdin,
    pub stdout: tokio::process::ChildStdout,
    pub handle: ProcessHandle,
}

/// Owner-side handle to the supervised process.
///
/// The `Child` itself lives in a monitor task; the handle can request
/// termination and observe exit. Dropping the handle without calling
/// [`ProcessHandle::kill`] also terminates the process.
pub struct ProcessHandle {
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: Option<oneshot::Receiver<std::process::ExitStatus>>,
    pid: Option<u32>,
}

impl ProcessHandle {
    /// One-shot terminated signal: fires on any exit, requested or
    /// spontaneous. Consumable exactly once; later calls return `None`.
    pub fn terminated(&mut self) -> Option<oneshot::Receiver<std::process::ExitStatus>> {
        self.exit_rx.take()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Request termination and resolve once the OS confirms exit.
    pub async fn kill(mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
        if let Some(rx) = self.exit_rx.take() {
            match rx.await {
                Ok(status) => tracing::debug!(%status, "rpc server exited after kill"),
                Err(_) => tracing::debug!("rpc server monitor already gone"),
            }
        }
    }
}

pub struct ServerProcess;

impl ServerProcess {
    /// Spawn one CLI server instance. Fails with [`RpcError::Spawn`] when
    /// the executable is missing or not invocable; existence/version
    /// pre-flight is the installer's job, not ours.
    pub fn spawn(config: &CliConfig) -> Result<SpawnedServer, RpcError> {
        let spawn_err = |message: String| RpcError::Spawn {
            command: config.command.clone(),
            message,
        };

        let resolved = which::which(&config.command)
            .map_err(|e| spawn_err(format!("not found in PATH: {e}")))?;

        let mut cmd = Command::new(&resolved);
        cmd.arg(RPC_SUBCOMMAND)
            .args(&config.args)
            .env("NIMBUS_REGION", config.region.as_str())
            .env("NIMBUS_ENVIRONMENT", config.environment.as_str())
            .env("NIMBUS_BOOTSTRAP_TOKEN", &config.bootstrap_token)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // Stderr is diagnostic only, never part of the protocol.
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if !config.feature_flags.is_empty() {
            cmd.env("NIMBUS_FEATURE_FLAGS", config.feature_flags.join(","));
        }

        let mut child = cmd.spawn().map_err(|e| spawn_err(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_err("child has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_err("child has no stdout".to_string()))?;

        let pid = child.id();
        tracing::info!(command = %resolved.display(), ?pid, "rpc server spawned");

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                // Fires on an explicit kill request or on handle drop.
                _ = kill_rx => {
                    let _ = child.start_kill();
                    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
                        Ok(status) => status,
                        Err(_) => {
                            let _ = child.kill().await;
                            child.wait().await
                        }
                    }
                }
            };
            match status {
                Ok(status) => {
                    tracing::info!(%status, ?pid, "rpc server terminated");
                    let _ = exit_tx.send(status);
                }
                Err(e) => {
                    tracing::warn!(error = %e, ?pid, "failed to reap rpc server");
                }
            }
        });

        Ok(SpawnedServer {
            stdin,
            stdout,
            handle: ProcessHandle {
                kill_tx: Some(kill_tx),
                exit_rx: Some(exit_rx),
                pid,
            },
        })
    }
}
