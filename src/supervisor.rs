//! Process manager for the local inference server (`ollama serve` by default).
//!
//! The child is started with the application and always stopped with it.
//! There is no health check or restart: if it dies, inference calls fail.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, trace, warn};

use crate::config::InferenceConfig;

/// How long a SIGTERM gets before the child is killed.
const GRACEFUL_STOP: Duration = Duration::from_secs(3);

pub struct InferenceServer {
    command: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl InferenceServer {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            child: None,
        }
    }

    pub fn from_config(config: &InferenceConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }

    /// Spawn the server. Its stdout and stderr are drained into trace logs.
    pub fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start inference server `{}`", self.command))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(drain(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain(stderr, "stderr"));
        }

        info!(command = %self.command, pid = ?child.id(), "inference server started");
        self.child = Some(child);
        Ok(())
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    pub fn is_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(?status, "inference server has exited");
                self.child = None;
                false
            }
            Err(_) => false,
        }
    }

    /// Ask the server to exit, then kill it if it does not.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        info!(pid = ?child.id(), "stopping inference server");

        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                // SAFETY: signalling a child we spawned and have not yet reaped.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
        }

        match tokio::time::timeout(GRACEFUL_STOP, child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "inference server exited"),
            Ok(Err(e)) => warn!(error = %e, "error waiting for inference server"),
            Err(_) => {
                warn!("inference server didn't exit gracefully, killing");
                child
                    .kill()
                    .await
                    .context("failed to kill inference server")?;
            }
        }
        Ok(())
    }
}

impl Drop for InferenceServer {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

async fn drain(stream: impl AsyncRead + Unpin, name: &'static str) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        trace!(target: "tichat::inference_server", stream = name, "{line}");
    }
}
