//! Upstream Usage Probe
//!
//! The external session-status call consulted by
//! [`AdmissionGate::check_token_usage`](super::gate::AdmissionGate::check_token_usage).
//! Failures here never block callers; the gate degrades to "allowed".

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time;

/// Default command queried for session status
pub const DEFAULT_PROBE_COMMAND: &str = "openclaw";
/// Default arguments for [`DEFAULT_PROBE_COMMAND`]
pub const DEFAULT_PROBE_ARGS: [&str; 2] = ["gateway", "config.get"];
/// Default probe timeout
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Source of an upstream usage signal
#[async_trait]
pub trait UsageProbe: Send + Sync {
    /// Query upstream; returns the raw response on success
    async fn query(&self) -> Result<String>;
}

/// Probe that shells out to a status command
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for CommandProbe {
    fn default() -> Self {
        Self::new(
            DEFAULT_PROBE_COMMAND,
            DEFAULT_PROBE_ARGS.iter().map(|s| s.to_string()).collect(),
            Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
        )
    }
}

impl CommandProbe {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl UsageProbe for CommandProbe {
    async fn query(&self) -> Result<String> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.with_context(|| format!("Failed to run {}", self.program))?,
            Err(_) => bail!("{} timed out after {:?}", self.program, self.timeout),
        };

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
