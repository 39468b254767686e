// Configuration File Support
//
// TOML configuration for the token watchdog with environment variable
// overrides. The file is looked up in the XDG config directory:
// ~/.config/token-watchdog/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::watchdog::probe::{
    DEFAULT_PROBE_ARGS, DEFAULT_PROBE_COMMAND, DEFAULT_PROBE_TIMEOUT_SECS,
};
use crate::watchdog::{CommandProbe, WatchdogConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Admission limits
    pub limits: WatchdogConfig,

    /// State file location
    pub state: StateConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Upstream status probe
    pub probe: ProbeConfig,
}

/// State file configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StateConfig {
    /// Path of the persisted state
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: data_root().join("token-watchdog.json"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,

    /// Whether to append diagnostics to a file as well as stderr
    pub log_to_file: bool,

    /// Log file path (if log_to_file is true)
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            log_to_file: true,
            log_file: Some(data_root().join("logs").join("watchdog.log")),
        }
    }
}

/// Upstream probe configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    /// Program to run
    pub command: String,

    /// Arguments for the program
    pub args: Vec<String>,

    /// Timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_PROBE_COMMAND.to_string(),
            args: DEFAULT_PROBE_ARGS.iter().map(|s| s.to_string()).collect(),
            timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
        }
    }
}

impl ProbeConfig {
    /// Build the probe described by this section
    pub fn build(&self) -> CommandProbe {
        CommandProbe::new(
            self.command.clone(),
            self.args.clone(),
            Duration::from_secs(self.timeout_secs),
        )
    }
}

/// `$HOME/.openclaw`, or `/tmp/.openclaw` when no home directory is known
fn data_root() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".openclaw")
}

impl Config {
    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation. If the file does not exist, defaults (plus
    /// environment overrides) are used.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?
        } else {
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/token-watchdog/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) =
            directories::ProjectDirs::from("com", "openclaw", "token-watchdog")
        {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("token-watchdog")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - TOKEN_WATCHDOG_LOG_LEVEL
    /// - TOKEN_WATCHDOG_LOG_FORMAT
    /// - TOKEN_WATCHDOG_LOG_FILE
    /// - TOKEN_WATCHDOG_STATE_FILE
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("TOKEN_WATCHDOG_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TOKEN_WATCHDOG_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(file) = std::env::var("TOKEN_WATCHDOG_LOG_FILE") {
            if !file.is_empty() {
                self.logging.log_file = Some(PathBuf::from(file));
            }
        }
        if let Ok(path) = std::env::var("TOKEN_WATCHDOG_STATE_FILE") {
            if !path.is_empty() {
                self.state.path = PathBuf::from(path);
            }
        }
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        let limits = &self.limits;
        if limits.tpm_threshold == 0 {
            anyhow::bail!("TPM threshold must be > 0");
        }
        if limits.tpm_threshold > limits.tpm_limit {
            anyhow::bail!(
                "TPM threshold ({}) must not exceed the TPM limit ({})",
                limits.tpm_threshold,
                limits.tpm_limit
            );
        }
        if limits.cooldown_seconds == 0 {
            anyhow::bail!("Cooldown must be at least 1 second");
        }
        if limits.window_seconds == 0 {
            anyhow::bail!("Estimation window must be at least 1 second");
        }
        if limits.default_request_tokens == 0 {
            anyhow::bail!("Default request cost must be > 0");
        }

        if self.probe.command.is_empty() {
            anyhow::bail!("Probe command must not be empty");
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
