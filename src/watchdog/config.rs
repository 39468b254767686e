//! Watchdog Limits
//!
//! Deployment constants for the admission gate. These are resolved once at
//! startup and handed to the gate at construction; nothing reads them from
//! global state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reference ceiling of the downstream quota (tokens per minute)
pub const DEFAULT_TPM_LIMIT: u64 = 1_000_000;
/// Estimated usage at which a cooldown starts
pub const DEFAULT_TPM_THRESHOLD: u64 = 900_000;
/// Length of a cooldown
pub const DEFAULT_COOLDOWN_SECONDS: u64 = 30;
/// Trailing window used by the estimator
pub const DEFAULT_WINDOW_SECONDS: u64 = 60;
/// Proxy cost of one request (input + output)
pub const DEFAULT_REQUEST_TOKENS: u64 = 4000;

/// Admission gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Downstream TPM quota, used for utilization reporting
    pub tpm_limit: u64,

    /// Estimated TPM at or above which a cooldown is triggered
    pub tpm_threshold: u64,

    /// Cooldown length in seconds
    pub cooldown_seconds: u64,

    /// Trailing estimation window in seconds
    pub window_seconds: u64,

    /// Token cost assumed for history entries without an explicit count
    pub default_request_tokens: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            tpm_limit: DEFAULT_TPM_LIMIT,
            tpm_threshold: DEFAULT_TPM_THRESHOLD,
            cooldown_seconds: DEFAULT_COOLDOWN_SECONDS,
            window_seconds: DEFAULT_WINDOW_SECONDS,
            default_request_tokens: DEFAULT_REQUEST_TOKENS,
        }
    }
}

impl WatchdogConfig {
    /// Create a configuration with the stock limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the threshold (builder style, mostly for tests)
    pub fn with_threshold(mut self, tpm_threshold: u64) -> Self {
        self.tpm_threshold = tpm_threshold;
        self
    }

    /// Override the cooldown length
    pub fn with_cooldown_seconds(mut self, cooldown_seconds: u64) -> Self {
        self.cooldown_seconds = cooldown_seconds;
        self
    }

    /// Cooldown length as a duration
    pub fn cooldown_duration(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    /// Estimation window as a duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub(crate) fn cooldown_millis(&self) -> i64 {
        millis(self.cooldown_seconds)
    }

    pub(crate) fn window_millis(&self) -> i64 {
        millis(self.window_seconds)
    }
}

fn millis(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}
