//! Watchdog State
//!
//! The single persisted aggregate: request history, cooldown deadline and
//! breach counter. All timestamps are milliseconds since the Unix epoch.

use serde::{Deserialize, Serialize};

/// One observed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the request was recorded
    pub time: i64,

    /// Token cost; entries written without one (or with zero) count as the
    /// default cost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
}

impl HistoryEntry {
    /// Create an entry with an explicit token count
    pub fn new(time: i64, tokens: u64) -> Self {
        Self {
            time,
            tokens: Some(tokens),
        }
    }

    /// Token cost, falling back to `default_tokens` when absent or zero
    pub fn cost(&self, default_tokens: u64) -> u64 {
        self.tokens.filter(|t| *t > 0).unwrap_or(default_tokens)
    }
}

/// Persisted watchdog memory
///
/// Every field defaults on its own, so files written by older tools (or with
/// extra keys) still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchdogState {
    /// Time of the most recent recording (informational)
    #[serde(rename = "lastCheck", alias = "lastCheckTime")]
    pub last_check_time: i64,

    /// End of the active cooldown; zero or past means none
    pub cooldown_until: i64,

    /// Number of cooldown activations
    pub total_blocked: u64,

    /// Recorded requests in insertion order
    pub history: Vec<HistoryEntry>,
}

impl WatchdogState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a cooldown is running at `now`
    pub fn in_cooldown(&self, now: i64) -> bool {
        now < self.cooldown_until
    }

    /// Whole seconds left in the cooldown, rounded up; zero when inactive
    pub fn cooldown_remaining_secs(&self, now: i64) -> u64 {
        if !self.in_cooldown(now) {
            return 0;
        }
        let remaining_ms = (self.cooldown_until - now) as u64;
        remaining_ms.div_ceil(1000)
    }

    /// Entries still inside the window ending at `now`
    pub fn window(&self, now: i64, window_ms: i64) -> impl Iterator<Item = &HistoryEntry> {
        let cutoff = now.saturating_sub(window_ms);
        self.history.iter().filter(move |entry| entry.time > cutoff)
    }

    /// Drop entries with `time <= now - window_ms`, keeping order
    ///
    /// Returns the number of entries removed.
    pub fn prune(&mut self, now: i64, window_ms: i64) -> usize {
        let cutoff = now.saturating_sub(window_ms);
        let before = self.history.len();
        self.history.retain(|entry| entry.time > cutoff);
        before - self.history.len()
    }

    /// Start (or extend) a cooldown ending at `until`
    ///
    /// The deadline never moves backwards.
    pub fn start_cooldown(&mut self, until: i64) {
        self.cooldown_until = self.cooldown_until.max(until);
        self.total_blocked += 1;
    }
}
