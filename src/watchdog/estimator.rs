//! Usage Estimator
//!
//! Estimates tokens per minute as the summed cost of the requests recorded in
//! the trailing window.

use serde::{Deserialize, Serialize};

use super::config::WatchdogConfig;
use super::state::WatchdogState;

/// Estimated usage at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEstimate {
    /// Estimated tokens per minute
    pub current: u64,

    /// Below threshold and outside any cooldown
    ///
    /// Informational only. The gate evaluates the cooldown itself before it
    /// looks at usage.
    pub allowed: bool,
}

impl UsageEstimate {
    /// Estimate used when the upstream signal is unavailable
    pub fn unknown() -> Self {
        Self {
            current: 0,
            allowed: true,
        }
    }
}

/// Sum of token costs inside the window ending at `now`
pub fn estimated_tpm(state: &WatchdogState, now: i64, config: &WatchdogConfig) -> u64 {
    state
        .window(now, config.window_millis())
        .map(|entry| entry.cost(config.default_request_tokens))
        .fold(0u64, u64::saturating_add)
}

/// Estimate usage for `state` at `now`
pub fn estimate(state: &WatchdogState, now: i64, config: &WatchdogConfig) -> UsageEstimate {
    let current = estimated_tpm(state, now, config);
    UsageEstimate {
        current,
        allowed: current < config.tpm_threshold && now > state.cooldown_until,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchdog::state::HistoryEntry;
    use proptest::prelude::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_empty_history() {
        let state = WatchdogState::new();
        let usage = estimate(&state, NOW, &WatchdogConfig::default());
        assert_eq!(usage.current, 0);
        assert!(usage.allowed);
    }

    #[test]
    fn test_missing_tokens_use_default_cost() {
        let mut state = WatchdogState::new();
        state.history.push(HistoryEntry {
            time: NOW - 1_000,
            tokens: None,
        });
        state.history.push(HistoryEntry::new(NOW - 500, 100));

        assert_eq!(estimated_tpm(&state, NOW, &WatchdogConfig::default()), 4_100);
    }

    #[test]
    fn test_zero_tokens_use_default_cost() {
        let mut state = WatchdogState::new();
        state.history.push(HistoryEntry::new(NOW - 1_000, 0));
        state.history.push(HistoryEntry::new(NOW - 500, 0));

        assert_eq!(estimated_tpm(&state, NOW, &WatchdogConfig::default()), 8_000);
    }

    #[test]
    fn test_expired_entries_ignored() {
        let mut state = WatchdogState::new();
        state.history.push(HistoryEntry::new(NOW - 60_000, 500_000));
        state.history.push(HistoryEntry::new(NOW - 59_999, 7));

        assert_eq!(estimated_tpm(&state, NOW, &WatchdogConfig::default()), 7);
    }

    #[test]
    fn test_threshold_is_inclusive_for_denial() {
        let config = WatchdogConfig::default().with_threshold(8_000);
        let mut state = WatchdogState::new();
        state.history.push(HistoryEntry::new(NOW, 4_000));
        assert!(estimate(&state, NOW, &config).allowed);

        state.history.push(HistoryEntry::new(NOW, 4_000));
        assert!(!estimate(&state, NOW, &config).allowed);
    }

    #[test]
    fn test_cooldown_disallows() {
        let mut state = WatchdogState::new();
        state.cooldown_until = NOW + 1;
        assert!(!estimate(&state, NOW, &WatchdogConfig::default()).allowed);

        // the projection needs now strictly past the deadline
        state.cooldown_until = NOW;
        assert!(!estimate(&state, NOW, &WatchdogConfig::default()).allowed);
        assert!(estimate(&state, NOW + 1, &WatchdogConfig::default()).allowed);
    }

    #[test]
    fn test_estimate_does_not_mutate() {
        let mut state = WatchdogState::new();
        state.history.push(HistoryEntry::new(0, 1));
        let before = state.clone();
        let _ = estimate(&state, NOW, &WatchdogConfig::default());
        assert_eq!(state, before);
    }

    proptest! {
        #[test]
        fn prop_estimate_is_windowed_sum(
            entries in proptest::collection::vec(
                (0i64..120_000, proptest::option::of(1u64..10_000)),
                0..64,
            ),
        ) {
            let now = 120_000;
            let config = WatchdogConfig::default();
            let mut state = WatchdogState::new();
            state.history = entries
                .iter()
                .map(|&(time, tokens)| HistoryEntry { time, tokens })
                .collect();

            let expected: u64 = entries
                .iter()
                .filter(|(time, _)| *time > now - 60_000)
                .map(|(_, tokens)| tokens.unwrap_or(4_000))
                .sum();
            prop_assert_eq!(estimated_tpm(&state, now, &config), expected);
        }

        #[test]
        fn prop_adding_in_window_entry_adds_its_tokens(
            times in proptest::collection::vec(0i64..120_000, 0..32),
            offset in 0i64..60_000,
            tokens in 1u64..50_000,
        ) {
            let now = 120_000;
            let config = WatchdogConfig::default();
            let mut state = WatchdogState::new();
            state.history = times.iter().map(|&t| HistoryEntry::new(t, 1_000)).collect();

            let before = estimated_tpm(&state, now, &config);
            state.history.push(HistoryEntry::new(now - offset, tokens));
            prop_assert_eq!(estimated_tpm(&state, now, &config), before + tokens);
        }
    }
}
