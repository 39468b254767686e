//! Admission Gate
//!
//! The decision procedure run before each outbound request and the recording
//! procedure run after one. Every operation loads the state, works on it in
//! memory and flushes it back before returning. Store failures never reach
//! the caller: they degrade to defaults and are reported in [`Outcome`].

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::config::WatchdogConfig;
use super::error::StoreError;
use super::estimator::{self, UsageEstimate};
use super::probe::UsageProbe;
use super::state::{HistoryEntry, WatchdogState};
use super::store::StateStore;
use crate::metrics;

/// Value produced by a gate operation, plus any store faults it absorbed
#[derive(Debug)]
pub struct Outcome<T> {
    /// The operation's result
    pub value: T,

    /// Store failures that were recovered from (load fell back to defaults,
    /// save was skipped)
    pub faults: Vec<StoreError>,
}

impl<T> Outcome<T> {
    fn new(value: T, faults: Vec<StoreError>) -> Self {
        Self { value, faults }
    }

    /// Whether the operation ran on degraded store access
    pub fn is_degraded(&self) -> bool {
        !self.faults.is_empty()
    }

    /// Discard fault information
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Machine-readable denial reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    /// A cooldown is running
    CooldownActive,
    /// This check crossed the threshold and started a cooldown
    ThresholdExceeded,
}

impl DenyReason {
    /// Wire code
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::CooldownActive => "COOLDOWN_ACTIVE",
            DenyReason::ThresholdExceeded => "THRESHOLD_EXCEEDED",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// Rejected because an earlier breach is still cooling down
    CooldownActive { remaining_seconds: u64 },

    /// Rejected because estimated usage reached the threshold
    ThresholdExceeded {
        current_tpm: u64,
        threshold: u64,
        cooldown_seconds: u64,
    },
}

impl Denial {
    pub fn reason(&self) -> DenyReason {
        match self {
            Denial::CooldownActive { .. } => DenyReason::CooldownActive,
            Denial::ThresholdExceeded { .. } => DenyReason::ThresholdExceeded,
        }
    }

    /// Human-readable explanation
    pub fn message(&self) -> String {
        match self {
            Denial::CooldownActive { remaining_seconds } => format!(
                "Token usage limit reached. Try again in {} seconds.",
                remaining_seconds
            ),
            Denial::ThresholdExceeded {
                current_tpm,
                threshold,
                cooldown_seconds,
            } => format!(
                "Token usage is approaching {} ({}). Starting a {} second cooldown.",
                group_thousands(*threshold),
                group_thousands(*current_tpm),
                cooldown_seconds
            ),
        }
    }
}

/// Admission verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The request may proceed
    Allow { current_tpm: u64 },
    /// The request must not be sent
    Deny(Denial),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow { .. })
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Verdict::Allow { .. } => None,
            Verdict::Deny(denial) => Some(denial),
        }
    }

    /// Flat report for structured output
    pub fn report(&self) -> CheckReport {
        match self {
            Verdict::Allow { current_tpm } => CheckReport {
                allowed: true,
                current_tpm: Some(*current_tpm),
                ..CheckReport::default()
            },
            Verdict::Deny(denial) => {
                let mut report = CheckReport {
                    allowed: false,
                    reason: Some(denial.reason()),
                    message: Some(denial.message()),
                    ..CheckReport::default()
                };
                match denial {
                    Denial::CooldownActive { remaining_seconds } => {
                        report.remaining_seconds = Some(*remaining_seconds);
                    }
                    Denial::ThresholdExceeded {
                        current_tpm,
                        cooldown_seconds,
                        ..
                    } => {
                        report.current_tpm = Some(*current_tpm);
                        report.cooldown_seconds = Some(*cooldown_seconds);
                    }
                }
                report
            }
        }
    }
}

/// Serialized form of a [`Verdict`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub allowed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,

    #[serde(rename = "currentTPM", skip_serializing_if = "Option::is_none")]
    pub current_tpm: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_seconds: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Acknowledgement of a recorded request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReceipt {
    pub recorded: bool,
    pub tokens: u64,
}

/// Read-only snapshot of the gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStatus {
    /// Estimated tokens per minute
    #[serde(rename = "currentTPM")]
    pub current_tpm: u64,

    /// Cooldown trigger point
    pub threshold: u64,

    /// Downstream quota
    pub limit: u64,

    /// `current_tpm` as a percentage of `limit`, e.g. `"92.0%"`
    pub utilization: String,

    pub in_cooldown: bool,

    /// Seconds left in the cooldown, 0 when inactive
    pub cooldown_remaining: u64,

    pub total_blocked: u64,

    /// Stored history length (may include entries that have expired since
    /// the last recording)
    pub recent_requests: usize,
}

/// The admission gate
///
/// Generic over its store and clock so tests can run against
/// [`MemoryStore`](super::store::MemoryStore) and
/// [`ManualClock`](super::clock::ManualClock).
#[derive(Debug, Clone)]
pub struct AdmissionGate<S, C = SystemClock> {
    config: WatchdogConfig,
    store: S,
    clock: C,
}

impl<S: StateStore> AdmissionGate<S, SystemClock> {
    /// Create a gate reading the system clock
    pub fn new(config: WatchdogConfig, store: S) -> Self {
        Self::with_clock(config, store, SystemClock)
    }
}

impl<S: StateStore, C: Clock> AdmissionGate<S, C> {
    /// Create a gate with an explicit time source
    pub fn with_clock(config: WatchdogConfig, store: S, clock: C) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Decide whether the next request may be sent
    ///
    /// The cooldown check runs first; usage is only estimated once any
    /// running cooldown has expired. Only a fresh threshold breach writes
    /// state.
    pub fn check_before_request(&self) -> Outcome<Verdict> {
        let now = self.clock.now_millis();
        let mut faults = Vec::new();
        let mut state = self.load_state(&mut faults);

        if state.in_cooldown(now) {
            let remaining_seconds = state.cooldown_remaining_secs(now);
            debug!(remaining_seconds, "Request denied, cooldown active");
            metrics::record_check(DenyReason::CooldownActive.as_str());
            return Outcome::new(
                Verdict::Deny(Denial::CooldownActive { remaining_seconds }),
                faults,
            );
        }

        let usage = estimator::estimate(&state, now, &self.config);
        metrics::ESTIMATED_TPM.set(gauge_value(usage.current));

        if usage.current >= self.config.tpm_threshold {
            state.start_cooldown(now.saturating_add(self.config.cooldown_millis()));
            self.save_state(&state, &mut faults);

            warn!(
                current_tpm = usage.current,
                threshold = self.config.tpm_threshold,
                cooldown_seconds = self.config.cooldown_seconds,
                total_blocked = state.total_blocked,
                "TPM threshold reached: {}/{}. Cooldown started.",
                usage.current,
                self.config.tpm_threshold
            );
            metrics::THRESHOLD_BREACHES_TOTAL.inc();
            metrics::record_check(DenyReason::ThresholdExceeded.as_str());

            return Outcome::new(
                Verdict::Deny(Denial::ThresholdExceeded {
                    current_tpm: usage.current,
                    threshold: self.config.tpm_threshold,
                    cooldown_seconds: self.config.cooldown_seconds,
                }),
                faults,
            );
        }

        metrics::record_check("allowed");
        Outcome::new(
            Verdict::Allow {
                current_tpm: usage.current,
            },
            faults,
        )
    }

    /// Record one observed request costing `tokens`
    ///
    /// A zero count is recorded as the default request cost.
    /// Expired entries are evicted before appending so the stored history
    /// stays bounded by the window.
    pub fn record_request(&self, tokens: u64) -> Outcome<RecordReceipt> {
        let tokens = if tokens == 0 {
            self.config.default_request_tokens
        } else {
            tokens
        };
        let now = self.clock.now_millis();
        let mut faults = Vec::new();
        let mut state = self.load_state(&mut faults);

        let evicted = state.prune(now, self.config.window_millis());
        state.history.push(HistoryEntry::new(now, tokens));
        state.last_check_time = now;
        self.save_state(&state, &mut faults);

        debug!(
            tokens,
            evicted,
            history_len = state.history.len(),
            "Recorded request"
        );
        metrics::RECORDED_TOKENS_TOTAL.inc_by(tokens);

        Outcome::new(
            RecordReceipt {
                recorded: true,
                tokens,
            },
            faults,
        )
    }

    /// Record one request at the configured default cost
    pub fn record_default_request(&self) -> Outcome<RecordReceipt> {
        self.record_request(self.config.default_request_tokens)
    }

    /// Current usage estimate; never writes
    pub fn estimate_token_usage(&self) -> Outcome<UsageEstimate> {
        let now = self.clock.now_millis();
        let mut faults = Vec::new();
        let state = self.load_state(&mut faults);
        Outcome::new(estimator::estimate(&state, now, &self.config), faults)
    }

    /// Consult the upstream probe, then estimate
    ///
    /// A failing probe degrades to an "allowed, zero usage" estimate rather
    /// than blocking callers.
    pub async fn check_token_usage<P>(&self, probe: &P) -> Outcome<UsageEstimate>
    where
        P: UsageProbe + ?Sized,
    {
        if let Err(e) = probe.query().await {
            warn!("Token check error: {:#}", e);
            return Outcome::new(UsageEstimate::unknown(), Vec::new());
        }
        self.estimate_token_usage()
    }

    /// Read-only status projection; never writes
    pub fn get_status(&self) -> Outcome<GateStatus> {
        let now = self.clock.now_millis();
        let mut faults = Vec::new();
        let state = self.load_state(&mut faults);
        let usage = estimator::estimate(&state, now, &self.config);

        let status = GateStatus {
            current_tpm: usage.current,
            threshold: self.config.tpm_threshold,
            limit: self.config.tpm_limit,
            utilization: utilization(usage.current, self.config.tpm_limit),
            in_cooldown: state.in_cooldown(now),
            cooldown_remaining: state.cooldown_remaining_secs(now),
            total_blocked: state.total_blocked,
            recent_requests: state.history.len(),
        };
        Outcome::new(status, faults)
    }

    fn load_state(&self, faults: &mut Vec<StoreError>) -> WatchdogState {
        match self.store.load() {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!("No persisted watchdog state, starting fresh");
                WatchdogState::default()
            }
            Err(e) => {
                warn!("State load error: {}", e);
                metrics::record_store_fault("load");
                faults.push(e);
                WatchdogState::default()
            }
        }
    }

    fn save_state(&self, state: &WatchdogState, faults: &mut Vec<StoreError>) {
        if let Err(e) = self.store.save(state) {
            warn!("State save error: {}", e);
            metrics::record_store_fault("save");
            faults.push(e);
        }
    }
}

fn utilization(current: u64, limit: u64) -> String {
    if limit == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", current as f64 / limit as f64 * 100.0)
}

fn gauge_value(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// `1234567` -> `"1,234,567"`
fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
