//! Token Watchdog Library
//!
//! Admission control for callers of a tokens-per-minute limited LLM API:
//! a sliding-window usage estimator, a threshold/cooldown gate, and the
//! persisted state they share.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod watchdog;

pub use config::Config;
pub use watchdog::{AdmissionGate, JsonFileStore, Verdict, WatchdogConfig};
