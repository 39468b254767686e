//! Token Watchdog Module
//!
//! Admission control in front of a tokens-per-minute limited API. Recent
//! consumption is estimated from a local request log; when the estimate
//! reaches the threshold the gate starts a fixed cooldown during which every
//! check is denied.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Admission Gate                          │
//! │     check_before_request / record_request / get_status       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐   ┌──────────────────────────┐    │
//! │  │   Usage Estimator    │   │  Clock (system / manual) │    │
//! │  │  60s trailing window │   │                          │    │
//! │  └──────────────────────┘   └──────────────────────────┘    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │        State Store (JSON file / in-memory)           │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Separate processes sharing one state file are not coordinated; the last
//! writer wins. Within a process, [`WatchdogService`] serializes access.

pub mod clock;
pub mod config;
pub mod error;
pub mod estimator;
pub mod gate;
pub mod probe;
pub mod service;
pub mod state;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::WatchdogConfig;
pub use error::{ServiceError, StoreError};
pub use estimator::UsageEstimate;
pub use gate::{
    AdmissionGate, CheckReport, Denial, DenyReason, GateStatus, Outcome, RecordReceipt, Verdict,
};
pub use probe::{CommandProbe, UsageProbe};
pub use service::{WatchdogHandle, WatchdogService};
pub use state::{HistoryEntry, WatchdogState};
pub use store::{JsonFileStore, MemoryStore, StateStore};
