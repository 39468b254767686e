// Prometheus metrics for the token watchdog
//
// - Admission checks by outcome (counter)
// - Threshold breaches (counter)
// - Recorded tokens (counter)
// - Store faults by operation (counter)
// - Estimated tokens per minute (gauge)

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::{Arc, Once};

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref ADMISSION_CHECKS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("watchdog_admission_checks_total", "Admission checks by outcome"),
        &["outcome"]
    ).expect("Failed to create admission checks metric");

    pub static ref THRESHOLD_BREACHES_TOTAL: IntCounter = IntCounter::new(
        "watchdog_threshold_breaches_total",
        "Cooldowns started because estimated usage reached the threshold"
    ).expect("Failed to create threshold breaches metric");

    pub static ref RECORDED_TOKENS_TOTAL: IntCounter = IntCounter::new(
        "watchdog_recorded_tokens_total",
        "Tokens recorded through record_request"
    ).expect("Failed to create recorded tokens metric");

    pub static ref STORE_FAULTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "watchdog_store_faults_total",
            "State store failures absorbed by the gate"
        ),
        &["operation"]
    ).expect("Failed to create store faults metric");

    pub static ref ESTIMATED_TPM: IntGauge = IntGauge::new(
        "watchdog_estimated_tpm",
        "Most recent estimated tokens per minute"
    ).expect("Failed to create estimated TPM metric");
}

static INIT: Once = Once::new();

/// Register all watchdog metrics; later calls are no-ops
pub fn init() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(ADMISSION_CHECKS_TOTAL.clone()),
            Box::new(THRESHOLD_BREACHES_TOTAL.clone()),
            Box::new(RECORDED_TOKENS_TOTAL.clone()),
            Box::new(STORE_FAULTS_TOTAL.clone()),
            Box::new(ESTIMATED_TPM.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::warn!("Failed to register metric: {}", e);
            }
        }
    });
}

pub(crate) fn record_check(outcome: &str) {
    ADMISSION_CHECKS_TOTAL.with_label_values(&[outcome]).inc();
}

pub(crate) fn record_store_fault(operation: &str) {
    STORE_FAULTS_TOTAL.with_label_values(&[operation]).inc();
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    init();
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
