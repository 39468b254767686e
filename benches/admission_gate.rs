use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::time::Duration;
use token_watchdog::watchdog::estimator;
use token_watchdog::watchdog::{
    AdmissionGate, HistoryEntry, ManualClock, MemoryStore, WatchdogConfig, WatchdogState,
};

const NOW: i64 = 1_700_000_000_000;

fn history_of(len: usize) -> WatchdogState {
    let mut state = WatchdogState::new();
    // half the entries expired, half inside the window
    state.history = (0..len)
        .map(|i| HistoryEntry::new(NOW - 120_000 + (i as i64 * 120_000 / len.max(1) as i64), 4000))
        .collect();
    state
}

fn bench_estimator(c: &mut Criterion) {
    let config = WatchdogConfig::default();
    let mut group = c.benchmark_group("estimate");
    for len in [10usize, 250, 5_000] {
        let state = history_of(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &state, |b, state| {
            b.iter(|| black_box(estimator::estimate(black_box(state), NOW, &config)));
        });
    }
    group.finish();
}

fn bench_gate(c: &mut Criterion) {
    // Threshold above anything the bench records, so checks stay on the allow path
    let config = WatchdogConfig {
        tpm_limit: u64::MAX,
        tpm_threshold: u64::MAX,
        ..WatchdogConfig::default()
    };
    let store = MemoryStore::with_state(history_of(250));
    let clock = ManualClock::new(NOW);
    let gate = AdmissionGate::with_clock(config, store, clock.clone());

    c.bench_function("gate_check_before_request", |b| {
        b.iter(|| black_box(gate.check_before_request()));
    });

    c.bench_function("gate_record_request", |b| {
        b.iter(|| {
            // keeps roughly 600 entries inside the window
            clock.advance(Duration::from_millis(100));
            black_box(gate.record_request(4000))
        });
    });
}

criterion_group!(benches, bench_estimator, bench_gate);
criterion_main!(benches);
