use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use relay_worker::DrainReport;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("relay_requests_total", "Inbound requests by enqueue outcome"),
        &["outcome"],
    )
    .expect("valid metric definition")
});

pub static DELIVERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("relay_deliveries_total", "Delivery attempts by result"),
        &["result"],
    )
    .expect("valid metric definition")
});

pub static DRAIN_CYCLES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("relay_drain_cycles_total", "Drain cycles run").expect("valid metric definition")
});

pub static DRAIN_CYCLES_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "relay_drain_cycles_skipped_total",
        "Drain cycles skipped because the downstream was unreachable",
    )
    .expect("valid metric definition")
});

pub fn init_metrics() {
    // Ignore errors if called multiple times (common in tests)
    let _ = REGISTRY.register(Box::new(REQUESTS.clone()));
    let _ = REGISTRY.register(Box::new(DELIVERIES.clone()));
    let _ = REGISTRY.register(Box::new(DRAIN_CYCLES.clone()));
    let _ = REGISTRY.register(Box::new(DRAIN_CYCLES_SKIPPED.clone()));
}

pub fn record_drain(report: &DrainReport) {
    DRAIN_CYCLES.inc();
    if report.downstream_down {
        DRAIN_CYCLES_SKIPPED.inc();
    }
    for (result, n) in [
        ("delivered", report.delivered),
        ("duplicate", report.duplicates),
        ("retried", report.retried),
        ("failed", report.failed),
    ] {
        if n > 0 {
            DELIVERIES.with_label_values(&[result]).inc_by(n as u64);
        }
    }
}

pub fn gather() -> String {
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buf) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8(buf).unwrap_or_default()
}
