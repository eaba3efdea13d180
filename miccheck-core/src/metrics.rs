//! Prometheus metrics for miccheck runs

use once_cell::sync::Lazy;
use prometheus::{
    opts, register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder,
    HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};

use crate::check::{Scope, TestStatus};

/// Test outcomes
static CHECK_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("miccheck_checks_total", "Total number of executed diagnostic tests"),
        &["check", "scope", "device", "result"]
    )
    .expect("Failed to create checks_total metric")
});

/// Probe duration histogram
static CHECK_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "miccheck_check_duration_seconds",
        "Duration of diagnostic tests",
        &["check", "scope"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to create check_duration metric")
});

static DEVICES_DETECTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(opts!(
        "miccheck_devices_detected",
        "Number of coprocessors detected on the host"
    ))
    .expect("Failed to create devices_detected metric")
});

static DEVICES_SELECTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(opts!(
        "miccheck_devices_selected",
        "Number of coprocessors selected for this run"
    ))
    .expect("Failed to create devices_selected metric")
});

/// 0 = OK, 1 = FAIL
static RUN_STATUS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(opts!("miccheck_run_status", "Overall status of the last run"))
        .expect("Failed to create run_status metric")
});

static LAST_RUN: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(opts!(
        "miccheck_last_run_timestamp_seconds",
        "Unix time the last run finished"
    ))
    .expect("Failed to create last_run metric")
});

/// Metrics registry wrapper
pub struct MetricsRegistry;

impl MetricsRegistry {
    pub fn new() -> Self {
        // Force initialization of lazy statics
        let _ = &*CHECK_RESULTS;
        let _ = &*CHECK_DURATION;
        let _ = &*DEVICES_DETECTED;
        let _ = &*DEVICES_SELECTED;
        let _ = &*RUN_STATUS;
        let _ = &*LAST_RUN;
        Self
    }

    pub fn set_devices_detected(&self, count: u32) {
        DEVICES_DETECTED.set(i64::from(count));
    }

    pub fn set_devices_selected(&self, count: usize) {
        DEVICES_SELECTED.set(count as i64);
    }

    /// Record one finished test; `device` is "host" for host tests
    pub fn record_check(
        &self,
        check: &str,
        scope: Scope,
        device: &str,
        status: TestStatus,
        duration_secs: f64,
    ) {
        let scope = scope.to_string();
        CHECK_RESULTS
            .with_label_values(&[check, &scope, device, &status.to_string()])
            .inc();
        CHECK_DURATION
            .with_label_values(&[check, &scope])
            .observe(duration_secs);
    }

    pub fn set_run_result(&self, ok: bool, finished_at: i64) {
        RUN_STATUS.set(if ok { 0 } else { 1 });
        LAST_RUN.set(finished_at);
    }

    /// Text exposition of every registered metric
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
