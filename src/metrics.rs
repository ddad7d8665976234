//! Prometheus metrics for a gate run
//!
//! A CI gate is a short-lived process, so nothing is served over HTTP.
//! The registry is written once at exit in the node-exporter textfile
//! format when a metrics file is configured.

use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::path::Path;

/// Phase label for the membership wait
pub const PHASE_MEMBERSHIP: &str = "membership";
/// Phase label for the health-check wait
pub const PHASE_HEALTH: &str = "health";

/// Attempt result: condition met
pub const RESULT_SATISFIED: &str = "satisfied";
/// Attempt result: catalog answered, condition not met
pub const RESULT_UNMET: &str = "unmet";
/// Attempt result: catalog query failed
pub const RESULT_ERROR: &str = "error";

/// Metrics registry for one gate run
#[derive(Clone)]
pub struct GateMetrics {
    registry: Registry,
    /// Poll attempts by phase and result
    pub attempts_total: IntCounterVec,
    /// Wall time spent in each phase
    pub phase_duration_seconds: HistogramVec,
    /// Target services missing at the last membership attempt
    pub missing_services: IntGauge,
    /// Failing health checks at the last health attempt
    pub failing_checks: IntGauge,
}

impl GateMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let attempts_total = IntCounterVec::new(
            Opts::new("svcgate_attempts_total", "Total number of poll attempts"),
            &["phase", "result"],
        )?;
        registry.register(Box::new(attempts_total.clone()))?;

        let phase_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "svcgate_phase_duration_seconds",
                "Time spent waiting in each phase in seconds",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]),
            &["phase"],
        )?;
        registry.register(Box::new(phase_duration_seconds.clone()))?;

        let missing_services = IntGauge::new(
            "svcgate_missing_services",
            "Target services not registered at the last attempt",
        )?;
        registry.register(Box::new(missing_services.clone()))?;

        let failing_checks = IntGauge::new(
            "svcgate_failing_checks",
            "Health checks not passing at the last attempt",
        )?;
        registry.register(Box::new(failing_checks.clone()))?;

        Ok(Self {
            registry,
            attempts_total,
            phase_duration_seconds,
            missing_services,
            failing_checks,
        })
    }

    pub fn record_attempt(&self, phase: &str, result: &str) {
        self.attempts_total.with_label_values(&[phase, result]).inc();
    }

    pub fn observe_phase_duration(&self, phase: &str, duration_secs: f64) {
        self.phase_duration_seconds
            .with_label_values(&[phase])
            .observe(duration_secs);
    }

    pub fn set_missing_services(&self, count: usize) {
        self.missing_services.set(count as i64);
    }

    pub fn set_failing_checks(&self, count: usize) {
        self.failing_checks.set(count as i64);
    }

    /// Encode all metrics to Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
        })
    }

    /// Write the encoded registry to `path`
    ///
    /// Writes a sibling temp file first and renames it over `path`, so a
    /// collector never reads a half-written file.
    pub fn write_textfile(&self, path: &Path) -> Result<(), prometheus::Error> {
        let body = self.encode()?;
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "metrics_test.rs"]
mod tests;
