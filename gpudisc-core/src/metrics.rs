//! Prometheus metrics for GPU discovery

use once_cell::sync::Lazy;
use prometheus::{
    opts, register_histogram, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounterVec, IntGauge, IntGaugeVec,
};

/// Discovery passes by outcome (success, empty, failure)
static DISCOVERY_PASSES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("gpudisc_discovery_passes_total", "Total number of GPU discovery passes"),
        &["outcome"]
    )
    .expect("Failed to create discovery_passes metric")
});

/// Discovery pass duration histogram
static DISCOVERY_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "gpudisc_discovery_duration_seconds",
        "Duration of GPU discovery passes",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to create discovery_duration metric")
});

/// Number of GPUs in the last discovered snapshot
static DISCOVERED_GPU_COUNT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(opts!(
        "gpudisc_discovered_gpu_count",
        "Number of GPUs in the last discovered snapshot"
    ))
    .expect("Failed to create discovered_gpu_count metric")
});

/// Number of usable GPUs from the last query, by selection mode
static USABLE_GPU_COUNT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        opts!("gpudisc_usable_gpu_count", "Number of GPUs usable for assignment"),
        &["mode"]
    )
    .expect("Failed to create usable_gpu_count metric")
});

/// Outcome label for a discovery pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Pass found at least one GPU
    Success,
    /// Pass completed with no matching GPU
    Empty,
    /// Native enumeration failed
    Failure,
}

impl PassOutcome {
    fn as_label(&self) -> &'static str {
        match self {
            PassOutcome::Success => "success",
            PassOutcome::Empty => "empty",
            PassOutcome::Failure => "failure",
        }
    }
}

/// Metrics registry wrapper
pub struct MetricsRegistry;

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        // Force initialization of lazy statics
        let _ = &*DISCOVERY_PASSES;
        let _ = &*DISCOVERY_DURATION;
        let _ = &*DISCOVERED_GPU_COUNT;
        let _ = &*USABLE_GPU_COUNT;
        Self
    }

    /// Record a finished discovery pass
    pub fn observe_discovery(&self, outcome: PassOutcome, duration_secs: f64) {
        DISCOVERY_PASSES
            .with_label_values(&[outcome.as_label()])
            .inc();
        DISCOVERY_DURATION.observe(duration_secs);
    }

    /// Set the size of the cached snapshot
    pub fn set_discovered_gpu_count(&self, count: i64) {
        DISCOVERED_GPU_COUNT.set(count);
    }

    /// Set the usable GPU count for a selection mode
    pub fn set_usable_gpu_count(&self, mode: &str, count: i64) {
        USABLE_GPU_COUNT.with_label_values(&[mode]).set(count);
    }

    /// Prometheus text exposition of the default registry
    pub fn render(&self) -> String {
        prometheus::TextEncoder::new()
            .encode_to_string(&prometheus::gather())
            .unwrap_or_default()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
