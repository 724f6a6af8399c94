//! The production [`SampleSink`] backed by the `metrics` facade.
//!
//! Samples are recorded as histogram observations under their sample name;
//! bucket rendering is left to whichever recorder is installed (the
//! Prometheus exporter in production, the default no-op recorder when the
//! exporter is disabled).

use tracing::{trace, warn};

use crate::core::SampleSink;

#[derive(Debug, Default)]
pub struct MetricsSampleSink;

impl MetricsSampleSink {
    pub fn new() -> Self {
        Self
    }
}

impl SampleSink for MetricsSampleSink {
    fn send_sample(&self, name: &str, value: i64, min: i64, max: i64, nbuckets: u32) {
        trace!(name, value, min, max, nbuckets, "sample");
        metrics::histogram!(name.to_string()).record(value as f64);
    }

    fn send_linear_sample(&self, name: &str, value: i64, max: i64, nbuckets: u32) {
        // Linear samples dedicate one bucket per integer in 0..=max plus an
        // underflow bucket.
        if i64::from(nbuckets) != max + 1 {
            warn!(name, max, nbuckets, "unsupported histogram scale");
        }
        trace!(name, value, max, "linear sample");
        metrics::histogram!(name.to_string()).record(value as f64);
    }
}
