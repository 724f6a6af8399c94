//! Test fakes for the collaborator traits.
//!
//! Shipped behind the `test-utils` feature so integration tests can share
//! the same fakes as the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::{ActiveClock, CpuUsageSource, Sample, SampleSink, VersionSource};

/// A [`SampleSink`] that records every sample for later inspection.
#[derive(Default)]
pub struct RecordingSink {
    samples: Mutex<Vec<Sample>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All samples recorded so far, in emission order.
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().unwrap().clone()
    }

    /// The first recorded sample with the given name.
    pub fn find(&self, name: &str) -> Option<Sample> {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }
}

impl SampleSink for RecordingSink {
    fn send_sample(&self, name: &str, value: i64, min: i64, max: i64, nbuckets: u32) {
        self.samples.lock().unwrap().push(Sample {
            name: name.to_string(),
            value,
            min,
            max,
            nbuckets,
            linear: false,
        });
    }

    fn send_linear_sample(&self, name: &str, value: i64, max: i64, nbuckets: u32) {
        self.samples.lock().unwrap().push(Sample {
            name: name.to_string(),
            value,
            min: 1,
            max,
            nbuckets,
            linear: true,
        });
    }
}

/// A [`CpuUsageSource`] returning a settable fixed reading.
#[derive(Clone)]
pub struct FixedCpu {
    reading: Arc<Mutex<Duration>>,
}

impl FixedCpu {
    pub fn new(reading: Duration) -> Self {
        Self {
            reading: Arc::new(Mutex::new(reading)),
        }
    }

    pub fn set(&self, reading: Duration) {
        *self.reading.lock().unwrap() = reading;
    }
}

impl CpuUsageSource for FixedCpu {
    fn cumulative_cpu_use(&self) -> Option<Duration> {
        Some(*self.reading.lock().unwrap())
    }
}

/// An [`ActiveClock`] that only moves when told to.
#[derive(Clone)]
pub struct FixedClock {
    seconds: Arc<Mutex<f64>>,
}

impl FixedClock {
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds: Arc::new(Mutex::new(seconds)),
        }
    }

    pub fn set(&self, seconds: f64) {
        *self.seconds.lock().unwrap() = seconds;
    }
}

impl ActiveClock for FixedClock {
    fn active_seconds(&self) -> f64 {
        *self.seconds.lock().unwrap()
    }
}

/// A [`VersionSource`] reporting a constant hash.
pub struct FixedVersion(pub u32);

impl VersionSource for FixedVersion {
    fn current_version_hash(&self) -> u32 {
        self.0
    }
}
