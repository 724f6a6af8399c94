//! Core sample types and collaborator traits for telemetryd
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern component interactions throughout the daemon. The traits are
//! the seams where production sources (procfs, sysfs, the metrics backend)
//! are swapped for fakes in tests.

use std::time::{Duration, Instant};

/// A single sample handed to the metrics backend.
///
/// `min`, `max` and `nbuckets` describe the requested bucketing range;
/// rendering the buckets is the backend's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub name: String,
    pub value: i64,
    pub min: i64,
    pub max: i64,
    pub nbuckets: u32,
    /// Linear/enumerated samples use one bucket per integer value.
    pub linear: bool,
}

/// Converts raw measurements into histogram samples for the metrics backend.
///
/// Implementations own no state; every call is a complete, self-contained
/// emission.
pub trait SampleSink: Send + Sync {
    /// Reports a log-scale histogram sample.
    fn send_sample(&self, name: &str, value: i64, min: i64, max: i64, nbuckets: u32);

    /// Reports a linear (enumerated) sample with one bucket per integer in
    /// `0..=max`.
    fn send_linear_sample(&self, name: &str, value: i64, max: i64, nbuckets: u32);
}

/// A monotonic clock that excludes device-suspended time.
///
/// "1 minute after boot" on this clock means 1 minute of awake time, which
/// is what the memory-use-at-age schedule needs.
pub trait ActiveClock: Send + Sync {
    /// Seconds of active (non-suspended) time since an arbitrary epoch.
    fn active_seconds(&self) -> f64;
}

/// Production [`ActiveClock`] backed by [`std::time::Instant`], which is
/// `CLOCK_MONOTONIC` on Linux and therefore stops during suspend.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveClock for MonotonicClock {
    fn active_seconds(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Supplies the device-lifetime cumulative CPU time.
///
/// The reading is monotonically non-decreasing; the stats tracker only ever
/// consumes deltas between consecutive calls. `None` means the source could
/// not be read this cycle, which skips the CPU delta for that update.
pub trait CpuUsageSource: Send + Sync {
    fn cumulative_cpu_use(&self) -> Option<Duration>;
}

/// Supplies a stable hash of the current OS version string, used only to
/// detect version changes across daemon starts.
pub trait VersionSource: Send + Sync {
    fn current_version_hash(&self) -> u32;
}
