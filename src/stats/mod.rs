//! The stats aggregation and persistence core.
//!
//! [`StatsTracker`] is the one explicit aggregate owning every persistent
//! counter plus the collaborator handles that feed them. It is constructed
//! once at daemon start and driven by the scheduler; no other component
//! duplicates counter storage. Cycle (daily / weekly / per-version) logic
//! lives in [`cycle`], crash accounting in [`crash`].

pub mod crash;
pub mod cycle;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{CpuUsageSource, SampleSink};
use crate::persist::PersistentCounter;

pub(crate) const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
pub(crate) const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;

/// Owns every tracked counter and the collaborators that update them.
pub struct StatsTracker {
    pub(crate) sink: Arc<dyn SampleSink>,
    pub(crate) cpu_source: Box<dyn CpuUsageSource>,

    pub(crate) daily_active_use: PersistentCounter,
    pub(crate) version_cumulative_active_use: PersistentCounter,
    pub(crate) version_cumulative_cpu_use: PersistentCounter,

    pub(crate) kernel_crash_interval: PersistentCounter,
    pub(crate) unclean_shutdown_interval: PersistentCounter,
    pub(crate) user_crash_interval: PersistentCounter,

    pub(crate) any_crashes_daily_count: PersistentCounter,
    pub(crate) any_crashes_weekly_count: PersistentCounter,
    pub(crate) user_crashes_daily_count: PersistentCounter,
    pub(crate) user_crashes_weekly_count: PersistentCounter,
    pub(crate) kernel_crashes_daily_count: PersistentCounter,
    pub(crate) kernel_crashes_weekly_count: PersistentCounter,
    pub(crate) kernel_crashes_version_count: PersistentCounter,
    pub(crate) unclean_shutdowns_daily_count: PersistentCounter,
    pub(crate) unclean_shutdowns_weekly_count: PersistentCounter,

    pub(crate) daily_cycle: PersistentCounter,
    pub(crate) weekly_cycle: PersistentCounter,
    pub(crate) version_cycle: PersistentCounter,

    pub(crate) last_update_active_seconds: f64,
    pub(crate) latest_cpu_use: Option<Duration>,
}

impl StatsTracker {
    /// Builds the aggregate against a state directory. The first
    /// `update_stats` call uses `start_active_seconds` (daemon start) as
    /// its elapsed-time baseline.
    pub fn new(
        state_dir: &Path,
        sink: Arc<dyn SampleSink>,
        cpu_source: Box<dyn CpuUsageSource>,
        start_active_seconds: f64,
    ) -> Self {
        let counter = |name: &str| PersistentCounter::new(state_dir, name);
        let latest_cpu_use = cpu_source.cumulative_cpu_use();
        Self {
            sink,
            cpu_source,
            daily_active_use: counter("Platform.UseTime.PerDay"),
            version_cumulative_active_use: counter("Platform.CumulativeUseTime"),
            version_cumulative_cpu_use: counter("Platform.CumulativeCpuTime"),
            kernel_crash_interval: counter("Platform.KernelCrashInterval"),
            unclean_shutdown_interval: counter("Platform.UncleanShutdownInterval"),
            user_crash_interval: counter("Platform.UserCrashInterval"),
            any_crashes_daily_count: counter("Platform.AnyCrashes.PerDay"),
            any_crashes_weekly_count: counter("Platform.AnyCrashes.PerWeek"),
            user_crashes_daily_count: counter("Platform.UserCrashes.PerDay"),
            user_crashes_weekly_count: counter("Platform.UserCrashes.PerWeek"),
            kernel_crashes_daily_count: counter("Platform.KernelCrashes.PerDay"),
            kernel_crashes_weekly_count: counter("Platform.KernelCrashes.PerWeek"),
            kernel_crashes_version_count: counter("Platform.KernelCrashesSinceUpdate"),
            unclean_shutdowns_daily_count: counter("Platform.UncleanShutdowns.PerDay"),
            unclean_shutdowns_weekly_count: counter("Platform.UncleanShutdowns.PerWeek"),
            daily_cycle: counter("daily.cycle"),
            weekly_cycle: counter("weekly.cycle"),
            version_cycle: counter("version.cycle"),
            last_update_active_seconds: start_active_seconds,
            latest_cpu_use,
        }
    }

    /// Flushes a daily active-use counter as a sample and resets it.
    pub(crate) fn send_and_reset_daily_use(sink: &dyn SampleSink, use_time: &mut PersistentCounter) {
        let value = use_time.get_and_clear();
        sink.send_sample(use_time.name(), value, 1, SECONDS_PER_DAY, 50);
    }

    /// Flushes a time-to-failure interval counter as a sample and resets it.
    pub(crate) fn send_and_reset_crash_interval(
        sink: &dyn SampleSink,
        interval: &mut PersistentCounter,
    ) {
        let value = interval.get_and_clear();
        sink.send_sample(interval.name(), value, 1, 4 * SECONDS_PER_WEEK, 50);
    }

    /// Flushes a daily/weekly crash frequency counter and resets it.
    pub(crate) fn send_and_reset_crash_frequency(
        sink: &dyn SampleSink,
        frequency: &mut PersistentCounter,
    ) {
        let value = frequency.get_and_clear();
        sink.send_sample(frequency.name(), value, 1, 100, 50);
    }
}
