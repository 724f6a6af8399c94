//! Cycle tracking: stats-flush boundaries and OS-version resets.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{StatsTracker, SECONDS_PER_DAY};

impl StatsTracker {
    /// Compares the current OS version hash against the persisted
    /// `version.cycle`; on mismatch, resets exactly the four version-scoped
    /// counters. Idempotent for an unchanged hash. Runs once per daemon
    /// start, before any other processing.
    pub fn check_version_change(&mut self, version_hash: u32) {
        let version = i64::from(version_hash);
        if self.version_cycle.get() == version {
            return;
        }
        self.version_cycle.set(version);
        self.kernel_crashes_version_count.set(0);
        self.version_cumulative_active_use.set(0);
        self.version_cumulative_cpu_use.set(0);
        info!(version_hash, "OS version changed, version-scoped counters reset");
    }

    /// Folds elapsed active time and the CPU-time delta into the counters,
    /// then flushes the daily and weekly sample sets if the wall clock has
    /// crossed the respective boundary since the last flush.
    ///
    /// Called every update interval and opportunistically before any crash
    /// is accounted.
    pub fn update_stats(&mut self, now_active_seconds: f64, now_wall: DateTime<Utc>) {
        let elapsed_seconds = (now_active_seconds - self.last_update_active_seconds) as i64;
        self.daily_active_use.add(elapsed_seconds);
        self.version_cumulative_active_use.add(elapsed_seconds);
        // Each interval counter measures time since an event of its kind,
        // so all of them advance together regardless of which event last
        // fired.
        self.user_crash_interval.add(elapsed_seconds);
        self.kernel_crash_interval.add(elapsed_seconds);
        self.unclean_shutdown_interval.add(elapsed_seconds);

        if let Some(cpu_use) = self.cpu_source.cumulative_cpu_use() {
            if let Some(latest) = self.latest_cpu_use {
                let delta_ms = cpu_use.saturating_sub(latest).as_millis() as i64;
                self.version_cumulative_cpu_use.add(delta_ms);
            }
            self.latest_cpu_use = Some(cpu_use);
        }
        self.last_update_active_seconds = now_active_seconds;

        let day = now_wall.timestamp().div_euclid(SECONDS_PER_DAY);
        let week = day / 7;

        if self.daily_cycle.get() != day {
            self.daily_cycle.set(day);
            debug!(day, "daily boundary crossed, flushing daily counters");
            Self::send_and_reset_daily_use(&*self.sink, &mut self.daily_active_use);
            Self::send_and_reset_crash_frequency(&*self.sink, &mut self.any_crashes_daily_count);
            Self::send_and_reset_crash_frequency(&*self.sink, &mut self.user_crashes_daily_count);
            Self::send_and_reset_crash_frequency(&*self.sink, &mut self.kernel_crashes_daily_count);
            Self::send_and_reset_crash_frequency(
                &*self.sink,
                &mut self.unclean_shutdowns_daily_count,
            );
            self.send_version_cumulative_stats();
        }

        if self.weekly_cycle.get() != week {
            self.weekly_cycle.set(week);
            debug!(week, "weekly boundary crossed, flushing weekly counters");
            Self::send_and_reset_crash_frequency(&*self.sink, &mut self.any_crashes_weekly_count);
            Self::send_and_reset_crash_frequency(&*self.sink, &mut self.user_crashes_weekly_count);
            Self::send_and_reset_crash_frequency(&*self.sink, &mut self.kernel_crashes_weekly_count);
            Self::send_and_reset_crash_frequency(
                &*self.sink,
                &mut self.unclean_shutdowns_weekly_count,
            );
        }
    }

    /// Reports the version-scoped cumulative stats without clearing them;
    /// they are cleared only on a version change.
    fn send_version_cumulative_stats(&mut self) {
        let sink = Arc::clone(&self.sink);
        let crashes_count = self.kernel_crashes_version_count.get();
        sink.send_sample(
            self.kernel_crashes_version_count.name(),
            crashes_count,
            1,
            500,
            100,
        );

        let cpu_use_ms = self.version_cumulative_cpu_use.get();
        // The stat is reported in seconds; the device may be used very
        // little or a lot (a little over 90 days).
        sink.send_sample(
            self.version_cumulative_cpu_use.name(),
            cpu_use_ms / 1000,
            1,
            8_000_000,
            100,
        );

        // Right after an OS update both denominators can be zero.
        if cpu_use_ms > 0 {
            sink.send_sample(
                "Logging.KernelCrashesPerCpuYear",
                crashes_count * SECONDS_PER_DAY * 365 * 1000 / cpu_use_ms,
                1,
                1_000_000,
                100,
            );
        }

        let active_use_seconds = self.version_cumulative_active_use.get();
        if active_use_seconds > 0 {
            sink.send_sample(
                self.version_cumulative_active_use.name(),
                active_use_seconds,
                1,
                8_000_000,
                100,
            );
            sink.send_sample(
                "Logging.KernelCrashesPerActiveYear",
                crashes_count * SECONDS_PER_DAY * 365 / active_use_seconds,
                1,
                1_000_000,
                100,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedCpu, RecordingSink};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn wall(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn tracker(
        dir: &std::path::Path,
        sink: &Arc<RecordingSink>,
        cpu: &FixedCpu,
    ) -> StatsTracker {
        StatsTracker::new(dir, sink.clone(), Box::new(cpu.clone()), 0.0)
    }

    #[test]
    fn version_change_resets_exactly_the_version_scoped_counters() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let cpu = FixedCpu::new(Duration::ZERO);
        let mut t = tracker(dir.path(), &sink, &cpu);

        t.kernel_crashes_version_count.set(3);
        t.version_cumulative_active_use.set(100);
        t.version_cumulative_cpu_use.set(200);
        t.daily_active_use.set(50);
        t.kernel_crashes_daily_count.set(2);

        t.check_version_change(0xdead_beef);
        assert_eq!(t.version_cycle.get(), i64::from(0xdead_beef_u32));
        assert_eq!(t.kernel_crashes_version_count.get(), 0);
        assert_eq!(t.version_cumulative_active_use.get(), 0);
        assert_eq!(t.version_cumulative_cpu_use.get(), 0);
        // Untouched counters keep their values.
        assert_eq!(t.daily_active_use.get(), 50);
        assert_eq!(t.kernel_crashes_daily_count.get(), 2);
    }

    #[test]
    fn version_check_is_idempotent_for_same_hash() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let cpu = FixedCpu::new(Duration::ZERO);
        let mut t = tracker(dir.path(), &sink, &cpu);

        t.check_version_change(42);
        t.kernel_crashes_version_count.set(7);
        t.check_version_change(42);
        assert_eq!(t.kernel_crashes_version_count.get(), 7);
    }

    #[test]
    fn elapsed_time_advances_all_interval_counters() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let cpu = FixedCpu::new(Duration::from_millis(1000));
        let mut t = tracker(dir.path(), &sink, &cpu);
        // Stay inside one day so no flush fires.
        t.daily_cycle.set(wall(1000).timestamp() / SECONDS_PER_DAY);
        t.weekly_cycle.set(wall(1000).timestamp() / SECONDS_PER_DAY / 7);

        cpu.set(Duration::from_millis(3500));
        t.update_stats(90.0, wall(1000));

        assert_eq!(t.daily_active_use.get(), 90);
        assert_eq!(t.version_cumulative_active_use.get(), 90);
        assert_eq!(t.user_crash_interval.get(), 90);
        assert_eq!(t.kernel_crash_interval.get(), 90);
        assert_eq!(t.unclean_shutdown_interval.get(), 90);
        assert_eq!(t.version_cumulative_cpu_use.get(), 2500);
        assert!(sink.samples().is_empty());
    }

    #[test]
    fn daily_flush_fires_once_per_boundary() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let cpu = FixedCpu::new(Duration::ZERO);
        let mut t = tracker(dir.path(), &sink, &cpu);

        let day_start = 20_000 * SECONDS_PER_DAY;
        t.daily_cycle.set(20_000);
        t.weekly_cycle.set(20_000 / 7);

        // Several updates within the same day: no flush.
        t.update_stats(10.0, wall(day_start + 100));
        t.update_stats(20.0, wall(day_start + 200));
        assert!(sink.find("Platform.UseTime.PerDay").is_none());

        // Crossing into the next day flushes exactly once.
        t.update_stats(30.0, wall(day_start + SECONDS_PER_DAY + 100));
        let flushed = sink.find("Platform.UseTime.PerDay").unwrap();
        assert_eq!(flushed.value, 30);
        assert_eq!(t.daily_active_use.get(), 0);
        assert_eq!(t.daily_cycle.get(), 20_001);

        let count_before = sink.samples().len();
        t.update_stats(40.0, wall(day_start + SECONDS_PER_DAY + 200));
        assert_eq!(sink.samples().len(), count_before);
    }

    #[test]
    fn day_and_week_boundaries_can_fire_in_one_call() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let cpu = FixedCpu::new(Duration::ZERO);
        let mut t = tracker(dir.path(), &sink, &cpu);

        // Pretend the daemon last flushed long ago.
        t.daily_cycle.set(1);
        t.weekly_cycle.set(0);
        t.any_crashes_daily_count.set(2);
        t.any_crashes_weekly_count.set(5);

        t.update_stats(1.0, wall(20_000 * SECONDS_PER_DAY));

        assert_eq!(sink.find("Platform.AnyCrashes.PerDay").unwrap().value, 2);
        assert_eq!(sink.find("Platform.AnyCrashes.PerWeek").unwrap().value, 5);
        assert_eq!(t.daily_cycle.get(), 20_000);
        assert_eq!(t.weekly_cycle.get(), 20_000 / 7);
    }

    #[test]
    fn daily_flush_reports_version_stats_and_gated_ratios() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let cpu = FixedCpu::new(Duration::ZERO);
        let mut t = tracker(dir.path(), &sink, &cpu);

        t.weekly_cycle.set(20_000 / 7);
        t.daily_cycle.set(19_999);
        t.kernel_crashes_version_count.set(2);
        t.version_cumulative_cpu_use.set(86_400_000); // one CPU-day in ms
        t.version_cumulative_active_use.set(86_400); // one active day

        t.update_stats(0.0, wall(20_000 * SECONDS_PER_DAY));

        // Counts survive the flush; only the cycle markers gate it.
        assert_eq!(t.kernel_crashes_version_count.get(), 2);
        assert_eq!(
            sink.find("Platform.KernelCrashesSinceUpdate").unwrap().value,
            2
        );
        // 2 crashes over one CPU-day, scaled to a year.
        assert_eq!(
            sink.find("Logging.KernelCrashesPerCpuYear").unwrap().value,
            2 * 365
        );
        assert_eq!(
            sink.find("Logging.KernelCrashesPerActiveYear").unwrap().value,
            2 * 365
        );
    }

    #[test]
    fn zero_denominators_suppress_ratio_samples() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let cpu = FixedCpu::new(Duration::ZERO);
        let mut t = tracker(dir.path(), &sink, &cpu);

        t.weekly_cycle.set(20_000 / 7);
        t.daily_cycle.set(19_999);
        t.kernel_crashes_version_count.set(1);

        t.update_stats(0.0, wall(20_000 * SECONDS_PER_DAY));

        assert!(sink.find("Logging.KernelCrashesPerCpuYear").is_none());
        assert!(sink.find("Logging.KernelCrashesPerActiveYear").is_none());
        assert!(sink.find("Platform.CumulativeUseTime").is_none());
    }
}
