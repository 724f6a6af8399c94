//! Crash accounting.
//!
//! Every event handler follows the same protocol: fold elapsed time up to
//! "now" into the counters, flush-and-reset the interval-since-last-event
//! counter for this event kind (the time-to-failure sample), then bump the
//! daily and weekly frequency counters. Kernel crashes additionally count
//! against the current OS version epoch.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::StatsTracker;

impl StatsTracker {
    /// Accounts a user-space crash reported by the crash-signal
    /// collaborator while the daemon is live.
    pub fn process_user_crash(&mut self, now_active_seconds: f64, now_wall: DateTime<Utc>) {
        self.update_stats(now_active_seconds, now_wall);
        Self::send_and_reset_crash_interval(&*self.sink, &mut self.user_crash_interval);
        self.any_crashes_daily_count.add(1);
        self.any_crashes_weekly_count.add(1);
        self.user_crashes_daily_count.add(1);
        self.user_crashes_weekly_count.add(1);
    }

    /// Accounts a kernel crash detected via the boot-time marker.
    pub fn process_kernel_crash(&mut self, now_active_seconds: f64, now_wall: DateTime<Utc>) {
        self.update_stats(now_active_seconds, now_wall);
        Self::send_and_reset_crash_interval(&*self.sink, &mut self.kernel_crash_interval);
        self.any_crashes_daily_count.add(1);
        self.any_crashes_weekly_count.add(1);
        self.kernel_crashes_daily_count.add(1);
        self.kernel_crashes_weekly_count.add(1);
        // Not reset until the next OS version change.
        self.kernel_crashes_version_count.add(1);
    }

    /// Accounts an unclean shutdown detected via the boot-time marker.
    pub fn process_unclean_shutdown(&mut self, now_active_seconds: f64, now_wall: DateTime<Utc>) {
        self.update_stats(now_active_seconds, now_wall);
        Self::send_and_reset_crash_interval(&*self.sink, &mut self.unclean_shutdown_interval);
        self.any_crashes_daily_count.add(1);
        self.any_crashes_weekly_count.add(1);
        self.unclean_shutdowns_daily_count.add(1);
        self.unclean_shutdowns_weekly_count.add(1);
    }

    /// Consumes a boot-time marker left by the external reporter.
    ///
    /// The marker is deleted before the caller accounts the event so a
    /// restarted daemon cannot report the same event twice. Deletion is
    /// best-effort at-most-once, not transactional.
    pub fn consume_boot_marker(marker_path: &Path) -> bool {
        if !marker_path.exists() {
            return false;
        }
        if let Err(e) = fs::remove_file(marker_path) {
            warn!(path = %marker_path.display(), error = %e, "failed to delete boot marker");
        }
        info!(path = %marker_path.display(), "boot marker consumed");
        true
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

    fn quiet_tracker(dir: &std::path::Path, sink: &Arc<RecordingSink>) -> StatsTracker {
        let cpu = FixedCpu::new(Duration::ZERO);
        let mut t = StatsTracker::new(dir, sink.clone(), Box::new(cpu), 0.0);
        // Park the cycle markers on the test's day so no flush interferes.
        t.daily_cycle.set(20_000);
        t.weekly_cycle.set(20_000 / 7);
        t
    }

    fn test_day_wall(offset: i64) -> DateTime<Utc> {
        wall(20_000 * super::super::SECONDS_PER_DAY + offset)
    }

    #[test]
    fn kernel_crash_flushes_interval_and_bumps_counts() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let mut t = quiet_tracker(dir.path(), &sink);

        t.process_kernel_crash(120.0, test_day_wall(100));

        // The interval sample includes the time folded in just before.
        let interval = sink.find("Platform.KernelCrashInterval").unwrap();
        assert_eq!(interval.value, 120);
        assert_eq!(t.kernel_crash_interval.get(), 0);
        // Other interval counters advanced but were not flushed.
        assert_eq!(t.user_crash_interval.get(), 120);
        assert_eq!(t.unclean_shutdown_interval.get(), 120);

        assert_eq!(t.any_crashes_daily_count.get(), 1);
        assert_eq!(t.any_crashes_weekly_count.get(), 1);
        assert_eq!(t.kernel_crashes_daily_count.get(), 1);
        assert_eq!(t.kernel_crashes_weekly_count.get(), 1);
        assert_eq!(t.kernel_crashes_version_count.get(), 1);
        assert_eq!(t.user_crashes_daily_count.get(), 0);
    }

    #[test]
    fn user_crash_does_not_touch_version_count() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let mut t = quiet_tracker(dir.path(), &sink);

        t.process_user_crash(30.0, test_day_wall(100));

        assert!(sink.find("Platform.UserCrashInterval").is_some());
        assert_eq!(t.user_crashes_daily_count.get(), 1);
        assert_eq!(t.user_crashes_weekly_count.get(), 1);
        assert_eq!(t.any_crashes_daily_count.get(), 1);
        assert_eq!(t.kernel_crashes_version_count.get(), 0);
    }

    #[test]
    fn unclean_shutdown_counts_as_any_crash() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let mut t = quiet_tracker(dir.path(), &sink);

        t.process_unclean_shutdown(10.0, test_day_wall(100));

        assert!(sink.find("Platform.UncleanShutdownInterval").is_some());
        assert_eq!(t.unclean_shutdowns_daily_count.get(), 1);
        assert_eq!(t.unclean_shutdowns_weekly_count.get(), 1);
        assert_eq!(t.any_crashes_daily_count.get(), 1);
        assert_eq!(t.any_crashes_weekly_count.get(), 1);
    }

    #[test]
    fn boot_marker_is_consumed_exactly_once() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("kernel-crash-detected");
        fs::write(&marker, "").unwrap();

        assert!(StatsTracker::consume_boot_marker(&marker));
        assert!(!marker.exists());
        // A second startup with no marker produces no further accounting.
        assert!(!StatsTracker::consume_boot_marker(&marker));
    }
}
