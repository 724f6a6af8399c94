//! The sampling loop.
//!
//! One task multiplexes the shutdown signal, the user-crash channel, and
//! three independent periodic activities. Every handler re-arms its own
//! deadline after completing, so a failure or skew in one activity never
//! perturbs the others, and because everything runs on this single task no
//! two handler bodies ever interleave.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::core::{ActiveClock, SampleSink};
use crate::meminfo;
use crate::stats::StatsTracker;
use crate::throttle::CpuThrottleSampler;
use crate::zram;

/// Active-time offsets from daemon start at which anon memory use is
/// sampled: the 1 minute, 5 minute, 30 minute, 2.5 hour and 12.5 hour
/// marks. Memory behavior mostly stabilizes after that, so the activity
/// then stops for good.
pub const MEMUSE_OFFSETS_SECONDS: [f64; 5] = [60.0, 300.0, 1800.0, 9000.0, 45_000.0];

/// What the memory-use-at-age activity should do when its timer fires.
#[derive(Debug, PartialEq)]
pub enum MemuseAction {
    /// The active clock lags the wall clock (the device slept); re-arm for
    /// the remaining active seconds.
    Wait(f64),
    /// The next offset has been reached; sample under this schedule index.
    Sample(usize),
    /// The schedule is exhausted.
    Done,
}

/// The finite, ordered memory-use-at-age schedule.
///
/// Deadlines are expressed on the active-time clock so that "1 minute after
/// boot" means one minute of awake time.
pub struct MemuseSchedule {
    start_active_seconds: f64,
    next_index: usize,
}

impl MemuseSchedule {
    pub fn new(start_active_seconds: f64) -> Self {
        Self {
            start_active_seconds,
            next_index: 0,
        }
    }

    /// Seconds until the first scheduled sample.
    pub fn first_delay(&self) -> f64 {
        MEMUSE_OFFSETS_SECONDS[0]
    }

    /// Decides, against the current active time, whether the pending offset
    /// has actually been reached.
    pub fn on_fire(&self, now_active_seconds: f64) -> MemuseAction {
        let Some(&offset) = MEMUSE_OFFSETS_SECONDS.get(self.next_index) else {
            return MemuseAction::Done;
        };
        let target = self.start_active_seconds + offset;
        // Avoid intervals of less than one second.
        let remaining = (target - now_active_seconds).ceil();
        if remaining > 0.0 {
            MemuseAction::Wait(remaining)
        } else {
            MemuseAction::Sample(self.next_index)
        }
    }

    /// Advances past the just-sampled offset. Returns the delay until the
    /// next one, or `None` after the last entry.
    pub fn advance(&mut self, now_active_seconds: f64) -> Option<f64> {
        self.next_index += 1;
        let &offset = MEMUSE_OFFSETS_SECONDS.get(self.next_index)?;
        let target = self.start_active_seconds + offset;
        Some((target - now_active_seconds).max(1.0))
    }
}

/// Drives the periodic activities and the crash-signal stream.
pub struct Scheduler {
    tracker: StatsTracker,
    throttle: CpuThrottleSampler,
    clock: Arc<dyn ActiveClock>,
    sink: Arc<dyn SampleSink>,
    meminfo_path: PathBuf,
    zram_dir: Option<PathBuf>,
    update_stats_interval: Duration,
    meminfo_interval: Duration,
    memuse: MemuseSchedule,
    crash_rx: async_channel::Receiver<()>,
    shutdown_rx: watch::Receiver<bool>,
}

#[allow(clippy::too_many_arguments)]
impl Scheduler {
    pub fn new(
        tracker: StatsTracker,
        throttle: CpuThrottleSampler,
        clock: Arc<dyn ActiveClock>,
        sink: Arc<dyn SampleSink>,
        meminfo_path: PathBuf,
        zram_dir: Option<PathBuf>,
        update_stats_interval: Duration,
        meminfo_interval: Duration,
        crash_rx: async_channel::Receiver<()>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let memuse = MemuseSchedule::new(clock.active_seconds());
        Self {
            tracker,
            throttle,
            clock,
            sink,
            meminfo_path,
            zram_dir,
            update_stats_interval,
            meminfo_interval,
            memuse,
            crash_rx,
            shutdown_rx,
        }
    }

    pub async fn run(mut self) {
        let mut stats_deadline = Instant::now() + self.update_stats_interval;
        let mut meminfo_deadline = Some(Instant::now() + self.meminfo_interval);
        let mut memuse_deadline =
            Some(Instant::now() + Duration::from_secs_f64(self.memuse.first_delay()));
        let mut crash_channel_open = true;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => {
                    info!("scheduler received shutdown signal");
                    break;
                }
                signal = self.crash_rx.recv(), if crash_channel_open => {
                    match signal {
                        Ok(()) => self.handle_user_crash(),
                        Err(_) => {
                            debug!("crash signal channel closed");
                            crash_channel_open = false;
                        }
                    }
                }
                _ = sleep_until(stats_deadline) => {
                    self.handle_update_stats();
                    // Wall-interval safety-net flush; always re-arms.
                    stats_deadline += self.update_stats_interval;
                }
                // Disabled branches still evaluate their expression, so a
                // cleared deadline must not unwrap.
                _ = sleep_until(meminfo_deadline.unwrap_or_else(Instant::now)),
                        if meminfo_deadline.is_some() => {
                    meminfo_deadline = self.handle_meminfo();
                }
                _ = sleep_until(memuse_deadline.unwrap_or_else(Instant::now)),
                        if memuse_deadline.is_some() => {
                    memuse_deadline = self.handle_memuse();
                }
            }
        }
    }

    fn handle_user_crash(&mut self) {
        info!("user crash signal received");
        self.tracker
            .process_user_crash(self.clock.active_seconds(), Utc::now());
    }

    fn handle_update_stats(&mut self) {
        self.tracker
            .update_stats(self.clock.active_seconds(), Utc::now());
        self.throttle.sample(&*self.sink);
    }

    /// Samples meminfo (and zram, when configured). A read or parse
    /// failure stops this activity instead of spinning on a permanently
    /// broken source.
    fn handle_meminfo(&mut self) -> Option<Instant> {
        let rearm = match fs::read_to_string(&self.meminfo_path) {
            Ok(raw) => match meminfo::process_meminfo(&raw, &*self.sink) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "meminfo parse failed, stopping meminfo sampling");
                    false
                }
            },
            Err(e) => {
                warn!(
                    path = %self.meminfo_path.display(),
                    error = %e,
                    "cannot read meminfo, stopping meminfo sampling"
                );
                false
            }
        };

        // Zram failures only skip this report; they never stop the
        // meminfo activity.
        if let Some(zram_dir) = &self.zram_dir {
            if let Err(e) = zram::report_zram(zram_dir, &*self.sink) {
                warn!(error = %e, "zram report skipped");
            }
        }

        rearm.then(|| Instant::now() + self.meminfo_interval)
    }

    fn handle_memuse(&mut self) -> Option<Instant> {
        let now_active = self.clock.active_seconds();
        match self.memuse.on_fire(now_active) {
            MemuseAction::Wait(seconds) => {
                debug!(seconds, "device slept, re-arming memuse timer");
                Some(Instant::now() + Duration::from_secs_f64(seconds))
            }
            MemuseAction::Sample(index) => {
                if !self.sample_memuse(index) {
                    return None;
                }
                self.memuse
                    .advance(now_active)
                    .map(|delay| Instant::now() + Duration::from_secs_f64(delay))
            }
            MemuseAction::Done => None,
        }
    }

    fn sample_memuse(&self, index: usize) -> bool {
        let raw = match fs::read_to_string(&self.meminfo_path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.meminfo_path.display(), error = %e, "cannot read meminfo");
                return false;
            }
        };
        match meminfo::process_memuse(&raw, index, &*self.sink) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "memuse sample failed, stopping age-based sampling");
                false
            }
        }
    }
}
