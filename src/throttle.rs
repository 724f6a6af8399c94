//! Thermal CPU throttling sampler.
//!
//! Reports the current scaling-max frequency as a percentage of the
//! hardware maximum. The hardware maximum is detected once and cached; a
//! failed detection latches permanently rather than retrying a broken
//! sysfs source every cycle.

use std::path::PathBuf;

use tracing::warn;

use crate::core::SampleSink;
use crate::sources::read_i64_file;

const SCALED_CPU_FREQUENCY_METRIC: &str = "Platform.CpuFrequencyThermalScaling";

/// One-time max-frequency detection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaxCpuFreq {
    Unknown,
    Known(i64),
    /// Sysfs did not report a usable maximum; give up for good.
    Failed,
}

pub struct CpuThrottleSampler {
    scaling_max_freq_path: PathBuf,
    cpuinfo_max_freq_path: PathBuf,
    max_freq: MaxCpuFreq,
}

impl CpuThrottleSampler {
    pub fn new(
        scaling_max_freq_path: impl Into<PathBuf>,
        cpuinfo_max_freq_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            scaling_max_freq_path: scaling_max_freq_path.into(),
            cpuinfo_max_freq_path: cpuinfo_max_freq_path.into(),
            max_freq: MaxCpuFreq::Unknown,
        }
    }

    /// Samples the current throttling state, if the max frequency is known
    /// or still discoverable.
    pub fn sample(&mut self, sink: &dyn SampleSink) {
        let max_freq = match self.max_freq {
            MaxCpuFreq::Failed => return,
            MaxCpuFreq::Known(value) => value,
            MaxCpuFreq::Unknown => match self.detect_max_freq() {
                Some(value) => {
                    self.max_freq = MaxCpuFreq::Known(value);
                    value
                }
                None => {
                    self.max_freq = MaxCpuFreq::Failed;
                    return;
                }
            },
        };
        let Some(scaled_freq) = read_i64_file(&self.scaling_max_freq_path) else {
            return;
        };
        // Frequencies are in kHz. scaled > max means turbo is on, but the
        // scaled value is not the actual turbo frequency; report 101%.
        let percent = if scaled_freq > max_freq {
            101
        } else {
            scaled_freq / (max_freq / 100)
        };
        sink.send_linear_sample(SCALED_CPU_FREQUENCY_METRIC, percent, 101, 102);
    }

    fn detect_max_freq(&self) -> Option<i64> {
        let mut max_freq = read_i64_file(&self.cpuinfo_max_freq_path)?;
        if max_freq == 0 {
            warn!("sysfs reports zero max CPU frequency");
            return None;
        }
        // Turbo-capable parts report max + 1000 kHz; normal (non-turbo)
        // frequencies are multiples of at least 10 MHz.
        if max_freq % 10_000 == 1_000 {
            max_freq -= 1_000;
        }
        Some(max_freq)
    }
}
