//! Production collaborators: cumulative CPU time, the OS version hash, and
//! small helpers for single-integer pseudo-files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::core::{CpuUsageSource, VersionSource};

/// Reads one integer from a sysfs/procfs style scalar file.
///
/// Returns `None` (with a warning) on any read or parse failure.
pub(crate) fn read_i64_file(path: &Path) -> Option<i64> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read scalar file");
            return None;
        }
    };
    let trimmed = content.trim();
    match trimmed.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(path = %path.display(), value = %trimmed, "cannot convert to integer");
            None
        }
    }
}

/// Cumulative CPU use derived from the aggregate `cpu` line of `/proc/stat`.
pub struct ProcStatCpu {
    path: PathBuf,
}

// Jiffies per second; USER_HZ is 100 on every platform this daemon targets.
const JIFFY_MS: u64 = 10;

impl ProcStatCpu {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CpuUsageSource for ProcStatCpu {
    fn cumulative_cpu_use(&self) -> Option<Duration> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read cpu stats");
                return None;
            }
        };
        let line = content.lines().find(|l| l.starts_with("cpu "))?;
        let mut busy_jiffies: u64 = 0;
        // Fields: user nice system idle iowait irq softirq steal.
        // Idle and iowait are not CPU use.
        for (i, token) in line.split_whitespace().skip(1).take(8).enumerate() {
            if i == 3 || i == 4 {
                continue;
            }
            busy_jiffies += token.parse::<u64>().ok()?;
        }
        Some(Duration::from_millis(busy_jiffies * JIFFY_MS))
    }
}

/// Hashes the OS version string from an os-release style file.
pub struct OsReleaseVersion {
    path: PathBuf,
}

const VERSION_KEY: &str = "VERSION_ID";
// Used when the version cannot be read, so a later successful read still
// registers as a version change.
const DEFAULT_VERSION: &str = "0.0.0.0";

impl OsReleaseVersion {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_version(&self) -> Option<String> {
        let content = fs::read_to_string(&self.path).ok()?;
        content.lines().find_map(|line| {
            let value = line.strip_prefix(VERSION_KEY)?.strip_prefix('=')?;
            Some(value.trim().trim_matches('"').to_string())
        })
    }
}

impl VersionSource for OsReleaseVersion {
    fn current_version_hash(&self) -> u32 {
        let version = self.read_version().unwrap_or_else(|| {
            warn!(path = %self.path.display(), "failed to read the product version");
            DEFAULT_VERSION.to_string()
        });
        let digest = blake3::hash(version.as_bytes());
        let bytes = digest.as_bytes();
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn proc_stat_sums_busy_jiffies() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cpu  100 20 50 100000 500 3 7 0 0 0").unwrap();
        writeln!(file, "cpu0 100 20 50 100000 500 3 7 0 0 0").unwrap();
        let source = ProcStatCpu::new(file.path());
        // (100 + 20 + 50 + 3 + 7 + 0) jiffies * 10 ms
        assert_eq!(source.cumulative_cpu_use(), Some(Duration::from_millis(1800)));
    }

    #[test]
    fn unreadable_proc_stat_yields_none() {
        let source = ProcStatCpu::new("/definitely/not/here");
        assert_eq!(source.cumulative_cpu_use(), None);
    }

    #[test]
    fn version_hash_is_stable_and_distinguishes_versions() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "NAME=\"Embedded OS\"").unwrap();
        writeln!(file, "VERSION_ID=\"12.4.0\"").unwrap();
        let source = OsReleaseVersion::new(file.path());
        let first = source.current_version_hash();
        assert_eq!(first, source.current_version_hash());

        let mut other = NamedTempFile::new().unwrap();
        writeln!(other, "VERSION_ID=\"12.5.0\"").unwrap();
        let changed = OsReleaseVersion::new(other.path());
        assert_ne!(first, changed.current_version_hash());
    }

    #[test]
    fn missing_os_release_falls_back_to_default_version() {
        let source = OsReleaseVersion::new("/definitely/not/here");
        let fallback = source.current_version_hash();
        // Deterministic fallback, not an error.
        assert_eq!(fallback, source.current_version_hash());
    }
}
