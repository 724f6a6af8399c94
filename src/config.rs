//! Configuration management for telemetryd
//!
//! Defines the main `Config` struct and its sub-structs. Settings are
//! layered with `figment`: compiled defaults, then a `telemetryd.toml`
//! file, then `TELEMETRYD_`-prefixed environment variables, then
//! command-line flags.

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cli::Cli;

/// The main configuration struct for the daemon.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the daemon.
    pub log_level: String,
    /// Core daemon settings.
    pub daemon: DaemonConfig,
    /// Locations of the kernel data sources.
    pub sources: SourcesConfig,
    /// Boot-time crash marker locations.
    pub markers: MarkersConfig,
    /// Prometheus exposition endpoint settings.
    pub exporter: ExporterConfig,
}

/// Core daemon settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DaemonConfig {
    /// Directory holding the disk-backed counters.
    pub state_dir: PathBuf,
    /// Wall-clock interval between stats updates, in seconds.
    pub update_stats_interval_seconds: u64,
    /// Wall-clock interval between meminfo samples, in seconds.
    pub meminfo_interval_seconds: u64,
}

/// Locations of the kernel data sources.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SourcesConfig {
    pub meminfo_path: PathBuf,
    pub proc_stat_path: PathBuf,
    /// Zram sysfs directory; `None` disables zram reporting.
    pub zram_dir: Option<PathBuf>,
    pub scaling_max_freq_path: PathBuf,
    pub cpuinfo_max_freq_path: PathBuf,
    pub os_release_path: PathBuf,
}

/// Boot-time crash marker locations.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MarkersConfig {
    pub kernel_crash_path: PathBuf,
    pub unclean_shutdown_path: PathBuf,
}

/// Prometheus exposition endpoint settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExporterConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Config {
    /// Loads the daemon configuration, layering file, environment, and
    /// command-line sources over the compiled defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from("telemetryd.toml"));
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            // Nested keys use a double underscore, e.g.
            // TELEMETRYD_DAEMON__STATE_DIR=/var/lib/telemetryd
            .merge(Env::prefixed("TELEMETRYD_").split("__"))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }
}

// Defaults match a stock Linux device layout.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            daemon: DaemonConfig {
                state_dir: PathBuf::from("/var/lib/telemetryd"),
                update_stats_interval_seconds: 300,
                meminfo_interval_seconds: 30,
            },
            sources: SourcesConfig {
                meminfo_path: PathBuf::from("/proc/meminfo"),
                proc_stat_path: PathBuf::from("/proc/stat"),
                zram_dir: None,
                scaling_max_freq_path: PathBuf::from(
                    "/sys/devices/system/cpu/cpu0/cpufreq/scaling_max_freq",
                ),
                cpuinfo_max_freq_path: PathBuf::from(
                    "/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq",
                ),
                os_release_path: PathBuf::from("/etc/os-release"),
            },
            markers: MarkersConfig {
                kernel_crash_path: PathBuf::from("/var/run/kernel-crash-detected"),
                unclean_shutdown_path: PathBuf::from("/var/run/unclean-shutdown-detected"),
            },
            exporter: ExporterConfig {
                enabled: false,
                listen_addr: "127.0.0.1:9925".to_string(),
            },
        }
    }
}
