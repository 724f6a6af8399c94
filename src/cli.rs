//! Command-line argument parsing.
//!
//! Arguments are parsed with `clap` at startup and then merged over the
//! `telemetryd.toml` file and environment variables as the
//! highest-precedence configuration layer.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// A resident daemon that accumulates device usage and crash statistics.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the disk-backed counters.
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Path to the meminfo source.
    #[arg(long, value_name = "FILE")]
    pub meminfo_path: Option<PathBuf>,

    /// Zram sysfs directory; enables zram reporting.
    #[arg(long, value_name = "DIR")]
    pub zram_dir: Option<PathBuf>,

    /// Address for the Prometheus exposition endpoint; enables the exporter.
    #[arg(long, value_name = "ADDR")]
    pub exporter_addr: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        let mut daemon = Dict::new();
        if let Some(state_dir) = &self.state_dir {
            daemon.insert(
                "state_dir".into(),
                Value::from(state_dir.display().to_string()),
            );
        }
        if !daemon.is_empty() {
            dict.insert("daemon".into(), Value::from(daemon));
        }

        let mut sources = Dict::new();
        if let Some(meminfo_path) = &self.meminfo_path {
            sources.insert(
                "meminfo_path".into(),
                Value::from(meminfo_path.display().to_string()),
            );
        }
        if let Some(zram_dir) = &self.zram_dir {
            sources.insert(
                "zram_dir".into(),
                Value::from(zram_dir.display().to_string()),
            );
        }
        if !sources.is_empty() {
            dict.insert("sources".into(), Value::from(sources));
        }

        if let Some(addr) = &self.exporter_addr {
            let mut exporter = Dict::new();
            exporter.insert("enabled".into(), Value::from(true));
            exporter.insert("listen_addr".into(), Value::from(addr.clone()));
            dict.insert("exporter".into(), Value::from(exporter));
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
