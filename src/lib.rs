//! telemetryd - resident device telemetry daemon
//!
//! Accumulates usage, crash, and resource-utilization statistics across
//! reboots and periodically emits them as bucketed histogram samples to a
//! metrics backend. State lives in a directory of disk-backed counters that
//! survive process restarts; a multi-period reset protocol (daily / weekly /
//! per-OS-version) flushes them at calendar and version boundaries.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod emit;
pub mod exporter;
pub mod meminfo;
pub mod persist;
pub mod scheduler;
pub mod sources;
pub mod stats;
pub mod task_manager;
pub mod throttle;
pub mod utils;
pub mod zram;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export core types for convenience
pub use crate::core::*;
