use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use telemetryd::cli::Cli;
use telemetryd::config::Config;

fn cli_with_config(file: &NamedTempFile) -> Cli {
    Cli {
        config: Some(file.path().to_path_buf()),
        ..Default::default()
    }
}

#[test]
fn load_full_valid_config() {
    let toml_content = r#"
        log_level = "debug"
        [daemon]
        state_dir = "/tmp/telemetryd-test"
        update_stats_interval_seconds = 60
        meminfo_interval_seconds = 10
        [sources]
        meminfo_path = "/proc/meminfo"
        proc_stat_path = "/proc/stat"
        zram_dir = "/sys/block/zram0"
        scaling_max_freq_path = "/sys/devices/system/cpu/cpu0/cpufreq/scaling_max_freq"
        cpuinfo_max_freq_path = "/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq"
        os_release_path = "/etc/os-release"
        [markers]
        kernel_crash_path = "/run/kernel-crash-detected"
        unclean_shutdown_path = "/run/unclean-shutdown-detected"
        [exporter]
        enabled = true
        listen_addr = "127.0.0.1:9030"
    "#;

    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();

    let config = Config::load(&cli_with_config(&file)).unwrap();

    assert_eq!(config.log_level, "debug");
    assert_eq!(config.daemon.state_dir, PathBuf::from("/tmp/telemetryd-test"));
    assert_eq!(config.daemon.update_stats_interval_seconds, 60);
    assert_eq!(config.daemon.meminfo_interval_seconds, 10);
    assert_eq!(config.sources.zram_dir, Some(PathBuf::from("/sys/block/zram0")));
    assert_eq!(
        config.markers.kernel_crash_path,
        PathBuf::from("/run/kernel-crash-detected")
    );
    assert!(config.exporter.enabled);
    assert_eq!(config.exporter.listen_addr, "127.0.0.1:9030");
}

#[test]
fn load_default_values() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "").unwrap();

    let config = Config::load(&cli_with_config(&file)).unwrap();
    let default_config = Config::default();

    assert_eq!(config, default_config);
}

#[test]
fn partial_file_keeps_other_defaults() {
    let toml_content = r#"
        [daemon]
        update_stats_interval_seconds = 120
    "#;

    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();

    let config = Config::load(&cli_with_config(&file)).unwrap();

    assert_eq!(config.daemon.update_stats_interval_seconds, 120);
    assert_eq!(config.daemon.meminfo_interval_seconds, 30);
    assert_eq!(config.sources.meminfo_path, PathBuf::from("/proc/meminfo"));
}

#[test]
fn cli_flags_override_file() {
    let toml_content = r#"
        log_level = "warn"
        [daemon]
        state_dir = "/from/file"
    "#;

    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();

    let cli = Cli {
        config: Some(file.path().to_path_buf()),
        state_dir: Some(PathBuf::from("/from/cli")),
        log_level: Some("trace".to_string()),
        exporter_addr: Some("127.0.0.1:0".to_string()),
        ..Default::default()
    };

    let config = Config::load(&cli).unwrap();

    assert_eq!(config.daemon.state_dir, PathBuf::from("/from/cli"));
    assert_eq!(config.log_level, "trace");
    // The exporter flag both enables the endpoint and sets the address.
    assert!(config.exporter.enabled);
    assert_eq!(config.exporter.listen_addr, "127.0.0.1:0");
}

#[test]
fn invalid_value_type_is_an_error() {
    let toml_content = r#"
        [daemon]
        update_stats_interval_seconds = "five minutes"
    "#;

    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();

    assert!(Config::load(&cli_with_config(&file)).is_err());
}
