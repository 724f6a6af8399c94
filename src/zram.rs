//! Zram compression statistics.
//!
//! Reads three raw scalars from a zram device's sysfs directory and derives
//! compression-effectiveness samples. Any unreadable value aborts the whole
//! report; there is no partial zram report.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::core::SampleSink;

const COMPR_DATA_SIZE: &str = "compr_data_size";
const ORIG_DATA_SIZE: &str = "orig_data_size";
const ZERO_PAGES: &str = "zero_pages";

const PAGE_SIZE: u64 = 4096;

#[derive(Debug, Error)]
pub enum ZramError {
    #[error("cannot read {name}: {source}")]
    Io {
        name: &'static str,
        source: std::io::Error,
    },
    #[error("invalid integer {value:?} in {name}")]
    Parse { name: &'static str, value: String },
    #[error("zram reports zero original data size")]
    ZeroOriginalSize,
}

fn read_u64(zram_dir: &Path, name: &'static str) -> Result<u64, ZramError> {
    let content =
        fs::read_to_string(zram_dir.join(name)).map_err(|source| ZramError::Io { name, source })?;
    let trimmed = content.trim();
    trimmed.parse().map_err(|_| ZramError::Parse {
        name,
        value: trimmed.to_string(),
    })
}

/// Reads the zram counters and emits the derived samples.
///
/// `orig_data_size` excludes zero-filled pages, so it is corrected by adding
/// `zero_pages * 4096` back before any ratio is computed.
pub fn report_zram(zram_dir: &Path, sink: &dyn SampleSink) -> Result<(), ZramError> {
    // Data sizes are in bytes; zero_pages is a page count.
    let compr_data_size = read_u64(zram_dir, COMPR_DATA_SIZE)?;
    let mut orig_data_size = read_u64(zram_dir, ORIG_DATA_SIZE)?;
    let zero_pages = read_u64(zram_dir, ZERO_PAGES)?;

    orig_data_size += zero_pages * PAGE_SIZE;
    if orig_data_size == 0 {
        return Err(ZramError::ZeroOriginalSize);
    }

    let compr_data_size_mb = (compr_data_size >> 20) as i64;
    let savings_mb = (orig_data_size.saturating_sub(compr_data_size) >> 20) as i64;
    let zero_ratio_percent = (zero_pages * PAGE_SIZE * 100 / orig_data_size) as i64;

    // 100 MB or less of compressed data has little impact.
    sink.send_sample("Platform.ZramCompressedSize", compr_data_size_mb, 100, 4000, 50);
    sink.send_sample("Platform.ZramSavings", savings_mb, 100, 4000, 50);
    // The ratio is scaled by 100 for resolution; interesting values sit
    // between 100% and 600%. Skip it when very little memory is compressed.
    if compr_data_size_mb >= 1 {
        sink.send_sample(
            "Platform.ZramCompressionRatioPercent",
            (orig_data_size * 100 / compr_data_size) as i64,
            100,
            600,
            50,
        );
    }
    // zero_pages of interest span 1 MB to 1 GB, in pages.
    sink.send_sample("Platform.ZramZeroPages", zero_pages as i64, 256, 256 * 1024, 50);
    sink.send_sample("Platform.ZramZeroRatioPercent", zero_ratio_percent, 1, 50, 50);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use tempfile::tempdir;

    fn write_zram(dir: &Path, compr: u64, orig: u64, zero_pages: u64) {
        fs::write(dir.join(COMPR_DATA_SIZE), format!("{compr}\n")).unwrap();
        fs::write(dir.join(ORIG_DATA_SIZE), format!("{orig}\n")).unwrap();
        fs::write(dir.join(ZERO_PAGES), format!("{zero_pages}\n")).unwrap();
    }

    #[test]
    fn derives_corrected_ratio_and_savings() {
        let dir = tempdir().unwrap();
        // corrected original = 4 MiB + 256 * 4096 B = 5 MiB
        write_zram(dir.path(), 1_048_576, 4_194_304, 256);
        let sink = RecordingSink::new();
        report_zram(dir.path(), &sink).unwrap();

        assert_eq!(sink.find("Platform.ZramCompressedSize").unwrap().value, 1);
        assert_eq!(sink.find("Platform.ZramSavings").unwrap().value, 4);
        assert_eq!(
            sink.find("Platform.ZramCompressionRatioPercent").unwrap().value,
            500
        );
        assert_eq!(sink.find("Platform.ZramZeroPages").unwrap().value, 256);
        // 1 MiB of zero pages out of 5 MiB corrected original.
        assert_eq!(sink.find("Platform.ZramZeroRatioPercent").unwrap().value, 20);
    }

    #[test]
    fn tiny_compressed_size_skips_ratio() {
        let dir = tempdir().unwrap();
        write_zram(dir.path(), 512 * 1024, 4_194_304, 0);
        let sink = RecordingSink::new();
        report_zram(dir.path(), &sink).unwrap();
        assert!(sink.find("Platform.ZramCompressionRatioPercent").is_none());
        assert!(sink.find("Platform.ZramSavings").is_some());
    }

    #[test]
    fn missing_value_aborts_whole_report() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(COMPR_DATA_SIZE), "1048576\n").unwrap();
        fs::write(dir.path().join(ORIG_DATA_SIZE), "4194304\n").unwrap();
        // zero_pages absent
        let sink = RecordingSink::new();
        assert!(report_zram(dir.path(), &sink).is_err());
        assert!(sink.samples().is_empty());
    }

    #[test]
    fn garbage_value_aborts_whole_report() {
        let dir = tempdir().unwrap();
        write_zram(dir.path(), 1_048_576, 4_194_304, 0);
        fs::write(dir.path().join(ZERO_PAGES), "banana\n").unwrap();
        let sink = RecordingSink::new();
        assert!(matches!(
            report_zram(dir.path(), &sink),
            Err(ZramError::Parse { name: "zero_pages", .. })
        ));
        assert!(sink.samples().is_empty());
    }
}
