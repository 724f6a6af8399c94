//! Meminfo parsing and reporting.
//!
//! The parser walks the raw dump once while walking an ordered field schema
//! once, advancing a cursor only on an exact case-sensitive label match.
//! Unknown lines are skipped; a schema field that never appears fails the
//! whole parse, so no partial report is ever emitted.

use thiserror::Error;

use crate::core::SampleSink;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeminfoError {
    #[error("field {0} not found in meminfo dump")]
    MissingField(&'static str),
    #[error("invalid value {value:?} for field {field}")]
    InvalidValue { field: &'static str, value: String },
    #[error("meminfo reports zero total memory")]
    ZeroTotal,
}

/// How a parsed field is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeminfoOp {
    /// Percent of total memory, linear 0-100.
    HistPercent,
    /// Kilobytes on a log scale, up to ~4 GiB.
    HistLog,
    /// Captured for the derived swap-used samples, not reported directly.
    SwapTotal,
    /// Captured for the derived swap-used samples, not reported directly.
    SwapFree,
}

/// One entry of the ordered meminfo schema.
pub struct MeminfoField {
    /// Logical name, used to form the sample name.
    pub name: &'static str,
    /// Exact label to match in the dump.
    pub label: &'static str,
    pub op: MeminfoOp,
}

const fn percent(name: &'static str, label: &'static str) -> MeminfoField {
    MeminfoField {
        name,
        label,
        op: MeminfoOp::HistPercent,
    }
}

const fn with_op(name: &'static str, label: &'static str, op: MeminfoOp) -> MeminfoField {
    MeminfoField { name, label, op }
}

/// Field 0 is total system memory; it scales the percent fields and is
/// itself never reported.
pub const MEMINFO_FIELDS: &[MeminfoField] = &[
    percent("MemTotal", "MemTotal"),
    percent("MemFree", "MemFree"),
    percent("Buffers", "Buffers"),
    percent("Cached", "Cached"),
    percent("Active", "Active"),
    percent("Inactive", "Inactive"),
    percent("ActiveAnon", "Active(anon)"),
    percent("InactiveAnon", "Inactive(anon)"),
    percent("ActiveFile", "Active(file)"),
    percent("InactiveFile", "Inactive(file)"),
    with_op("Unevictable", "Unevictable", MeminfoOp::HistLog),
    with_op("SwapTotal", "SwapTotal", MeminfoOp::SwapTotal),
    with_op("SwapFree", "SwapFree", MeminfoOp::SwapFree),
    percent("AnonPages", "AnonPages"),
    percent("Mapped", "Mapped"),
    with_op("Shmem", "Shmem", MeminfoOp::HistLog),
    with_op("Slab", "Slab", MeminfoOp::HistLog),
];

/// Reduced schema for the memory-use-at-age samples.
const MEMUSE_FIELDS: &[MeminfoField] = &[
    percent("MemTotal", "MemTotal"),
    percent("ActiveAnon", "Active(anon)"),
    percent("InactiveAnon", "Inactive(anon)"),
];

/// Extracts the schema's values from a raw meminfo dump.
///
/// Ordered linear merge: the dump and the schema are each walked exactly
/// once, so fields must appear in the dump in schema order. Returns one
/// value per schema field, in schema order.
pub fn fill_meminfo(raw: &str, schema: &[MeminfoField]) -> Result<Vec<i64>, MeminfoError> {
    let mut values = Vec::with_capacity(schema.len());
    let mut cursor = 0;
    for line in raw.lines() {
        if cursor >= schema.len() {
            break;
        }
        let mut tokens = line
            .split(|c: char| c == ':' || c.is_ascii_whitespace())
            .filter(|t| !t.is_empty());
        let Some(label) = tokens.next() else {
            continue;
        };
        if label != schema[cursor].label {
            continue;
        }
        let value = tokens.next().unwrap_or("");
        let parsed = value
            .parse::<i64>()
            .map_err(|_| MeminfoError::InvalidValue {
                field: schema[cursor].label,
                value: value.to_string(),
            })?;
        values.push(parsed);
        cursor += 1;
    }
    if cursor < schema.len() {
        return Err(MeminfoError::MissingField(schema[cursor].label));
    }
    Ok(values)
}

/// Parses a full meminfo dump and reports every schema field per its
/// operation, plus the derived swap-used samples when swap is present.
pub fn process_meminfo(raw: &str, sink: &dyn SampleSink) -> Result<(), MeminfoError> {
    let values = fill_meminfo(raw, MEMINFO_FIELDS)?;
    let total = values[0];
    if total == 0 {
        return Err(MeminfoError::ZeroTotal);
    }
    let mut swap_total = 0;
    let mut swap_free = 0;
    for (field, &value) in MEMINFO_FIELDS.iter().zip(&values).skip(1) {
        let metric = format!("Platform.Meminfo{}", field.name);
        match field.op {
            MeminfoOp::HistPercent => {
                sink.send_linear_sample(&metric, value * 100 / total, 100, 101);
            }
            MeminfoOp::HistLog => {
                sink.send_sample(&metric, value, 1, 4_000_000, 100);
            }
            // The swap pair is captured together, never reported directly;
            // the all-or-nothing parse guarantees both are present.
            MeminfoOp::SwapTotal => swap_total = value,
            MeminfoOp::SwapFree => swap_free = value,
        }
    }
    if swap_total > 0 {
        let swap_used = swap_total - swap_free;
        sink.send_sample("Platform.MeminfoSwapUsed", swap_used, 1, 8_000_000, 100);
        sink.send_linear_sample(
            "Platform.MeminfoSwapUsed.Percent",
            swap_used * 100 / swap_total,
            100,
            101,
        );
    }
    Ok(())
}

/// Reports anon memory as a percentage of total, named by the
/// memory-use-at-age schedule index.
pub fn process_memuse(
    raw: &str,
    interval_index: usize,
    sink: &dyn SampleSink,
) -> Result<(), MeminfoError> {
    let values = fill_meminfo(raw, MEMUSE_FIELDS)?;
    let total = values[0];
    if total == 0 {
        return Err(MeminfoError::ZeroTotal);
    }
    let anon = values[1] + values[2];
    let metric = format!("Platform.MemuseAnon{interval_index}");
    sink.send_linear_sample(&metric, anon * 100 / total, 100, 101);
    Ok(())
}
