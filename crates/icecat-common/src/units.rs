//! Byte size formatting for log lines and run summaries

use byte_unit::{Byte, UnitType};

/// Human-readable binary size, e.g. `1.50 KiB`
pub fn format_bytes(bytes: u64) -> String {
    let adjusted = Byte::from_u64(bytes).get_appropriate_unit(UnitType::Binary);
    format!("{adjusted:.2}")
}

/// Size in mebibytes with two decimals, the unit the download job reports in
pub fn size_mb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / (1024.0 * 1024.0))
}
