//! Record identity extraction

use tracing::warn;

use crate::reader::Record;

/// Fallback identity for a record with no usable id, from its physical line number
pub fn synthetic_identity(line: u64) -> String {
    format!("row_{line:07}")
}

/// Trimmed value of `column`, or [`synthetic_identity`] when it is absent or blank.
///
/// Synthetic identities are unique within one file but shift whenever upstream
/// row order changes.
pub fn record_identity(record: &Record, column: &str) -> String {
    match record.get(column).map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => {
            let synthetic = synthetic_identity(record.line());
            warn!(
                line = record.line(),
                column,
                identity = %synthetic,
                "Blank identity, using synthetic id"
            );
            synthetic
        },
    }
}

/// Keep only ASCII alphanumerics and `-_.` so the identity is a safe file stem
pub fn sanitize_stem(identity: &str) -> String {
    identity
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}
