//! One synchronization pass: extract identifiers, resolve quotes, write back.

mod engine;

pub use engine::SyncEngine;

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::bitable::RawRecord;

/// One table row with a non-blank identifier, scoped to a single pass.
#[derive(Debug, Clone)]
pub struct Instrument {
    pub record_id: String,
    /// Trimmed identifier as stored in the table. This is the write-back
    /// key; the provider lookup form is derived separately.
    pub symbol: String,
    pub fields: HashMap<String, Value>,
}

/// Instruments plus the count of rows skipped for lacking an identifier.
#[derive(Debug, Default)]
pub struct Extraction {
    pub instruments: Vec<Instrument>,
    pub skipped_no_identifier: usize,
}

/// Map raw records to instruments, silently skipping rows whose identifier
/// column is absent, empty, or whitespace-only.
pub fn extract_instruments(records: Vec<RawRecord>, symbol_field: &str) -> Extraction {
    let mut extraction = Extraction::default();

    for record in records {
        let symbol = record
            .fields
            .get(symbol_field)
            .and_then(field_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        match symbol {
            Some(symbol) => extraction.instruments.push(Instrument {
                record_id: record.record_id,
                symbol,
                fields: record.fields,
            }),
            None => extraction.skipped_no_identifier += 1,
        }
    }

    extraction
}

/// Pull a plain string out of a Bitable field value.
///
/// Text columns usually come back as a string, but rich-text columns return
/// an array of `{ "text": ... }` segments and number columns a bare number.
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(segments) => {
            let joined: String = segments
                .iter()
                .filter_map(|seg| seg.get("text").and_then(Value::as_str))
                .collect();
            Some(joined)
        }
        _ => None,
    }
}

/// Result of attempting to write one record.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub record_id: String,
    pub symbol: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl UpdateOutcome {
    pub fn ok(record_id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            symbol: symbol.into(),
            succeeded: true,
            error: None,
        }
    }

    pub fn failed(
        record_id: impl Into<String>,
        symbol: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            symbol: symbol.into(),
            succeeded: false,
            error: Some(error.into()),
        }
    }
}

/// Counts for one completed (or short-circuited) pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Records for which a write was attempted.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Rows skipped because the identifier column was blank.
    pub skipped_no_identifier: usize,
    /// Instruments left untouched because no price could be resolved.
    pub unresolved: usize,
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted {}, succeeded {}, failed {}, unresolved {}, skipped (no identifier) {}",
            self.attempted, self.succeeded, self.failed, self.unresolved, self.skipped_no_identifier
        )
    }
}
