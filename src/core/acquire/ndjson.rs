//! NDJSON output parsing
//!
//! One resource per line. Lines that are not JSON objects with a valid `resourceType` are
//! counted and skipped; blank lines are ignored.

use crate::domain::ExternalRecord;

/// Records parsed from one NDJSON file
#[derive(Debug, Default)]
pub struct NdjsonBatch {
    /// Parsed records, in file order
    pub records: Vec<ExternalRecord>,
    /// Lines that could not be parsed
    pub malformed: usize,
}

/// Parses an NDJSON body; `source` names the file in log output
pub fn parse_ndjson(body: &str, source: &str) -> NdjsonBatch {
    let mut batch = NdjsonBatch::default();

    for (index, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parsed = serde_json::from_str(line)
            .map_err(|e| e.to_string())
            .and_then(|value| ExternalRecord::from_value(value).map_err(|e| e.to_string()));

        match parsed {
            Ok(record) => batch.records.push(record),
            Err(error) => {
                batch.malformed += 1;
                tracing::warn!(
                    source = %source,
                    line = index + 1,
                    error = %error,
                    "Skipping malformed NDJSON line"
                );
            }
        }
    }

    batch
}
