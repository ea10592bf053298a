//! Acquisition strategies and their output

use crate::domain::ExternalRecord;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// How records were pulled from the EHR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionStrategy {
    /// Asynchronous `$export` job
    BulkExport,
    /// Group member enumeration plus per-patient searches
    GroupSearch,
    /// `$everything` or per-type searches for one patient
    PatientSearch,
}

impl AcquisitionStrategy {
    /// Stable name, stored on watermarks
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionStrategy::BulkExport => "bulk_export",
            AcquisitionStrategy::GroupSearch => "group_search",
            AcquisitionStrategy::PatientSearch => "patient_search",
        }
    }
}

impl fmt::Display for AcquisitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records grouped by resource type
///
/// A record with an EHR id is kept once even when several searches return it.
#[derive(Debug, Default)]
pub struct RecordSet {
    by_type: BTreeMap<String, Vec<ExternalRecord>>,
    seen: HashSet<String>,
    malformed: usize,
}

impl RecordSet {
    /// Creates an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record; returns `false` if a record with the same key was already added
    pub fn push(&mut self, record: ExternalRecord) -> bool {
        if let Some(key) = record.key() {
            if !self.seen.insert(key.to_string()) {
                return false;
            }
        }
        self.by_type
            .entry(record.resource_type().as_str().to_string())
            .or_default()
            .push(record);
        true
    }

    /// Adds every record from an iterator
    pub fn extend(&mut self, records: impl IntoIterator<Item = ExternalRecord>) {
        for record in records {
            self.push(record);
        }
    }

    /// Counts lines or entries that could not be parsed into a record
    pub fn add_malformed(&mut self, count: usize) {
        self.malformed += count;
    }

    /// Number of unparseable inputs seen while acquiring
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    /// Total number of records
    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    /// `true` when no records were acquired
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resource types present, alphabetically
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.by_type.keys().map(String::as_str)
    }

    /// Records of one type
    pub fn get(&self, resource_type: &str) -> &[ExternalRecord] {
        self.by_type
            .get(resource_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Consumes the set, yielding records grouped by type
    pub fn into_groups(self) -> BTreeMap<String, Vec<ExternalRecord>> {
        self.by_type
    }
}

/// Output of one acquisition
#[derive(Debug)]
pub struct Acquisition {
    /// Acquired records
    pub records: RecordSet,
    /// Server snapshot time, when the strategy reports one
    pub transaction_time: Option<DateTime<Utc>>,
    /// Strategy that produced the records
    pub strategy: AcquisitionStrategy,
}
