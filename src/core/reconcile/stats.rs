//! Per-run reconciliation counters

use serde::Serialize;
use std::collections::BTreeMap;

/// What happened to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Created,
    Updated,
}

/// Counters for one resource type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Counters for one run, overall and per type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationStats {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub by_type: BTreeMap<String, TypeStats>,
}

impl ReconciliationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a written record
    pub fn record(&mut self, resource_type: &str, outcome: RecordOutcome) {
        let entry = self.by_type.entry(resource_type.to_string()).or_default();
        match outcome {
            RecordOutcome::Created => {
                self.created += 1;
                entry.created += 1;
            }
            RecordOutcome::Updated => {
                self.updated += 1;
                entry.updated += 1;
            }
        }
    }

    /// Counts a record that could not be reconciled
    pub fn record_failure(&mut self, resource_type: &str) {
        self.failed += 1;
        self.by_type
            .entry(resource_type.to_string())
            .or_default()
            .failed += 1;
    }

    /// Records written (created or updated)
    pub fn written(&self) -> usize {
        self.created + self.updated
    }

    /// Records attempted
    pub fn total(&self) -> usize {
        self.written() + self.failed
    }

    /// `true` when at least one record failed
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
