//! Sync run summary and reporting

use crate::core::acquire::AcquisitionStrategy;
use crate::core::reconcile::ReconciliationStats;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Outcome of one sync run
#[derive(Debug, Clone)]
pub struct SyncSummary {
    /// EHR base URL
    pub source: String,

    /// Scope label (`system`, `group/<id>`, `patient/<id>`)
    pub scope: String,

    /// Lower bound used for the acquisition, if incremental
    pub since: Option<DateTime<Utc>>,

    /// Strategy that produced the records
    pub strategy: AcquisitionStrategy,

    /// Records acquired from the EHR
    pub acquired: usize,

    /// Export lines or search entries that could not be parsed
    pub malformed: usize,

    /// Reconciliation counters
    pub stats: ReconciliationStats,

    /// New watermark, when it was saved
    pub watermark: Option<DateTime<Utc>>,

    /// Duration of the run
    pub duration: Duration,
}

impl SyncSummary {
    /// `true` when every acquired record was written
    pub fn is_successful(&self) -> bool {
        !self.stats.has_failures()
    }

    /// Get success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.stats.total();
        if total == 0 {
            return 100.0;
        }
        (self.stats.written() as f64 / total as f64) * 100.0
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            source = %self.source,
            scope = %self.scope,
            strategy = %self.strategy,
            acquired = self.acquired,
            malformed = self.malformed,
            created = self.stats.created,
            updated = self.stats.updated,
            failed = self.stats.failed,
            watermark = ?self.watermark,
            duration_secs = self.duration.as_secs(),
            success_rate = format!("{:.2}%", self.success_rate()),
            "Sync completed"
        );

        for (resource_type, counts) in &self.stats.by_type {
            tracing::debug!(
                resource_type = %resource_type,
                created = counts.created,
                updated = counts.updated,
                failed = counts.failed,
                "Type summary"
            );
        }

        if self.stats.has_failures() {
            tracing::warn!(
                failed = self.stats.failed,
                "Sync completed with record failures; watermark not advanced"
            );
        }
    }
}
