//! Bulk export job state machine
//!
//! ```text
//! Requested ──► Polling ──► Complete
//!     │            ├──────► Failed
//!     └──► Failed  └──────► TimedOut
//! ```
//!
//! Terminal states have no exits. Jobs live for one run and are never persisted.

use super::ndjson::parse_ndjson;
use super::strategy::RecordSet;
use crate::adapters::ehr::{EhrApi, ExportPoll, ExportRequest, OutputFile};
use crate::config::BulkExportConfig;
use crate::domain::{ConduitError, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Lifecycle state of an export job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Requested,
    Polling,
    Complete,
    Failed,
    TimedOut,
}

impl ExportState {
    /// `true` for Complete, Failed and TimedOut
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExportState::Complete | ExportState::Failed | ExportState::TimedOut
        )
    }

    fn can_transition_to(&self, next: ExportState) -> bool {
        use ExportState::*;
        matches!(
            (self, next),
            (Requested, Polling)
                | (Requested, Failed)
                | (Polling, Polling)
                | (Polling, Complete)
                | (Polling, Failed)
                | (Polling, TimedOut)
        )
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportState::Requested => "requested",
            ExportState::Polling => "polling",
            ExportState::Complete => "complete",
            ExportState::Failed => "failed",
            ExportState::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// One asynchronous export job
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Status URL from the kickoff `Content-Location`
    pub status_url: String,
    state: ExportState,
    /// Status polls issued so far
    pub attempts: u32,
    /// Data files listed by the manifest
    pub outputs: Vec<OutputFile>,
    /// OperationOutcome files listed by the manifest
    pub errors: Vec<OutputFile>,
    /// Manifest `transactionTime`
    pub transaction_time: Option<DateTime<Utc>>,
    /// Whether downloads need the bearer token
    pub requires_access_token: bool,
    /// Last `X-Progress` value
    pub progress: Option<String>,
}

impl ExportJob {
    /// A freshly kicked-off job
    pub fn new(status_url: impl Into<String>) -> Self {
        Self {
            status_url: status_url.into(),
            state: ExportState::Requested,
            attempts: 0,
            outputs: Vec::new(),
            errors: Vec::new(),
            transaction_time: None,
            requires_access_token: false,
            progress: None,
        }
    }

    /// Current state
    pub fn state(&self) -> ExportState {
        self.state
    }

    /// Moves the job to `next`
    ///
    /// # Errors
    ///
    /// Returns a `State` error for transitions the lifecycle does not allow, including
    /// any transition out of a terminal state.
    pub fn transition(&mut self, next: ExportState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ConduitError::State(format!(
                "export job {} cannot move from {} to {next}",
                self.status_url, self.state
            )));
        }
        self.state = next;
        Ok(())
    }
}

/// Drives export jobs against one EHR
pub struct BulkExporter<'a> {
    ehr: &'a dyn EhrApi,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl<'a> BulkExporter<'a> {
    /// Creates an exporter using the `[ehr.export]` polling budget
    pub fn new(ehr: &'a dyn EhrApi, config: &BulkExportConfig) -> Self {
        Self {
            ehr,
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            max_poll_attempts: config.max_poll_attempts,
        }
    }

    /// Kicks off an export and returns the job in `Polling`
    ///
    /// # Errors
    ///
    /// Propagates kickoff errors unchanged; no job exists in that case.
    pub async fn start(&self, request: &ExportRequest) -> Result<ExportJob> {
        let status_url = self.ehr.kickoff_export(request).await?;
        let mut job = ExportJob::new(status_url);
        job.transition(ExportState::Polling)?;
        Ok(job)
    }

    /// Polls until the job completes, fails, or the poll budget is spent
    ///
    /// # Errors
    ///
    /// Returns the poll error (job `Failed`) or a `Timeout` (job `TimedOut`).
    pub async fn await_completion(&self, job: &mut ExportJob) -> Result<()> {
        while job.state() == ExportState::Polling {
            if job.attempts >= self.max_poll_attempts {
                job.transition(ExportState::TimedOut)?;
                return Err(ConduitError::Timeout(format!(
                    "export job {} still running after {} polls",
                    job.status_url, job.attempts
                )));
            }

            job.attempts += 1;
            match self.ehr.poll_export(&job.status_url).await {
                Ok(ExportPoll::InProgress { progress }) => {
                    tracing::debug!(
                        status_url = %job.status_url,
                        attempt = job.attempts,
                        progress = ?progress,
                        "Export in progress"
                    );
                    job.progress = progress;
                    job.transition(ExportState::Polling)?;
                    if job.attempts < self.max_poll_attempts {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
                Ok(ExportPoll::Complete(manifest)) => {
                    job.outputs = manifest.output;
                    job.errors = manifest.error;
                    job.transaction_time = manifest.transaction_time;
                    job.requires_access_token = manifest.requires_access_token;
                    job.transition(ExportState::Complete)?;
                    tracing::info!(
                        status_url = %job.status_url,
                        attempts = job.attempts,
                        files = job.outputs.len(),
                        error_files = job.errors.len(),
                        transaction_time = ?job.transaction_time,
                        "Export complete"
                    );
                }
                Err(e) => {
                    job.transition(ExportState::Failed)?;
                    tracing::error!(status_url = %job.status_url, error = %e, "Export failed");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Downloads and parses every output file of a completed job
    ///
    /// # Errors
    ///
    /// Returns a `State` error if the job is not complete, or the first download error.
    pub async fn download(&self, job: &ExportJob) -> Result<RecordSet> {
        if job.state() != ExportState::Complete {
            return Err(ConduitError::State(format!(
                "export job {} is {}, not complete",
                job.status_url,
                job.state()
            )));
        }

        if !job.errors.is_empty() {
            tracing::warn!(
                status_url = %job.status_url,
                error_files = job.errors.len(),
                "Export reported OperationOutcome files"
            );
        }

        let mut records = RecordSet::new();
        for file in &job.outputs {
            let body = self
                .ehr
                .download_output(file, job.requires_access_token)
                .await?;
            let batch = parse_ndjson(&body, &file.url);

            tracing::info!(
                resource_type = %file.resource_type,
                url = %file.url,
                records = batch.records.len(),
                malformed = batch.malformed,
                "Downloaded export file"
            );
            records.add_malformed(batch.malformed);
            records.extend(batch.records);
        }
        Ok(records)
    }

    /// Best-effort cancellation; errors are logged and dropped
    pub async fn cancel(&self, job: &ExportJob) {
        if let Err(e) = self.ehr.cancel_export(&job.status_url).await {
            tracing::warn!(status_url = %job.status_url, error = %e, "Failed to cancel export job");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_happy_path_transitions() {
        let mut job = ExportJob::new("https://ehr/status/1");
        assert_eq!(job.state(), ExportState::Requested);
        job.transition(ExportState::Polling).unwrap();
        job.transition(ExportState::Polling).unwrap();
        job.transition(ExportState::Complete).unwrap();
        assert!(job.state().is_terminal());
    }

    #[test_case(ExportState::Complete ; "complete")]
    #[test_case(ExportState::Failed ; "failed")]
    #[test_case(ExportState::TimedOut ; "timed out")]
    fn test_terminal_states_have_no_exits(terminal: ExportState) {
        let mut job = ExportJob::new("https://ehr/status/1");
        job.transition(ExportState::Polling).unwrap();
        job.transition(terminal).unwrap();

        for next in [
            ExportState::Requested,
            ExportState::Polling,
            ExportState::Complete,
            ExportState::Failed,
            ExportState::TimedOut,
        ] {
            assert!(matches!(job.transition(next), Err(ConduitError::State(_))));
        }
        assert_eq!(job.state(), terminal);
    }

    #[test]
    fn test_requested_cannot_complete_without_polling() {
        let mut job = ExportJob::new("https://ehr/status/1");
        assert!(job.transition(ExportState::Complete).is_err());
        assert!(job.transition(ExportState::Failed).is_ok());
    }
}
