//! Sync coordinator - one acquisition-and-reconciliation run
//!
//! Reads the watermark for the run's (source, scope), acquires records, reconciles them
//! and, when every record was written, advances the watermark to the export transaction
//! time (or the run start time for search-based strategies).
//!
//! Runs narrowed to a subset of the configured types leave the watermark alone.
//! Watermark read and write failures are logged and never fail a run.

use super::summary::SyncSummary;
use crate::adapters::ehr::{EhrApi, FhirEhrClient};
use crate::adapters::state::create_state_storage;
use crate::adapters::store::{ClinicalStore, FhirStore};
use crate::config::ConduitConfig;
use crate::core::acquire::{AcquisitionOrchestrator, AcquisitionRequest};
use crate::core::reconcile::ReconciliationEngine;
use crate::core::state::watermark::SYSTEM_SCOPE;
use crate::core::state::StateManager;
use crate::domain::Result;
use crate::log_sync_start;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

/// Per-run overrides
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Sync a single patient
    pub patient_id: Option<String>,
    /// Group to use instead of `ehr.group_id`
    pub group_id: Option<String>,
    /// Resource types to use instead of `ehr.resource_types`
    pub resource_types: Option<Vec<String>>,
    /// Ignore the watermark
    pub full: bool,
}

/// Runs syncs against one EHR and one local store
pub struct SyncCoordinator {
    ehr: Arc<dyn EhrApi>,
    state: StateManager,
    orchestrator: AcquisitionOrchestrator,
    engine: ReconciliationEngine,
    group_id: Option<String>,
    resource_types: Vec<String>,
    full_mode: bool,
}

impl SyncCoordinator {
    /// Connects to the EHR, the local store and the watermark backend
    ///
    /// # Errors
    ///
    /// Returns configuration, authentication discovery or state backend errors.
    pub async fn new(config: &ConduitConfig) -> Result<Self> {
        let ehr: Arc<dyn EhrApi> = Arc::new(FhirEhrClient::connect(&config.ehr).await?);
        let store: Arc<dyn ClinicalStore> = Arc::new(FhirStore::new(&config.store)?);
        let storage = create_state_storage(config, store.clone()).await?;

        Ok(Self::from_parts(
            config,
            ehr,
            store,
            StateManager::new_with_storage(storage),
        ))
    }

    /// Assembles a coordinator from already-built collaborators
    pub fn from_parts(
        config: &ConduitConfig,
        ehr: Arc<dyn EhrApi>,
        store: Arc<dyn ClinicalStore>,
        state: StateManager,
    ) -> Self {
        let orchestrator = AcquisitionOrchestrator::new(
            ehr.clone(),
            config.ehr.export.clone(),
            config.ehr.search.clone(),
        );
        let engine = ReconciliationEngine::new(store, &config.sync);

        Self {
            ehr,
            state,
            orchestrator,
            engine,
            group_id: config.ehr.group_id.clone(),
            resource_types: config.ehr.resource_types.clone(),
            full_mode: config.sync.is_full(),
        }
    }

    /// Watermark scope for a run
    pub fn scope_for(&self, options: &SyncOptions) -> Option<String> {
        if let Some(ref patient) = options.patient_id {
            return Some(format!("patient/{patient}"));
        }
        options
            .group_id
            .as_ref()
            .or(self.group_id.as_ref())
            .map(|group| format!("group/{group}"))
    }

    /// `true` when `requested` includes every configured type, so the run may advance the
    /// shared watermark
    fn covers_configured_types(&self, requested: &[String]) -> bool {
        self.resource_types.iter().all(|t| requested.contains(t))
    }

    /// Executes one sync run
    ///
    /// # Errors
    ///
    /// Returns acquisition errors (authentication, protocol, export failure, timeout,
    /// unhandled capability denial). Record-level failures are reported in the summary.
    pub async fn execute_sync(&self, options: &SyncOptions) -> Result<SyncSummary> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let source = self.ehr.base_url().to_string();
        let scope = self.scope_for(options);
        let scope_label = scope.as_deref().unwrap_or(SYSTEM_SCOPE).to_string();

        let since = if options.full || self.full_mode {
            tracing::info!("Full sync requested; ignoring watermark");
            None
        } else {
            match self.state.last_sync_time(&source, scope.as_deref()).await {
                Ok(since) => since,
                Err(e) => {
                    tracing::warn!(error = %e, scope = %scope_label, "Failed to read watermark; running full sync");
                    None
                }
            }
        };

        log_sync_start!(source, scope_label, since);

        let request = AcquisitionRequest {
            patient_id: options.patient_id.clone(),
            group_id: options.group_id.clone().or_else(|| self.group_id.clone()),
            resource_types: options
                .resource_types
                .clone()
                .unwrap_or_else(|| self.resource_types.clone()),
            since,
        };

        let covers_all_types = self.covers_configured_types(&request.resource_types);

        let acquisition = self.orchestrator.acquire(&request).await?;
        let acquired = acquisition.records.len();
        let malformed = acquisition.records.malformed();
        tracing::info!(
            strategy = %acquisition.strategy,
            records = acquired,
            malformed,
            "Acquisition complete"
        );

        let stats = self.engine.reconcile(acquisition.records).await;

        let mut watermark = None;
        if stats.has_failures() {
            tracing::warn!(
                failed = stats.failed,
                scope = %scope_label,
                "Keeping previous watermark so failed records are retried"
            );
        } else if !covers_all_types {
            tracing::info!(
                types = ?request.resource_types,
                scope = %scope_label,
                "Type subset synced; watermark not advanced"
            );
        } else {
            let sync_time = acquisition.transaction_time.unwrap_or(started_at);
            match self
                .state
                .record_success(
                    &source,
                    scope.as_deref(),
                    sync_time,
                    acquisition.strategy.as_str(),
                    stats.written() as u64,
                )
                .await
            {
                Ok(saved) => watermark = Some(saved.last_sync_time),
                Err(e) => {
                    tracing::warn!(error = %e, scope = %scope_label, "Failed to save watermark")
                }
            }
        }

        let summary = SyncSummary {
            source,
            scope: scope_label,
            since,
            strategy: acquisition.strategy,
            acquired,
            malformed,
            stats,
            watermark,
            duration: timer.elapsed(),
        };
        summary.log_summary();
        Ok(summary)
    }
}
