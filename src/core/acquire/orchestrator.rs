//! Strategy selection
//!
//! An explicit patient request uses [`PatientSearch`]. Everything else starts as a bulk
//! export (group-level when a group is set). A capability denial falls back to
//! [`GroupSearch`] once when a group is set; every other failure propagates unchanged.

use super::export::BulkExporter;
use super::group::GroupSearch;
use super::patient::PatientSearch;
use super::strategy::{Acquisition, AcquisitionStrategy};
use crate::adapters::ehr::{EhrApi, ExportRequest};
use crate::config::{BulkExportConfig, SearchConfig};
use crate::domain::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// What to acquire in one run
#[derive(Debug, Clone, Default)]
pub struct AcquisitionRequest {
    /// Acquire a single patient
    pub patient_id: Option<String>,
    /// Group to export, and to search if export is denied
    pub group_id: Option<String>,
    /// Resource types to pull
    pub resource_types: Vec<String>,
    /// Only records changed at or after this instant
    pub since: Option<DateTime<Utc>>,
}

/// Chooses and runs acquisition strategies against one EHR
pub struct AcquisitionOrchestrator {
    ehr: Arc<dyn EhrApi>,
    export: BulkExportConfig,
    search: SearchConfig,
}

impl AcquisitionOrchestrator {
    pub fn new(ehr: Arc<dyn EhrApi>, export: BulkExportConfig, search: SearchConfig) -> Self {
        Self {
            ehr,
            export,
            search,
        }
    }

    /// Acquires records for `request`
    ///
    /// # Errors
    ///
    /// Propagates authentication, protocol, export and timeout errors. Capability denials
    /// propagate unchanged when no group is configured.
    pub async fn acquire(&self, request: &AcquisitionRequest) -> Result<Acquisition> {
        if let Some(ref patient_id) = request.patient_id {
            let records = PatientSearch::new(self.ehr.as_ref(), &self.search, &request.resource_types)
                .acquire(patient_id, request.since)
                .await?;
            return Ok(Acquisition {
                records,
                transaction_time: None,
                strategy: AcquisitionStrategy::PatientSearch,
            });
        }

        match self.bulk_export(request).await {
            Ok(acquisition) => Ok(acquisition),
            Err(e) if e.is_capability_denied() => match request.group_id {
                Some(ref group_id) => {
                    tracing::warn!(
                        group = %group_id,
                        error = %e,
                        "Bulk export denied; falling back to group search"
                    );
                    let records =
                        GroupSearch::new(self.ehr.as_ref(), &self.search, &request.resource_types)
                            .acquire(group_id, request.since)
                            .await?;
                    Ok(Acquisition {
                        records,
                        transaction_time: None,
                        strategy: AcquisitionStrategy::GroupSearch,
                    })
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn bulk_export(&self, request: &AcquisitionRequest) -> Result<Acquisition> {
        let exporter = BulkExporter::new(self.ehr.as_ref(), &self.export);

        let export_request = ExportRequest {
            group_id: request.group_id.clone(),
            resource_types: request.resource_types.clone(),
            since: request.since,
            output_format: self.export.output_format.clone(),
        };

        let mut job = exporter.start(&export_request).await?;
        if let Err(e) = exporter.await_completion(&mut job).await {
            exporter.cancel(&job).await;
            return Err(e);
        }

        let records = exporter.download(&job).await?;
        Ok(Acquisition {
            records,
            transaction_time: job.transaction_time,
            strategy: AcquisitionStrategy::BulkExport,
        })
    }
}
