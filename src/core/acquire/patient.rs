//! Single-patient acquisition
//!
//! `Patient/{id}/$everything` first. When the EHR rejects it, the Patient is read and each
//! configured type is searched; after `failure_threshold` consecutive type failures the
//! remaining types are skipped.

use super::search::ResourceSearch;
use super::strategy::RecordSet;
use crate::adapters::ehr::EhrApi;
use crate::config::SearchConfig;
use crate::domain::{ConduitError, ExternalRecord, ResourceKey, ResourceType, Result};
use chrono::{DateTime, Utc};

/// Patient-scoped acquisition over one EHR
pub struct PatientSearch<'a> {
    ehr: &'a dyn EhrApi,
    search: ResourceSearch<'a>,
    failure_threshold: u32,
    types: &'a [String],
}

impl<'a> PatientSearch<'a> {
    pub fn new(ehr: &'a dyn EhrApi, config: &'a SearchConfig, types: &'a [String]) -> Self {
        Self {
            ehr,
            search: ResourceSearch::new(ehr, config),
            failure_threshold: config.failure_threshold.max(1),
            types,
        }
    }

    /// Pulls one patient's records
    ///
    /// # Errors
    ///
    /// Fails when neither `$everything` nor a plain read of the Patient succeeds.
    pub async fn acquire(
        &self,
        patient_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<RecordSet> {
        match self.everything(patient_id, since).await {
            Ok(records) => {
                tracing::info!(
                    patient_id = %patient_id,
                    records = records.len(),
                    "Acquired patient with $everything"
                );
                return Ok(records);
            }
            Err(e) => {
                tracing::warn!(
                    patient_id = %patient_id,
                    error = %e,
                    "$everything failed; falling back to per-type search"
                );
            }
        }

        self.per_type(patient_id, since).await
    }

    async fn everything(
        &self,
        patient_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<RecordSet> {
        let first = self.ehr.patient_everything(patient_id, since).await?;
        let found = self
            .search
            .collect_pages(first, &format!("Patient/{patient_id}/$everything"))
            .await?;

        let mut records = RecordSet::new();
        records.add_malformed(found.malformed);
        records.extend(found.records);
        Ok(records)
    }

    async fn per_type(
        &self,
        patient_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<RecordSet> {
        let key = ResourceKey::new(ResourceType::known("Patient"), patient_id);
        let patient = self
            .ehr
            .read_resource(&key)
            .await?
            .ok_or_else(|| ConduitError::Protocol(format!("{key} not found")))?;

        let mut records = RecordSet::new();
        records.push(ExternalRecord::from_value(patient)?);

        let mut consecutive_failures = 0u32;
        let types: Vec<&str> = self
            .types
            .iter()
            .map(String::as_str)
            .filter(|t| *t != "Patient" && *t != "Group")
            .collect();

        for (index, resource_type) in types.iter().enumerate() {
            match self.search.for_patient(resource_type, patient_id, since).await {
                Ok(found) => {
                    consecutive_failures = 0;
                    records.add_malformed(found.malformed);
                    records.extend(found.records);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        patient_id = %patient_id,
                        resource_type = %resource_type,
                        consecutive_failures,
                        error = %e,
                        "Per-type search failed"
                    );
                    if consecutive_failures >= self.failure_threshold {
                        tracing::warn!(
                            patient_id = %patient_id,
                            skipped = ?&types[index + 1..],
                            "Too many consecutive failures; skipping remaining types"
                        );
                        break;
                    }
                }
            }
        }

        Ok(records)
    }
}
