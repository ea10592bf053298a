//! Group-scoped search fallback
//!
//! Enumerates the members of `Group/{id}` (or, for a group without a member list, the
//! first `max_group_members` patients) and pulls each member's records by search.

use super::search::ResourceSearch;
use super::strategy::RecordSet;
use crate::adapters::ehr::EhrApi;
use crate::config::SearchConfig;
use crate::domain::{ConduitError, ExternalRecord, ResourceKey, ResourceType, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Group search over one EHR
pub struct GroupSearch<'a> {
    ehr: &'a dyn EhrApi,
    search: ResourceSearch<'a>,
    config: &'a SearchConfig,
    types: &'a [String],
}

impl<'a> GroupSearch<'a> {
    /// `types` are the configured resource types; `Patient` and `Group` are handled apart
    pub fn new(ehr: &'a dyn EhrApi, config: &'a SearchConfig, types: &'a [String]) -> Self {
        Self {
            ehr,
            search: ResourceSearch::new(ehr, config),
            config,
            types,
        }
    }

    /// Pulls every member's records
    ///
    /// # Errors
    ///
    /// Fails only when the group itself cannot be read or enumerated. Per-member failures
    /// are logged and skipped.
    pub async fn acquire(&self, group_id: &str, since: Option<DateTime<Utc>>) -> Result<RecordSet> {
        let group_key = ResourceKey::new(ResourceType::known("Group"), group_id);
        let group = self
            .ehr
            .read_resource(&group_key)
            .await?
            .ok_or_else(|| ConduitError::Protocol(format!("{group_key} not found")))?;

        let mut records = RecordSet::new();
        let mut prefetched: HashMap<String, ExternalRecord> = HashMap::new();

        let mut members = member_patient_ids(&group);
        if members.is_empty() {
            tracing::info!(
                group = %group_id,
                cap = self.config.max_group_members,
                "Group has no member list; enumerating patients"
            );
            let found = self
                .search
                .search_up_to("Patient", Vec::new(), None, self.config.max_group_members)
                .await?;
            records.add_malformed(found.malformed);
            for patient in found.records {
                if let Some(id) = patient.id().map(str::to_string) {
                    members.push(id.clone());
                    prefetched.insert(id, patient);
                }
            }
        }

        let total = members.len();
        let mut failed_members = 0usize;
        tracing::info!(group = %group_id, members = total, "Searching group members");

        for patient_id in members {
            let patient = prefetched.remove(&patient_id);
            match self.member_records(&patient_id, patient, since).await {
                Ok(member) => {
                    records.add_malformed(member.malformed());
                    for (_, batch) in member.into_groups() {
                        records.extend(batch);
                    }
                }
                Err(e) => {
                    failed_members += 1;
                    tracing::warn!(
                        group = %group_id,
                        patient_id = %patient_id,
                        error = %e,
                        "Skipping group member"
                    );
                }
            }
        }

        tracing::info!(
            group = %group_id,
            members = total,
            failed_members,
            records = records.len(),
            "Group search complete"
        );
        Ok(records)
    }

    async fn member_records(
        &self,
        patient_id: &str,
        patient: Option<ExternalRecord>,
        since: Option<DateTime<Utc>>,
    ) -> Result<RecordSet> {
        let mut records = RecordSet::new();

        let patient = match patient {
            Some(p) => p,
            None => {
                let key = ResourceKey::new(ResourceType::known("Patient"), patient_id);
                let value = self
                    .ehr
                    .read_resource(&key)
                    .await?
                    .ok_or_else(|| ConduitError::Record(format!("{key} not found")))?;
                ExternalRecord::from_value(value)?
            }
        };
        records.push(patient);

        for resource_type in self.dependent_types() {
            let found = self.search.for_patient(resource_type, patient_id, since).await?;
            records.add_malformed(found.malformed);
            records.extend(found.records);
        }
        Ok(records)
    }

    fn dependent_types(&self) -> impl Iterator<Item = &str> {
        self.types
            .iter()
            .map(String::as_str)
            .filter(|t| *t != "Patient" && *t != "Group")
    }
}

/// Patient ids referenced by `member[].entity`, in group order
pub fn member_patient_ids(group: &Value) -> Vec<String> {
    group
        .get("member")
        .and_then(Value::as_array)
        .map(|members| {
            members
                .iter()
                .filter(|m| m.get("inactive").and_then(Value::as_bool) != Some(true))
                .filter_map(|m| m.get("entity")?.get("reference")?.as_str())
                .filter_map(ResourceKey::parse)
                .filter(|key| key.resource_type.as_str() == "Patient")
                .map(|key| key.id)
                .collect()
        })
        .unwrap_or_default()
}
