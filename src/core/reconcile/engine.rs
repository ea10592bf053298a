//! Reconciliation/upsert engine
//!
//! Writes acquired records into the local store exactly once. Anchor types go first so
//! that dependent records can have their references rewritten to local ids; records are
//! written strictly one at a time.

use super::identity::IdentityResolver;
use super::reference_map::ReferenceMap;
use super::references::{collect_references, rewrite_references};
use super::stats::{ReconciliationStats, RecordOutcome};
use crate::adapters::store::traits::resource_id;
use crate::adapters::store::{ClinicalStore, SearchCriterion};
use crate::config::SyncConfig;
use crate::core::acquire::RecordSet;
use crate::domain::{ConduitError, ExternalRecord, Identifier, Result};
use crate::log_record_failure;
use std::collections::HashSet;
use std::sync::Arc;

/// Per-run translation state
#[derive(Debug, Default)]
struct RunContext {
    references: ReferenceMap,
    unresolved: HashSet<String>,
    /// Local `Type/id` written so far
    claimed: HashSet<String>,
}

/// Merges external records into a [`ClinicalStore`]
pub struct ReconciliationEngine {
    store: Arc<dyn ClinicalStore>,
    sync_system: String,
    anchor_types: Vec<String>,
    type_order: Vec<String>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn ClinicalStore>, config: &SyncConfig) -> Self {
        Self {
            store,
            sync_system: config.identifier_system.clone(),
            anchor_types: config.anchor_types.clone(),
            type_order: config.type_order.clone(),
        }
    }

    fn is_anchor(&self, resource_type: &str) -> bool {
        self.anchor_types.iter().any(|t| t == resource_type)
    }

    /// Order in which `types` are processed: anchors, configured order, then alphabetical
    pub fn processing_order<'t>(&self, types: impl IntoIterator<Item = &'t str>) -> Vec<String> {
        let mut remaining: Vec<&str> = types.into_iter().collect();
        remaining.sort_unstable();
        remaining.dedup();

        let mut order = Vec::with_capacity(remaining.len());
        for preferred in self.anchor_types.iter().chain(self.type_order.iter()) {
            if let Some(pos) = remaining.iter().position(|t| t == preferred) {
                order.push(remaining.remove(pos).to_string());
            }
        }
        order.extend(remaining.into_iter().map(str::to_string));
        order
    }

    /// Reconciles every record; single-record failures are counted, not returned
    pub async fn reconcile(&self, records: RecordSet) -> ReconciliationStats {
        let order = self.processing_order(records.types());
        let mut groups = records.into_groups();
        let mut context = RunContext::default();
        let mut stats = ReconciliationStats::new();

        for resource_type in order {
            let Some(batch) = groups.remove(&resource_type) else {
                continue;
            };
            tracing::debug!(resource_type = %resource_type, records = batch.len(), "Reconciling type");

            for record in batch {
                let source_id = record.source_id();
                match self.reconcile_record(record, &source_id, &mut context).await {
                    Ok(outcome) => stats.record(&resource_type, outcome),
                    Err(e) => {
                        log_record_failure!(resource_type, source_id, e);
                        stats.record_failure(&resource_type);
                    }
                }
            }

            if let Some(type_stats) = stats.by_type.get(&resource_type) {
                tracing::info!(
                    resource_type = %resource_type,
                    created = type_stats.created,
                    updated = type_stats.updated,
                    failed = type_stats.failed,
                    "Reconciled type"
                );
            }
        }

        tracing::debug!(mapped_anchors = context.references.len(), "Reference map size");
        stats
    }

    async fn reconcile_record(
        &self,
        record: ExternalRecord,
        source_id: &str,
        context: &mut RunContext,
    ) -> Result<RecordOutcome> {
        let resource_type = record.resource_type().clone();
        let original = record.clone();

        let mut prepared = record;
        prepared.strip_server_fields();
        prepared.set_sync_identifier(&self.sync_system, source_id);

        self.lookup_unmapped_anchors(&prepared, context).await?;
        let references = &context.references;
        rewrite_references(prepared.as_value_mut(), |key| {
            references.get(&key.to_string()).map(str::to_string)
        });

        let resolver = IdentityResolver::new(self.store.as_ref(), &self.sync_system)
            .with_claimed(&context.claimed);
        let matched = resolver.resolve(&prepared, source_id, &original).await?;

        let (stored, outcome) = match matched {
            Some(existing) => {
                let local_id = existing
                    .local_id()
                    .ok_or_else(|| ConduitError::Record("matched record has no id".to_string()))?
                    .to_string();
                tracing::debug!(
                    resource_type = %resource_type,
                    source_id = %source_id,
                    local_id = %local_id,
                    tier = ?existing.tier,
                    "Updating matched record"
                );
                prepared.set_id(&local_id);
                (self.store.update(prepared.as_value()).await?, RecordOutcome::Updated)
            }
            None => {
                let key = Identifier::new(self.sync_system.clone(), source_id);
                let written = self
                    .store
                    .create_if_none_exist(prepared.as_value(), &key)
                    .await?;
                if written.created {
                    (written.resource, RecordOutcome::Created)
                } else {
                    let local_id = resource_id(&written.resource)
                        .ok_or_else(|| ConduitError::Record("matched record has no id".to_string()))?
                        .to_string();
                    prepared.set_id(&local_id);
                    (self.store.update(prepared.as_value()).await?, RecordOutcome::Updated)
                }
            }
        };

        let local_id = resource_id(&stored)
            .ok_or_else(|| ConduitError::Record("store returned no id".to_string()))?;
        context.claimed.insert(format!("{resource_type}/{local_id}"));

        if self.is_anchor(resource_type.as_str()) {
            context
                .references
                .insert(format!("{resource_type}/{source_id}"), format!("{resource_type}/{local_id}"));
        }

        Ok(outcome)
    }

    /// Resolves anchor references not seen in this run by private identifier, once each
    async fn lookup_unmapped_anchors(
        &self,
        record: &ExternalRecord,
        context: &mut RunContext,
    ) -> Result<()> {
        for key in collect_references(record.as_value()) {
            let external = key.to_string();
            if !self.is_anchor(key.resource_type.as_str())
                || context.references.contains(&external)
                || context.unresolved.contains(&external)
            {
                continue;
            }

            let criteria = [SearchCriterion::Identifier(Identifier::new(
                self.sync_system.clone(),
                key.id.clone(),
            ))];
            let found = self.store.search(&key.resource_type, &criteria).await?;

            match found.first().and_then(resource_id) {
                Some(local_id) => {
                    let local = format!("{}/{local_id}", key.resource_type);
                    tracing::debug!(external = %external, local = %local, "Resolved anchor from store");
                    context.references.insert(external, local);
                }
                None => {
                    tracing::debug!(external = %external, "Anchor not present locally");
                    context.unresolved.insert(external);
                }
            }
        }
        Ok(())
    }
}
