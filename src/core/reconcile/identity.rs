//! Identity resolution
//!
//! Decides whether an incoming record already has a local counterpart. Tiers are tried
//! in order and the first match wins:
//!
//! 1. same type and private sync identifier
//! 2. same type and one of the record's own identifiers
//! 3. same type, anchor reference, code and date (only for types with a rule)

use crate::adapters::store::{ClinicalStore, SearchCriterion};
use crate::domain::{ExternalRecord, Identifier, ResourceKey, ResourceType, Result};
use serde_json::Value;
use std::collections::HashSet;

/// Which tier produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    SyncIdentifier,
    BusinessIdentifier,
    Semantic,
}

/// An existing local record
#[derive(Debug, Clone)]
pub struct IdentityMatch {
    pub local: Value,
    pub tier: MatchTier,
}

impl IdentityMatch {
    /// Local logical id
    pub fn local_id(&self) -> Option<&str> {
        self.local.get("id").and_then(Value::as_str)
    }
}

/// Fields that identify a clinical event when identifiers do not
struct SemanticRule {
    resource_type: &'static str,
    anchor_param: &'static str,
    anchor_field: &'static str,
    code_param: &'static str,
    code_field: &'static str,
    date_param: &'static str,
    date_fields: &'static [&'static str],
}

const SEMANTIC_RULES: &[SemanticRule] = &[
    SemanticRule {
        resource_type: "Observation",
        anchor_param: "subject",
        anchor_field: "subject",
        code_param: "code",
        code_field: "code",
        date_param: "date",
        date_fields: &["effectiveDateTime", "effectiveInstant", "effectivePeriod.start"],
    },
    SemanticRule {
        resource_type: "Condition",
        anchor_param: "subject",
        anchor_field: "subject",
        code_param: "code",
        code_field: "code",
        date_param: "onset-date",
        date_fields: &["onsetDateTime"],
    },
    SemanticRule {
        resource_type: "Procedure",
        anchor_param: "subject",
        anchor_field: "subject",
        code_param: "code",
        code_field: "code",
        date_param: "date",
        date_fields: &["performedDateTime", "performedPeriod.start"],
    },
    SemanticRule {
        resource_type: "DiagnosticReport",
        anchor_param: "subject",
        anchor_field: "subject",
        code_param: "code",
        code_field: "code",
        date_param: "date",
        date_fields: &["effectiveDateTime", "effectivePeriod.start"],
    },
    SemanticRule {
        resource_type: "Immunization",
        anchor_param: "patient",
        anchor_field: "patient",
        code_param: "vaccine-code",
        code_field: "vaccineCode",
        date_param: "date",
        date_fields: &["occurrenceDateTime"],
    },
    SemanticRule {
        resource_type: "MedicationRequest",
        anchor_param: "subject",
        anchor_field: "subject",
        code_param: "code",
        code_field: "medicationCodeableConcept",
        date_param: "authoredon",
        date_fields: &["authoredOn"],
    },
    SemanticRule {
        resource_type: "AllergyIntolerance",
        anchor_param: "patient",
        anchor_field: "patient",
        code_param: "code",
        code_field: "code",
        date_param: "date",
        date_fields: &["recordedDate"],
    },
];

/// `true` when `resource_type` has a semantic matching rule
pub fn has_semantic_rule(resource_type: &str) -> bool {
    rule_for(resource_type).is_some()
}

fn rule_for(resource_type: &str) -> Option<&'static SemanticRule> {
    SEMANTIC_RULES.iter().find(|r| r.resource_type == resource_type)
}

/// Resolves incoming records against one local store
pub struct IdentityResolver<'a> {
    store: &'a dyn ClinicalStore,
    sync_system: &'a str,
    claimed: Option<&'a HashSet<String>>,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(store: &'a dyn ClinicalStore, sync_system: &'a str) -> Self {
        Self {
            store,
            sync_system,
            claimed: None,
        }
    }

    /// Local records (`Type/id`) already written for another source record in this run.
    /// Tiers 2 and 3 never return them.
    pub fn with_claimed(mut self, claimed: &'a HashSet<String>) -> Self {
        self.claimed = Some(claimed);
        self
    }

    fn is_claimed(&self, local: &Value) -> bool {
        let (Some(claimed), Some(resource_type), Some(id)) = (
            self.claimed,
            local.get("resourceType").and_then(Value::as_str),
            local.get("id").and_then(Value::as_str),
        ) else {
            return false;
        };
        claimed.contains(&format!("{resource_type}/{id}"))
    }

    async fn search_unclaimed(
        &self,
        resource_type: &ResourceType,
        criteria: &[SearchCriterion],
    ) -> Result<Vec<Value>> {
        let mut found = self.store.search(resource_type, criteria).await?;
        found.retain(|local| !self.is_claimed(local));
        Ok(found)
    }

    /// Finds the local counterpart of `prepared`
    ///
    /// `prepared` is the record after reference rewriting; `original` is the record as
    /// received, whose anchor reference is tried second in tier 3.
    ///
    /// # Errors
    ///
    /// Propagates store search errors.
    pub async fn resolve(
        &self,
        prepared: &ExternalRecord,
        source_id: &str,
        original: &ExternalRecord,
    ) -> Result<Option<IdentityMatch>> {
        let resource_type = prepared.resource_type();

        let sync_id = Identifier::new(self.sync_system, source_id);
        let mut found = self
            .store
            .search(resource_type, &[SearchCriterion::Identifier(sync_id)])
            .await?;
        if !found.is_empty() {
            if found.len() > 1 {
                tracing::warn!(
                    resource_type = %resource_type,
                    source_id = %source_id,
                    matches = found.len(),
                    "Several local records carry the same sync identifier"
                );
            }
            return Ok(Some(IdentityMatch {
                local: found.swap_remove(0),
                tier: MatchTier::SyncIdentifier,
            }));
        }

        for identifier in prepared
            .identifiers()
            .into_iter()
            .filter(|id| id.system != self.sync_system)
        {
            let mut found = self
                .search_unclaimed(resource_type, &[SearchCriterion::Identifier(identifier.clone())])
                .await?;
            match found.len() {
                0 => continue,
                1 => {
                    return Ok(Some(IdentityMatch {
                        local: found.swap_remove(0),
                        tier: MatchTier::BusinessIdentifier,
                    }))
                }
                n => {
                    tracing::debug!(
                        resource_type = %resource_type,
                        identifier = %identifier.as_token(),
                        matches = n,
                        "Ambiguous identifier match ignored"
                    );
                }
            }
        }

        self.semantic_match(prepared, original).await
    }

    async fn semantic_match(
        &self,
        prepared: &ExternalRecord,
        original: &ExternalRecord,
    ) -> Result<Option<IdentityMatch>> {
        let Some(rule) = rule_for(prepared.resource_type().as_str()) else {
            return Ok(None);
        };

        let Some((system, code)) = first_coding(prepared.get_path(rule.code_field)) else {
            return Ok(None);
        };
        let Some(date) = rule
            .date_fields
            .iter()
            .find_map(|f| prepared.get_path(f).and_then(Value::as_str))
        else {
            return Ok(None);
        };

        let mut anchors: Vec<String> = Vec::with_capacity(2);
        for record in [prepared, original] {
            let reference = anchor_reference(record, rule.anchor_field);
            if let Some(reference) = reference {
                if !anchors.contains(&reference) {
                    anchors.push(reference);
                }
            }
        }

        for anchor in anchors {
            let criteria = [
                SearchCriterion::Reference {
                    param: rule.anchor_param.to_string(),
                    field: rule.anchor_field.to_string(),
                    reference: anchor.clone(),
                },
                SearchCriterion::Token {
                    param: rule.code_param.to_string(),
                    field: rule.code_field.to_string(),
                    system: system.clone(),
                    code: code.clone(),
                },
                SearchCriterion::Date {
                    param: rule.date_param.to_string(),
                    fields: rule.date_fields.iter().map(|f| f.to_string()).collect(),
                    value: date.to_string(),
                },
            ];

            let mut found = self
                .search_unclaimed(prepared.resource_type(), &criteria)
                .await?;
            if found.len() == 1 {
                tracing::debug!(
                    resource_type = %prepared.resource_type(),
                    anchor = %anchor,
                    "Semantic match"
                );
                return Ok(Some(IdentityMatch {
                    local: found.swap_remove(0),
                    tier: MatchTier::Semantic,
                }));
            }
        }

        Ok(None)
    }
}

/// Normalized anchor reference (`Type/id`) at `field`
fn anchor_reference(record: &ExternalRecord, field: &str) -> Option<String> {
    record
        .get_path(field)?
        .get("reference")?
        .as_str()
        .and_then(ResourceKey::parse)
        .map(|key| key.to_string())
}

/// First coding with a code in a CodeableConcept
fn first_coding(concept: Option<&Value>) -> Option<(Option<String>, String)> {
    concept?
        .get("coding")?
        .as_array()?
        .iter()
        .find_map(|coding| {
            let code = coding.get("code")?.as_str()?;
            let system = coding.get("system").and_then(Value::as_str).map(str::to_string);
            Some((system, code.to_string()))
        })
}
