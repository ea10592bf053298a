//! Local clinical store abstraction
//!
//! The reconciliation engine never talks to a concrete store. It searches, reads and
//! writes through [`ClinicalStore`], which the FHIR REST adapter and the in-memory test
//! store both implement.

use crate::domain::{ConduitError, Identifier, ResourceType, Result};
use async_trait::async_trait;
use serde_json::Value;

/// One search restriction
///
/// Each variant carries both the FHIR search parameter (used by REST stores) and the
/// element path it indexes (used by stores that evaluate matches themselves).
#[derive(Debug, Clone, PartialEq)]
pub enum SearchCriterion {
    /// `identifier=system|value`
    Identifier(Identifier),

    /// Reference parameter, e.g. `subject=Patient/123`
    Reference {
        param: String,
        field: String,
        reference: String,
    },

    /// Token parameter over a CodeableConcept, e.g. `code=http://loinc.org|8867-4`
    Token {
        param: String,
        field: String,
        system: Option<String>,
        code: String,
    },

    /// Date parameter matched exactly against any of `fields`
    Date {
        param: String,
        fields: Vec<String>,
        value: String,
    },
}

impl SearchCriterion {
    /// Query parameter name and value for a REST search
    pub fn to_query_pair(&self) -> (String, String) {
        match self {
            SearchCriterion::Identifier(id) => ("identifier".to_string(), id.as_token()),
            SearchCriterion::Reference {
                param, reference, ..
            } => (param.clone(), reference.clone()),
            SearchCriterion::Token {
                param, system, code, ..
            } => {
                let value = match system {
                    Some(system) => format!("{system}|{code}"),
                    None => code.clone(),
                };
                (param.clone(), value)
            }
            SearchCriterion::Date { param, value, .. } => (param.clone(), value.clone()),
        }
    }

    /// Evaluates the criterion against a resource
    pub fn matches(&self, resource: &Value) -> bool {
        match self {
            SearchCriterion::Identifier(wanted) => resource
                .get("identifier")
                .and_then(Value::as_array)
                .map(|ids| {
                    ids.iter().any(|id| {
                        id.get("system").and_then(Value::as_str) == Some(wanted.system.as_str())
                            && id.get("value").and_then(Value::as_str)
                                == Some(wanted.value.as_str())
                    })
                })
                .unwrap_or(false),
            SearchCriterion::Reference {
                field, reference, ..
            } => lookup(resource, field)
                .and_then(|r| r.get("reference"))
                .and_then(Value::as_str)
                == Some(reference.as_str()),
            SearchCriterion::Token {
                field,
                system,
                code,
                ..
            } => lookup(resource, field)
                .and_then(|cc| cc.get("coding"))
                .and_then(Value::as_array)
                .map(|codings| {
                    codings.iter().any(|c| {
                        c.get("code").and_then(Value::as_str) == Some(code.as_str())
                            && system.as_deref().map_or(true, |s| {
                                c.get("system").and_then(Value::as_str) == Some(s)
                            })
                    })
                })
                .unwrap_or(false),
            SearchCriterion::Date { fields, value, .. } => fields.iter().any(|field| {
                lookup(resource, field).and_then(Value::as_str) == Some(value.as_str())
            }),
        }
    }
}

fn lookup<'a>(resource: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(resource, |node, segment| node.get(segment))
}

/// Result of a conditional create
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// The stored resource (with its local id)
    pub resource: Value,
    /// `false` when an existing record matched the condition
    pub created: bool,
}

/// Local clinical store
#[async_trait]
pub trait ClinicalStore: Send + Sync {
    /// Human-readable store name for logs
    fn name(&self) -> &str;

    /// Returns all resources of `resource_type` matching every criterion
    async fn search(
        &self,
        resource_type: &ResourceType,
        criteria: &[SearchCriterion],
    ) -> Result<Vec<Value>>;

    /// Reads one resource; `None` when it does not exist
    async fn read(&self, resource_type: &ResourceType, id: &str) -> Result<Option<Value>>;

    /// Creates a resource and returns it with its assigned id
    async fn create(&self, resource: &Value) -> Result<Value>;

    /// Creates the resource unless a record with `identifier` already exists
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` when more than one record carries the identifier.
    async fn create_if_none_exist(
        &self,
        resource: &Value,
        identifier: &Identifier,
    ) -> Result<WriteOutcome>;

    /// Replaces the resource with the id it carries
    async fn update(&self, resource: &Value) -> Result<Value>;
}

/// Reads `resourceType` of a resource about to be written
pub fn resource_type_of(resource: &Value) -> Result<ResourceType> {
    let name = resource
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| ConduitError::Record("resource has no resourceType".to_string()))?;
    ResourceType::new(name).map_err(ConduitError::Record)
}

/// Reads the logical id of a resource
pub fn resource_id(resource: &Value) -> Option<&str> {
    resource.get("id").and_then(Value::as_str)
}
