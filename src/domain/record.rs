//! External record model
//!
//! An [`ExternalRecord`] is a FHIR resource as received from the EHR. The record is kept
//! as raw JSON because the engine only touches a handful of well-known elements
//! (`id`, `meta`, `identifier` and reference-bearing fields) and must round-trip the rest.

use crate::domain::ids::{ResourceKey, ResourceType};
use crate::domain::{ConduitError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Prefix for ids synthesized from record content
pub const SYNTHESIZED_ID_PREFIX: &str = "syn-";

/// A FHIR `Identifier` (system + value)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    /// Namespace of the value
    pub system: String,
    /// The value, unique within `system`
    pub value: String,
}

impl Identifier {
    /// Creates a new identifier
    pub fn new(system: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            value: value.into(),
        }
    }

    /// Renders the identifier as a FHIR token (`system|value`)
    pub fn as_token(&self) -> String {
        format!("{}|{}", self.system, self.value)
    }
}

/// A clinical record pulled from the EHR
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalRecord {
    resource_type: ResourceType,
    body: Value,
}

impl ExternalRecord {
    /// Wraps a JSON resource
    ///
    /// # Errors
    ///
    /// Returns a `Record` error if the value is not an object or has no valid `resourceType`.
    pub fn from_value(body: Value) -> Result<Self> {
        let type_name = body
            .as_object()
            .ok_or_else(|| ConduitError::Record("resource is not a JSON object".to_string()))?
            .get("resourceType")
            .and_then(Value::as_str)
            .ok_or_else(|| ConduitError::Record("resource has no resourceType".to_string()))?;

        let resource_type = ResourceType::new(type_name).map_err(ConduitError::Record)?;
        Ok(Self {
            resource_type,
            body,
        })
    }

    /// Resource type of the record
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    /// Logical id assigned by the EHR, if any
    pub fn id(&self) -> Option<&str> {
        self.body
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
    }

    /// `Type/id` key on the EHR, if the record has an id
    pub fn key(&self) -> Option<ResourceKey> {
        self.id()
            .map(|id| ResourceKey::new(self.resource_type.clone(), id))
    }

    /// The EHR id, or a deterministic id derived from the record content
    pub fn source_id(&self) -> String {
        match self.id() {
            Some(id) => id.to_string(),
            None => synthesize_id(&self.body),
        }
    }

    /// All identifiers carrying both a system and a value
    pub fn identifiers(&self) -> Vec<Identifier> {
        self.body
            .get("identifier")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let system = item.get("system")?.as_str()?;
                        let value = item.get("value")?.as_str()?;
                        if system.is_empty() || value.is_empty() {
                            return None;
                        }
                        Some(Identifier::new(system, value))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Looks up a value by dotted path (`effectivePeriod.start`). Arrays are not traversed.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.body, |node, segment| node.get(segment))
    }

    /// Removes the EHR id and server-assigned version metadata
    pub fn strip_server_fields(&mut self) {
        if let Some(obj) = self.body.as_object_mut() {
            obj.remove("id");
            let meta_empty = match obj.get_mut("meta").and_then(Value::as_object_mut) {
                Some(meta) => {
                    meta.remove("versionId");
                    meta.remove("lastUpdated");
                    meta.is_empty()
                }
                None => false,
            };
            if meta_empty {
                obj.remove("meta");
            }
        }
    }

    /// Ensures exactly one identifier with `system` exists and that it carries `value`
    pub fn set_sync_identifier(&mut self, system: &str, value: &str) {
        let Some(obj) = self.body.as_object_mut() else {
            return;
        };

        let mut identifiers: Vec<Value> = obj
            .remove("identifier")
            .and_then(|v| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default()
            .into_iter()
            .filter(|item| item.get("system").and_then(Value::as_str) != Some(system))
            .collect();

        let mut entry = Map::new();
        entry.insert("system".to_string(), Value::String(system.to_string()));
        entry.insert("value".to_string(), Value::String(value.to_string()));
        identifiers.push(Value::Object(entry));

        obj.insert("identifier".to_string(), Value::Array(identifiers));
    }

    /// Sets the logical id (used before updating a matched local record)
    pub fn set_id(&mut self, id: &str) {
        if let Some(obj) = self.body.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id.to_string()));
        }
    }

    /// Borrow the raw JSON
    pub fn as_value(&self) -> &Value {
        &self.body
    }

    /// Mutably borrow the raw JSON
    pub fn as_value_mut(&mut self) -> &mut Value {
        &mut self.body
    }

    /// Consumes the record and returns the raw JSON
    pub fn into_value(self) -> Value {
        self.body
    }
}

/// Derives a stable id from resource content
///
/// `serde_json` maps are key-ordered, so the serialized form (and therefore the hash) is
/// independent of the field order the EHR used.
pub fn synthesize_id(body: &Value) -> String {
    let canonical = serde_json::to_string(body).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    let hex: String = digest.iter().take(16).map(|b| format!("{b:02x}")).collect();
    format!("{SYNTHESIZED_ID_PREFIX}{hex}")
}
