//! In-memory clinical store
//!
//! Evaluates searches locally with [`SearchCriterion::matches`]. Nothing is persisted.

use super::traits::{resource_id, resource_type_of, ClinicalStore, SearchCriterion, WriteOutcome};
use crate::domain::{Identifier, ResourceType, Result, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Map-backed [`ClinicalStore`]
#[derive(Default)]
pub struct InMemoryStore {
    resources: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    next_id: AtomicU64,
    writes: AtomicU64,
}

impl InMemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// All resources of one type, ordered by local id
    pub async fn all(&self, resource_type: &str) -> Vec<Value> {
        self.resources
            .read()
            .await
            .get(resource_type)
            .map(|by_id| by_id.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of resources of one type
    pub async fn count(&self, resource_type: &str) -> usize {
        self.resources
            .read()
            .await
            .get(resource_type)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Number of creates and updates served so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn assign_id(&self) -> String {
        format!("local-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn insert(&self, resource: &Value) -> Result<Value> {
        let resource_type = resource_type_of(resource)?;
        let mut stored = resource.clone();
        let id = self.assign_id();
        if let Some(obj) = stored.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id.clone()));
        }

        self.resources
            .write()
            .await
            .entry(resource_type.as_str().to_string())
            .or_default()
            .insert(id, stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}

#[async_trait]
impl ClinicalStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn search(
        &self,
        resource_type: &ResourceType,
        criteria: &[SearchCriterion],
    ) -> Result<Vec<Value>> {
        let guard = self.resources.read().await;
        Ok(guard
            .get(resource_type.as_str())
            .map(|by_id| {
                by_id
                    .values()
                    .filter(|r| criteria.iter().all(|c| c.matches(r)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn read(&self, resource_type: &ResourceType, id: &str) -> Result<Option<Value>> {
        Ok(self
            .resources
            .read()
            .await
            .get(resource_type.as_str())
            .and_then(|by_id| by_id.get(id))
            .cloned())
    }

    async fn create(&self, resource: &Value) -> Result<Value> {
        self.insert(resource).await
    }

    async fn create_if_none_exist(
        &self,
        resource: &Value,
        identifier: &Identifier,
    ) -> Result<WriteOutcome> {
        let resource_type = resource_type_of(resource)?;
        let mut existing = self
            .search(
                &resource_type,
                &[SearchCriterion::Identifier(identifier.clone())],
            )
            .await?;

        match existing.len() {
            0 => Ok(WriteOutcome {
                resource: self.insert(resource).await?,
                created: true,
            }),
            1 => Ok(WriteOutcome {
                resource: existing.remove(0),
                created: false,
            }),
            n => Err(StoreError::Conflict(format!(
                "{n} {resource_type} records carry identifier {}",
                identifier.as_token()
            ))
            .into()),
        }
    }

    async fn update(&self, resource: &Value) -> Result<Value> {
        let resource_type = resource_type_of(resource)?;
        let id = resource_id(resource)
            .ok_or_else(|| StoreError::WriteFailed {
                status: 400,
                message: "update requires an id".to_string(),
            })?
            .to_string();

        let mut guard = self.resources.write().await;
        let by_id = guard.entry(resource_type.as_str().to_string()).or_default();
        if !by_id.contains_key(&id) {
            return Err(StoreError::WriteFailed {
                status: 404,
                message: format!("{resource_type}/{id} not found"),
            }
            .into());
        }
        by_id.insert(id, resource.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(resource.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConduitError;
    use serde_json::json;

    fn patient(value: &str) -> Value {
        json!({
            "resourceType": "Patient",
            "identifier": [{"system": "urn:sync", "value": value}]
        })
    }

    #[tokio::test]
    async fn test_create_assigns_local_ids() {
        let store = InMemoryStore::new();
        let a = store.create(&patient("a")).await.unwrap();
        let b = store.create(&patient("b")).await.unwrap();
        assert_eq!(a["id"], "local-1");
        assert_eq!(b["id"], "local-2");
        assert_eq!(store.count("Patient").await, 2);
    }

    #[tokio::test]
    async fn test_create_if_none_exist_returns_existing() {
        let store = InMemoryStore::new();
        let key = Identifier::new("urn:sync", "a");

        let first = store.create_if_none_exist(&patient("a"), &key).await.unwrap();
        let second = store.create_if_none_exist(&patient("a"), &key).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.resource["id"], second.resource["id"]);
        assert_eq!(store.count("Patient").await, 1);
    }

    #[tokio::test]
    async fn test_create_if_none_exist_conflict() {
        let store = InMemoryStore::new();
        store.create(&patient("dup")).await.unwrap();
        store.create(&patient("dup")).await.unwrap();

        let err = store
            .create_if_none_exist(&patient("dup"), &Identifier::new("urn:sync", "dup"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConduitError::Store(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_requires_existing_record() {
        let store = InMemoryStore::new();
        let mut created = store.create(&patient("a")).await.unwrap();
        created["active"] = json!(true);
        store.update(&created).await.unwrap();

        let rt = ResourceType::new("Patient").unwrap();
        let read = store.read(&rt, "local-1").await.unwrap().unwrap();
        assert_eq!(read["active"], true);

        let mut ghost = patient("ghost");
        ghost["id"] = json!("local-99");
        assert!(store.update(&ghost).await.is_err());
    }
}
