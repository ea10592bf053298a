//! Watermarks kept in the local clinical store
//!
//! Each watermark is a FHIR `Basic` resource identified by
//! `<identifier_system>/watermark|<watermark id>`, with the serialized watermark in an
//! extension.

use super::traits::StateStorage;
use crate::adapters::store::{ClinicalStore, SearchCriterion};
use crate::core::state::watermark::Watermark;
use crate::domain::{ConduitError, Identifier, ResourceType, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const WATERMARK_CODE: &str = "sync-watermark";

/// [`StateStorage`] on top of a [`ClinicalStore`]
pub struct StoreStateStorage {
    store: Arc<dyn ClinicalStore>,
    system: String,
}

impl StoreStateStorage {
    /// Creates the backend; `identifier_system` is the integration's private system
    pub fn new(store: Arc<dyn ClinicalStore>, identifier_system: &str) -> Self {
        Self {
            store,
            system: format!("{}/watermark", identifier_system.trim_end_matches('/')),
        }
    }

    fn basic_type() -> ResourceType {
        ResourceType::known("Basic")
    }

    fn to_resource(&self, watermark: &Watermark) -> Result<Value> {
        let payload = serde_json::to_string(watermark)?;
        Ok(json!({
            "resourceType": "Basic",
            "identifier": [{"system": self.system, "value": watermark.id}],
            "code": {"coding": [{"system": self.system, "code": WATERMARK_CODE}]},
            "extension": [{"url": self.system, "valueString": payload}]
        }))
    }

    fn from_resource(&self, resource: &Value) -> Result<Watermark> {
        let payload = resource
            .get("extension")
            .and_then(Value::as_array)
            .and_then(|exts| {
                exts.iter()
                    .find(|e| e.get("url").and_then(Value::as_str) == Some(self.system.as_str()))
            })
            .and_then(|e| e.get("valueString"))
            .and_then(Value::as_str)
            .ok_or_else(|| ConduitError::State("watermark resource has no payload".to_string()))?;

        serde_json::from_str(payload)
            .map_err(|e| ConduitError::State(format!("corrupt watermark payload: {e}")))
    }

    async fn find(&self, id: &str) -> Result<Option<Value>> {
        let criteria = [SearchCriterion::Identifier(Identifier::new(
            self.system.clone(),
            id,
        ))];
        let mut found = self
            .store
            .search(&Self::basic_type(), &criteria)
            .await
            .map_err(as_state_error)?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.remove(0))
        })
    }
}

fn as_state_error(err: ConduitError) -> ConduitError {
    match err {
        ConduitError::State(_) => err,
        other => ConduitError::State(other.to_string()),
    }
}

#[async_trait]
impl StateStorage for StoreStateStorage {
    async fn load_watermark(
        &self,
        source_base_url: &str,
        scope_id: Option<&str>,
    ) -> Result<Option<Watermark>> {
        let id = Watermark::generate_id(source_base_url, scope_id);
        match self.find(&id).await? {
            Some(resource) => self.from_resource(&resource).map(Some),
            None => {
                tracing::debug!(watermark_id = %id, "No watermark found (first sync)");
                Ok(None)
            }
        }
    }

    async fn save_watermark(&self, watermark: &Watermark) -> Result<()> {
        let mut resource = self.to_resource(watermark)?;

        match self.find(&watermark.id).await? {
            Some(existing) => {
                if let Some(id) = existing.get("id").cloned() {
                    resource["id"] = id;
                }
                self.store.update(&resource).await.map_err(as_state_error)?;
            }
            None => {
                let key = Identifier::new(self.system.clone(), watermark.id.clone());
                self.store
                    .create_if_none_exist(&resource, &key)
                    .await
                    .map_err(as_state_error)?;
            }
        }

        tracing::debug!(watermark_id = %watermark.id, store = self.store.name(), "Watermark saved");
        Ok(())
    }

    async fn get_all_watermarks(&self) -> Result<Vec<Watermark>> {
        let criteria = [SearchCriterion::Token {
            param: "code".to_string(),
            field: "code".to_string(),
            system: Some(self.system.clone()),
            code: WATERMARK_CODE.to_string(),
        }];
        let resources = self
            .store
            .search(&Self::basic_type(), &criteria)
            .await
            .map_err(as_state_error)?;

        let mut watermarks = resources
            .iter()
            .map(|r| self.from_resource(r))
            .collect::<Result<Vec<_>>>()?;
        watermarks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(watermarks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::InMemoryStore;
    use chrono::{TimeZone, Utc};

    const SYSTEM: &str = "https://conduit.dev/fhir/sync-id";

    #[tokio::test]
    async fn test_save_overwrites_existing_watermark() {
        let store = Arc::new(InMemoryStore::new());
        let storage = StoreStateStorage::new(store.clone(), SYSTEM);
        let source = "https://ehr/fhir";

        let first = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        storage
            .save_watermark(&Watermark::new(source, None, first))
            .await
            .unwrap();
        storage
            .save_watermark(&Watermark::new(source, None, second))
            .await
            .unwrap();

        assert_eq!(store.count("Basic").await, 1);
        let loaded = storage.load_watermark(source, None).await.unwrap().unwrap();
        assert_eq!(loaded.last_sync_time, second);
    }

    #[tokio::test]
    async fn test_get_all_watermarks_sorted() {
        let store = Arc::new(InMemoryStore::new());
        let storage = StoreStateStorage::new(store, SYSTEM);
        let now = Utc::now();

        storage
            .save_watermark(&Watermark::new("https://ehr/fhir", Some("patient/p-9"), now))
            .await
            .unwrap();
        storage
            .save_watermark(&Watermark::new("https://ehr/fhir", Some("group/g-1"), now))
            .await
            .unwrap();

        let all = storage.get_all_watermarks().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].scope_label(), "group/g-1");
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_state_error() {
        let store = Arc::new(InMemoryStore::new());
        let storage = StoreStateStorage::new(store.clone(), SYSTEM);
        let id = Watermark::generate_id("https://ehr/fhir", None);
        store
            .create(&json!({
                "resourceType": "Basic",
                "identifier": [{"system": format!("{SYSTEM}/watermark"), "value": id}],
                "extension": [{"url": format!("{SYSTEM}/watermark"), "valueString": "not json"}]
            }))
            .await
            .unwrap();

        let err = storage
            .load_watermark("https://ehr/fhir", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConduitError::State(_)));
    }
}
