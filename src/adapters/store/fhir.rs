//! FHIR REST implementation of [`ClinicalStore`]
//!
//! Conditional creates use the `If-None-Exist` header: the server answers 201 when it
//! created the resource and 200 when an existing record matched.

use super::traits::{resource_id, resource_type_of, ClinicalStore, SearchCriterion, WriteOutcome};
use crate::config::{StoreAuth, StoreConfig};
use crate::domain::{Bundle, ConduitError, Identifier, ResourceType, Result, StoreError};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;

const FHIR_JSON: &str = "application/fhir+json";

/// Local store reached over FHIR REST
pub struct FhirStore {
    base_url: String,
    client: Client,
    auth_header: Option<String>,
}

impl FhirStore {
    /// Creates a store client from configuration
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the HTTP client cannot be built.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConduitError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        let auth_header = match config.auth {
            StoreAuth::None => None,
            StoreAuth::Bearer => config
                .token
                .as_ref()
                .map(|t| format!("Bearer {}", t.expose_secret().as_ref())),
            StoreAuth::Basic => match (&config.username, &config.password) {
                (Some(username), Some(password)) => {
                    let credentials = format!("{username}:{}", password.expose_secret().as_ref());
                    let encoded = general_purpose::STANDARD.encode(credentials.as_bytes());
                    Some(format!("Basic {encoded}"))
                }
                _ => None,
            },
        };

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            auth_header,
        })
    }

    fn with_headers(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", FHIR_JSON);
        match self.auth_header {
            Some(ref auth) => request.header("Authorization", auth),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.with_headers(request)
            .send()
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()).into())
    }

    async fn parse_resource(response: Response) -> Result<Value> {
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        serde_json::from_str(&body)
            .map_err(|e| StoreError::InvalidResponse(format!("{e}: {body}")).into())
    }

    async fn write_error(response: Response) -> ConduitError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        StoreError::WriteFailed { status, message }.into()
    }
}

#[async_trait]
impl ClinicalStore for FhirStore {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn search(
        &self,
        resource_type: &ResourceType,
        criteria: &[SearchCriterion],
    ) -> Result<Vec<Value>> {
        let url = format!("{}/{}", self.base_url, resource_type);
        let query: Vec<(String, String)> = criteria.iter().map(|c| c.to_query_pair()).collect();

        tracing::debug!(resource_type = %resource_type, criteria = ?query, "Searching local store");

        let response = self.send(self.client.get(&url).query(&query)).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::QueryFailed(format!(
                "search {resource_type} failed with status {status}: {body}"
            ))
            .into());
        }

        let bundle: Bundle = serde_json::from_value(Self::parse_resource(response).await?)
            .map_err(|e| StoreError::InvalidResponse(format!("not a Bundle: {e}")))?;
        Ok(bundle.into_resources())
    }

    async fn read(&self, resource_type: &ResourceType, id: &str) -> Result<Option<Value>> {
        let url = format!("{}/{}/{}", self.base_url, resource_type, id);
        let response = self.send(self.client.get(&url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(None),
            s if s.is_success() => Ok(Some(Self::parse_resource(response).await?)),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::QueryFailed(format!(
                    "read {resource_type}/{id} failed with status {s}: {body}"
                ))
                .into())
            }
        }
    }

    async fn create(&self, resource: &Value) -> Result<Value> {
        let resource_type = resource_type_of(resource)?;
        let url = format!("{}/{}", self.base_url, resource_type);

        let response = self
            .send(
                self.client
                    .post(&url)
                    .header("Content-Type", FHIR_JSON)
                    .header("Prefer", "return=representation")
                    .json(resource),
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::write_error(response).await);
        }
        Self::parse_resource(response).await
    }

    async fn create_if_none_exist(
        &self,
        resource: &Value,
        identifier: &Identifier,
    ) -> Result<WriteOutcome> {
        let resource_type = resource_type_of(resource)?;
        let url = format!("{}/{}", self.base_url, resource_type);
        let condition = format!("identifier={}", identifier.as_token());

        let response = self
            .send(
                self.client
                    .post(&url)
                    .header("Content-Type", FHIR_JSON)
                    .header("Prefer", "return=representation")
                    .header("If-None-Exist", condition)
                    .json(resource),
            )
            .await?;

        match response.status() {
            StatusCode::CREATED => Ok(WriteOutcome {
                resource: Self::parse_resource(response).await?,
                created: true,
            }),
            StatusCode::OK => {
                // Some servers answer a matched condition with an empty body
                let body = response.text().await.unwrap_or_default();
                let existing = match serde_json::from_str::<Value>(&body) {
                    Ok(v) if resource_id(&v).is_some() => v,
                    _ => self
                        .search(
                            &resource_type,
                            &[SearchCriterion::Identifier(identifier.clone())],
                        )
                        .await?
                        .into_iter()
                        .next()
                        .ok_or_else(|| {
                            StoreError::InvalidResponse(format!(
                                "conditional create matched {} but search found nothing",
                                identifier.as_token()
                            ))
                        })?,
                };
                Ok(WriteOutcome {
                    resource: existing,
                    created: false,
                })
            }
            StatusCode::PRECONDITION_FAILED => Err(StoreError::Conflict(format!(
                "multiple {resource_type} records carry identifier {}",
                identifier.as_token()
            ))
            .into()),
            _ => Err(Self::write_error(response).await),
        }
    }

    async fn update(&self, resource: &Value) -> Result<Value> {
        let resource_type = resource_type_of(resource)?;
        let id = resource_id(resource).ok_or_else(|| StoreError::WriteFailed {
            status: 400,
            message: "update requires an id".to_string(),
        })?;
        let url = format!("{}/{}/{}", self.base_url, resource_type, id);

        let response = self
            .send(
                self.client
                    .put(&url)
                    .header("Content-Type", FHIR_JSON)
                    .header("Prefer", "return=representation")
                    .json(resource),
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::write_error(response).await);
        }
        Self::parse_resource(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;
    use mockito::Matcher;
    use serde_json::json;

    fn store_for(server: &mockito::ServerGuard) -> FhirStore {
        FhirStore::new(&StoreConfig {
            base_url: server.url(),
            auth: StoreAuth::Bearer,
            username: None,
            password: None,
            token: Some(secret_string("local-token".to_string())),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    fn patient() -> Value {
        json!({
            "resourceType": "Patient",
            "identifier": [{"system": "urn:sync", "value": "p-1"}]
        })
    }

    #[tokio::test]
    async fn test_conditional_create_created() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/Patient")
            .match_header("If-None-Exist", "identifier=urn:sync|p-1")
            .match_header("Authorization", "Bearer local-token")
            .with_status(201)
            .with_body(r#"{"resourceType":"Patient","id":"42"}"#)
            .create_async()
            .await;

        let store = store_for(&server);
        let outcome = store
            .create_if_none_exist(&patient(), &Identifier::new("urn:sync", "p-1"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(outcome.created);
        assert_eq!(outcome.resource["id"], "42");
    }

    #[tokio::test]
    async fn test_conditional_create_existing_match_with_empty_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/Patient")
            .with_status(200)
            .with_body("")
            .create_async()
            .await;
        server
            .mock("GET", "/Patient")
            .match_query(Matcher::UrlEncoded(
                "identifier".into(),
                "urn:sync|p-1".into(),
            ))
            .with_status(200)
            .with_body(
                json!({"resourceType": "Bundle", "entry": [{"resource": {"resourceType": "Patient", "id": "7"}}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let store = store_for(&server);
        let outcome = store
            .create_if_none_exist(&patient(), &Identifier::new("urn:sync", "p-1"))
            .await
            .unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.resource["id"], "7");
    }

    #[tokio::test]
    async fn test_conditional_create_multiple_matches() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/Patient")
            .with_status(412)
            .create_async()
            .await;

        let store = store_for(&server);
        let err = store
            .create_if_none_exist(&patient(), &Identifier::new("urn:sync", "p-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConduitError::Store(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_read_not_found_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/Patient/missing")
            .with_status(404)
            .create_async()
            .await;

        let store = store_for(&server);
        let rt = ResourceType::new("Patient").unwrap();
        assert!(store.read(&rt, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_puts_to_resource_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/Patient/42")
            .with_status(200)
            .with_body(r#"{"resourceType":"Patient","id":"42","active":true}"#)
            .create_async()
            .await;

        let store = store_for(&server);
        let mut resource = patient();
        resource["id"] = json!("42");
        let updated = store.update(&resource).await.unwrap();

        mock.assert_async().await;
        assert_eq!(updated["active"], true);
    }
}
