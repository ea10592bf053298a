//! FHIR R4 client for the external EHR
//!
//! [`EhrApi`] is the seam the acquisition layer is written against; [`FhirEhrClient`]
//! implements it over HTTP with bearer tokens from a [`CredentialProvider`].
//!
//! Transient failures (connection errors, 429 and 5xx) are retried with exponential
//! backoff. 401 and 403 surface as [`ConduitError::CapabilityDenied`].

use super::auth::CredentialProvider;
use super::discovery::discover_token_endpoint;
use super::models::{ExportManifest, ExportPoll, ExportRequest, OutputFile};
use crate::config::{EhrConfig, RetryConfig};
use crate::domain::{Bundle, ConduitError, ResourceKey, Result};
use crate::log_retry_attempt;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

const FHIR_JSON: &str = "application/fhir+json";
const NDJSON: &str = "application/fhir+ndjson";

/// Operations the sync engine needs from an EHR
#[async_trait]
pub trait EhrApi: Send + Sync {
    /// FHIR base URL, used to key watermarks
    fn base_url(&self) -> &str;

    /// Starts a bulk export and returns its status URL
    async fn kickoff_export(&self, request: &ExportRequest) -> Result<String>;

    /// Polls an export status URL once
    async fn poll_export(&self, status_url: &str) -> Result<ExportPoll>;

    /// Downloads one NDJSON output file
    async fn download_output(&self, file: &OutputFile, requires_token: bool) -> Result<String>;

    /// Asks the server to cancel and discard an export job
    async fn cancel_export(&self, status_url: &str) -> Result<()>;

    /// Reads one resource; `None` when it does not exist
    async fn read_resource(&self, key: &ResourceKey) -> Result<Option<Value>>;

    /// Type-level search, first page
    async fn search(&self, resource_type: &str, params: &[(String, String)]) -> Result<Bundle>;

    /// Follows a paging link
    async fn fetch_page(&self, url: &str) -> Result<Bundle>;

    /// `Patient/{id}/$everything`, first page
    async fn patient_everything(
        &self,
        patient_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Bundle>;
}

/// Formats an instant the way `_since` and `_lastUpdated` expect
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// HTTP implementation of [`EhrApi`]
pub struct FhirEhrClient {
    base_url: String,
    http: Client,
    credentials: CredentialProvider,
    retry: RetryConfig,
}

impl FhirEhrClient {
    /// Builds a client from `[ehr]`, discovering the token endpoint when none is configured
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error when the HTTP client, the credential or the token
    /// endpoint cannot be set up.
    pub async fn connect(config: &EhrConfig) -> Result<Self> {
        let http = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(!config.tls_verify)
            .build()
            .map_err(|e| ConduitError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        let token_url = match config.token_url {
            Some(ref url) => url.clone(),
            None => discover_token_endpoint(&http, &config.base_url).await?,
        };

        let credentials = CredentialProvider::from_config(config, http.clone(), token_url)?;
        Ok(Self::with_credentials(
            &config.base_url,
            http,
            credentials,
            config.retry.clone(),
        ))
    }

    /// Assembles a client from parts
    pub fn with_credentials(
        base_url: &str,
        http: Client,
        credentials: CredentialProvider,
        retry: RetryConfig,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            credentials,
            retry,
        }
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.credentials.get_token().await?;
        Ok(request.header("Authorization", token.header_value()))
    }

    /// Retries `operation` while it fails with a transient error
    async fn retry_request<F, T, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let max_retries = self.retry.max_retries.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if !e.is_retryable() || attempt >= max_retries {
                        return Err(e);
                    }

                    let factor = self.retry.backoff_multiplier.powf((attempt - 1) as f64);
                    let delay_ms = ((self.retry.initial_delay_ms as f64) * factor) as u64;
                    let delay_ms = delay_ms.min(self.retry.max_delay_ms);

                    log_retry_attempt!(attempt, max_retries, delay_ms, e);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    async fn get_bundle(&self, url: &str, query: &[(String, String)]) -> Result<Bundle> {
        self.retry_request(|| async move {
            let request = self
                .authorized(self.http.get(url).header("Accept", FHIR_JSON))
                .await?
                .query(query);
            let response = error_for_status(request.send().await.map_err(connection_error)?).await?;

            response
                .json::<Bundle>()
                .await
                .map_err(|e| ConduitError::Protocol(format!("Invalid Bundle from {url}: {e}")))
        })
        .await
    }
}

fn connection_error(err: reqwest::Error) -> ConduitError {
    ConduitError::Connection(err.to_string())
}

async fn error_for_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ConduitError::from_status(status.as_u16(), body))
}

#[async_trait]
impl EhrApi for FhirEhrClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn kickoff_export(&self, request: &ExportRequest) -> Result<String> {
        let url = match request.group_id {
            Some(ref group) => format!("{}/Group/{group}/$export", self.base_url),
            None => format!("{}/$export", self.base_url),
        };

        let mut query: Vec<(&str, String)> = Vec::new();
        if !request.output_format.is_empty() {
            query.push(("_outputFormat", request.output_format.clone()));
        }
        if !request.resource_types.is_empty() {
            query.push(("_type", request.resource_types.join(",")));
        }
        if let Some(ref since) = request.since {
            query.push(("_since", format_instant(since)));
        }
        let query = &query;
        let url = url.as_str();

        let status_url = self
            .retry_request(|| async move {
                let request = self
                    .authorized(
                        self.http
                            .get(url)
                            .header("Accept", FHIR_JSON)
                            .header("Prefer", "respond-async"),
                    )
                    .await?
                    .query(query);
                let response =
                    error_for_status(request.send().await.map_err(connection_error)?).await?;

                if response.status() != StatusCode::ACCEPTED {
                    return Err(ConduitError::Protocol(format!(
                        "Export kickoff returned {} instead of 202 Accepted",
                        response.status()
                    )));
                }

                response
                    .headers()
                    .get("Content-Location")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ConduitError::Protocol(
                            "Export kickoff response has no Content-Location header".to_string(),
                        )
                    })
            })
            .await?;

        tracing::info!(kickoff = %url, status_url = %status_url, "Bulk export accepted");
        Ok(status_url)
    }

    async fn poll_export(&self, status_url: &str) -> Result<ExportPoll> {
        self.retry_request(|| async move {
            let request = self
                .authorized(self.http.get(status_url).header("Accept", "application/json"))
                .await?;
            let response = request.send().await.map_err(connection_error)?;
            let status = response.status();

            if status == StatusCode::ACCEPTED {
                let progress = response
                    .headers()
                    .get("X-Progress")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                return Ok(ExportPoll::InProgress { progress });
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ConduitError::ExportFailed(format!(
                    "status {}: {body}",
                    status.as_u16()
                )));
            }

            let manifest = response.json::<ExportManifest>().await.map_err(|e| {
                ConduitError::Protocol(format!("Invalid export manifest: {e}"))
            })?;
            Ok(ExportPoll::Complete(manifest))
        })
        .await
    }

    async fn download_output(&self, file: &OutputFile, requires_token: bool) -> Result<String> {
        let url = file.url.as_str();
        self.retry_request(|| async move {
            let mut request = self.http.get(url).header("Accept", NDJSON);
            if requires_token {
                request = self.authorized(request).await?;
            }
            let response = error_for_status(request.send().await.map_err(connection_error)?).await?;
            response.text().await.map_err(connection_error)
        })
        .await
    }

    async fn cancel_export(&self, status_url: &str) -> Result<()> {
        let request = self.authorized(self.http.delete(status_url)).await?;
        let response = request.send().await.map_err(connection_error)?;

        match response.status() {
            status if status.is_success() => {
                tracing::info!(status_url = %status_url, "Bulk export cancelled");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                tracing::debug!(status_url = %status_url, "Export job already gone");
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(
                    status_url = %status_url,
                    status = status.as_u16(),
                    body = %body,
                    "Export cancellation was not accepted"
                );
                Ok(())
            }
        }
    }

    async fn read_resource(&self, key: &ResourceKey) -> Result<Option<Value>> {
        let url = format!("{}/{key}", self.base_url);
        let url = url.as_str();

        self.retry_request(|| async move {
            let request = self
                .authorized(self.http.get(url).header("Accept", FHIR_JSON))
                .await?;
            let response = request.send().await.map_err(connection_error)?;

            if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
                return Ok(None);
            }

            let response = error_for_status(response).await?;
            response
                .json::<Value>()
                .await
                .map(Some)
                .map_err(|e| ConduitError::Protocol(format!("Invalid resource at {url}: {e}")))
        })
        .await
    }

    async fn search(&self, resource_type: &str, params: &[(String, String)]) -> Result<Bundle> {
        let url = format!("{}/{resource_type}", self.base_url);
        self.get_bundle(&url, params).await
    }

    async fn fetch_page(&self, url: &str) -> Result<Bundle> {
        self.get_bundle(url, &[]).await
    }

    async fn patient_everything(
        &self,
        patient_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Bundle> {
        let url = format!("{}/Patient/{patient_id}/$everything", self.base_url);
        let params: Vec<(String, String)> = since
            .iter()
            .map(|s| ("_since".to_string(), format_instant(s)))
            .collect();
        self.get_bundle(&url, &params).await
    }
}
