//! Token endpoint discovery
//!
//! Tries `/.well-known/smart-configuration` first, then
//! `/.well-known/oauth-authorization-server`.

use super::models::AuthorizationMetadata;
use crate::domain::{ConduitError, Result};
use reqwest::Client;

const WELL_KNOWN_PATHS: [&str; 2] = [
    ".well-known/smart-configuration",
    ".well-known/oauth-authorization-server",
];

/// Finds the token endpoint advertised by the EHR at `base_url`
///
/// # Errors
///
/// Returns a `Configuration` error when neither document is available.
pub async fn discover_token_endpoint(client: &Client, base_url: &str) -> Result<String> {
    let base = base_url.trim_end_matches('/');
    let mut failures = Vec::new();

    for path in WELL_KNOWN_PATHS {
        let url = format!("{base}/{path}");
        match fetch_metadata(client, &url).await {
            Ok(metadata) => {
                tracing::info!(
                    document = %url,
                    token_endpoint = %metadata.token_endpoint,
                    "Discovered token endpoint"
                );
                return Ok(metadata.token_endpoint);
            }
            Err(e) => {
                tracing::debug!(document = %url, error = %e, "Discovery document unavailable");
                failures.push(format!("{path}: {e}"));
            }
        }
    }

    Err(ConduitError::Configuration(format!(
        "Could not discover a token endpoint for {base}; set ehr.token_url ({})",
        failures.join("; ")
    )))
}

async fn fetch_metadata(client: &Client, url: &str) -> Result<AuthorizationMetadata> {
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| ConduitError::Connection(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ConduitError::RequestFailed {
            status: status.as_u16(),
            message: "discovery document not found".to_string(),
        });
    }

    response
        .json::<AuthorizationMetadata>()
        .await
        .map_err(|e| ConduitError::Protocol(format!("Invalid discovery document: {e}")))
}
