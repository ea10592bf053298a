//! EHR wire models
//!
//! Token, discovery and bulk data status payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth token response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,

    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,

    /// Token type (`bearer`)
    #[serde(default)]
    pub token_type: Option<String>,

    /// Granted scope
    #[serde(default)]
    pub scope: Option<String>,
}

/// SMART / OAuth server metadata
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationMetadata {
    /// Token endpoint
    pub token_endpoint: String,

    /// Authorization endpoint
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
}

/// Export kickoff parameters
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    /// Group-level export when set, system-level otherwise
    pub group_id: Option<String>,

    /// `_type` filter
    pub resource_types: Vec<String>,

    /// `_since` filter
    pub since: Option<DateTime<Utc>>,

    /// `_outputFormat`
    pub output_format: String,
}

/// Completed export manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportManifest {
    /// Server time the export snapshot was taken
    pub transaction_time: Option<DateTime<Utc>>,

    /// Original kickoff URL
    #[serde(default)]
    pub request: Option<String>,

    /// Whether output downloads need the bearer token
    #[serde(default)]
    pub requires_access_token: bool,

    /// Data files
    #[serde(default)]
    pub output: Vec<OutputFile>,

    /// OperationOutcome files
    #[serde(default)]
    pub error: Vec<OutputFile>,
}

/// One file listed in a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFile {
    /// Resource type contained in the file
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Download URL
    pub url: String,

    /// Number of resources, when reported
    #[serde(default)]
    pub count: Option<u64>,
}

/// Result of one status poll
#[derive(Debug, Clone)]
pub enum ExportPoll {
    /// 202: still running, with the `X-Progress` text if sent
    InProgress { progress: Option<String> },
    /// 200: finished
    Complete(ExportManifest),
}
