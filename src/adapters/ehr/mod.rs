//! External EHR adapter
//!
//! - [`CredentialProvider`] - SMART backend-services / client-secret tokens
//! - [`discover_token_endpoint`] - `.well-known` metadata lookup
//! - [`EhrApi`] / [`FhirEhrClient`] - bulk export, search and read over FHIR R4

pub mod auth;
pub mod client;
pub mod discovery;
pub mod models;

pub use auth::{BearerToken, ClientCredential, CredentialProvider};
pub use client::{EhrApi, FhirEhrClient};
pub use discovery::discover_token_endpoint;
pub use models::{ExportManifest, ExportPoll, ExportRequest, OutputFile};
