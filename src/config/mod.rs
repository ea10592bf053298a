//! Configuration management for Conduit.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! Conduit uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `CONDUIT_<SECTION>_<KEY>` environment overrides
//! - Default values for optional settings
//! - Comprehensive validation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use conduit::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("conduit.toml")?;
//!
//! println!("EHR: {}", config.ehr.base_url);
//! println!("Store: {}", config.store.base_url);
//! if let Some(group) = &config.ehr.group_id {
//!     println!("Group: {group}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level
//! - [`EhrConfig`] - EHR endpoint, credentials, export and search limits
//! - [`StoreConfig`] - Local clinical store endpoint and credentials
//! - [`SyncConfig`] - Identifier system, processing order, schedule
//! - [`StateConfig`] - Watermark backend
//! - [`PostgreSQLConfig`] - PostgreSQL watermark backend
//! - [`LoggingConfig`] - Logging configuration
//!
//! # Example Configuration
//!
//! ```toml
//! [ehr]
//! base_url = "https://ehr.example.com/fhir/R4"
//! client_id = "conduit"
//! auth_method = "private_key_jwt"
//! private_key_path = "/etc/conduit/ehr-key.pem"
//! key_id = "conduit-2025"
//! group_id = "clinic-a"
//!
//! [store]
//! base_url = "http://localhost:8103/fhir/R4"
//! auth = "bearer"
//! token = "${CONDUIT_STORE_TOKEN}"
//!
//! [sync]
//! interval_seconds = 3600
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::load_config;
pub use schema::{
    ApplicationConfig, AuthMethod, BulkExportConfig, ConduitConfig, EhrConfig, Environment,
    LoggingConfig, PostgreSQLConfig, RetryConfig, SearchConfig, SigningAlgorithm, StateBackend,
    StateConfig, StoreAuth, StoreConfig, SyncConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
