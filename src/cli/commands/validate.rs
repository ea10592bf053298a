//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Conduit configuration file.

use crate::config::load_config;
use crate::config::schema::{AuthMethod, StateBackend};
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates after parsing and env overrides
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                println!();
                return Ok(2);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Environment: {:?}", config.environment);
        println!("  Log Level: {}", config.application.log_level);
        println!("  EHR: {}", config.ehr.base_url);
        println!("  Client ID: {}", config.ehr.client_id);
        match config.ehr.auth_method {
            AuthMethod::PrivateKeyJwt => println!(
                "  Auth: private_key_jwt ({:?})",
                config.ehr.signing_algorithm
            ),
            AuthMethod::ClientSecret => println!("  Auth: client_secret"),
        }
        println!(
            "  Token Endpoint: {}",
            config.ehr.token_url.as_deref().unwrap_or("(discovered)")
        );
        if let Some(ref group) = config.ehr.group_id {
            println!("  Group: {group}");
        }
        println!("  Resource Types: {}", config.ehr.resource_types.join(", "));
        println!("  Store: {}", config.store.base_url);
        println!("  Sync Mode: {}", config.sync.mode);
        println!("  Sync Interval: {}s", config.sync.interval_seconds);
        println!("  Identifier System: {}", config.sync.identifier_system);

        match config.state.backend {
            StateBackend::Store => println!("  Watermarks: local store"),
            StateBackend::PostgreSQL => {
                if let Some(ref pg_config) = config.postgresql {
                    use secrecy::ExposeSecret;
                    println!(
                        "  Watermarks: PostgreSQL ({})",
                        pg_config
                            .connection_string
                            .expose_secret()
                            .host_part()
                            .unwrap_or("***")
                    );
                }
            }
        }
        println!();
        Ok(0)
    }
}
