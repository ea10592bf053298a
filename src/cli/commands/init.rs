//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "conduit.toml")]
    pub output: String,

    /// Include example values and comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing Conduit configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your EHR and store URLs", self.output);
                println!("  2. Register the client with the EHR and note its client_id");
                println!("  3. Point ehr.private_key_path at the registered signing key,");
                println!("     or set auth_method = \"client_secret\" and CONDUIT_EHR_CLIENT_SECRET");
                println!("  4. Validate configuration: conduit validate-config");
                println!("  5. Run a sync: conduit sync");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file: {e}");
                Ok(5)
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# Conduit Configuration File

environment = "development"

[application]
log_level = "info"

[ehr]
base_url = "https://ehr.example.com/fhir/r4"
client_id = "conduit"
auth_method = "private_key_jwt"
private_key_path = "/etc/conduit/private_key.pem"
key_id = "conduit-key-1"
signing_algorithm = "RS384"
scope = "system/*.read"
resource_types = ["Patient", "Encounter", "Observation", "Condition"]

[store]
base_url = "http://localhost:8080/fhir"
auth = "none"

[sync]
mode = "incremental"
interval_seconds = 3600

[state]
backend = "store"

[logging]
local_enabled = true
local_path = "/var/log/conduit"
local_rotation = "daily"
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    fn generate_config_with_examples() -> String {
        r#"# Conduit Configuration File
#
# Values of the form ${VAR} are replaced from the environment when the file is loaded.
# Any CONDUIT_<SECTION>_<KEY> variable overrides the matching setting.

# development | staging | production (tls_verify cannot be disabled in production)
environment = "development"

[application]
# trace | debug | info | warn | error
log_level = "info"

[ehr]
# FHIR R4 base URL of the source EHR
base_url = "https://ehr.example.com/fhir/r4"

client_id = "conduit"

# private_key_jwt (SMART backend services) | client_secret
auth_method = "private_key_jwt"

# PEM key registered with the EHR; RS384 needs an RSA key, ES384 a P-384 key
private_key_path = "/etc/conduit/private_key.pem"
key_id = "conduit-key-1"
signing_algorithm = "RS384"

# Only used with auth_method = "client_secret"
# client_secret = "${CONDUIT_EHR_CLIENT_SECRET}"

# Discovered from .well-known/smart-configuration when omitted
# token_url = "https://ehr.example.com/oauth2/token"

scope = "system/*.read"

# Group-level export; also enables the group search fallback
# group_id = "my-population"

resource_types = [
    "Patient",
    "Encounter",
    "Observation",
    "Condition",
    "MedicationRequest",
    "AllergyIntolerance",
    "Procedure",
    "Immunization",
]

tls_verify = true
timeout_seconds = 60

[ehr.export]
poll_interval_seconds = 10
# Polls before the export is considered timed out
max_poll_attempts = 360
output_format = "application/fhir+ndjson"

[ehr.search]
page_size = 100
max_pages = 10
# Patients searched when a group has no member list
max_group_members = 1000
# Consecutive per-type failures before the remaining types are skipped
failure_threshold = 2

[ehr.retry]
max_retries = 3
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0

[store]
# FHIR R4 base URL of the local clinical store
base_url = "http://localhost:8080/fhir"

# none | bearer | basic
auth = "none"
# token = "${CONDUIT_STORE_TOKEN}"
# username = "conduit"
# password = "${CONDUIT_STORE_PASSWORD}"

timeout_seconds = 60

[sync]
# Identifier system stamped on every record this integration writes
identifier_system = "https://conduit.dev/fhir/sync-id"

# Processed first, in this order, so later records can reference them
anchor_types = ["Organization", "Practitioner", "Location", "Patient", "Encounter"]

# Preferred order for the remaining types
type_order = []

# incremental | full
mode = "incremental"

# Daemon schedule
enabled = true
interval_seconds = 3600
run_on_startup = true
shutdown_timeout_secs = 30

[state]
# store (Basic resources in the local store) | postgresql
backend = "store"

# Required when state.backend = "postgresql"
# [postgresql]
# connection_string = "${CONDUIT_POSTGRESQL_CONNECTION_STRING}"
# max_connections = 5
# connection_timeout_seconds = 30
# statement_timeout_seconds = 60
# ssl_mode = "prefer"

[logging]
local_enabled = true
local_path = "/var/log/conduit"
# daily | hourly
local_rotation = "daily"
"#
        .to_string()
    }
}
