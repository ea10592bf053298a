//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{AuthMethod, ConduitConfig};
use super::secret::secret_string;
use crate::domain::errors::ConduitError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into ConduitConfig
/// 4. Applies environment variable overrides (CONDUIT_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns a `Configuration` error if the file cannot be read or parsed, a referenced
/// environment variable is missing, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use conduit::config::loader::load_config;
///
/// let config = load_config("conduit.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ConduitConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConduitError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ConduitError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: ConduitConfig = toml::from_str(&contents)
        .map_err(|e| ConduitError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config);

    config.validate().map_err(|e| {
        ConduitError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ConduitError::Other(format!("invalid substitution pattern: {e}")))?;
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let processed = re.replace_all(line, |cap: &regex::Captures<'_>| {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    String::new()
                }
            }
        });
        lines.push(processed.into_owned());
    }

    if !missing_vars.is_empty() {
        return Err(ConduitError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

/// Applies environment variable overrides using the CONDUIT_* prefix
///
/// Environment variables follow the pattern: CONDUIT_<SECTION>_<KEY>
/// For example: CONDUIT_EHR_BASE_URL, CONDUIT_SYNC_INTERVAL_SECONDS
fn apply_env_overrides(config: &mut ConduitConfig) {
    // Application overrides
    if let Ok(val) = std::env::var("CONDUIT_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // EHR overrides
    if let Ok(val) = std::env::var("CONDUIT_EHR_BASE_URL") {
        config.ehr.base_url = val;
    }
    if let Ok(val) = std::env::var("CONDUIT_EHR_CLIENT_ID") {
        config.ehr.client_id = val;
    }
    if let Ok(val) = std::env::var("CONDUIT_EHR_CLIENT_SECRET") {
        config.ehr.client_secret = Some(secret_string(val));
    }
    if let Ok(val) = std::env::var("CONDUIT_EHR_AUTH_METHOD") {
        match val.as_str() {
            "client_secret" => config.ehr.auth_method = AuthMethod::ClientSecret,
            "private_key_jwt" => config.ehr.auth_method = AuthMethod::PrivateKeyJwt,
            other => tracing::warn!(value = %other, "Ignoring unknown CONDUIT_EHR_AUTH_METHOD"),
        }
    }
    if let Ok(val) = std::env::var("CONDUIT_EHR_PRIVATE_KEY_PATH") {
        config.ehr.private_key_path = Some(val);
    }
    if let Ok(val) = std::env::var("CONDUIT_EHR_KEY_ID") {
        config.ehr.key_id = Some(val);
    }
    if let Ok(val) = std::env::var("CONDUIT_EHR_TOKEN_URL") {
        config.ehr.token_url = Some(val);
    }
    if let Ok(val) = std::env::var("CONDUIT_EHR_GROUP_ID") {
        config.ehr.group_id = if val.is_empty() { None } else { Some(val) };
    }
    if let Ok(val) = std::env::var("CONDUIT_EHR_RESOURCE_TYPES") {
        config.ehr.resource_types = split_list(&val);
    }
    if let Ok(val) = std::env::var("CONDUIT_EHR_TLS_VERIFY") {
        config.ehr.tls_verify = val.parse().unwrap_or(true);
    }

    // Store overrides
    if let Ok(val) = std::env::var("CONDUIT_STORE_BASE_URL") {
        config.store.base_url = val;
    }
    if let Ok(val) = std::env::var("CONDUIT_STORE_TOKEN") {
        config.store.token = Some(secret_string(val));
    }
    if let Ok(val) = std::env::var("CONDUIT_STORE_PASSWORD") {
        config.store.password = Some(secret_string(val));
    }

    // Sync overrides
    if let Ok(val) = std::env::var("CONDUIT_SYNC_ENABLED") {
        config.sync.enabled = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("CONDUIT_SYNC_INTERVAL_SECONDS") {
        if let Ok(interval) = val.parse() {
            config.sync.interval_seconds = interval;
        }
    }
    if let Ok(val) = std::env::var("CONDUIT_SYNC_RUN_ON_STARTUP") {
        config.sync.run_on_startup = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("CONDUIT_SYNC_MODE") {
        config.sync.mode = val;
    }

    // PostgreSQL overrides (only if PostgreSQL is configured)
    if let Some(ref mut pg) = config.postgresql {
        if let Ok(val) = std::env::var("CONDUIT_POSTGRESQL_CONNECTION_STRING") {
            pg.connection_string = secret_string(val);
        }
    }

    // Logging overrides
    if let Ok(val) = std::env::var("CONDUIT_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("CONDUIT_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
