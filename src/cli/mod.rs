//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Conduit using clap.

pub mod commands;

use crate::domain::ConduitError;
use clap::{Parser, Subcommand};

/// Conduit - FHIR bulk-data sync
#[derive(Parser, Debug)]
#[command(name = "conduit")]
#[command(version, about, long_about = None)]
#[command(author = "Conduit Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "conduit.toml", env = "CONDUIT_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CONDUIT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one sync from the EHR into the local store
    Sync(commands::sync::SyncArgs),

    /// Run syncs on the configured schedule until stopped
    Daemon(commands::daemon::DaemonArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show sync watermarks
    Status(commands::status::StatusArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

/// Process exit code for an error that ended a command
///
/// 2 configuration, 4 connection, 5 anything else.
pub fn exit_code_for(error: &ConduitError) -> i32 {
    match error {
        ConduitError::Configuration(_) => 2,
        ConduitError::Connection(_) => 4,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_sync() {
        let cli = Cli::parse_from(["conduit", "sync"]);
        assert_eq!(cli.config, "conduit.toml");
        assert!(matches!(cli.command, Commands::Sync(_)));
    }

    #[test]
    fn test_cli_parse_sync_overrides() {
        let cli = Cli::parse_from([
            "conduit",
            "sync",
            "--patient",
            "p-1",
            "--types",
            "Patient,Observation",
            "--full",
        ]);
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.patient.as_deref(), Some("p-1"));
        assert_eq!(
            args.types,
            Some(vec!["Patient".to_string(), "Observation".to_string()])
        );
        assert!(args.full);
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["conduit", "--config", "custom.toml", "daemon"]);
        assert_eq!(cli.config, "custom.toml");
        assert!(matches!(cli.command, Commands::Daemon(_)));
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["conduit", "--log-level", "debug", "status"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["conduit", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["conduit", "init"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&ConduitError::Configuration("x".into())), 2);
        assert_eq!(exit_code_for(&ConduitError::Connection("x".into())), 4);
        assert_eq!(exit_code_for(&ConduitError::Timeout("x".into())), 5);
    }
}
