//! Sync command implementation
//!
//! This module implements the `sync` command: one acquisition and reconciliation
//! run from the EHR into the local store.

use crate::cli::exit_code_for;
use crate::config::load_config;
use crate::core::sync::{SyncCoordinator, SyncOptions, SyncSummary};
use crate::domain::ConduitError;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the sync command
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Sync a single patient by EHR id
    #[arg(long)]
    pub patient: Option<String>,

    /// Override the group to export
    #[arg(long)]
    pub group: Option<String>,

    /// Override resource types (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub types: Option<Vec<String>>,

    /// Ignore the stored watermark and acquire everything
    #[arg(long)]
    pub full: bool,
}

impl SyncArgs {
    fn options(&self) -> SyncOptions {
        SyncOptions {
            patient_id: self.patient.clone(),
            group_id: self.group.clone(),
            resource_types: self
                .types
                .as_ref()
                .map(|types| types.iter().map(|t| t.trim().to_string()).collect()),
            full: self.full,
        }
    }

    /// Execute the sync command
    pub async fn execute(
        &self,
        config_path: &str,
        mut shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting sync command");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Configuration error: {e}");
                return Ok(2);
            }
        };

        let coordinator = match SyncCoordinator::new(&config).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize sync");
                eprintln!("Failed to initialize sync: {e}");
                return Ok(match e {
                    ConduitError::Configuration(_) => 2,
                    _ => 4,
                });
            }
        };

        let options = self.options();
        let outcome = tokio::select! {
            outcome = coordinator.execute_sync(&options) => Some(outcome),
            _ = shutdown_signal.changed() => None,
        };

        match outcome {
            None => {
                tracing::warn!("Sync interrupted by shutdown signal");
                println!("⚠️  Sync interrupted; the watermark was not advanced");
                Ok(130)
            }
            Some(Ok(summary)) => {
                print_summary(&summary);
                Ok(if summary.is_successful() { 0 } else { 1 })
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Sync failed");
                eprintln!("❌ Sync failed: {e}");
                Ok(exit_code_for(&e))
            }
        }
    }
}

fn print_summary(summary: &SyncSummary) {
    let status = if summary.is_successful() {
        "✅ Sync completed"
    } else {
        "⚠️  Sync completed with failures"
    };
    println!("{status}");
    println!();
    println!("  Source:    {}", summary.source);
    println!("  Scope:     {}", summary.scope);
    println!("  Strategy:  {}", summary.strategy);
    match summary.since {
        Some(since) => println!("  Since:     {}", since.to_rfc3339()),
        None => println!("  Since:     (full)"),
    }
    println!("  Acquired:  {}", summary.acquired);
    if summary.malformed > 0 {
        println!("  Malformed: {}", summary.malformed);
    }
    println!("  Created:   {}", summary.stats.created);
    println!("  Updated:   {}", summary.stats.updated);
    println!("  Failed:    {}", summary.stats.failed);
    println!("  Duration:  {:.1}s", summary.duration.as_secs_f64());
    match summary.watermark {
        Some(watermark) => println!("  Watermark: {}", watermark.to_rfc3339()),
        None => println!("  Watermark: not advanced"),
    }
    println!();
}
