//! Daemon command implementation
//!
//! Runs scheduled syncs until a shutdown signal arrives.

use crate::config::load_config;
use crate::core::sync::{SyncCoordinator, SyncScheduler};
use crate::domain::ConduitError;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the daemon command
#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Override `sync.interval_seconds`
    #[arg(long)]
    pub interval: Option<u64>,
}

impl DaemonArgs {
    /// Execute the daemon command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Configuration error: {e}");
                return Ok(2);
            }
        };

        if !config.sync.enabled {
            tracing::info!("Scheduled sync is disabled (sync.enabled = false)");
            println!("Scheduled sync is disabled. Set sync.enabled = true or use 'conduit sync'.");
            return Ok(0);
        }

        let coordinator = match SyncCoordinator::new(&config).await {
            Ok(c) => Arc::new(c),
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize sync");
                eprintln!("Failed to initialize sync: {e}");
                return Ok(match e {
                    ConduitError::Configuration(_) => 2,
                    _ => 4,
                });
            }
        };

        let mut scheduler = SyncScheduler::new(coordinator, &config.sync);
        if let Some(seconds) = self.interval {
            if seconds < 60 {
                eprintln!("--interval must be >= 60 seconds, got {seconds}");
                return Ok(2);
            }
            scheduler = scheduler.with_interval(Duration::from_secs(seconds));
        }

        println!(
            "🔄 Conduit daemon started (every {}s); press Ctrl+C to stop",
            self.interval.unwrap_or(config.sync.interval_seconds)
        );

        let report = scheduler.run(shutdown_signal).await;

        println!(
            "Daemon stopped: {} completed, {} failed, {} skipped",
            report.completed, report.failed, report.skipped
        );
        Ok(if report.failed > 0 { 1 } else { 0 })
    }
}
