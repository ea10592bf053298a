//! Status command implementation
//!
//! This module implements the `status` command for displaying sync watermarks.

use crate::adapters::state::create_state_storage;
use crate::adapters::store::{ClinicalStore, FhirStore};
use crate::config::load_config;
use crate::core::state::{StateManager, Watermark};
use clap::Args;
use std::sync::Arc;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Filter by scope (`system`, `group/<id>`, `patient/<id>`)
    #[arg(long)]
    pub scope: Option<String>,
}

impl StatusArgs {
    fn matches(&self, watermark: &Watermark) -> bool {
        self.scope
            .as_deref()
            .map_or(true, |scope| watermark.scope_label() == scope)
    }

    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking sync status");

        println!("📊 Sync Status");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let store: Arc<dyn ClinicalStore> = match FhirStore::new(&config.store) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                println!("❌ Failed to create store client");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let state_storage = match create_state_storage(&config, store).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to connect to watermark storage");
                println!("   Error: {e}");
                return Ok(4);
            }
        };

        let state_manager = StateManager::new_with_storage(state_storage);

        let watermarks = match state_manager.get_all_watermarks().await {
            Ok(w) => w,
            Err(e) => {
                println!("❌ Failed to load watermarks");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        if watermarks.is_empty() {
            println!("No sync history found.");
            println!("Run 'conduit sync' to start syncing data.");
            return Ok(0);
        }

        let filtered: Vec<_> = watermarks.iter().filter(|w| self.matches(w)).collect();

        if filtered.is_empty() {
            println!("No watermarks match the specified filters.");
            return Ok(0);
        }

        println!("Found {} watermark(s):", filtered.len());
        println!();
        println!(
            "{:<40} {:<24} {:<16} {:<10} {:<20}",
            "Source", "Scope", "Strategy", "Records", "Last Sync"
        );
        println!("{}", "-".repeat(112));

        for watermark in filtered {
            println!(
                "{:<40} {:<24} {:<16} {:<10} {:<20}",
                watermark.source_base_url,
                watermark.scope_label(),
                watermark.last_strategy.as_deref().unwrap_or("-"),
                watermark.records_synced,
                watermark.last_sync_time.format("%Y-%m-%d %H:%M:%S")
            );
        }

        println!();
        Ok(0)
    }
}
