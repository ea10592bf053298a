//! Core business logic for Conduit.
//!
//! # Modules
//!
//! - [`acquire`] - Pulling records from the EHR (bulk export, group and patient search)
//! - [`reconcile`] - Identity resolution, reference rewriting and upserts
//! - [`state`] - Watermarks for incremental sync
//! - [`sync`] - Run coordination and the daemon scheduler
//!
//! # Sync Workflow
//!
//! 1. **Load State**: read the watermark for (EHR, scope)
//! 2. **Acquire**: bulk export, falling back to group search on capability denial
//! 3. **Reconcile**: anchors first, then dependents, one record at a time
//! 4. **Checkpoint**: advance the watermark when every record was written
//! 5. **Report**: log the run summary
//!
//! # Example
//!
//! ```rust,no_run
//! use conduit::config::load_config;
//! use conduit::core::sync::{SyncCoordinator, SyncOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("conduit.toml")?;
//! let coordinator = SyncCoordinator::new(&config).await?;
//!
//! let summary = coordinator.execute_sync(&SyncOptions::default()).await?;
//! println!("Created: {}", summary.stats.created);
//! println!("Updated: {}", summary.stats.updated);
//! println!("Failed: {}", summary.stats.failed);
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod reconcile;
pub mod state;
pub mod sync;
