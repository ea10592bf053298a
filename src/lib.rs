// Conduit - FHIR bulk-data sync
// Copyright (c) 2025 Conduit Contributors
// Licensed under the MIT License

//! # Conduit - FHIR bulk-data sync
//!
//! Conduit pulls clinical records from an external EHR over the FHIR Bulk Data
//! Access API and reconciles them into a local FHIR R4 store, so the same remote
//! record always lands on the same local record across repeated runs.
//!
//! ## Overview
//!
//! - **Acquire** records through a bulk `$export` job, falling back to group or
//!   patient searches when the EHR refuses the export
//! - **Authenticate** with SMART backend-services signed assertions or a client secret
//! - **Reconcile** each record against the store by sync identifier, business
//!   identifier, or semantic match, rewriting references to local ids
//! - **Track** a watermark per (EHR, scope) so the next run only asks for changes
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Acquisition, reconciliation, watermarks and sync runs
//! - [`adapters`] - EHR client, local store client, watermark backends
//! - [`domain`] - Errors, resource keys, records and bundles
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conduit::config::load_config;
//! use conduit::core::sync::{SyncCoordinator, SyncOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("conduit.toml")?;
//!     let coordinator = SyncCoordinator::new(&config).await?;
//!
//!     let summary = coordinator.execute_sync(&SyncOptions::default()).await?;
//!     println!(
//!         "Created {}, updated {}, failed {}",
//!         summary.stats.created, summary.stats.updated, summary.stats.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Library operations return [`domain::Result`], whose error type is
//! [`domain::ConduitError`]. Record-level failures never abort a run; they are
//! counted in the run summary and keep the watermark from advancing.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
