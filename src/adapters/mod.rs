//! External system integrations for Conduit.
//!
//! - [`ehr`] - The external EHR (FHIR R4 Bulk Data, search, SMART backend auth)
//! - [`store`] - The local clinical store (trait-based, FHIR REST and in-memory)
//! - [`state`] - Watermark persistence (local store or PostgreSQL)
//!
//! # Design Pattern
//!
//! Adapters isolate external systems behind traits ([`ehr::EhrApi`],
//! [`store::ClinicalStore`], [`state::StateStorage`]) so the sync engine can be driven by
//! test doubles.
//!
//! ```rust,no_run
//! use conduit::adapters::store::{ClinicalStore, FhirStore};
//! use conduit::config::StoreConfig;
//!
//! # async fn example(config: StoreConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let store = FhirStore::new(&config)?;
//! println!("Writing to {}", store.name());
//! # Ok(())
//! # }
//! ```

pub mod ehr;
pub mod state;
pub mod store;
