//! Local clinical store adapters
//!
//! - [`FhirStore`] - FHIR R4 REST server
//! - [`InMemoryStore`] - map-backed store for tests

pub mod fhir;
pub mod memory;
pub mod traits;

pub use fhir::FhirStore;
pub use memory::InMemoryStore;
pub use traits::{ClinicalStore, SearchCriterion, WriteOutcome};
