//! Reconciliation of acquired records into the local store
//!
//! - [`engine`] - ordering, per-record upsert, anchor mapping
//! - [`identity`] - three-tier identity resolution
//! - [`references`] - reference-path table and rewriting
//! - [`reference_map`] - external-to-local reference map
//! - [`stats`] - per-type counters

pub mod engine;
pub mod identity;
pub mod reference_map;
pub mod references;
pub mod stats;

pub use engine::ReconciliationEngine;
pub use identity::{IdentityMatch, IdentityResolver, MatchTier};
pub use reference_map::ReferenceMap;
pub use references::{collect_references, reference_paths, rewrite_references};
pub use stats::{ReconciliationStats, RecordOutcome, TypeStats};
