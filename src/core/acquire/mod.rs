//! Record acquisition from the EHR
//!
//! - [`orchestrator`] - strategy selection and capability fallback
//! - [`export`] - bulk export job state machine
//! - [`group`] / [`patient`] - search-based fallbacks
//! - [`search`] - paged search and the patient reference parameter table
//! - [`ndjson`] - export file parsing

pub mod export;
pub mod group;
pub mod ndjson;
pub mod orchestrator;
pub mod patient;
pub mod search;
pub mod strategy;

pub use export::{BulkExporter, ExportJob, ExportState};
pub use group::GroupSearch;
pub use ndjson::{parse_ndjson, NdjsonBatch};
pub use orchestrator::{AcquisitionOrchestrator, AcquisitionRequest};
pub use patient::PatientSearch;
pub use search::{reference_param, ResourceSearch};
pub use strategy::{Acquisition, AcquisitionStrategy, RecordSet};
