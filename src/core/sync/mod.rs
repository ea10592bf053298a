//! Sync runs
//!
//! - [`coordinator`] - one run: watermark, acquisition, reconciliation, watermark
//! - [`scheduler`] - daemon loop with overlap guard and graceful shutdown
//! - [`summary`] - run reporting

pub mod coordinator;
pub mod scheduler;
pub mod summary;

pub use coordinator::{SyncCoordinator, SyncOptions};
pub use scheduler::{RunGuard, SchedulerReport, SyncScheduler};
pub use summary::SyncSummary;
