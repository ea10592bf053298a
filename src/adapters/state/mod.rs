//! Watermark persistence backends
//!
//! - [`StoreStateStorage`] - `Basic` resources in the local clinical store (default)
//! - [`PostgreSQLStateStorage`] - `sync_watermarks` table

pub mod postgresql;
pub mod store;
pub mod traits;

pub use postgresql::PostgreSQLStateStorage;
pub use store::StoreStateStorage;
pub use traits::StateStorage;

use crate::adapters::store::ClinicalStore;
use crate::config::schema::{ConduitConfig, StateBackend};
use crate::domain::{ConduitError, Result};
use std::sync::Arc;

/// Create the state storage selected by `[state] backend`
///
/// # Errors
///
/// Returns an error if the PostgreSQL backend is selected but not configured or cannot
/// be reached.
pub async fn create_state_storage(
    config: &ConduitConfig,
    store: Arc<dyn ClinicalStore>,
) -> Result<Arc<dyn StateStorage>> {
    match config.state.backend {
        StateBackend::Store => {
            tracing::info!(store = store.name(), "Using local store for watermarks");
            Ok(Arc::new(StoreStateStorage::new(
                store,
                &config.sync.identifier_system,
            )))
        }
        StateBackend::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                ConduitError::Configuration(
                    "postgresql configuration is required when state.backend = 'postgresql'"
                        .to_string(),
                )
            })?;

            tracing::info!("Using PostgreSQL for watermarks");
            Ok(Arc::new(PostgreSQLStateStorage::new(pg_config).await?))
        }
    }
}
