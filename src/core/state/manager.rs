//! State manager for watermark persistence

use crate::adapters::state::StateStorage;
use crate::core::state::watermark::Watermark;
use crate::domain::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Loads and records watermarks through a [`StateStorage`] backend
#[derive(Clone)]
pub struct StateManager {
    storage: Arc<dyn StateStorage>,
}

impl StateManager {
    /// Create a new StateManager with a state storage backend
    pub fn new_with_storage(storage: Arc<dyn StateStorage>) -> Self {
        Self { storage }
    }

    /// Last successful sync time for a (source, scope) pair, if any
    ///
    /// # Errors
    ///
    /// Returns a `State` error if the backend cannot be read.
    pub async fn last_sync_time(
        &self,
        source_base_url: &str,
        scope_id: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .storage
            .load_watermark(source_base_url, scope_id)
            .await?
            .map(|w| w.last_sync_time))
    }

    /// Writes the watermark of a completed run
    ///
    /// # Errors
    ///
    /// Returns a `State` error if the backend rejects the write.
    pub async fn record_success(
        &self,
        source_base_url: &str,
        scope_id: Option<&str>,
        sync_time: DateTime<Utc>,
        strategy: &str,
        records_synced: u64,
    ) -> Result<Watermark> {
        let watermark =
            Watermark::new(source_base_url, scope_id, sync_time).with_run(strategy, records_synced);

        tracing::debug!(
            watermark_id = %watermark.id,
            last_sync_time = %watermark.last_sync_time,
            "Saving watermark"
        );

        self.storage.save_watermark(&watermark).await?;
        Ok(watermark)
    }

    /// All stored watermarks
    ///
    /// # Errors
    ///
    /// Returns a `State` error if the backend cannot be read.
    pub async fn get_all_watermarks(&self) -> Result<Vec<Watermark>> {
        self.storage.get_all_watermarks().await
    }
}
