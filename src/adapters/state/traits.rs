//! Watermark storage abstraction

use crate::core::state::watermark::Watermark;
use crate::domain::Result;
use async_trait::async_trait;

/// Persistence for sync watermarks
///
/// Implementations report every failure as `ConduitError::State`.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Loads the watermark of a (source, scope) pair
    async fn load_watermark(
        &self,
        source_base_url: &str,
        scope_id: Option<&str>,
    ) -> Result<Option<Watermark>>;

    /// Creates or replaces a watermark
    async fn save_watermark(&self, watermark: &Watermark) -> Result<()>;

    /// All watermarks, ordered by id
    async fn get_all_watermarks(&self) -> Result<Vec<Watermark>>;
}
