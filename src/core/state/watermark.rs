//! Sync watermark model
//!
//! One watermark exists per (EHR base URL, scope) pair. Its `last_sync_time` becomes the
//! `_since` filter of the next incremental run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scope label used when no group or patient narrows the run
pub const SYSTEM_SCOPE: &str = "system";

/// Last successful sync for one (source, scope) pair
///
/// # Examples
///
/// ```
/// use conduit::core::state::watermark::Watermark;
/// use chrono::Utc;
///
/// let watermark = Watermark::new("https://ehr.example.com/fhir", Some("group/g-1"), Utc::now());
/// assert_eq!(watermark.id, "https://ehr.example.com/fhir::group/g-1");
/// assert_eq!(watermark.scope_label(), "group/g-1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    /// Key of this watermark, see [`Watermark::generate_id`]
    pub id: String,

    /// EHR base URL
    pub source_base_url: String,

    /// `group/<id>`, `patient/<id>`, or `None` for a system-level run
    pub scope_id: Option<String>,

    /// Start of the data window of the next run
    pub last_sync_time: DateTime<Utc>,

    /// When the watermark was written
    pub updated_at: DateTime<Utc>,

    /// Strategy that produced the last run
    #[serde(default)]
    pub last_strategy: Option<String>,

    /// Records created or updated by the last run
    #[serde(default)]
    pub records_synced: u64,
}

impl Watermark {
    /// Creates a watermark for a source and scope
    pub fn new(
        source_base_url: &str,
        scope_id: Option<&str>,
        last_sync_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Self::generate_id(source_base_url, scope_id),
            source_base_url: normalize_source(source_base_url),
            scope_id: scope_id.map(str::to_string),
            last_sync_time,
            updated_at: Utc::now(),
            last_strategy: None,
            records_synced: 0,
        }
    }

    /// Records run details shown by `conduit status`
    pub fn with_run(mut self, strategy: impl Into<String>, records_synced: u64) -> Self {
        self.last_strategy = Some(strategy.into());
        self.records_synced = records_synced;
        self
    }

    /// Key for a (source, scope) pair: `"{source}::{scope}"`
    pub fn generate_id(source_base_url: &str, scope_id: Option<&str>) -> String {
        format!(
            "{}::{}",
            normalize_source(source_base_url),
            scope_id.unwrap_or(SYSTEM_SCOPE)
        )
    }

    /// Scope for display
    pub fn scope_label(&self) -> &str {
        self.scope_id.as_deref().unwrap_or(SYSTEM_SCOPE)
    }
}

fn normalize_source(source_base_url: &str) -> String {
    source_base_url.trim_end_matches('/').to_string()
}
