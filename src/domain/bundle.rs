//! FHIR `Bundle` (searchset) model shared by the EHR and the local store adapters

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A searchset bundle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bundle {
    /// Total number of matches, when the server reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,

    /// Paging links
    #[serde(default)]
    pub link: Vec<BundleLink>,

    /// Entries on this page
    #[serde(default)]
    pub entry: Vec<BundleEntry>,
}

/// A paging link (`self`, `next`, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleLink {
    /// Link relation
    pub relation: String,
    /// Target URL
    pub url: String,
}

/// One bundle entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleEntry {
    /// Absolute URL of the resource
    #[serde(rename = "fullUrl", default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    /// The resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,

    /// Why the entry is in the result set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<EntrySearch>,
}

/// Search metadata of an entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySearch {
    /// `match`, `include` or `outcome`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl Bundle {
    /// URL of the next page, if any
    pub fn next_link(&self) -> Option<&str> {
        self.link
            .iter()
            .find(|l| l.relation == "next")
            .map(|l| l.url.as_str())
    }

    /// Resources on this page, without `OperationOutcome` entries
    pub fn into_resources(self) -> Vec<Value> {
        self.entry
            .into_iter()
            .filter(|e| {
                e.search.as_ref().and_then(|s| s.mode.as_deref()) != Some("outcome")
            })
            .filter_map(|e| e.resource)
            .filter(|r| r.get("resourceType").and_then(Value::as_str) != Some("OperationOutcome"))
            .collect()
    }
}
