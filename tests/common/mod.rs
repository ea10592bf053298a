//! Shared fakes for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conduit::adapters::ehr::{EhrApi, ExportManifest, ExportPoll, ExportRequest, OutputFile};
use conduit::adapters::store::{ClinicalStore, InMemoryStore, SearchCriterion, WriteOutcome};
use conduit::config::{
    BulkExportConfig, ConduitConfig, EhrConfig, SearchConfig, StoreConfig, SyncConfig,
};
use conduit::domain::{Bundle, ConduitError, Identifier, ResourceKey, ResourceType, Result};
use conduit::domain::bundle::{BundleEntry, BundleLink};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const EHR_BASE: &str = "https://ehr.example.com/fhir";
pub const STATUS_URL: &str = "https://ehr.example.com/fhir/$export-poll/job-1";

/// How the fake answers an export kickoff
#[derive(Debug, Clone)]
pub enum Kickoff {
    Accepted,
    Denied,
    MissingContentLocation,
}

/// Scripted EHR: answers come from the fields below, calls are counted
pub struct ScriptedEhr {
    pub kickoff: Kickoff,
    /// In-progress polls before the manifest is returned; `None` never completes
    pub polls_before_complete: Option<u32>,
    /// Poll error text, returned on the first poll when set
    pub poll_failure: Option<String>,
    pub transaction_time: Option<DateTime<Utc>>,
    /// NDJSON bodies by resource type
    pub files: Vec<(String, String)>,
    /// Resources served by read and search, keyed `Type/id`
    pub resources: HashMap<String, Value>,
    pub everything_denied: bool,
    /// Search results per page; `None` returns everything on one page
    pub search_page_size: Option<usize>,
    /// Types whose searches fail with a server error
    pub failing_types: Vec<String>,

    pub kickoffs: AtomicUsize,
    pub polls: AtomicUsize,
    pub cancels: AtomicUsize,
    pub downloads: AtomicUsize,
    pub reads: AtomicUsize,
    pub searches: AtomicUsize,
    pub pages: AtomicUsize,
    pub last_request: Mutex<Option<ExportRequest>>,
    /// Type of every search, in call order
    pub searched_types: Mutex<Vec<String>>,
    results: Mutex<Vec<Vec<Value>>>,
}

impl ScriptedEhr {
    pub fn new() -> Self {
        Self {
            kickoff: Kickoff::Accepted,
            polls_before_complete: Some(0),
            poll_failure: None,
            transaction_time: None,
            files: Vec::new(),
            resources: HashMap::new(),
            everything_denied: true,
            search_page_size: None,
            failing_types: Vec::new(),
            kickoffs: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
            pages: AtomicUsize::new(0),
            last_request: Mutex::new(None),
            searched_types: Mutex::new(Vec::new()),
            results: Mutex::new(Vec::new()),
        }
    }

    pub fn with_kickoff(mut self, kickoff: Kickoff) -> Self {
        self.kickoff = kickoff;
        self
    }

    pub fn with_polls(mut self, in_progress: Option<u32>) -> Self {
        self.polls_before_complete = in_progress;
        self
    }

    pub fn with_transaction_time(mut self, time: DateTime<Utc>) -> Self {
        self.transaction_time = Some(time);
        self
    }

    /// Adds an export file holding `resources`, one per line
    pub fn with_file(mut self, resource_type: &str, resources: &[Value]) -> Self {
        let body = resources
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        self.files.push((resource_type.to_string(), body));
        self
    }

    /// Makes a resource readable and searchable
    pub fn with_resource(mut self, resource: Value) -> Self {
        let key = format!(
            "{}/{}",
            resource["resourceType"].as_str().unwrap_or_default(),
            resource["id"].as_str().unwrap_or_default()
        );
        self.resources.insert(key, resource);
        self
    }

    pub fn with_search_page_size(mut self, size: usize) -> Self {
        self.search_page_size = Some(size);
        self
    }

    pub fn with_failing_search(mut self, resource_type: &str) -> Self {
        self.failing_types.push(resource_type.to_string());
        self
    }

    pub fn searched(&self) -> Vec<String> {
        self.searched_types.lock().unwrap().clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn manifest(&self) -> ExportManifest {
        ExportManifest {
            transaction_time: self.transaction_time,
            request: None,
            requires_access_token: true,
            output: self
                .files
                .iter()
                .enumerate()
                .map(|(i, (resource_type, _))| OutputFile {
                    resource_type: resource_type.clone(),
                    url: format!("https://files.example.com/{i}.ndjson"),
                    count: None,
                })
                .collect(),
            error: Vec::new(),
        }
    }

    /// Page `offset..offset + size` of stored result list `result`
    fn page(&self, result: usize, offset: usize) -> Result<Bundle> {
        let results = self.results.lock().unwrap();
        let all = results
            .get(result)
            .ok_or_else(|| ConduitError::Protocol(format!("unknown result set {result}")))?;
        let size = self.search_page_size.unwrap_or(all.len().max(1));
        let end = (offset + size).min(all.len());
        let mut bundle = Self::bundle(all[offset.min(end)..end].to_vec());
        if end < all.len() {
            bundle.link.push(BundleLink {
                relation: "next".to_string(),
                url: format!("{EHR_BASE}/_page/{result}/{end}"),
            });
        }
        Ok(bundle)
    }

    fn bundle(resources: Vec<Value>) -> Bundle {
        Bundle {
            total: Some(resources.len() as u64),
            link: Vec::new(),
            entry: resources
                .into_iter()
                .map(|resource| BundleEntry {
                    full_url: None,
                    resource: Some(resource),
                    search: None,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl EhrApi for ScriptedEhr {
    fn base_url(&self) -> &str {
        EHR_BASE
    }

    async fn kickoff_export(&self, request: &ExportRequest) -> Result<String> {
        self.kickoffs.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }
        match self.kickoff {
            Kickoff::Accepted => Ok(STATUS_URL.to_string()),
            Kickoff::Denied => Err(ConduitError::from_status(403, "bulk export not permitted")),
            Kickoff::MissingContentLocation => Err(ConduitError::Protocol(
                "export kickoff returned no Content-Location".to_string(),
            )),
        }
    }

    async fn poll_export(&self, _status_url: &str) -> Result<ExportPoll> {
        let attempt = self.polls.fetch_add(1, Ordering::SeqCst) as u32;
        if let Some(ref failure) = self.poll_failure {
            return Err(ConduitError::ExportFailed(failure.clone()));
        }
        match self.polls_before_complete {
            Some(n) if attempt >= n => Ok(ExportPoll::Complete(self.manifest())),
            _ => Ok(ExportPoll::InProgress {
                progress: Some(format!("{}%", attempt * 10)),
            }),
        }
    }

    async fn download_output(&self, file: &OutputFile, _requires_token: bool) -> Result<String> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let index: usize = file
            .url
            .trim_start_matches("https://files.example.com/")
            .trim_end_matches(".ndjson")
            .parse()
            .map_err(|_| ConduitError::Protocol(format!("unknown file {}", file.url)))?;
        Ok(self.files[index].1.clone())
    }

    async fn cancel_export(&self, _status_url: &str) -> Result<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_resource(&self, key: &ResourceKey) -> Result<Option<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.resources.get(&key.to_string()).cloned())
    }

    /// Matches every non-underscore parameter value as a literal reference
    async fn search(&self, resource_type: &str, params: &[(String, String)]) -> Result<Bundle> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.searched_types.lock().unwrap().push(resource_type.to_string());
        if self.failing_types.iter().any(|t| t == resource_type) {
            return Err(ConduitError::from_status(500, "search backend unavailable"));
        }
        let filters: Vec<String> = params
            .iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .map(|(_, value)| format!("\"reference\":\"{value}\""))
            .collect();

        let mut found: Vec<Value> = self
            .resources
            .values()
            .filter(|r| r["resourceType"] == resource_type)
            .filter(|r| {
                let text = r.to_string();
                filters.iter().all(|f| text.contains(f.as_str()))
            })
            .cloned()
            .collect();
        found.sort_by_key(|r| r["id"].as_str().unwrap_or_default().to_string());

        let result = {
            let mut results = self.results.lock().unwrap();
            results.push(found);
            results.len() - 1
        };
        self.page(result, 0)
    }

    /// Serves `{EHR_BASE}/_page/{result}/{offset}` links
    async fn fetch_page(&self, url: &str) -> Result<Bundle> {
        self.pages.fetch_add(1, Ordering::SeqCst);
        let unexpected = || ConduitError::Protocol(format!("unexpected page request {url}"));
        let rest = url
            .strip_prefix(&format!("{EHR_BASE}/_page/"))
            .ok_or_else(unexpected)?;
        let (result, offset) = rest.split_once('/').ok_or_else(unexpected)?;
        let result = result.parse().map_err(|_| unexpected())?;
        let offset = offset.parse().map_err(|_| unexpected())?;
        self.page(result, offset)
    }

    async fn patient_everything(
        &self,
        patient_id: &str,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Bundle> {
        if self.everything_denied {
            return Err(ConduitError::from_status(403, "$everything not permitted"));
        }
        let reference = format!("\"reference\":\"Patient/{patient_id}\"");
        let found = self
            .resources
            .iter()
            .filter(|(key, r)| {
                key.as_str() == format!("Patient/{patient_id}") || r.to_string().contains(&reference)
            })
            .map(|(_, r)| r.clone())
            .collect();
        Ok(Self::bundle(found))
    }
}

/// In-memory store that rejects writes of one resource type
pub struct RejectingStore {
    pub inner: InMemoryStore,
    pub rejected_type: String,
}

impl RejectingStore {
    pub fn new(rejected_type: &str) -> Self {
        Self {
            inner: InMemoryStore::new(),
            rejected_type: rejected_type.to_string(),
        }
    }

    fn check(&self, resource: &Value) -> Result<()> {
        if resource["resourceType"] == self.rejected_type.as_str() {
            return Err(ConduitError::Record(format!(
                "{} rejected by store",
                self.rejected_type
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ClinicalStore for RejectingStore {
    fn name(&self) -> &str {
        "rejecting"
    }

    async fn search(
        &self,
        resource_type: &ResourceType,
        criteria: &[SearchCriterion],
    ) -> Result<Vec<Value>> {
        self.inner.search(resource_type, criteria).await
    }

    async fn read(&self, resource_type: &ResourceType, id: &str) -> Result<Option<Value>> {
        self.inner.read(resource_type, id).await
    }

    async fn create(&self, resource: &Value) -> Result<Value> {
        self.check(resource)?;
        self.inner.create(resource).await
    }

    async fn create_if_none_exist(
        &self,
        resource: &Value,
        identifier: &Identifier,
    ) -> Result<WriteOutcome> {
        self.check(resource)?;
        self.inner.create_if_none_exist(resource, identifier).await
    }

    async fn update(&self, resource: &Value) -> Result<Value> {
        self.check(resource)?;
        self.inner.update(resource).await
    }
}

pub fn export_config(max_poll_attempts: u32) -> BulkExportConfig {
    BulkExportConfig {
        poll_interval_seconds: 0,
        max_poll_attempts,
        ..BulkExportConfig::default()
    }
}

/// Configuration for coordinator tests; never validated, so zero poll intervals are fine
pub fn test_config(group_id: Option<&str>) -> ConduitConfig {
    let ehr: EhrConfig = toml::from_str(&format!(
        r#"
base_url = "{EHR_BASE}"
client_id = "conduit-test"
resource_types = ["Patient", "Observation"]
"#
    ))
    .expect("ehr config");
    let store: StoreConfig =
        toml::from_str(r#"base_url = "http://localhost:8080/fhir""#).expect("store config");

    let mut config = ConduitConfig {
        application: Default::default(),
        environment: Default::default(),
        ehr,
        store,
        sync: SyncConfig::default(),
        state: Default::default(),
        postgresql: None,
        logging: Default::default(),
    };
    config.ehr.group_id = group_id.map(str::to_string);
    config.ehr.export = export_config(5);
    config.ehr.search = SearchConfig::default();
    config
}
