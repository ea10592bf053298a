//! Paged FHIR search against the EHR

use crate::adapters::ehr::client::format_instant;
use crate::adapters::ehr::EhrApi;
use crate::config::SearchConfig;
use crate::domain::{Bundle, ExternalRecord, Result};
use chrono::{DateTime, Utc};
use url::Url;

/// Types whose patient link is only searchable as `subject`
const SUBJECT_ONLY_TYPES: &[&str] = &[
    "Specimen",
    "Media",
    "QuestionnaireResponse",
    "Flag",
    "Communication",
    "List",
    "ClinicalImpression",
    "RiskAssessment",
];

/// Search parameter that links `resource_type` to a patient
pub fn reference_param(resource_type: &str) -> &'static str {
    match resource_type {
        "Coverage" => "beneficiary",
        t if SUBJECT_ONLY_TYPES.contains(&t) => "subject",
        _ => "patient",
    }
}

/// Records found by one search, plus entries that were not valid resources
#[derive(Debug, Default)]
pub struct SearchResult {
    pub records: Vec<ExternalRecord>,
    pub malformed: usize,
}

/// Runs searches and follows `next` links within the page budget
pub struct ResourceSearch<'a> {
    ehr: &'a dyn EhrApi,
    page_size: u32,
    max_pages: u32,
}

impl<'a> ResourceSearch<'a> {
    pub fn new(ehr: &'a dyn EhrApi, config: &SearchConfig) -> Self {
        Self {
            ehr,
            page_size: config.page_size,
            max_pages: config.max_pages.max(1),
        }
    }

    /// Searches `resource_type` with `params`, adding `_count` and `_lastUpdated=ge<since>`
    ///
    /// # Errors
    ///
    /// Returns the first EHR error; records from earlier pages are discarded.
    pub async fn search(
        &self,
        resource_type: &str,
        params: Vec<(String, String)>,
        since: Option<DateTime<Utc>>,
    ) -> Result<SearchResult> {
        self.search_up_to(resource_type, params, since, usize::MAX).await
    }

    /// Like [`search`](Self::search), but stops paging once `limit` records were read
    pub async fn search_up_to(
        &self,
        resource_type: &str,
        mut params: Vec<(String, String)>,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<SearchResult> {
        let count = usize::try_from(self.page_size).map_or(limit, |size| size.min(limit));
        params.push(("_count".to_string(), count.to_string()));
        if let Some(ref since) = since {
            params.push(("_lastUpdated".to_string(), format!("ge{}", format_instant(since))));
        }

        let first = self.ehr.search(resource_type, &params).await?;
        self.collect_pages_up_to(first, resource_type, limit).await
    }

    /// All records of `resource_type` in a patient's compartment
    pub async fn for_patient(
        &self,
        resource_type: &str,
        patient_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<SearchResult> {
        let params = vec![(
            reference_param(resource_type).to_string(),
            format!("Patient/{patient_id}"),
        )];
        self.search(resource_type, params, since).await
    }

    /// Follows `next` links from `first` until exhausted or `max_pages` pages were read
    pub async fn collect_pages(&self, first: Bundle, label: &str) -> Result<SearchResult> {
        self.collect_pages_up_to(first, label, usize::MAX).await
    }

    async fn collect_pages_up_to(
        &self,
        first: Bundle,
        label: &str,
        limit: usize,
    ) -> Result<SearchResult> {
        let mut result = SearchResult::default();
        let mut page = first;
        let mut pages = 1;

        loop {
            let next = page.next_link().map(|link| self.resolve_link(link));
            absorb(&mut result, page);

            if result.records.len() >= limit {
                result.records.truncate(limit);
                tracing::debug!(search = %label, limit, "Record limit reached");
                break;
            }

            match next {
                Some(url) if pages < self.max_pages => {
                    page = self.ehr.fetch_page(&url).await?;
                    pages += 1;
                }
                Some(_) => {
                    tracing::warn!(
                        search = %label,
                        max_pages = self.max_pages,
                        "Page limit reached; remaining results skipped"
                    );
                    break;
                }
                None => break,
            }
        }

        tracing::debug!(search = %label, pages, records = result.records.len(), "Search complete");
        Ok(result)
    }

    fn resolve_link(&self, link: &str) -> String {
        if Url::parse(link).is_ok() {
            return link.to_string();
        }
        let base = format!("{}/", self.ehr.base_url().trim_end_matches('/'));
        Url::parse(&base)
            .and_then(|b| b.join(link))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| link.to_string())
    }
}

fn absorb(result: &mut SearchResult, page: Bundle) {
    for resource in page.into_resources() {
        match ExternalRecord::from_value(resource) {
            Ok(record) => result.records.push(record),
            Err(e) => {
                result.malformed += 1;
                tracing::warn!(error = %e, "Skipping invalid search entry");
            }
        }
    }
}
