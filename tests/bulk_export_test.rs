//! Integration tests for the bulk export job lifecycle and strategy fallback

mod common;

use common::{export_config, Kickoff, ScriptedEhr};
use conduit::config::SearchConfig;
use conduit::core::acquire::{
    AcquisitionOrchestrator, AcquisitionRequest, AcquisitionStrategy, BulkExporter, ExportState,
    GroupSearch, PatientSearch, ResourceSearch,
};
use conduit::adapters::ehr::ExportRequest;
use conduit::domain::ConduitError;
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use test_case::test_case;

fn patient(id: &str) -> serde_json::Value {
    json!({"resourceType": "Patient", "id": id, "name": [{"family": "Doe"}]})
}

fn observation(id: &str, patient_id: &str) -> serde_json::Value {
    json!({
        "resourceType": "Observation",
        "id": id,
        "status": "final",
        "subject": {"reference": format!("Patient/{patient_id}")},
        "code": {"coding": [{"system": "http://loinc.org", "code": "8867-4"}]},
        "effectiveDateTime": "2025-01-10T08:00:00Z"
    })
}

fn request(group: Option<&str>) -> AcquisitionRequest {
    AcquisitionRequest {
        patient_id: None,
        group_id: group.map(str::to_string),
        resource_types: vec!["Patient".to_string(), "Observation".to_string()],
        since: None,
    }
}

#[test_case(0 ; "complete on first poll")]
#[test_case(1 ; "one in-progress poll")]
#[test_case(4 ; "four in-progress polls")]
#[tokio::test]
async fn test_export_completes_after_n_plus_one_polls(in_progress: u32) {
    let ehr = ScriptedEhr::new().with_polls(Some(in_progress));
    let config = export_config(10);
    let exporter = BulkExporter::new(&ehr, &config);

    let mut job = exporter.start(&ExportRequest::default()).await.unwrap();
    assert_eq!(job.state(), ExportState::Polling);

    exporter.await_completion(&mut job).await.unwrap();

    assert_eq!(job.state(), ExportState::Complete);
    assert_eq!(ScriptedEhr::count(&ehr.polls), in_progress as usize + 1);
    assert_eq!(job.attempts, in_progress + 1);
}

#[tokio::test]
async fn test_export_times_out_after_max_polls() {
    let ehr = ScriptedEhr::new().with_polls(None);
    let config = export_config(3);
    let exporter = BulkExporter::new(&ehr, &config);

    let mut job = exporter.start(&ExportRequest::default()).await.unwrap();
    let err = exporter.await_completion(&mut job).await.unwrap_err();

    assert!(matches!(err, ConduitError::Timeout(_)));
    assert_eq!(job.state(), ExportState::TimedOut);
    assert_eq!(ScriptedEhr::count(&ehr.polls), 3);
}

#[tokio::test]
async fn test_export_failure_marks_job_failed() {
    let mut ehr = ScriptedEhr::new();
    ehr.poll_failure = Some("status 500: disk full".to_string());
    let config = export_config(3);
    let exporter = BulkExporter::new(&ehr, &config);

    let mut job = exporter.start(&ExportRequest::default()).await.unwrap();
    let err = exporter.await_completion(&mut job).await.unwrap_err();

    assert!(matches!(err, ConduitError::ExportFailed(_)));
    assert_eq!(job.state(), ExportState::Failed);
    assert_eq!(ScriptedEhr::count(&ehr.polls), 1);
}

#[tokio::test]
async fn test_download_requires_complete_job() {
    let ehr = ScriptedEhr::new().with_polls(None);
    let config = export_config(3);
    let exporter = BulkExporter::new(&ehr, &config);

    let job = exporter.start(&ExportRequest::default()).await.unwrap();
    let err = exporter.download(&job).await.unwrap_err();

    assert!(matches!(err, ConduitError::State(_)));
    assert_eq!(ScriptedEhr::count(&ehr.downloads), 0);
}

#[tokio::test]
async fn test_bulk_export_acquisition() {
    let transaction_time = Utc.with_ymd_and_hms(2025, 2, 1, 10, 0, 0).unwrap();
    let mut ehr = ScriptedEhr::new()
        .with_polls(Some(2))
        .with_transaction_time(transaction_time)
        .with_file("Patient", &[patient("p1"), patient("p2")])
        .with_file("Observation", &[observation("o1", "p1")]);
    // one malformed line alongside the valid record
    ehr.files[1].1.push_str("\n{not json");
    let ehr = Arc::new(ehr);

    let orchestrator =
        AcquisitionOrchestrator::new(ehr.clone(), export_config(5), SearchConfig::default());
    let acquisition = orchestrator.acquire(&request(None)).await.unwrap();

    assert_eq!(acquisition.strategy, AcquisitionStrategy::BulkExport);
    assert_eq!(acquisition.transaction_time, Some(transaction_time));
    assert_eq!(acquisition.records.len(), 3);
    assert_eq!(acquisition.records.malformed(), 1);
    assert_eq!(ScriptedEhr::count(&ehr.downloads), 2);
    assert_eq!(ScriptedEhr::count(&ehr.cancels), 0);
}

#[tokio::test]
async fn test_timeout_cancels_job_and_does_not_fall_back() {
    let ehr = Arc::new(ScriptedEhr::new().with_polls(None));
    let orchestrator =
        AcquisitionOrchestrator::new(ehr.clone(), export_config(2), SearchConfig::default());

    let err = orchestrator.acquire(&request(Some("g-1"))).await.unwrap_err();

    assert!(matches!(err, ConduitError::Timeout(_)));
    assert_eq!(ScriptedEhr::count(&ehr.polls), 2);
    assert_eq!(ScriptedEhr::count(&ehr.cancels), 1);
    assert_eq!(ScriptedEhr::count(&ehr.reads), 0);
}

#[tokio::test]
async fn test_missing_content_location_is_protocol_error() {
    let ehr = Arc::new(ScriptedEhr::new().with_kickoff(Kickoff::MissingContentLocation));
    let orchestrator =
        AcquisitionOrchestrator::new(ehr.clone(), export_config(5), SearchConfig::default());

    let err = orchestrator.acquire(&request(Some("g-1"))).await.unwrap_err();

    assert!(matches!(err, ConduitError::Protocol(_)));
    assert_eq!(ScriptedEhr::count(&ehr.polls), 0);
    assert_eq!(ScriptedEhr::count(&ehr.reads), 0);
    assert_eq!(ScriptedEhr::count(&ehr.searches), 0);
}

#[tokio::test]
async fn test_denied_export_falls_back_to_group_search_once() {
    let group = json!({
        "resourceType": "Group",
        "id": "g-1",
        "type": "person",
        "actual": true,
        "member": [
            {"entity": {"reference": "Patient/p1"}},
            {"entity": {"reference": "Patient/p2"}, "inactive": true}
        ]
    });
    let ehr = Arc::new(
        ScriptedEhr::new()
            .with_kickoff(Kickoff::Denied)
            .with_resource(group)
            .with_resource(patient("p1"))
            .with_resource(patient("p2"))
            .with_resource(observation("o1", "p1"))
            .with_resource(observation("o2", "p2")),
    );
    let orchestrator =
        AcquisitionOrchestrator::new(ehr.clone(), export_config(5), SearchConfig::default());

    let acquisition = orchestrator.acquire(&request(Some("g-1"))).await.unwrap();

    assert_eq!(acquisition.strategy, AcquisitionStrategy::GroupSearch);
    assert!(acquisition.transaction_time.is_none());
    assert_eq!(ScriptedEhr::count(&ehr.kickoffs), 1);
    // Group read, then the one active member
    assert_eq!(ScriptedEhr::count(&ehr.reads), 2);
    assert_eq!(acquisition.records.get("Patient").len(), 1);
    assert_eq!(acquisition.records.get("Observation").len(), 1);
}

#[tokio::test]
async fn test_denied_export_without_group_propagates() {
    let ehr = Arc::new(ScriptedEhr::new().with_kickoff(Kickoff::Denied));
    let orchestrator =
        AcquisitionOrchestrator::new(ehr.clone(), export_config(5), SearchConfig::default());

    let err = orchestrator.acquire(&request(None)).await.unwrap_err();

    assert!(matches!(
        err,
        ConduitError::CapabilityDenied { status: 403, .. }
    ));
    assert_eq!(ScriptedEhr::count(&ehr.kickoffs), 1);
    assert_eq!(ScriptedEhr::count(&ehr.searches), 0);
    assert_eq!(ScriptedEhr::count(&ehr.reads), 0);
}

#[tokio::test]
async fn test_patient_request_uses_patient_search() {
    let ehr = Arc::new(
        ScriptedEhr::new()
            .with_resource(patient("p1"))
            .with_resource(observation("o1", "p1"))
            .with_resource(observation("o9", "p9")),
    );
    let orchestrator =
        AcquisitionOrchestrator::new(ehr.clone(), export_config(5), SearchConfig::default());

    let acquisition = orchestrator
        .acquire(&AcquisitionRequest {
            patient_id: Some("p1".to_string()),
            ..request(None)
        })
        .await
        .unwrap();

    assert_eq!(acquisition.strategy, AcquisitionStrategy::PatientSearch);
    assert_eq!(ScriptedEhr::count(&ehr.kickoffs), 0);
    assert_eq!(acquisition.records.get("Patient").len(), 1);
    assert_eq!(acquisition.records.get("Observation").len(), 1);
}

fn types(names: &[&str]) -> Vec<String> {
    names.iter().map(|t| t.to_string()).collect()
}

fn record_ids(records: &conduit::core::acquire::RecordSet, resource_type: &str) -> Vec<String> {
    let mut ids: Vec<String> = records
        .get(resource_type)
        .iter()
        .filter_map(|r| r.id().map(str::to_string))
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_patient_search_stops_after_consecutive_failures() {
    let ehr = ScriptedEhr::new()
        .with_resource(patient("p1"))
        .with_resource(observation("o1", "p1"))
        .with_failing_search("Condition")
        .with_failing_search("Procedure");
    let config = SearchConfig::default();
    let types = types(&["Patient", "Condition", "Procedure", "Observation", "Immunization"]);

    let records = PatientSearch::new(&ehr, &config, &types)
        .acquire("p1", None)
        .await
        .unwrap();

    assert_eq!(ehr.searched(), vec!["Condition", "Procedure"]);
    assert_eq!(record_ids(&records, "Patient"), vec!["p1"]);
    assert!(records.get("Observation").is_empty());
}

#[tokio::test]
async fn test_patient_search_success_resets_failure_count() {
    let ehr = ScriptedEhr::new()
        .with_resource(patient("p1"))
        .with_resource(observation("o1", "p1"))
        .with_failing_search("Condition")
        .with_failing_search("Procedure");
    let config = SearchConfig::default();
    let types = types(&["Condition", "Observation", "Procedure", "Immunization"]);

    let records = PatientSearch::new(&ehr, &config, &types)
        .acquire("p1", None)
        .await
        .unwrap();

    assert_eq!(
        ehr.searched(),
        vec!["Condition", "Observation", "Procedure", "Immunization"]
    );
    assert_eq!(record_ids(&records, "Observation"), vec!["o1"]);
}

#[tokio::test]
async fn test_search_stops_at_page_limit() {
    let mut ehr = ScriptedEhr::new().with_search_page_size(2);
    for i in 1..=5 {
        ehr = ehr.with_resource(observation(&format!("o{i}"), "p1"));
    }
    let config = SearchConfig {
        max_pages: 2,
        ..SearchConfig::default()
    };

    let found = ResourceSearch::new(&ehr, &config)
        .search("Observation", Vec::new(), None)
        .await
        .unwrap();

    assert_eq!(found.records.len(), 4);
    assert_eq!(ScriptedEhr::count(&ehr.pages), 1);
}

#[tokio::test]
async fn test_group_without_members_enumerates_capped_patients() {
    let mut ehr = ScriptedEhr::new()
        .with_search_page_size(2)
        .with_resource(json!({"resourceType": "Group", "id": "g-1", "type": "person", "actual": true}))
        .with_resource(observation("o1", "p1"));
    for i in 1..=5 {
        ehr = ehr.with_resource(patient(&format!("p{i}")));
    }
    let config = SearchConfig {
        max_group_members: 3,
        ..SearchConfig::default()
    };
    let types = types(&["Patient", "Observation"]);

    let records = GroupSearch::new(&ehr, &config, &types)
        .acquire("g-1", None)
        .await
        .unwrap();

    assert_eq!(record_ids(&records, "Patient"), vec!["p1", "p2", "p3"]);
    assert_eq!(record_ids(&records, "Observation"), vec!["o1"]);
    // Paging stops at the cap: two pages of two, not all three pages
    assert_eq!(ScriptedEhr::count(&ehr.pages), 1);
    // Enumerated patients are not read again
    assert_eq!(ScriptedEhr::count(&ehr.reads), 1);
    assert_eq!(
        ehr.searched(),
        vec!["Patient", "Observation", "Observation", "Observation"]
    );
}

#[tokio::test]
async fn test_group_member_failure_does_not_stop_others() {
    let ehr = ScriptedEhr::new()
        .with_resource(json!({
            "resourceType": "Group",
            "id": "g-1",
            "type": "person",
            "actual": true,
            "member": [
                {"entity": {"reference": "Patient/gone"}},
                {"entity": {"reference": "Patient/p1"}}
            ]
        }))
        .with_resource(patient("p1"))
        .with_resource(observation("o1", "p1"));
    let config = SearchConfig::default();
    let types = types(&["Patient", "Observation"]);

    let records = GroupSearch::new(&ehr, &config, &types)
        .acquire("g-1", None)
        .await
        .unwrap();

    assert_eq!(record_ids(&records, "Patient"), vec!["p1"]);
    assert_eq!(record_ids(&records, "Observation"), vec!["o1"]);
}
