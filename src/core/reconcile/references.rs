//! Declarative reference-path table
//!
//! Each entry lists the elements of a resource type that hold a `Reference`. A segment
//! ending in `[]` is an array whose items are walked. Types without an entry use
//! [`COMMON_PATHS`].

use crate::domain::ResourceKey;
use serde_json::Value;

/// Paths checked for types without a table entry
pub const COMMON_PATHS: &[&str] = &["subject", "patient", "encounter"];

const REFERENCE_PATHS: &[(&str, &[&str])] = &[
    ("Organization", &["partOf"]),
    ("Practitioner", &[]),
    ("Location", &["managingOrganization", "partOf"]),
    (
        "Patient",
        &["generalPractitioner[]", "managingOrganization", "link[].other"],
    ),
    ("PractitionerRole", &["practitioner", "organization", "location[]"]),
    (
        "Encounter",
        &[
            "subject",
            "participant[].individual",
            "serviceProvider",
            "location[].location",
            "partOf",
            "episodeOfCare[]",
            "reasonReference[]",
            "hospitalization.origin",
            "hospitalization.destination",
        ],
    ),
    (
        "Observation",
        &[
            "subject",
            "encounter",
            "performer[]",
            "basedOn[]",
            "partOf[]",
            "specimen",
            "hasMember[]",
            "derivedFrom[]",
        ],
    ),
    ("Condition", &["subject", "encounter", "recorder", "asserter"]),
    (
        "Procedure",
        &[
            "subject",
            "encounter",
            "performer[].actor",
            "performer[].onBehalfOf",
            "location",
            "recorder",
            "asserter",
            "basedOn[]",
            "partOf[]",
            "reasonReference[]",
        ],
    ),
    (
        "MedicationRequest",
        &[
            "subject",
            "encounter",
            "requester",
            "performer",
            "recorder",
            "medicationReference",
            "basedOn[]",
            "reasonReference[]",
        ],
    ),
    (
        "MedicationStatement",
        &["subject", "context", "informationSource", "medicationReference"],
    ),
    (
        "MedicationAdministration",
        &["subject", "context", "performer[].actor", "request", "medicationReference"],
    ),
    ("AllergyIntolerance", &["patient", "encounter", "recorder", "asserter"]),
    (
        "Immunization",
        &["patient", "encounter", "location", "manufacturer", "performer[].actor"],
    ),
    (
        "DiagnosticReport",
        &[
            "subject",
            "encounter",
            "performer[]",
            "resultsInterpreter[]",
            "result[]",
            "specimen[]",
            "basedOn[]",
        ],
    ),
    ("Specimen", &["subject", "parent[]", "collection.collector"]),
    ("Coverage", &["beneficiary", "subscriber", "policyHolder", "payor[]"]),
    ("CarePlan", &["subject", "encounter", "author", "careTeam[]", "addresses[]"]),
    (
        "CareTeam",
        &["subject", "encounter", "participant[].member", "managingOrganization[]"],
    ),
    (
        "DocumentReference",
        &["subject", "author[]", "custodian", "context.encounter[]"],
    ),
    ("ServiceRequest", &["subject", "encounter", "requester", "performer[]"]),
    ("Goal", &["subject", "expressedBy"]),
    ("QuestionnaireResponse", &["subject", "encounter", "author", "source"]),
];

/// Reference paths for `resource_type`
pub fn reference_paths(resource_type: &str) -> &'static [&'static str] {
    REFERENCE_PATHS
        .iter()
        .find(|(t, _)| *t == resource_type)
        .map(|(_, paths)| *paths)
        .unwrap_or(COMMON_PATHS)
}

fn resource_type(resource: &Value) -> &str {
    resource
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn visit<'a>(node: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((segment, rest)) = segments.split_first() else {
        out.push(node);
        return;
    };
    let name = segment.strip_suffix("[]").unwrap_or(*segment);
    match node.get(name) {
        Some(Value::Array(items)) => items.iter().for_each(|item| visit(item, rest, out)),
        Some(child) => visit(child, rest, out),
        None => {}
    }
}

fn visit_mut(node: &mut Value, segments: &[&str], f: &mut dyn FnMut(&mut Value)) {
    let Some((segment, rest)) = segments.split_first() else {
        f(node);
        return;
    };
    let name = segment.strip_suffix("[]").unwrap_or(*segment);
    match node.get_mut(name) {
        Some(Value::Array(items)) => items.iter_mut().for_each(|item| visit_mut(item, rest, f)),
        Some(child) => visit_mut(child, rest, f),
        None => {}
    }
}

/// Keys of every literal reference in the table paths, in path order
///
/// Contained and `urn:` references are not included.
pub fn collect_references(resource: &Value) -> Vec<ResourceKey> {
    let mut nodes = Vec::new();
    for path in reference_paths(resource_type(resource)) {
        let segments: Vec<&str> = path.split('.').collect();
        visit(resource, &segments, &mut nodes);
    }

    nodes
        .into_iter()
        .filter_map(|n| n.get("reference").and_then(Value::as_str))
        .filter_map(ResourceKey::parse)
        .collect()
}

/// Rewrites every reference `translate` knows; returns how many were changed
pub fn rewrite_references<F>(resource: &mut Value, mut translate: F) -> usize
where
    F: FnMut(&ResourceKey) -> Option<String>,
{
    let paths = reference_paths(resource_type(resource));
    let mut rewritten = 0;

    for path in paths {
        let segments: Vec<&str> = path.split('.').collect();
        visit_mut(resource, &segments, &mut |node| {
            let Some(key) = node
                .get("reference")
                .and_then(Value::as_str)
                .and_then(ResourceKey::parse)
            else {
                return;
            };
            if let Some(local) = translate(&key) {
                node["reference"] = Value::String(local);
                rewritten += 1;
            }
        });
    }
    rewritten
}
