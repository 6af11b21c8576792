use chrono::{DateTime, Utc};
use consentry_core::{ConsentId, FieldPath, OrganizationId, PatientId, Period, Purpose, RequestId};
use serde::Serialize;
use serde_json::Value;

use crate::datatypes::{
    wire_instant, CodeableConcept, Coding, Reference, WirePeriod, SYS_ACT_CODE, SYS_ACT_REASON,
    SYS_CONSENT_CATEGORY, SYS_CONSENT_SCOPE, SYS_PARTICIPATION_TYPE, SYS_RESOURCE_TYPES,
};

// ---------------------------------------------------------------------------
// Consent snapshot — emitted once per approved decision
// ---------------------------------------------------------------------------

/// Inputs for a consent resource snapshot.
pub struct ConsentSnapshotParams<'a> {
    pub request_id: &'a RequestId,
    pub patient_id: &'a PatientId,
    pub requester_organization: &'a OrganizationId,
    pub purpose: Purpose,
    /// The request's access window, echoed as the provision data period.
    pub period: &'a Period,
    /// Final filtered allowed classes, already in deterministic order.
    pub allowed_classes: Vec<FieldPath>,
    /// Restriction codes rendered as provision security labels.
    pub restriction_codes: Vec<String>,
    /// The consent the decision was derived from; recorded in provenance.
    /// Absent for emergency-override approvals with no matched consent.
    pub matched_consent_id: Option<&'a ConsentId>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ConsentResource {
    #[serde(rename = "resourceType")]
    resource_type: &'static str,
    id: String,
    meta: ConsentMeta,
    status: &'static str,
    scope: CodeableConcept,
    category: Vec<CodeableConcept>,
    patient: Reference,
    #[serde(rename = "dateTime")]
    date_time: String,
    performer: Vec<Reference>,
    provision: WireProvision,
}

#[derive(Serialize)]
struct ConsentMeta {
    #[serde(rename = "versionId")]
    version_id: &'static str,
    #[serde(rename = "lastUpdated")]
    last_updated: String,
    /// Provenance pointer to the consent this snapshot was derived from.
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

#[derive(Serialize)]
struct WireProvision {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "dataPeriod")]
    data_period: WirePeriod,
    class: Vec<Coding>,
    purpose: Vec<Coding>,
    actor: Vec<WireActor>,
    #[serde(rename = "securityLabel", skip_serializing_if = "Vec::is_empty")]
    security_label: Vec<Coding>,
}

#[derive(Serialize)]
struct WireActor {
    role: CodeableConcept,
    reference: Reference,
}

/// Build the `Consent` resource snapshot for an approved decision.
///
/// Output is a `serde_json::Value`; its maps are BTree-backed, so rendering
/// yields recursively key-sorted, byte-stable JSON.
pub fn consent_snapshot(params: &ConsentSnapshotParams<'_>) -> Value {
    let resource = ConsentResource {
        resource_type: "Consent",
        id: format!("consent-decision-{}", params.request_id),
        meta: ConsentMeta {
            version_id: "1",
            last_updated: wire_instant(params.recorded_at),
            source: params
                .matched_consent_id
                .map(|id| format!("Consent/{id}")),
        },
        status: "active",
        scope: CodeableConcept::single(Coding::new(SYS_CONSENT_SCOPE, "patient-privacy")),
        category: vec![CodeableConcept::single(Coding::new(
            SYS_CONSENT_CATEGORY,
            "idscl",
        ))],
        patient: Reference::new("Patient", params.patient_id.as_str()),
        date_time: wire_instant(params.recorded_at),
        performer: vec![Reference::new("Patient", params.patient_id.as_str())],
        provision: WireProvision {
            kind: "permit",
            data_period: WirePeriod::from_period(params.period),
            class: params
                .allowed_classes
                .iter()
                .map(|c| {
                    Coding::new(SYS_RESOURCE_TYPES, root_segment(c))
                        .with_display(c.as_str().to_string())
                })
                .collect(),
            purpose: vec![Coding::new(SYS_ACT_REASON, params.purpose.code())],
            actor: vec![WireActor {
                role: CodeableConcept::single(Coding::new(SYS_PARTICIPATION_TYPE, "CST")),
                reference: Reference::new(
                    "Organization",
                    params.requester_organization.as_str(),
                ),
            }],
            security_label: params
                .restriction_codes
                .iter()
                .map(|code| Coding::new(SYS_ACT_CODE, code.clone()))
                .collect(),
        },
    };
    serde_json::to_value(resource).expect("consent snapshot serialization is infallible")
}

fn root_segment(path: &FieldPath) -> String {
    path.segments().next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use consentry_core::parse_instant;

    fn make_params<'a>(
        request_id: &'a RequestId,
        patient_id: &'a PatientId,
        org: &'a OrganizationId,
        consent_id: &'a ConsentId,
        period: &'a Period,
    ) -> ConsentSnapshotParams<'a> {
        ConsentSnapshotParams {
            request_id,
            patient_id,
            requester_organization: org,
            purpose: Purpose::Treat,
            period,
            allowed_classes: vec![
                FieldPath::new("Observation.vital-signs"),
                FieldPath::new("Patient.demographics"),
            ],
            restriction_codes: vec!["mask".to_string()],
            matched_consent_id: Some(consent_id),
            recorded_at: parse_instant("2025-03-01T12:00:00Z", true).unwrap(),
        }
    }

    #[test]
    fn test_snapshot_shape() {
        let request_id = RequestId::new("req-001");
        let patient_id = PatientId::new("CR123456789");
        let org = OrganizationId::new("knh-hospital");
        let consent_id = ConsentId::new("consent-001");
        let period = Period::parse("2025-03-01T00:00:00Z", "2025-03-02T00:00:00Z", true).unwrap();

        let v = consent_snapshot(&make_params(&request_id, &patient_id, &org, &consent_id, &period));

        assert_eq!(v["resourceType"], "Consent");
        assert_eq!(v["id"], "consent-decision-req-001");
        assert_eq!(v["status"], "active");
        assert_eq!(v["patient"]["reference"], "Patient/CR123456789");
        assert_eq!(v["meta"]["source"], "Consent/consent-001");
        assert_eq!(v["provision"]["type"], "permit");
        assert_eq!(v["provision"]["purpose"][0]["code"], "TREAT");
        assert_eq!(v["provision"]["dataPeriod"]["start"], "2025-03-01T00:00:00Z");
        assert_eq!(v["provision"]["class"][0]["code"], "Observation");
        assert_eq!(
            v["provision"]["class"][0]["display"],
            "Observation.vital-signs"
        );
        assert_eq!(v["provision"]["securityLabel"][0]["code"], "mask");
        assert_eq!(
            v["provision"]["actor"][0]["reference"]["reference"],
            "Organization/knh-hospital"
        );
    }

    #[test]
    fn test_snapshot_keys_are_sorted() {
        let request_id = RequestId::new("req-001");
        let patient_id = PatientId::new("CR123456789");
        let org = OrganizationId::new("knh-hospital");
        let consent_id = ConsentId::new("consent-001");
        let period = Period::parse("2025-03-01T00:00:00Z", "2025-03-02T00:00:00Z", true).unwrap();

        let v = consent_snapshot(&make_params(&request_id, &patient_id, &org, &consent_id, &period));
        let rendered = serde_json::to_string(&v).unwrap();

        let top_keys: Vec<&String> = v.as_object().unwrap().keys().collect();
        let mut sorted = top_keys.clone();
        sorted.sort();
        assert_eq!(top_keys, sorted);
        // resourceType sorts after provision in the rendered output
        assert!(rendered.find("\"provision\"").unwrap() < rendered.find("\"resourceType\"").unwrap());
    }

    #[test]
    fn test_snapshot_is_deterministic() {
        let request_id = RequestId::new("req-001");
        let patient_id = PatientId::new("CR123456789");
        let org = OrganizationId::new("knh-hospital");
        let consent_id = ConsentId::new("consent-001");
        let period = Period::parse("2025-03-01T00:00:00Z", "2025-03-02T00:00:00Z", true).unwrap();

        let a = consent_snapshot(&make_params(&request_id, &patient_id, &org, &consent_id, &period));
        let b = consent_snapshot(&make_params(&request_id, &patient_id, &org, &consent_id, &period));
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_empty_security_labels_omitted() {
        let request_id = RequestId::new("req-001");
        let patient_id = PatientId::new("CR123456789");
        let org = OrganizationId::new("knh-hospital");
        let consent_id = ConsentId::new("consent-001");
        let period = Period::parse("2025-03-01T00:00:00Z", "2025-03-02T00:00:00Z", true).unwrap();

        let mut params = make_params(&request_id, &patient_id, &org, &consent_id, &period);
        params.restriction_codes.clear();
        let v = consent_snapshot(&params);
        assert!(v["provision"].get("securityLabel").is_none());
    }

    #[test]
    fn test_missing_provenance_source_omitted() {
        let request_id = RequestId::new("req-001");
        let patient_id = PatientId::new("CR123456789");
        let org = OrganizationId::new("knh-hospital");
        let consent_id = ConsentId::new("consent-001");
        let period = Period::parse("2025-03-01T00:00:00Z", "2025-03-02T00:00:00Z", true).unwrap();

        let mut params = make_params(&request_id, &patient_id, &org, &consent_id, &period);
        params.matched_consent_id = None;
        let v = consent_snapshot(&params);
        assert!(v["meta"].get("source").is_none());
    }
}
