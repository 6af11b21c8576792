use chrono::{DateTime, Utc};
use consentry_core::{ConsentId, OrganizationId, PatientId, Purpose, RequestId, RequesterId, Role};
use serde::Serialize;
use serde_json::Value;

use crate::datatypes::{
    wire_instant, CodeableConcept, Coding, Reference, SYS_ACT_REASON, SYS_AUDIT_ENTITY_TYPE,
    SYS_AUDIT_EVENT_TYPE, SYS_OBJECT_ROLE, SYS_RESTFUL_INTERACTION, SYS_ROLE_CODE,
    SYS_SECURITY_ROLE_TYPE, SYS_SECURITY_SOURCE_TYPE,
};

// ---------------------------------------------------------------------------
// AuditEvent — emitted once per validate call, approval or not
// ---------------------------------------------------------------------------

/// Observer device reference identifying the engine as the audit source.
const SOURCE_OBSERVER: &str = "Device/consentry-engine";
const SOURCE_SITE: &str = "Consentry";

/// Inputs for the audit event resource.
pub struct AuditEventParams<'a> {
    pub recorded_at: DateTime<Utc>,
    /// True only for approved decisions; renders as outcome "0" vs "4".
    pub success: bool,
    /// Human companion string of the decision reason.
    pub outcome_description: &'a str,
    pub request_id: &'a RequestId,
    pub patient_id: &'a PatientId,
    pub requester_id: &'a RequesterId,
    pub requester_role: Role,
    pub requester_organization: &'a OrganizationId,
    pub matched_consent_id: Option<&'a ConsentId>,
    pub purpose: Purpose,
}

#[derive(Serialize)]
struct AuditEventResource {
    #[serde(rename = "resourceType")]
    resource_type: &'static str,
    id: String,
    #[serde(rename = "type")]
    kind: Coding,
    subtype: Vec<Coding>,
    action: &'static str,
    recorded: String,
    outcome: &'static str,
    #[serde(rename = "outcomeDesc")]
    outcome_desc: String,
    agent: Vec<WireAgent>,
    source: WireSource,
    entity: Vec<WireEntity>,
    #[serde(rename = "purposeOfEvent")]
    purpose_of_event: Vec<CodeableConcept>,
}

#[derive(Serialize)]
struct WireAgent {
    #[serde(rename = "type")]
    kind: CodeableConcept,
    who: Reference,
    requestor: bool,
    role: Vec<CodeableConcept>,
    network: WireNetwork,
}

#[derive(Serialize)]
struct WireNetwork {
    address: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct WireSource {
    site: &'static str,
    observer: Reference,
    #[serde(rename = "type")]
    kind: Vec<Coding>,
}

#[derive(Serialize)]
struct WireEntity {
    what: Reference,
    #[serde(rename = "type")]
    kind: Coding,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Coding>,
}

/// Build the `AuditEvent` resource for a decision.
///
/// Fixed codings: REST-read event type, action `R`, outcome `0` on success
/// and `4` on failure. The entity list carries the patient, the request,
/// and the matched consent when one was selected.
pub fn audit_event(params: &AuditEventParams<'_>) -> Value {
    let mut entity = vec![
        WireEntity {
            what: Reference::new("Patient", params.patient_id.as_str()),
            kind: Coding::new(SYS_AUDIT_ENTITY_TYPE, "1").with_display("Person"),
            role: Some(Coding::new(SYS_OBJECT_ROLE, "1").with_display("Patient")),
        },
        WireEntity {
            what: Reference::new("Task", params.request_id.as_str()),
            kind: Coding::new(SYS_AUDIT_ENTITY_TYPE, "2").with_display("System Object"),
            role: Some(Coding::new(SYS_OBJECT_ROLE, "24").with_display("Query")),
        },
    ];
    if let Some(consent_id) = params.matched_consent_id {
        entity.push(WireEntity {
            what: Reference::new("Consent", consent_id.as_str()),
            kind: Coding::new(SYS_AUDIT_ENTITY_TYPE, "2").with_display("System Object"),
            role: None,
        });
    }

    let resource = AuditEventResource {
        resource_type: "AuditEvent",
        id: format!("audit-{}", params.request_id),
        kind: Coding::new(SYS_AUDIT_EVENT_TYPE, "rest").with_display("RESTful Operation"),
        subtype: vec![Coding::new(SYS_RESTFUL_INTERACTION, "read").with_display("read")],
        action: "R",
        recorded: wire_instant(params.recorded_at),
        outcome: if params.success { "0" } else { "4" },
        outcome_desc: params.outcome_description.to_string(),
        agent: vec![WireAgent {
            kind: CodeableConcept::single(
                Coding::new(SYS_SECURITY_ROLE_TYPE, "humanuser").with_display("Human User"),
            ),
            who: Reference::new("Practitioner", params.requester_id.as_str()),
            requestor: true,
            role: vec![CodeableConcept::single(Coding::new(
                SYS_ROLE_CODE,
                params.requester_role.code().to_ascii_uppercase(),
            ))],
            network: WireNetwork {
                address: params.requester_organization.as_str().to_string(),
                kind: "5",
            },
        }],
        source: WireSource {
            site: SOURCE_SITE,
            observer: Reference {
                reference: SOURCE_OBSERVER.to_string(),
            },
            kind: vec![Coding::new(SYS_SECURITY_SOURCE_TYPE, "4").with_display("Application Server")],
        },
        entity,
        purpose_of_event: vec![CodeableConcept::single(Coding::new(
            SYS_ACT_REASON,
            params.purpose.code(),
        ))],
    };
    serde_json::to_value(resource).expect("audit event serialization is infallible")
}
