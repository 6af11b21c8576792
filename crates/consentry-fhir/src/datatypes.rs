use chrono::{DateTime, Utc};
use consentry_core::{format_instant, Period};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Shared FHIR datatypes used by both emitted resources
// ---------------------------------------------------------------------------

/// A coded value drawn from a named code system.
#[derive(Debug, Clone, Serialize)]
pub struct Coding {
    pub system: &'static str,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Coding {
    pub fn new(system: &'static str, code: impl Into<String>) -> Self {
        Self {
            system,
            code: code.into(),
            display: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

/// A concept carrying one or more codings.
#[derive(Debug, Clone, Serialize)]
pub struct CodeableConcept {
    pub coding: Vec<Coding>,
}

impl CodeableConcept {
    pub fn single(coding: Coding) -> Self {
        Self {
            coding: vec![coding],
        }
    }
}

/// A literal reference to another resource, e.g. `Patient/CR123456789`.
#[derive(Debug, Clone, Serialize)]
pub struct Reference {
    pub reference: String,
}

impl Reference {
    pub fn new(resource_type: &str, id: &str) -> Self {
        Self {
            reference: format!("{resource_type}/{id}"),
        }
    }
}

/// A period rendered in the canonical instant form (whole seconds, `Z`).
#[derive(Debug, Clone, Serialize)]
pub struct WirePeriod {
    pub start: String,
    pub end: String,
}

impl WirePeriod {
    pub fn from_period(period: &Period) -> Self {
        Self {
            start: format_instant(period.start()),
            end: format_instant(period.end()),
        }
    }
}

/// Canonical instant rendering shared by the wire models.
pub(crate) fn wire_instant(t: DateTime<Utc>) -> String {
    format_instant(t)
}

// Code system URLs (closed set).
pub(crate) const SYS_RESOURCE_TYPES: &str = "http://hl7.org/fhir/resource-types";
pub(crate) const SYS_ACT_REASON: &str = "http://terminology.hl7.org/CodeSystem/v3-ActReason";
pub(crate) const SYS_ACT_CODE: &str = "http://terminology.hl7.org/CodeSystem/v3-ActCode";
pub(crate) const SYS_ROLE_CODE: &str = "http://terminology.hl7.org/CodeSystem/v3-RoleCode";
pub(crate) const SYS_PARTICIPATION_TYPE: &str =
    "http://terminology.hl7.org/CodeSystem/v3-ParticipationType";
pub(crate) const SYS_CONSENT_SCOPE: &str = "http://terminology.hl7.org/CodeSystem/consentscope";
pub(crate) const SYS_CONSENT_CATEGORY: &str =
    "http://terminology.hl7.org/CodeSystem/consentcategorycodes";
pub(crate) const SYS_AUDIT_EVENT_TYPE: &str =
    "http://terminology.hl7.org/CodeSystem/audit-event-type";
pub(crate) const SYS_RESTFUL_INTERACTION: &str = "http://hl7.org/fhir/restful-interaction";
pub(crate) const SYS_SECURITY_ROLE_TYPE: &str =
    "http://terminology.hl7.org/CodeSystem/extra-security-role-type";
pub(crate) const SYS_SECURITY_SOURCE_TYPE: &str =
    "http://terminology.hl7.org/CodeSystem/security-source-type";
pub(crate) const SYS_AUDIT_ENTITY_TYPE: &str =
    "http://terminology.hl7.org/CodeSystem/audit-entity-type";
pub(crate) const SYS_OBJECT_ROLE: &str = "http://terminology.hl7.org/CodeSystem/object-role";
