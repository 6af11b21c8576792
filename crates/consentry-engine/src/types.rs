use chrono::{DateTime, Utc};
use consentry_core::{
    ConsentId, ConsentStatus, DecisionKind, FieldPath, OrganizationId, PatientId, Period,
    ProvisionType, Purpose, RequestId, RequesterId, Role,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// ConsentRequest — a single access request
// ---------------------------------------------------------------------------

/// A request to access patient clinical data. The engine borrows it for the
/// duration of one `validate` call and keeps nothing afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub request_id: RequestId,
    pub patient_id: PatientId,
    pub requester_id: RequesterId,
    pub requester_organization: OrganizationId,
    pub requester_role: Role,
    /// Requested data classes; order is preserved and observable in the
    /// audit trail.
    pub data_types: Vec<FieldPath>,
    pub purpose: Purpose,
    /// The access window the requester asks for (UTC).
    pub time_range: Period,
    #[serde(default)]
    pub emergency_context: bool,
    pub timestamp: DateTime<Utc>,
    /// Pre-materialized organizational relationship between the requester
    /// and the patient's custodian. The engine never infers this.
    #[serde(default)]
    pub relationship: OrganizationRelationship,
}

/// Organizational relationship supplied by the caller, scored by the
/// matcher's requester axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrganizationRelationship {
    SameOrganization,
    NetworkPartner,
    ActiveReferral,
    SharedNetwork,
    #[default]
    Unknown,
}

impl OrganizationRelationship {
    pub fn score(self) -> f64 {
        match self {
            OrganizationRelationship::SameOrganization => 1.0,
            OrganizationRelationship::NetworkPartner => 0.8,
            OrganizationRelationship::ActiveReferral => 0.6,
            OrganizationRelationship::SharedNetwork => 0.4,
            OrganizationRelationship::Unknown => 0.2,
        }
    }
}

// ---------------------------------------------------------------------------
// Consent — a patient-authorized policy tree
// ---------------------------------------------------------------------------

/// A consent resource as supplied by the external repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consent {
    pub id: ConsentId,
    pub patient_id: PatientId,
    pub status: ConsentStatus,
    /// When the consent was captured.
    pub recorded_at: DateTime<Utc>,
    /// The overall validity window of the consent.
    pub data_period: Period,
    /// Root of the provision tree.
    pub provision: Provision,
}

/// A node in a consent tree. Nested provisions are exceptions to their
/// parent and take precedence over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provision {
    #[serde(rename = "type")]
    pub kind: ProvisionType,
    /// Data classes this provision speaks for. Non-empty on every typed
    /// provision.
    pub classes: Vec<FieldPath>,
    /// Optional fine-grained codes (e.g. specific test identifiers)
    /// excluded or included beneath the classes.
    #[serde(default)]
    pub codes: Vec<String>,
    /// Purposes this provision is scoped to; empty means all purposes.
    #[serde(default)]
    pub purposes: Vec<Purpose>,
    /// Actor constraints; empty means any requester.
    #[serde(default)]
    pub actors: Vec<ActorConstraint>,
    /// Confidentiality tags carried through to snapshots.
    #[serde(default)]
    pub security_labels: Vec<String>,
    /// Optional narrower window; must lie within the parent's.
    #[serde(default)]
    pub data_period: Option<Period>,
    /// Child provisions, evaluated depth-first, left-to-right.
    #[serde(default)]
    pub nested: Vec<Provision>,
}

/// Role and/or organization constraint on a provision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConstraint {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub organization: Option<OrganizationId>,
}

impl ActorConstraint {
    /// Whether the constraint admits the requester. A constraint with both
    /// fields unset admits no one (it is ignored upstream when empty
    /// constraints are meant).
    pub fn admits(&self, role: Role, organization: &OrganizationId) -> bool {
        let role_ok = self.role.map(|r| r == role);
        let org_ok = self.organization.as_ref().map(|o| o == organization);
        match (role_ok, org_ok) {
            (Some(r), Some(o)) => r && o,
            (Some(r), None) => r,
            (None, Some(o)) => o,
            (None, None) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// PatientPreferences — enumerated patient-level filters
// ---------------------------------------------------------------------------

/// Patient preferences applied as the last filtering stage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PatientPreferences {
    /// Mask demographic detail fields in every disclosure.
    #[serde(default)]
    pub mask_demographic: bool,
    /// Refuse marketing use outright.
    #[serde(default)]
    pub no_marketing: bool,
    /// Refuse research use outright.
    #[serde(default)]
    pub no_research: bool,
    /// Contact details only under emergency treatment.
    #[serde(default)]
    pub contact_emergency_only: bool,
}

impl PatientPreferences {
    pub fn allows_marketing(&self) -> bool {
        !self.no_marketing
    }
}

// ---------------------------------------------------------------------------
// PermissionSet — four disjoint field-path collections
// ---------------------------------------------------------------------------

/// The evaluator's output: what is allowed, denied, masked, and
/// pseudonymized. `allowed` and `denied` are kept disjoint at all times;
/// `masked` and `pseudonymized` are transformations layered on `allowed`.
///
/// Backed by ordered sets so iteration order, and therefore every
/// serialized artifact, is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub allowed: BTreeSet<FieldPath>,
    pub denied: BTreeSet<FieldPath>,
    pub masked: BTreeSet<FieldPath>,
    pub pseudonymized: BTreeSet<FieldPath>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an allow. A standing denial for the same path wins and the
    /// allow is dropped.
    pub fn allow(&mut self, path: FieldPath) {
        if !self.denied.contains(&path) {
            self.allowed.insert(path);
        }
    }

    /// Record a denial, withdrawing any standing allow for the path.
    pub fn deny(&mut self, path: FieldPath) {
        self.allowed.remove(&path);
        self.denied.insert(path);
    }

    /// Force an allow, overriding a standing denial. Used only by the
    /// emergency override.
    pub fn force_allow(&mut self, path: FieldPath) {
        self.denied.remove(&path);
        self.allowed.insert(path);
    }

    pub fn mask(&mut self, path: FieldPath) {
        self.masked.insert(path);
    }

    pub fn pseudonymize(&mut self, path: FieldPath) {
        self.pseudonymized.insert(path);
    }

    /// Move every allowed path into denied. Used by the deny-all filter
    /// outcomes (marketing opt-out and the like).
    pub fn deny_all(&mut self) {
        let allowed = std::mem::take(&mut self.allowed);
        self.denied.extend(allowed);
    }

    /// Re-establish `allowed ∩ denied = ∅` with deny winning.
    pub fn enforce_disjoint(&mut self) {
        for path in &self.denied {
            self.allowed.remove(path);
        }
    }

    pub fn is_disjoint(&self) -> bool {
        self.allowed.is_disjoint(&self.denied)
    }
}

// ---------------------------------------------------------------------------
// Decision types
// ---------------------------------------------------------------------------

/// Closed set of decision reason codes. The code is the stable identifier
/// test suites match on; the human message is a companion string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Matched,
    EmergencyAccess,
    NoMatchingConsent,
    BelowReuseThreshold,
    PartialCoverage,
    EmptyPermissions,
    TemporalOutOfScope,
    RoleDenied,
    PurposeRestricted,
    MarketingNotPermitted,
    ResearchNotPermitted,
    PreferenceDenied,
    MalformedConsent,
}

impl ReasonCode {
    pub fn code(self) -> &'static str {
        match self {
            ReasonCode::Matched => "matched",
            ReasonCode::EmergencyAccess => "emergency_access",
            ReasonCode::NoMatchingConsent => "no_matching_consent",
            ReasonCode::BelowReuseThreshold => "below_reuse_threshold",
            ReasonCode::PartialCoverage => "partial_coverage",
            ReasonCode::EmptyPermissions => "empty_permissions",
            ReasonCode::TemporalOutOfScope => "temporal_out_of_scope",
            ReasonCode::RoleDenied => "role_denied",
            ReasonCode::PurposeRestricted => "purpose_restricted",
            ReasonCode::MarketingNotPermitted => "marketing_not_permitted",
            ReasonCode::ResearchNotPermitted => "research_not_permitted",
            ReasonCode::PreferenceDenied => "preference_denied",
            ReasonCode::MalformedConsent => "malformed_consent",
        }
    }

    /// Canonical human companion string. Deterministic: no request data is
    /// interpolated.
    pub fn human_message(self) -> &'static str {
        match self {
            ReasonCode::Matched => "matching consent found and permissions granted",
            ReasonCode::EmergencyAccess => {
                "emergency access granted for safety-critical data under a 24-hour cap"
            }
            ReasonCode::NoMatchingConsent => "no matching active consent covers the request",
            ReasonCode::BelowReuseThreshold => {
                "a consent matched but explicit patient reconsent is required"
            }
            ReasonCode::PartialCoverage => {
                "one or more requested data types are not covered by the matched consent"
            }
            ReasonCode::EmptyPermissions => "the matched consent grants no permissions",
            ReasonCode::TemporalOutOfScope => {
                "the requested time range falls outside the consent period"
            }
            ReasonCode::RoleDenied => "the requester role is not permitted to access this data",
            ReasonCode::PurposeRestricted => {
                "the stated purpose does not extend to the requested data"
            }
            ReasonCode::MarketingNotPermitted => "the patient has not opted in to marketing use",
            ReasonCode::ResearchNotPermitted => "the patient has opted out of research use",
            ReasonCode::PreferenceDenied => "a patient preference denies the requested access",
            ReasonCode::MalformedConsent => "a supplied consent exceeds the provision tree bounds",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Structured decision reason: stable code plus human companion string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reason {
    pub code: ReasonCode,
    pub human_message: String,
}

impl Reason {
    pub fn from_code(code: ReasonCode) -> Self {
        Self {
            code,
            human_message: code.human_message().to_string(),
        }
    }
}

/// A structured condition attached to an approval, e.g. masked fields or
/// the emergency expiry cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restriction {
    pub code: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldPath>,
}

impl Restriction {
    pub fn mask(fields: Vec<FieldPath>) -> Self {
        Self {
            code: "mask".to_string(),
            fields,
        }
    }

    pub fn pseudonymize(fields: Vec<FieldPath>) -> Self {
        Self {
            code: "pseudonymize".to_string(),
            fields,
        }
    }

    pub fn emergency_expiry(hours: u32) -> Self {
        Self {
            code: format!("emergency-expiry-{hours}h"),
            fields: Vec::new(),
        }
    }
}

/// Per-axis candidate score, recorded in the audit info of the decision.
/// Axis values are raw (unweighted); `total` is the weighted sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub data_type: f64,
    pub purpose: f64,
    pub requester: f64,
    pub temporal: f64,
    pub total: f64,
}

/// Opaque, non-secret access handle issued on approval. A lookup key for
/// downstream stores, not a credential; the engine never renews it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessHandle {
    pub id: String,
    pub expires_at: DateTime<Utc>,
}

/// Request fingerprint, matched consent, and score trail accompanying
/// every decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditInfo {
    pub request_fingerprint: String,
    pub matched_consent_id: Option<ConsentId>,
    pub score_breakdown: Option<ScoreBreakdown>,
    pub emergency_override: bool,
    pub relationship_score: f64,
}

/// The engine's verdict on one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub kind: DecisionKind,
    pub reason: Reason,
    /// Present on approval, and on coverage denials so callers can see
    /// which classes were refused.
    pub permissions: Option<PermissionSet>,
    /// Present only on approval.
    pub access_handle: Option<AccessHandle>,
    pub restrictions: Vec<Restriction>,
    pub audit_info: AuditInfo,
}

impl Decision {
    pub fn is_approved(&self) -> bool {
        self.kind == DecisionKind::Approved
    }
}

/// Everything one `validate` call produces: the decision, a consent
/// resource snapshot (approvals only), and an audit event (always).
#[derive(Debug, Clone, Serialize)]
pub struct DecisionBundle {
    pub decision: Decision,
    pub consent_snapshot: Option<serde_json::Value>,
    pub audit_event: serde_json::Value,
}

// ---------------------------------------------------------------------------
// BestMatch — matcher output
// ---------------------------------------------------------------------------

/// The matcher's selection: a borrowed winning consent with its score
/// trail and the deepest provision depth a requested class matched at.
#[derive(Debug)]
pub struct BestMatch<'a> {
    pub consent: &'a Consent,
    pub breakdown: ScoreBreakdown,
    pub matched_depth: usize,
}
