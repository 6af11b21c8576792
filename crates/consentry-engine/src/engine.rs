use chrono::{DateTime, Duration, Utc};
use consentry_core::{is_opaque_id, DecisionKind, FieldPath};
use consentry_fhir::{audit_event, consent_snapshot, AuditEventParams, ConsentSnapshotParams};
use std::collections::BTreeSet;
use tracing::debug;

use crate::config::EngineConfig;
use crate::emergency;
use crate::error::{ConfigError, EngineResult, InputError};
use crate::filter;
use crate::handle::{derive_access_handle, request_fingerprint};
use crate::matcher;
use crate::provision;
use crate::registry::registry;
use crate::types::{
    AuditInfo, BestMatch, Consent, ConsentRequest, Decision, DecisionBundle, PatientPreferences,
    PermissionSet, Reason, ReasonCode, Restriction, ScoreBreakdown,
};

// ---------------------------------------------------------------------------
// ConsentEngine — the validate pipeline
// ---------------------------------------------------------------------------

/// The consent decision engine. Stateless per call and shared-nothing: a
/// `validate` invocation performs no I/O, holds no locks, and may run in
/// parallel across threads. The engine borrows its inputs for the duration
/// of one call and carries nothing between calls.
pub struct ConsentEngine {
    config: EngineConfig,
}

impl Default for ConsentEngine {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }
}

impl ConsentEngine {
    /// Build an engine with the given configuration. Invalid configs never
    /// produce an engine.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse a timestamp under the engine's strictness setting. Provided
    /// for hosts assembling requests from wire input.
    pub fn parse_instant(&self, s: &str) -> EngineResult<DateTime<Utc>> {
        Ok(consentry_core::parse_instant(
            s,
            self.config.strict_timestamp_parsing,
        )?)
    }

    /// Validate one access request against the patient's active consents.
    ///
    /// Returns `Err` only for malformed input. Every authorization outcome
    /// — approval, denial, or pending reconsent — is a `DecisionBundle`
    /// whose audit event is constructed before the bundle is returned.
    pub fn validate(
        &self,
        request: &ConsentRequest,
        active_consents: &[Consent],
        now: DateTime<Utc>,
        preferences: &PatientPreferences,
    ) -> EngineResult<DecisionBundle> {
        self.validate_request(request)?;
        let reg = registry();

        // Oversized or structurally broken trees are refused outright
        // rather than expanded.
        for consent in active_consents {
            if !provision::well_formed(
                consent,
                self.config.max_provision_depth,
                self.config.max_provision_nodes,
            ) {
                debug!(consent_id = %consent.id, "consent tree rejected as malformed");
                return Ok(self.denied(
                    request,
                    now,
                    ReasonCode::MalformedConsent,
                    self.audit_info(request, None, None, false),
                    None,
                ));
            }
        }

        let grant = emergency::grant_classes(request, reg);
        let best = matcher::find_best_match(request, active_consents, now, reg, &self.config);

        let Some(best) = best else {
            // No consent clears the threshold. The emergency override can
            // still rescue the safety-critical subset.
            if let Some(grant) = grant {
                return Ok(self.approve_emergency_without_consent(request, now, grant));
            }
            return Ok(self.denied(
                request,
                now,
                ReasonCode::NoMatchingConsent,
                self.audit_info(request, None, None, false),
                None,
            ));
        };

        let breakdown = best.breakdown;
        let matched = best.consent;
        let audit = move |emergency_override: bool| {
            self.audit_info(request, Some(matched), Some(breakdown), emergency_override)
        };

        if self.config.require_reconsent && breakdown.total < self.config.reuse_threshold {
            return Ok(self.pending(request, now, audit(false)));
        }

        let mut perms = provision::evaluate(best.consent, request);
        if let Some(grant) = &grant {
            for class in grant {
                perms.force_allow(class.clone());
            }
        }

        if perms.allowed.is_empty() {
            return Ok(self.denied(
                request,
                now,
                ReasonCode::EmptyPermissions,
                audit(false),
                Some(perms),
            ));
        }

        let uncovered: Vec<&FieldPath> = request
            .data_types
            .iter()
            .filter(|dt| !perms.allowed.contains(dt))
            .collect();
        if !uncovered.is_empty() {
            debug!(?uncovered, "requested types not covered by matched consent");
            return Ok(self.denied(
                request,
                now,
                ReasonCode::PartialCoverage,
                audit(false),
                Some(perms),
            ));
        }

        if !best.consent.data_period.encloses(&request.time_range) {
            return Ok(self.denied(
                request,
                now,
                ReasonCode::TemporalOutOfScope,
                audit(false),
                None,
            ));
        }

        if let Err(code) = filter::apply_filters(&mut perms, request, preferences, reg) {
            return Ok(self.denied(request, now, code, audit(false), None));
        }

        // The override's force-allow survives the filters; everything else
        // keeps its filtered state.
        if let Some(grant) = &grant {
            for class in grant {
                perms.force_allow(class.clone());
            }
        }
        perms.enforce_disjoint();

        Ok(self.approve(request, now, best, perms, grant.is_some()))
    }

    // -----------------------------------------------------------------------
    // Input validation
    // -----------------------------------------------------------------------

    fn validate_request(&self, request: &ConsentRequest) -> EngineResult<()> {
        if !is_opaque_id(request.request_id.as_str()) {
            return Err(InputError::InvalidIdentifier {
                field: "request_id",
                value: request.request_id.as_str().to_string(),
            });
        }
        if !request.patient_id.is_well_formed() {
            return Err(InputError::InvalidPatientId(
                request.patient_id.as_str().to_string(),
            ));
        }
        if !is_opaque_id(request.requester_id.as_str()) {
            return Err(InputError::InvalidIdentifier {
                field: "requester_id",
                value: request.requester_id.as_str().to_string(),
            });
        }
        if !is_opaque_id(request.requester_organization.as_str()) {
            return Err(InputError::InvalidIdentifier {
                field: "requester_organization",
                value: request.requester_organization.as_str().to_string(),
            });
        }
        if request.data_types.is_empty() {
            return Err(InputError::EmptyDataTypes);
        }
        for data_type in &request.data_types {
            if !data_type.is_well_formed() {
                return Err(InputError::InvalidDataType(
                    data_type.as_str().to_string(),
                ));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Decision assembly
    // -----------------------------------------------------------------------

    fn audit_info(
        &self,
        request: &ConsentRequest,
        matched: Option<&Consent>,
        breakdown: Option<ScoreBreakdown>,
        emergency_override: bool,
    ) -> AuditInfo {
        AuditInfo {
            request_fingerprint: request_fingerprint(request),
            matched_consent_id: matched.map(|c| c.id.clone()),
            score_breakdown: breakdown,
            emergency_override,
            relationship_score: request.relationship.score(),
        }
    }

    /// Expiry of an approval: the earliest of the consent period end, the
    /// purpose default from the request timestamp (clamped to `now`), and
    /// the emergency cap when the override contributed.
    fn expiry_time(
        &self,
        request: &ConsentRequest,
        now: DateTime<Utc>,
        consent: Option<&Consent>,
        emergency_override: bool,
    ) -> DateTime<Utc> {
        let duration = registry().purpose_duration(request.purpose);
        let anchor = request.timestamp.min(now);
        let mut expiry = anchor + duration;
        if let Some(consent) = consent {
            expiry = expiry.min(consent.data_period.end());
        }
        if emergency_override {
            expiry = expiry.min(now + Duration::hours(self.config.emergency_cap_hours as i64));
        }
        expiry
    }

    fn restrictions(&self, perms: &PermissionSet, emergency_override: bool) -> Vec<Restriction> {
        let mut restrictions = Vec::new();
        if !perms.masked.is_empty() {
            restrictions.push(Restriction::mask(perms.masked.iter().cloned().collect()));
        }
        if !perms.pseudonymized.is_empty() {
            restrictions.push(Restriction::pseudonymize(
                perms.pseudonymized.iter().cloned().collect(),
            ));
        }
        if emergency_override {
            restrictions.push(Restriction::emergency_expiry(self.config.emergency_cap_hours));
        }
        restrictions
    }

    fn approve(
        &self,
        request: &ConsentRequest,
        now: DateTime<Utc>,
        best: BestMatch<'_>,
        perms: PermissionSet,
        emergency_override: bool,
    ) -> DecisionBundle {
        let expiry = self.expiry_time(request, now, Some(best.consent), emergency_override);
        let handle = derive_access_handle(request, Some(&best.consent.id), expiry);
        let restrictions = self.restrictions(&perms, emergency_override);
        let decision = Decision {
            kind: DecisionKind::Approved,
            reason: Reason::from_code(ReasonCode::Matched),
            permissions: Some(perms),
            access_handle: Some(handle),
            restrictions,
            audit_info: self.audit_info(
                request,
                Some(best.consent),
                Some(best.breakdown),
                emergency_override,
            ),
        };
        self.bundle(request, now, decision)
    }

    fn approve_emergency_without_consent(
        &self,
        request: &ConsentRequest,
        now: DateTime<Utc>,
        grant: BTreeSet<FieldPath>,
    ) -> DecisionBundle {
        let mut perms = PermissionSet::new();
        for class in grant {
            perms.allow(class);
        }
        let expiry = self.expiry_time(request, now, None, true);
        let handle = derive_access_handle(request, None, expiry);
        let restrictions = self.restrictions(&perms, true);
        let decision = Decision {
            kind: DecisionKind::Approved,
            reason: Reason::from_code(ReasonCode::EmergencyAccess),
            permissions: Some(perms),
            access_handle: Some(handle),
            restrictions,
            audit_info: self.audit_info(request, None, None, true),
        };
        self.bundle(request, now, decision)
    }

    fn pending(
        &self,
        request: &ConsentRequest,
        now: DateTime<Utc>,
        audit_info: AuditInfo,
    ) -> DecisionBundle {
        let decision = Decision {
            kind: DecisionKind::Pending,
            reason: Reason::from_code(ReasonCode::BelowReuseThreshold),
            permissions: None,
            access_handle: None,
            restrictions: Vec::new(),
            audit_info,
        };
        self.bundle(request, now, decision)
    }

    fn denied(
        &self,
        request: &ConsentRequest,
        now: DateTime<Utc>,
        code: ReasonCode,
        audit_info: AuditInfo,
        perms: Option<PermissionSet>,
    ) -> DecisionBundle {
        let decision = Decision {
            kind: DecisionKind::Denied,
            reason: Reason::from_code(code),
            permissions: perms,
            access_handle: None,
            restrictions: Vec::new(),
            audit_info,
        };
        self.bundle(request, now, decision)
    }

    /// Assemble the bundle. The audit event is built here, before the
    /// bundle leaves the engine, so every decision is audited; the consent
    /// snapshot accompanies approvals only.
    fn bundle(
        &self,
        request: &ConsentRequest,
        now: DateTime<Utc>,
        decision: Decision,
    ) -> DecisionBundle {
        let audit = audit_event(&AuditEventParams {
            recorded_at: now,
            success: decision.is_approved(),
            outcome_description: &decision.reason.human_message,
            request_id: &request.request_id,
            patient_id: &request.patient_id,
            requester_id: &request.requester_id,
            requester_role: request.requester_role,
            requester_organization: &request.requester_organization,
            matched_consent_id: decision.audit_info.matched_consent_id.as_ref(),
            purpose: request.purpose,
        });

        let snapshot = if decision.is_approved() {
            let allowed_classes: Vec<FieldPath> = decision
                .permissions
                .as_ref()
                .map(|perms| perms.allowed.iter().cloned().collect())
                .unwrap_or_default();
            let restriction_codes = decision
                .restrictions
                .iter()
                .map(|r| r.code.clone())
                .collect();
            Some(consent_snapshot(&ConsentSnapshotParams {
                request_id: &request.request_id,
                patient_id: &request.patient_id,
                requester_organization: &request.requester_organization,
                purpose: request.purpose,
                period: &request.time_range,
                allowed_classes,
                restriction_codes,
                matched_consent_id: decision.audit_info.matched_consent_id.as_ref(),
                recorded_at: now,
            }))
        } else {
            None
        };

        DecisionBundle {
            decision,
            consent_snapshot: snapshot,
            audit_event: audit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActorConstraint, OrganizationRelationship, Provision};
    use consentry_core::{
        parse_instant, ConsentId, ConsentStatus, OrganizationId, PatientId, Period, ProvisionType,
        Purpose, RequestId, RequesterId, Role,
    };

    fn ts(s: &str) -> DateTime<Utc> {
        parse_instant(s, true).unwrap()
    }

    fn period(start: &str, end: &str) -> Period {
        Period::parse(start, end, true).unwrap()
    }

    fn make_request() -> ConsentRequest {
        ConsentRequest {
            request_id: RequestId::new("req-001"),
            patient_id: PatientId::new("CR123456789"),
            requester_id: RequesterId::new("dr-smith-001"),
            requester_organization: OrganizationId::new("knh-hospital"),
            requester_role: Role::Physician,
            data_types: vec![FieldPath::new("Patient.demographics")],
            purpose: Purpose::Treat,
            time_range: period("2025-03-01T00:00:00Z", "2025-03-02T00:00:00Z"),
            emergency_context: false,
            timestamp: ts("2025-03-01T12:00:00Z"),
            relationship: OrganizationRelationship::Unknown,
        }
    }

    fn make_consent() -> Consent {
        Consent {
            id: ConsentId::new("consent-001"),
            patient_id: PatientId::new("CR123456789"),
            status: ConsentStatus::Active,
            recorded_at: ts("2025-01-01T00:00:00Z"),
            data_period: period("2025-01-01T00:00:00Z", "2025-12-31T00:00:00Z"),
            provision: Provision {
                kind: ProvisionType::Permit,
                classes: vec![FieldPath::new("Patient.demographics")],
                codes: Vec::new(),
                purposes: vec![Purpose::Treat],
                actors: vec![ActorConstraint {
                    role: Some(Role::Physician),
                    organization: None,
                }],
                security_labels: Vec::new(),
                data_period: None,
                nested: Vec::new(),
            },
        }
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = EngineConfig {
            reuse_threshold: 0.2,
            ..EngineConfig::default()
        };
        assert!(ConsentEngine::new(config).is_err());
    }

    #[test]
    fn test_empty_data_types_is_an_input_error() {
        let engine = ConsentEngine::default();
        let mut request = make_request();
        request.data_types.clear();
        let result = engine.validate(&request, &[], ts("2025-03-01T12:00:00Z"), &Default::default());
        assert!(matches!(result, Err(InputError::EmptyDataTypes)));
    }

    #[test]
    fn test_bad_patient_id_is_an_input_error() {
        let engine = ConsentEngine::default();
        let mut request = make_request();
        request.patient_id = PatientId::new("not-a-patient");
        let result = engine.validate(&request, &[], ts("2025-03-01T12:00:00Z"), &Default::default());
        assert!(matches!(result, Err(InputError::InvalidPatientId(_))));
    }

    #[test]
    fn test_bad_request_id_is_an_input_error() {
        let engine = ConsentEngine::default();
        let mut request = make_request();
        request.request_id = RequestId::new("has space");
        let result = engine.validate(&request, &[], ts("2025-03-01T12:00:00Z"), &Default::default());
        assert!(matches!(
            result,
            Err(InputError::InvalidIdentifier { field: "request_id", .. })
        ));
    }

    #[test]
    fn test_malformed_data_type_is_an_input_error() {
        let engine = ConsentEngine::default();
        let mut request = make_request();
        request.data_types = vec![FieldPath::new("Patient..demographics")];
        let result = engine.validate(&request, &[], ts("2025-03-01T12:00:00Z"), &Default::default());
        assert!(matches!(result, Err(InputError::InvalidDataType(_))));
    }

    #[test]
    fn test_no_consents_is_a_denial_not_an_error() {
        let engine = ConsentEngine::default();
        let bundle = engine
            .validate(
                &make_request(),
                &[],
                ts("2025-03-01T12:00:00Z"),
                &Default::default(),
            )
            .unwrap();
        assert_eq!(bundle.decision.kind, DecisionKind::Denied);
        assert_eq!(bundle.decision.reason.code, ReasonCode::NoMatchingConsent);
        assert!(bundle.consent_snapshot.is_none());
        assert_eq!(bundle.audit_event["outcome"], "4");
    }

    #[test]
    fn test_simple_approval_carries_handle_and_snapshot() {
        let engine = ConsentEngine::default();
        let bundle = engine
            .validate(
                &make_request(),
                &[make_consent()],
                ts("2025-03-01T12:00:00Z"),
                &Default::default(),
            )
            .unwrap();
        assert_eq!(bundle.decision.kind, DecisionKind::Approved);
        assert_eq!(bundle.decision.reason.code, ReasonCode::Matched);
        let handle = bundle.decision.access_handle.as_ref().unwrap();
        assert_eq!(handle.id.len(), 64);
        assert!(bundle.consent_snapshot.is_some());
        assert_eq!(bundle.audit_event["outcome"], "0");
    }

    #[test]
    fn test_oversized_tree_is_denied_malformed() {
        let engine = ConsentEngine::default();
        let mut consent = make_consent();
        // Chain deeper than the 16-level bound.
        let mut nested = consent.provision.clone();
        for _ in 0..16 {
            let mut outer = consent.provision.clone();
            outer.nested = vec![nested];
            nested = outer;
        }
        consent.provision = nested;
        let bundle = engine
            .validate(
                &make_request(),
                &[consent],
                ts("2025-03-01T12:00:00Z"),
                &Default::default(),
            )
            .unwrap();
        assert_eq!(bundle.decision.kind, DecisionKind::Denied);
        assert_eq!(bundle.decision.reason.code, ReasonCode::MalformedConsent);
    }

    /// Parent-class data match (0.7) on an actor-unconstrained consent
    /// with an unknown relationship lands the score at 0.78: inside
    /// `[minimum_match_threshold, reuse_threshold)`.
    fn make_reuse_band_consent() -> Consent {
        let mut consent = make_consent();
        consent.provision.classes = vec![FieldPath::new("Patient.*")];
        consent.provision.actors.clear();
        consent
    }

    #[test]
    fn test_pending_when_reconsent_required() {
        let engine = ConsentEngine::new(EngineConfig {
            require_reconsent: true,
            ..EngineConfig::default()
        })
        .unwrap();
        let bundle = engine
            .validate(
                &make_request(),
                &[make_reuse_band_consent()],
                ts("2025-03-01T12:00:00Z"),
                &Default::default(),
            )
            .unwrap();
        assert_eq!(bundle.decision.kind, DecisionKind::Pending);
        assert_eq!(bundle.decision.reason.code, ReasonCode::BelowReuseThreshold);
        assert!(bundle.decision.access_handle.is_none());
        assert!(bundle.consent_snapshot.is_none());
    }

    #[test]
    fn test_same_score_approves_without_reconsent_flag() {
        let engine = ConsentEngine::default();
        let bundle = engine
            .validate(
                &make_request(),
                &[make_reuse_band_consent()],
                ts("2025-03-01T12:00:00Z"),
                &Default::default(),
            )
            .unwrap();
        assert_eq!(bundle.decision.kind, DecisionKind::Approved);
    }

    #[test]
    fn test_expiry_clamped_by_consent_end() {
        let engine = ConsentEngine::default();
        let mut consent = make_consent();
        consent.data_period = period("2025-01-01T00:00:00Z", "2025-03-10T00:00:00Z");
        let mut request = make_request();
        request.time_range = period("2025-03-01T00:00:00Z", "2025-03-02T00:00:00Z");
        let bundle = engine
            .validate(
                &request,
                &[consent],
                ts("2025-03-01T12:00:00Z"),
                &Default::default(),
            )
            .unwrap();
        let handle = bundle.decision.access_handle.unwrap();
        assert_eq!(handle.expires_at, ts("2025-03-10T00:00:00Z"));
    }

    #[test]
    fn test_relationship_score_recorded() {
        let engine = ConsentEngine::default();
        let mut request = make_request();
        request.relationship = OrganizationRelationship::ActiveReferral;
        let bundle = engine
            .validate(
                &request,
                &[make_consent()],
                ts("2025-03-01T12:00:00Z"),
                &Default::default(),
            )
            .unwrap();
        assert_eq!(bundle.decision.audit_info.relationship_score, 0.6);
    }

    #[test]
    fn test_parse_instant_honors_strictness() {
        let strict = ConsentEngine::default();
        assert!(strict.parse_instant("2025-03-01T12:00:00").is_err());

        let lenient = ConsentEngine::new(EngineConfig {
            strict_timestamp_parsing: false,
            ..EngineConfig::default()
        })
        .unwrap();
        assert!(lenient.parse_instant("2025-03-01T12:00:00").is_ok());
    }
}
