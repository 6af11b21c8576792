use chrono::{DateTime, Utc};
use consentry_core::{format_instant, ConsentId};
use sha2::{Digest, Sha256};

use crate::types::{AccessHandle, ConsentRequest};

// ---------------------------------------------------------------------------
// Deterministic digests — access handle and request fingerprint
// ---------------------------------------------------------------------------

/// Versioned engine salt folded into every handle. Bump the version when
/// the derivation changes so old handles cannot collide with new ones.
const ENGINE_SALT: &str = "consentry-engine/v1";

/// Domain separator between digest inputs.
const SEP: &[u8] = &[0x1f];

/// Derive the opaque access handle for an approval.
///
/// A pure function of `(request id, matched consent id, expiry, engine
/// salt)` through SHA-256. The handle is a lookup key, not a credential:
/// it carries no secrets and is neither signed nor encrypted. Emergency
/// approvals without a matched consent use a fixed placeholder in the
/// consent position.
pub fn derive_access_handle(
    request: &ConsentRequest,
    matched_consent: Option<&ConsentId>,
    expires_at: DateTime<Utc>,
) -> AccessHandle {
    let mut hasher = Sha256::new();
    hasher.update(ENGINE_SALT.as_bytes());
    hasher.update(SEP);
    hasher.update(request.request_id.as_str().as_bytes());
    hasher.update(SEP);
    hasher.update(
        matched_consent
            .map(ConsentId::as_str)
            .unwrap_or("emergency-override")
            .as_bytes(),
    );
    hasher.update(SEP);
    hasher.update(format_instant(expires_at).as_bytes());
    AccessHandle {
        id: hex::encode(hasher.finalize()),
        expires_at,
    }
}

/// Collision-resistant fingerprint of a request, recorded in the audit
/// info of every decision.
pub fn request_fingerprint(request: &ConsentRequest) -> String {
    let mut hasher = Sha256::new();
    for part in [
        request.request_id.as_str(),
        request.patient_id.as_str(),
        request.requester_id.as_str(),
        request.requester_organization.as_str(),
        request.requester_role.code(),
        request.purpose.code(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update(SEP);
    }
    for data_type in &request.data_types {
        hasher.update(data_type.as_str().as_bytes());
        hasher.update(SEP);
    }
    hasher.update(format_instant(request.time_range.start()).as_bytes());
    hasher.update(SEP);
    hasher.update(format_instant(request.time_range.end()).as_bytes());
    hasher.update(SEP);
    hasher.update(format_instant(request.timestamp).as_bytes());
    hasher.update(SEP);
    hasher.update([request.emergency_context as u8]);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrganizationRelationship;
    use consentry_core::{
        is_opaque_id, parse_instant, FieldPath, OrganizationId, PatientId, Period, Purpose,
        RequestId, RequesterId, Role,
    };

    fn make_request(request_id: &str) -> ConsentRequest {
        ConsentRequest {
            request_id: RequestId::new(request_id),
            patient_id: PatientId::new("CR123456789"),
            requester_id: RequesterId::new("dr-smith-001"),
            requester_organization: OrganizationId::new("knh-hospital"),
            requester_role: Role::Physician,
            data_types: vec![FieldPath::new("Patient.demographics")],
            purpose: Purpose::Treat,
            time_range: Period::parse("2025-03-01T00:00:00Z", "2025-03-02T00:00:00Z", true)
                .unwrap(),
            emergency_context: false,
            timestamp: parse_instant("2025-03-01T12:00:00Z", true).unwrap(),
            relationship: OrganizationRelationship::Unknown,
        }
    }

    #[test]
    fn test_handle_is_deterministic() {
        let request = make_request("req-001");
        let consent = ConsentId::new("consent-001");
        let expiry = parse_instant("2025-03-31T12:00:00Z", true).unwrap();
        let a = derive_access_handle(&request, Some(&consent), expiry);
        let b = derive_access_handle(&request, Some(&consent), expiry);
        assert_eq!(a, b);
    }

    #[test]
    fn test_handle_is_url_safe_and_sized() {
        let request = make_request("req-001");
        let expiry = parse_instant("2025-03-31T12:00:00Z", true).unwrap();
        let handle = derive_access_handle(&request, None, expiry);
        assert_eq!(handle.id.len(), 64);
        assert!(is_opaque_id(&handle.id));
        assert_eq!(handle.expires_at, expiry);
    }

    #[test]
    fn test_handle_varies_with_inputs() {
        let request_a = make_request("req-001");
        let request_b = make_request("req-002");
        let consent = ConsentId::new("consent-001");
        let expiry = parse_instant("2025-03-31T12:00:00Z", true).unwrap();
        let later = parse_instant("2025-04-01T12:00:00Z", true).unwrap();

        let base = derive_access_handle(&request_a, Some(&consent), expiry);
        assert_ne!(base, derive_access_handle(&request_b, Some(&consent), expiry));
        assert_ne!(base, derive_access_handle(&request_a, None, expiry));
        assert_ne!(base, derive_access_handle(&request_a, Some(&consent), later));
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let request = make_request("req-001");
        assert_eq!(request_fingerprint(&request), request_fingerprint(&request));

        let mut altered = make_request("req-001");
        altered.data_types.push(FieldPath::new("Observation.genetic"));
        assert_ne!(request_fingerprint(&request), request_fingerprint(&altered));

        let mut emergency = make_request("req-001");
        emergency.emergency_context = true;
        assert_ne!(request_fingerprint(&request), request_fingerprint(&emergency));
    }
}
