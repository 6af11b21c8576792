use consentry_core::{FieldPath, Purpose, SensitivityLevel};

use crate::registry::Registry;
use crate::types::{ConsentRequest, PatientPreferences, PermissionSet, ReasonCode};

// ---------------------------------------------------------------------------
// Field lists used by the pipeline stages
// ---------------------------------------------------------------------------

/// Masks layered on whenever an allowed class reaches sensitivity level 3.
pub const HIGH_SENSITIVITY_MASKS: &[&str] = &[
    "Patient.identifier.value",
    "Patient.telecom.value",
    "Patient.address.line",
    "Practitioner.identifier.value",
];

/// Identifying fields pseudonymized under the research purpose.
pub const IDENTIFYING_FIELDS: &[&str] = &[
    "Patient.identifier",
    "Patient.name",
    "Patient.contact",
    "Patient.address",
];

/// Clinical detail masked under the payment purpose.
pub const CLINICAL_DETAIL_MASKS: &[&str] = &[
    "Condition.note",
    "DiagnosticReport.conclusion",
    "Observation.value",
];

/// Administrative classes outside the clinical narrowing of TREAT/ETREAT.
pub const NON_CLINICAL_CLASSES: &[&str] = &["Coverage", "Encounter.financial"];

/// Demographic detail masked by the `mask_demographic` preference.
pub const DEMOGRAPHIC_MASKS: &[&str] = &[
    "Patient.address.line",
    "Patient.identifier.value",
    "Patient.telecom",
];

/// Contact fields withheld by `contact_emergency_only` outside ETREAT.
pub const CONTACT_FIELDS: &[&str] = &["Patient.contact", "Patient.telecom"];

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the four filtering stages over an evaluated permission set, in
/// order: role, purpose, sensitivity, patient preference. Each stage
/// rewrites the set and the disjointness invariant is re-established after
/// every stage.
///
/// Returns `Err` with the denial reason when a stage leaves nothing
/// allowed (or refuses the purpose outright); the permission set then
/// reflects the state at the point of denial.
pub fn apply_filters(
    perms: &mut PermissionSet,
    request: &ConsentRequest,
    preferences: &PatientPreferences,
    registry: &Registry,
) -> Result<(), ReasonCode> {
    role_stage(perms, request, registry)?;
    purpose_stage(perms, request, preferences)?;
    sensitivity_stage(perms, request, registry);
    preference_stage(perms, request, preferences)?;
    Ok(())
}

/// Stage 1: intersect with the requester role's capability set. Role
/// denies outrank consent allows.
fn role_stage(
    perms: &mut PermissionSet,
    request: &ConsentRequest,
    registry: &Registry,
) -> Result<(), ReasonCode> {
    let caps = registry.role_capability(request.requester_role);
    for class in perms.allowed.clone() {
        if !caps.allows(&class) {
            perms.deny(class);
        }
    }
    for field in caps.pseudonymize_fields {
        perms.pseudonymize(FieldPath::new(*field));
    }
    perms.enforce_disjoint();
    if perms.allowed.is_empty() {
        return Err(ReasonCode::RoleDenied);
    }
    Ok(())
}

/// Stage 2: purpose-of-use narrowing.
fn purpose_stage(
    perms: &mut PermissionSet,
    request: &ConsentRequest,
    preferences: &PatientPreferences,
) -> Result<(), ReasonCode> {
    match request.purpose {
        Purpose::Treat | Purpose::Etreat => {
            for class in perms.allowed.clone() {
                let non_clinical = NON_CLINICAL_CLASSES
                    .iter()
                    .any(|pattern| class.as_str() == *pattern || class.matches_glob(&format!("{pattern}.*")));
                if non_clinical {
                    perms.deny(class);
                }
            }
            if perms.allowed.is_empty() {
                return Err(ReasonCode::PurposeRestricted);
            }
        }
        Purpose::Hpaymt => {
            for field in CLINICAL_DETAIL_MASKS {
                perms.mask(FieldPath::new(*field));
            }
        }
        Purpose::Hresch => {
            if preferences.no_research {
                perms.deny_all();
                return Err(ReasonCode::ResearchNotPermitted);
            }
            for field in IDENTIFYING_FIELDS {
                perms.pseudonymize(FieldPath::new(*field));
            }
        }
        Purpose::Hmarkt => {
            if !preferences.allows_marketing() {
                perms.deny_all();
                return Err(ReasonCode::MarketingNotPermitted);
            }
        }
        Purpose::Hoperat | Purpose::Pubhlth | Purpose::Hdirect => {}
    }
    perms.enforce_disjoint();
    Ok(())
}

/// Stage 3: once any allowed class sits at sensitivity level 3 or above,
/// the role's mask fields plus the high-sensitivity mask set apply.
fn sensitivity_stage(perms: &mut PermissionSet, request: &ConsentRequest, registry: &Registry) {
    let has_sensitive = perms
        .allowed
        .iter()
        .any(|class| registry.sensitivity(class) >= SensitivityLevel::Medium);
    if !has_sensitive {
        return;
    }
    let caps = registry.role_capability(request.requester_role);
    for field in caps.mask_fields {
        perms.mask(FieldPath::new(*field));
    }
    for field in HIGH_SENSITIVITY_MASKS {
        perms.mask(FieldPath::new(*field));
    }
}

/// Stage 4: patient preferences.
fn preference_stage(
    perms: &mut PermissionSet,
    request: &ConsentRequest,
    preferences: &PatientPreferences,
) -> Result<(), ReasonCode> {
    if preferences.mask_demographic {
        for field in DEMOGRAPHIC_MASKS {
            perms.mask(FieldPath::new(*field));
        }
    }
    if preferences.contact_emergency_only && request.purpose != Purpose::Etreat {
        for field in CONTACT_FIELDS {
            perms.deny(FieldPath::new(*field));
        }
    }
    perms.enforce_disjoint();
    if perms.allowed.is_empty() {
        return Err(ReasonCode::PreferenceDenied);
    }
    Ok(())
}
