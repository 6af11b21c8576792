use chrono::Duration;
use consentry_core::{FieldPath, Purpose, Role, SensitivityLevel};
use std::collections::HashMap;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// RoleCapability — base capability set per requester role
// ---------------------------------------------------------------------------

/// Base capability set for a requester role: glob patterns over data
/// classes, fields the role always sees masked or pseudonymized, and
/// whether the role may trigger the emergency override.
#[derive(Debug, Clone, Copy)]
pub struct RoleCapability {
    pub allow: &'static [&'static str],
    pub deny: &'static [&'static str],
    pub mask_fields: &'static [&'static str],
    pub pseudonymize_fields: &'static [&'static str],
    pub may_override_emergency: bool,
}

impl RoleCapability {
    /// Whether the capability set grants access to a data class.
    /// Denies outrank allows.
    pub fn allows(&self, class: &FieldPath) -> bool {
        if self.deny.iter().any(|pattern| class.matches_glob(pattern)) {
            return false;
        }
        self.allow.iter().any(|pattern| class.matches_glob(pattern))
    }
}

const PHYSICIAN: RoleCapability = RoleCapability {
    allow: &["*"],
    deny: &[],
    mask_fields: &[],
    pseudonymize_fields: &[],
    may_override_emergency: true,
};

const NURSE: RoleCapability = RoleCapability {
    allow: &[
        "Patient.demographics",
        "Observation.*",
        "Condition.*",
        "AllergyIntolerance",
    ],
    deny: &["Encounter.financial", "Coverage"],
    mask_fields: &["Patient.identifier.value"],
    pseudonymize_fields: &[],
    may_override_emergency: true,
};

const PHARMACIST: RoleCapability = RoleCapability {
    allow: &[
        "MedicationRequest",
        "MedicationRequest.*",
        "MedicationDispense",
        "AllergyIntolerance",
        "Patient.demographics",
    ],
    deny: &["DiagnosticReport.*", "Observation.laboratory"],
    mask_fields: &["Patient.address", "Patient.telecom"],
    pseudonymize_fields: &[],
    may_override_emergency: false,
};

const RESEARCHER: RoleCapability = RoleCapability {
    allow: &["*"],
    deny: &[],
    mask_fields: &[],
    pseudonymize_fields: &[
        "Patient.identifier",
        "Patient.name",
        "Patient.contact",
        "Patient.address",
    ],
    may_override_emergency: false,
};

const BILLING: RoleCapability = RoleCapability {
    allow: &["Patient.demographics", "Encounter.financial", "Coverage"],
    deny: &["Observation.*", "Condition.*", "DiagnosticReport.*"],
    mask_fields: &["Patient.name"],
    pseudonymize_fields: &[],
    may_override_emergency: false,
};

const OTHER: RoleCapability = RoleCapability {
    allow: &[],
    deny: &["*"],
    mask_fields: &[],
    pseudonymize_fields: &[],
    may_override_emergency: false,
};

// ---------------------------------------------------------------------------
// Registry — process-wide read-only terminology snapshot
// ---------------------------------------------------------------------------

/// Read-only terminology tables: data-class sensitivity, purpose default
/// durations, role capabilities, purpose compatibility, and the
/// safety-critical class list used by the emergency override.
///
/// Initialized once and held behind a `OnceLock`; all lookups are pure and
/// total, and concurrent unsynchronized reads are safe.
#[derive(Debug)]
pub struct Registry {
    sensitivity: HashMap<&'static str, SensitivityLevel>,
}

/// Safety-critical classes force-allowed under the emergency override.
const SAFETY_CRITICAL_CLASSES: &[&str] = &[
    "AllergyIntolerance",
    "Condition.critical",
    "MedicationRequest.active",
    "Observation.vital-signs",
];

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry snapshot.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::seed)
}

impl Registry {
    fn seed() -> Self {
        use SensitivityLevel::*;
        let sensitivity = HashMap::from([
            ("Patient.demographics", Low),
            ("Observation.vital-signs", Low),
            ("Observation.laboratory", LowMedium),
            ("DiagnosticReport.imaging", LowMedium),
            ("Condition.diagnosis", Medium),
            ("Condition.mental-health", High),
            ("MedicationRequest.controlled", High),
            ("AllergyIntolerance", High),
            ("Observation.genetic", Critical),
            ("MedicationRequest", High),
            ("MedicationDispense", High),
            ("Encounter.financial", Medium),
            ("Coverage", Medium),
        ]);
        Self { sensitivity }
    }

    /// Sensitivity of a data class. Unknown classes default to level 2.
    pub fn sensitivity(&self, class: &FieldPath) -> SensitivityLevel {
        self.sensitivity
            .get(class.as_str())
            .copied()
            .unwrap_or(SensitivityLevel::LowMedium)
    }

    /// Default access duration granted for a purpose of use.
    pub fn purpose_duration(&self, purpose: Purpose) -> Duration {
        match purpose {
            Purpose::Treat => Duration::days(30),
            Purpose::Etreat => Duration::hours(24),
            Purpose::Hpaymt => Duration::days(180),
            Purpose::Hoperat => Duration::days(90),
            Purpose::Hresch => Duration::days(1825),
            Purpose::Pubhlth => Duration::days(365),
            Purpose::Hmarkt => Duration::days(90),
            Purpose::Hdirect => Duration::days(365),
        }
    }

    pub fn role_capability(&self, role: Role) -> &RoleCapability {
        match role {
            Role::Physician => &PHYSICIAN,
            Role::Nurse => &NURSE,
            Role::Pharmacist => &PHARMACIST,
            Role::Researcher => &RESEARCHER,
            Role::Billing => &BILLING,
            Role::Other => &OTHER,
        }
    }

    /// Cross-purpose compatibility score. Equal purposes score 1.0; the
    /// documented compatible pair TREAT <-> ETREAT scores 0.7; every other
    /// pair is incompatible.
    pub fn purpose_compatibility(&self, consented: Purpose, requested: Purpose) -> f64 {
        if consented == requested {
            return 1.0;
        }
        match (consented, requested) {
            (Purpose::Treat, Purpose::Etreat) | (Purpose::Etreat, Purpose::Treat) => 0.7,
            _ => 0.0,
        }
    }

    /// Whether a requested data type falls under the safety-critical set.
    pub fn is_safety_critical(&self, requested: &FieldPath) -> bool {
        SAFETY_CRITICAL_CLASSES.iter().any(|class| {
            let class = FieldPath::new(*class);
            class == *requested || class.is_parent_of(requested)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> FieldPath {
        FieldPath::new(s)
    }

    #[test]
    fn test_seed_sensitivity_levels() {
        let r = registry();
        assert_eq!(r.sensitivity(&p("Patient.demographics")).rank(), 1);
        assert_eq!(r.sensitivity(&p("Observation.vital-signs")).rank(), 1);
        assert_eq!(r.sensitivity(&p("Observation.laboratory")).rank(), 2);
        assert_eq!(r.sensitivity(&p("DiagnosticReport.imaging")).rank(), 2);
        assert_eq!(r.sensitivity(&p("Condition.diagnosis")).rank(), 3);
        assert_eq!(r.sensitivity(&p("Condition.mental-health")).rank(), 4);
        assert_eq!(r.sensitivity(&p("MedicationRequest.controlled")).rank(), 4);
        assert_eq!(r.sensitivity(&p("AllergyIntolerance")).rank(), 4);
        assert_eq!(r.sensitivity(&p("Observation.genetic")).rank(), 5);
    }

    #[test]
    fn test_unknown_class_defaults_to_level_two() {
        assert_eq!(registry().sensitivity(&p("Specimen.unknown")).rank(), 2);
    }

    #[test]
    fn test_purpose_durations() {
        let r = registry();
        assert_eq!(r.purpose_duration(Purpose::Treat), Duration::days(30));
        assert_eq!(r.purpose_duration(Purpose::Etreat), Duration::hours(24));
        assert_eq!(r.purpose_duration(Purpose::Hpaymt), Duration::days(180));
        assert_eq!(r.purpose_duration(Purpose::Hoperat), Duration::days(90));
        assert_eq!(r.purpose_duration(Purpose::Hresch), Duration::days(1825));
        assert_eq!(r.purpose_duration(Purpose::Pubhlth), Duration::days(365));
        assert_eq!(r.purpose_duration(Purpose::Hmarkt), Duration::days(90));
        assert_eq!(r.purpose_duration(Purpose::Hdirect), Duration::days(365));
    }

    #[test]
    fn test_role_capability_globs() {
        let r = registry();
        let nurse = r.role_capability(Role::Nurse);
        assert!(nurse.allows(&p("Observation.vital-signs")));
        assert!(nurse.allows(&p("Condition.diagnosis")));
        assert!(nurse.allows(&p("AllergyIntolerance")));
        assert!(!nurse.allows(&p("Coverage")));
        assert!(!nurse.allows(&p("MedicationRequest")));

        let physician = r.role_capability(Role::Physician);
        assert!(physician.allows(&p("Observation.genetic")));

        let other = r.role_capability(Role::Other);
        assert!(!other.allows(&p("Patient.demographics")));
    }

    #[test]
    fn test_role_deny_outranks_allow() {
        // Pharmacist allow list does not cover labs, and labs are also
        // explicitly denied; both paths must refuse.
        let pharmacist = registry().role_capability(Role::Pharmacist);
        assert!(!pharmacist.allows(&p("Observation.laboratory")));
        assert!(!pharmacist.allows(&p("DiagnosticReport.imaging")));
        assert!(pharmacist.allows(&p("MedicationRequest.controlled")));
    }

    #[test]
    fn test_emergency_override_roles() {
        let r = registry();
        assert!(r.role_capability(Role::Physician).may_override_emergency);
        assert!(r.role_capability(Role::Nurse).may_override_emergency);
        assert!(!r.role_capability(Role::Pharmacist).may_override_emergency);
        assert!(!r.role_capability(Role::Researcher).may_override_emergency);
        assert!(!r.role_capability(Role::Billing).may_override_emergency);
        assert!(!r.role_capability(Role::Other).may_override_emergency);
    }

    #[test]
    fn test_purpose_compatibility_table() {
        let r = registry();
        assert_eq!(r.purpose_compatibility(Purpose::Treat, Purpose::Treat), 1.0);
        assert_eq!(r.purpose_compatibility(Purpose::Treat, Purpose::Etreat), 0.7);
        assert_eq!(r.purpose_compatibility(Purpose::Etreat, Purpose::Treat), 0.7);
        // HPAYMT is isolated
        assert_eq!(r.purpose_compatibility(Purpose::Hpaymt, Purpose::Hoperat), 0.0);
        assert_eq!(r.purpose_compatibility(Purpose::Hmarkt, Purpose::Treat), 0.0);
    }

    #[test]
    fn test_safety_critical_classes() {
        let r = registry();
        assert!(r.is_safety_critical(&p("AllergyIntolerance")));
        assert!(r.is_safety_critical(&p("AllergyIntolerance.drug")));
        assert!(r.is_safety_critical(&p("Condition.critical")));
        assert!(r.is_safety_critical(&p("Observation.vital-signs")));
        assert!(r.is_safety_critical(&p("MedicationRequest.active")));
        assert!(!r.is_safety_critical(&p("Observation.genetic")));
        assert!(!r.is_safety_critical(&p("Condition.diagnosis")));
    }
}
