use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Purpose — closed set of purpose-of-use codes
// ---------------------------------------------------------------------------

/// Purpose-of-use codes (v3 ActReason subset). Exhaustive so a new purpose
/// forces compile-time review of every match site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Purpose {
    /// Routine treatment.
    Treat,
    /// Emergency treatment.
    Etreat,
    /// Healthcare payment.
    Hpaymt,
    /// Healthcare operations.
    Hoperat,
    /// Healthcare research.
    Hresch,
    /// Public health.
    Pubhlth,
    /// Healthcare marketing.
    Hmarkt,
    /// Healthcare directory.
    Hdirect,
}

impl Purpose {
    /// Wire code as it appears in consents and audit events.
    pub fn code(self) -> &'static str {
        match self {
            Purpose::Treat => "TREAT",
            Purpose::Etreat => "ETREAT",
            Purpose::Hpaymt => "HPAYMT",
            Purpose::Hoperat => "HOPERAT",
            Purpose::Hresch => "HRESCH",
            Purpose::Pubhlth => "PUBHLTH",
            Purpose::Hmarkt => "HMARKT",
            Purpose::Hdirect => "HDIRECT",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "TREAT" => Some(Purpose::Treat),
            "ETREAT" => Some(Purpose::Etreat),
            "HPAYMT" => Some(Purpose::Hpaymt),
            "HOPERAT" => Some(Purpose::Hoperat),
            "HRESCH" => Some(Purpose::Hresch),
            "PUBHLTH" => Some(Purpose::Pubhlth),
            "HMARKT" => Some(Purpose::Hmarkt),
            "HDIRECT" => Some(Purpose::Hdirect),
            _ => None,
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// Role — requester roles
// ---------------------------------------------------------------------------

/// Requester roles recognized by the capability tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Physician,
    Nurse,
    Pharmacist,
    Researcher,
    Billing,
    Other,
}

impl Role {
    pub fn code(self) -> &'static str {
        match self {
            Role::Physician => "physician",
            Role::Nurse => "nurse",
            Role::Pharmacist => "pharmacist",
            Role::Researcher => "researcher",
            Role::Billing => "billing",
            Role::Other => "other",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// ConsentStatus — consent lifecycle
// ---------------------------------------------------------------------------

/// Consent lifecycle status. Only `Active` consents are ever matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsentStatus {
    Draft,
    Proposed,
    Active,
    Rejected,
    Inactive,
    EnteredInError,
}

impl fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsentStatus::Draft => "draft",
            ConsentStatus::Proposed => "proposed",
            ConsentStatus::Active => "active",
            ConsentStatus::Rejected => "rejected",
            ConsentStatus::Inactive => "inactive",
            ConsentStatus::EnteredInError => "entered-in-error",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// DecisionKind — terminal decision outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Approved,
    Denied,
    Pending,
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionKind::Approved => "approved",
            DecisionKind::Denied => "denied",
            DecisionKind::Pending => "pending",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// ProvisionType — permit or deny
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionType {
    Permit,
    Deny,
}

// ---------------------------------------------------------------------------
// SensitivityLevel — five-level data sensitivity scale
// ---------------------------------------------------------------------------

/// Five-level sensitivity scale attached to data classes. Declaration order
/// gives the derived `Ord`: Low < LowMedium < Medium < High < Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SensitivityLevel {
    Low,
    LowMedium,
    Medium,
    High,
    Critical,
}

impl SensitivityLevel {
    /// Numeric rank, 1 through 5.
    pub fn rank(self) -> u8 {
        match self {
            SensitivityLevel::Low => 1,
            SensitivityLevel::LowMedium => 2,
            SensitivityLevel::Medium => 3,
            SensitivityLevel::High => 4,
            SensitivityLevel::Critical => 5,
        }
    }

    pub fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            1 => Some(SensitivityLevel::Low),
            2 => Some(SensitivityLevel::LowMedium),
            3 => Some(SensitivityLevel::Medium),
            4 => Some(SensitivityLevel::High),
            5 => Some(SensitivityLevel::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for SensitivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rank())
    }
}
