use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Typed identifiers — prevent stringly-typed confusion
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_id!(PatientId, "Patient identifier (national health id format).");
define_id!(ConsentId, "Opaque identifier of a consent resource.");
define_id!(RequestId, "Opaque identifier of an access request.");
define_id!(RequesterId, "Opaque identifier of the requesting practitioner.");
define_id!(OrganizationId, "Opaque identifier of a requester organization.");

/// Maximum length of an opaque identifier.
pub const MAX_OPAQUE_ID_LEN: usize = 128;

/// Whether `s` is a valid opaque identifier: 1..=128 characters drawn from
/// the URL-safe set (alphanumerics plus `-`, `_`, `.`, `~`).
pub fn is_opaque_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_OPAQUE_ID_LEN
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
}

impl PatientId {
    /// Whether the identifier matches the documented national health id
    /// format: the literal prefix `CR` followed by exactly nine digits.
    pub fn is_well_formed(&self) -> bool {
        let s = self.0.as_str();
        s.len() == 11
            && s.starts_with("CR")
            && s[2..].chars().all(|c| c.is_ascii_digit())
    }
}
