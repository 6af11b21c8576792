use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// FieldPath — dotted-segment grammar for data classes and field tokens
// ---------------------------------------------------------------------------

/// A dotted path naming a data class or a field within one, e.g.
/// `Observation.laboratory` or `Patient.identifier.value`.
///
/// The same grammar serves consent provision classes, requested data types,
/// and the mask/pseudonymize tokens in a permission set. Paths are compared
/// as whole segments: `Observation` is a parent of `Observation.laboratory`
/// but not of `ObservationX`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Whether the path is non-empty with no empty segments.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty() && self.0.split('.').all(|seg| !seg.is_empty())
    }

    /// Whether this path is a strict ancestor of `other`
    /// (`Observation` is a parent of `Observation.laboratory`).
    pub fn is_parent_of(&self, other: &FieldPath) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(self.0.as_str())
            && other.0.as_bytes()[self.0.len()] == b'.'
    }

    /// Match against a glob pattern.
    ///
    /// Patterns:
    /// - `"*"` matches every path
    /// - a trailing `".*"` matches any descendant (`"Observation.*"` matches
    ///   `"Observation.laboratory"` but not `"Observation"` itself)
    /// - anything else is an exact match
    pub fn matches_glob(&self, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix(".*") {
            return FieldPath::new(prefix).is_parent_of(self);
        }
        self.0 == pattern
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FieldPath {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FieldPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// How closely a consent class token covers a requested data type.
///
/// Ordering is by coverage quality: `Exact` > `Parent` > `Wildcard` > `Miss`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClassMatch {
    Miss,
    Wildcard,
    Parent,
    Exact,
}

impl ClassMatch {
    /// Match weight used by the candidate scorer.
    pub fn weight(self) -> f64 {
        match self {
            ClassMatch::Exact => 1.0,
            ClassMatch::Parent => 0.7,
            ClassMatch::Wildcard => 0.5,
            ClassMatch::Miss => 0.0,
        }
    }
}

/// Classify how a consent class token covers a requested data type.
///
/// A class equal to the requested type is `Exact`; a class that is an
/// ancestor of it (either as a bare prefix like `Observation` or a glob
/// like `Observation.*`) is `Parent`; the bare `*` wildcard is `Wildcard`.
pub fn classify_class_match(class: &FieldPath, requested: &FieldPath) -> ClassMatch {
    if class == requested {
        return ClassMatch::Exact;
    }
    if class.as_str() == "*" {
        return ClassMatch::Wildcard;
    }
    if let Some(prefix) = class.as_str().strip_suffix(".*") {
        if FieldPath::new(prefix).is_parent_of(requested) {
            return ClassMatch::Parent;
        }
        return ClassMatch::Miss;
    }
    if class.is_parent_of(requested) {
        return ClassMatch::Parent;
    }
    ClassMatch::Miss
}
