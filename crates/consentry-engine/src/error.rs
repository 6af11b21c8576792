use consentry_core::TimeError;
use thiserror::Error;

/// Malformed-input failures surfaced as `Err` from `validate`.
///
/// Authorization outcomes (no match, deny provision, role denial, and so
/// on) are never errors; they come back as `Decision::denied` with a
/// structured reason. Display strings carry identifiers only, never
/// clinical payload data.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("timestamp error: {0}")]
    Timestamp(#[from] TimeError),

    #[error("data_types must contain at least one entry")]
    EmptyDataTypes,

    #[error("data type {0:?} is not a well-formed field path")]
    InvalidDataType(String),

    #[error("patient id {0:?} does not match the documented identifier format")]
    InvalidPatientId(String),

    #[error("{field} {value:?} is not a valid opaque identifier (1-128 URL-safe characters)")]
    InvalidIdentifier { field: &'static str, value: String },
}

/// Configuration rejections raised at engine construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("minimum_match_threshold {0} is outside [0.0, 1.0]")]
    MatchThresholdOutOfRange(f64),

    #[error("reuse_threshold {reuse} must lie in [{minimum}, 1.0]")]
    ReuseThresholdOutOfRange { reuse: f64, minimum: f64 },

    #[error("emergency_cap_hours must be at least 1")]
    EmergencyCapZero,

    #[error("max_provision_nodes and max_provision_depth must be at least 1")]
    ProvisionBoundsZero,
}

pub type EngineResult<T> = Result<T, InputError>;
