//! Consentry Engine
//!
//! Stateless healthcare consent decision engine. A single
//! `ConsentEngine::validate` call scores a request against a patient's
//! active consents, evaluates the best match's nested permit/deny
//! provisions into a field-level permission set, applies role, purpose,
//! sensitivity, and patient-preference filters, honors the emergency
//! treatment override, and returns a `DecisionBundle`: the decision, a
//! consent resource snapshot, and an audit event.
//!
//! Key properties:
//! - Total and deterministic: identical inputs produce byte-identical
//!   serialized bundles; the clock is injected, never read
//! - Shared-nothing: no I/O, no locks, no state between calls; the
//!   terminology registry is an immutable process-wide snapshot
//! - Deny wins: a deny provision, role denial, or preference denial always
//!   outranks an allow for the same class
//! - Structured failure: authorization outcomes are `Decision` values with
//!   closed reason codes; only malformed input returns `Err`

pub mod config;
pub mod emergency;
pub mod engine;
pub mod error;
pub mod filter;
pub mod handle;
pub mod matcher;
pub mod provision;
pub mod registry;
pub mod types;

pub use config::EngineConfig;
pub use engine::ConsentEngine;
pub use error::{ConfigError, EngineResult, InputError};
pub use registry::{registry, Registry, RoleCapability};
pub use types::{
    AccessHandle, ActorConstraint, AuditInfo, BestMatch, Consent, ConsentRequest, Decision,
    DecisionBundle, OrganizationRelationship, PatientPreferences, PermissionSet, Provision,
    Reason, ReasonCode, Restriction, ScoreBreakdown,
};
