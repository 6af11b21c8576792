//! Consentry FHIR wire models
//!
//! Strict wire models for the two interop artifacts the engine emits per
//! decision: a `Consent` resource snapshot and an `AuditEvent` resource.
//! Field names and codings are closed and fixed; both resources serialize
//! through `serde_json::Value`, whose object maps are BTree-backed, so the
//! rendered JSON has recursively sorted keys and identical inputs produce
//! byte-identical output.
//!
//! These are emission-only models. The engine does not parse FHIR; consents
//! arrive as typed values from the caller.

pub mod audit;
pub mod consent;
mod datatypes;

pub use audit::{AuditEventParams, audit_event};
pub use consent::{ConsentSnapshotParams, consent_snapshot};
pub use datatypes::{CodeableConcept, Coding, Reference, WirePeriod};
