use consentry_core::{FieldPath, Purpose};
use std::collections::BTreeSet;

use crate::registry::Registry;
use crate::types::ConsentRequest;

// ---------------------------------------------------------------------------
// Emergency override — ETREAT short-circuit for safety-critical data
// ---------------------------------------------------------------------------

/// The safety-critical subset of the request that the emergency override
/// force-allows, or `None` when the override does not apply.
///
/// The override fires only when the purpose is emergency treatment AND the
/// requester's role carries `may_override_emergency`. It never expands to
/// classes outside the safety-critical set; roles without the override get
/// nothing regardless of context flags.
pub fn grant_classes(request: &ConsentRequest, registry: &Registry) -> Option<BTreeSet<FieldPath>> {
    if request.purpose != Purpose::Etreat {
        return None;
    }
    if !registry
        .role_capability(request.requester_role)
        .may_override_emergency
    {
        return None;
    }
    let grant: BTreeSet<FieldPath> = request
        .data_types
        .iter()
        .filter(|requested| registry.is_safety_critical(requested))
        .cloned()
        .collect();
    if grant.is_empty() {
        None
    } else {
        Some(grant)
    }
}

/// Whether the grant alone satisfies every requested data type.
pub fn covers_all(grant: &BTreeSet<FieldPath>, request: &ConsentRequest) -> bool {
    request.data_types.iter().all(|dt| grant.contains(dt))
}
