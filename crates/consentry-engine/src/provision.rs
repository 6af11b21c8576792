use consentry_core::{FieldPath, Period, ProvisionType};

use crate::types::{Consent, ConsentRequest, PermissionSet, Provision};

// ---------------------------------------------------------------------------
// Tree well-formedness
// ---------------------------------------------------------------------------

/// Whether a consent tree is acceptable for evaluation: it stays within
/// the configured depth and node bounds, every provision names at least
/// one class, and every provision-level period lies within its parent's
/// effective period (the consent period at the root). Depth is counted
/// from 1 at the root; nodes count every provision in the tree.
pub fn well_formed(consent: &Consent, max_depth: usize, max_nodes: usize) -> bool {
    let mut nodes = 0usize;
    check(
        &consent.provision,
        1,
        &consent.data_period,
        max_depth,
        max_nodes,
        &mut nodes,
    )
}

fn check(
    provision: &Provision,
    depth: usize,
    parent_period: &Period,
    max_depth: usize,
    max_nodes: usize,
    nodes: &mut usize,
) -> bool {
    if depth > max_depth {
        return false;
    }
    *nodes += 1;
    if *nodes > max_nodes {
        return false;
    }
    if provision.classes.is_empty() {
        return false;
    }
    let effective = match &provision.data_period {
        Some(own) => {
            if !parent_period.encloses(own) {
                return false;
            }
            own
        }
        None => parent_period,
    };
    provision
        .nested
        .iter()
        .all(|child| check(child, depth + 1, effective, max_depth, max_nodes, nodes))
}

// ---------------------------------------------------------------------------
// Evaluation — depth-first permit/deny walk
// ---------------------------------------------------------------------------

/// Walk the consent tree depth-first, left-to-right, accumulating the
/// request's permission set.
///
/// Rules:
/// - a provision whose own `data_period` shares no instant with the
///   requested window is skipped along with its whole subtree
/// - a provision scoped to other purposes or other actors is skipped, but
///   its children are still walked on their own terms
/// - a deny for a class wins over any permit for the same class, whatever
///   the nesting order; `allowed ∩ denied = ∅` holds throughout
/// - fine-grained codes on a deny provision exclude `class.code` subpaths
///   without withdrawing the class itself
pub fn evaluate(consent: &Consent, request: &ConsentRequest) -> PermissionSet {
    let mut perms = PermissionSet::new();
    walk(&consent.provision, request, &mut perms);
    perms.enforce_disjoint();
    perms
}

fn walk(provision: &Provision, request: &ConsentRequest, perms: &mut PermissionSet) {
    if let Some(period) = &provision.data_period {
        if !period.overlaps(&request.time_range) {
            return;
        }
    }

    if applies_to(provision, request) {
        for class in &provision.classes {
            for requested in &request.data_types {
                if !class_covers(class, requested) {
                    continue;
                }
                match provision.kind {
                    ProvisionType::Permit => perms.allow(requested.clone()),
                    ProvisionType::Deny => {
                        perms.deny(requested.clone());
                        for code in &provision.codes {
                            perms.deny(FieldPath::new(format!("{requested}.{code}")));
                        }
                    }
                }
            }
        }
    }

    for child in &provision.nested {
        walk(child, request, perms);
    }
}

/// Purpose and actor scoping of a single provision against the request.
fn applies_to(provision: &Provision, request: &ConsentRequest) -> bool {
    if !provision.purposes.is_empty() && !provision.purposes.contains(&request.purpose) {
        return false;
    }
    if !provision.actors.is_empty()
        && !provision.actors.iter().any(|actor| {
            actor.admits(request.requester_role, &request.requester_organization)
        })
    {
        return false;
    }
    true
}

/// Whether a provision class token speaks for a requested data type:
/// exact, ancestor (`Observation` or `Observation.*`), or the `*`
/// wildcard.
fn class_covers(class: &FieldPath, requested: &FieldPath) -> bool {
    class.is_parent_of(requested) || requested.matches_glob(class.as_str())
}
