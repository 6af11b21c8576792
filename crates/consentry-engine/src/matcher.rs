use chrono::{DateTime, Utc};
use consentry_core::{classify_class_match, ClassMatch, ConsentStatus, FieldPath};
use tracing::debug;

use crate::config::EngineConfig;
use crate::registry::Registry;
use crate::types::{BestMatch, Consent, ConsentRequest, Provision, ScoreBreakdown};

// Axis weights of the candidate score.
const WEIGHT_DATA_TYPE: f64 = 0.4;
const WEIGHT_PURPOSE: f64 = 0.3;
const WEIGHT_REQUESTER: f64 = 0.2;
const WEIGHT_TEMPORAL: f64 = 0.1;

/// Two candidate scores within this distance are a tie and fall through to
/// the deterministic tie-break chain.
const SCORE_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Candidate selection
// ---------------------------------------------------------------------------

/// Score every active candidate and pick the best one at or above the
/// match threshold.
///
/// Ties are broken by narrower consent period, then deeper matched
/// provision, then lexicographic consent id, so selection is fully
/// deterministic.
pub fn find_best_match<'a>(
    request: &ConsentRequest,
    consents: &'a [Consent],
    now: DateTime<Utc>,
    registry: &Registry,
    config: &EngineConfig,
) -> Option<BestMatch<'a>> {
    let mut best: Option<BestMatch<'a>> = None;

    for consent in consents {
        if consent.status != ConsentStatus::Active {
            continue;
        }
        if consent.patient_id != request.patient_id {
            continue;
        }
        if !consent.data_period.contains(now) {
            continue;
        }

        let (breakdown, matched_depth) = score_consent(request, consent, registry);
        debug!(
            consent_id = %consent.id,
            score = breakdown.total,
            data_type = breakdown.data_type,
            purpose = breakdown.purpose,
            requester = breakdown.requester,
            temporal = breakdown.temporal,
            "candidate scored"
        );

        if breakdown.total < config.minimum_match_threshold {
            continue;
        }

        let candidate = BestMatch {
            consent,
            breakdown,
            matched_depth,
        };
        best = Some(match best {
            None => candidate,
            Some(current) => pick_winner(current, candidate),
        });
    }

    if let Some(winner) = &best {
        debug!(consent_id = %winner.consent.id, score = winner.breakdown.total, "best match selected");
    }
    best
}

fn pick_winner<'a>(current: BestMatch<'a>, challenger: BestMatch<'a>) -> BestMatch<'a> {
    let diff = challenger.breakdown.total - current.breakdown.total;
    if diff > SCORE_EPSILON {
        return challenger;
    }
    if diff < -SCORE_EPSILON {
        return current;
    }
    // Tie-break (i): narrower data period.
    let current_span = current.consent.data_period.duration_secs();
    let challenger_span = challenger.consent.data_period.duration_secs();
    if challenger_span != current_span {
        return if challenger_span < current_span {
            challenger
        } else {
            current
        };
    }
    // Tie-break (ii): deeper matched provision.
    if challenger.matched_depth != current.matched_depth {
        return if challenger.matched_depth > current.matched_depth {
            challenger
        } else {
            current
        };
    }
    // Tie-break (iii): lexicographic consent id.
    if challenger.consent.id < current.consent.id {
        challenger
    } else {
        current
    }
}

// ---------------------------------------------------------------------------
// Scoring axes
// ---------------------------------------------------------------------------

/// Compute the four-axis score of one candidate. Returns the breakdown and
/// the deepest provision depth at which a requested class matched.
pub fn score_consent(
    request: &ConsentRequest,
    consent: &Consent,
    registry: &Registry,
) -> (ScoreBreakdown, usize) {
    let (data_type, matched_depth) = data_type_axis(request, &consent.provision);
    let purpose = purpose_axis(request, &consent.provision, registry);
    let requester = requester_axis(request, &consent.provision);
    let temporal = temporal_axis(request, consent);

    let total = data_type * WEIGHT_DATA_TYPE
        + purpose * WEIGHT_PURPOSE
        + requester * WEIGHT_REQUESTER
        + temporal * WEIGHT_TEMPORAL;

    (
        ScoreBreakdown {
            data_type,
            purpose,
            requester,
            temporal,
            total,
        },
        matched_depth,
    )
}

/// Fraction of requested types covered, each weighted by match quality of
/// the best permit class found anywhere in the tree (exact 1.0, parent 0.7,
/// wildcard 0.5).
fn data_type_axis(request: &ConsentRequest, root: &Provision) -> (f64, usize) {
    if request.data_types.is_empty() {
        return (0.0, 0);
    }
    let mut sum = 0.0;
    let mut deepest = 0usize;
    for requested in &request.data_types {
        let (quality, depth) = best_class_match(root, requested, 0);
        sum += quality.weight();
        if quality > ClassMatch::Miss {
            deepest = deepest.max(depth);
        }
    }
    (sum / request.data_types.len() as f64, deepest)
}

/// Best permit-class match for one requested type across the whole tree.
/// Prefers match quality, then greater depth, so the depth tie-break
/// reflects the most specific provision touched.
fn best_class_match(
    provision: &Provision,
    requested: &FieldPath,
    depth: usize,
) -> (ClassMatch, usize) {
    let mut best = (ClassMatch::Miss, depth);
    if provision.kind == consentry_core::ProvisionType::Permit {
        for class in &provision.classes {
            let quality = classify_class_match(class, requested);
            if quality > best.0 || (quality == best.0 && quality > ClassMatch::Miss) {
                best = (quality, depth);
            }
        }
    }
    for child in &provision.nested {
        let (quality, child_depth) = best_class_match(child, requested, depth + 1);
        if quality > best.0 || (quality == best.0 && quality > ClassMatch::Miss && child_depth > best.1)
        {
            best = (quality, child_depth);
        }
    }
    best
}

/// Exact purpose scores 1.0; the compatibility table covers the rest.
fn purpose_axis(request: &ConsentRequest, root: &Provision, registry: &Registry) -> f64 {
    root.purposes
        .iter()
        .map(|consented| registry.purpose_compatibility(*consented, request.purpose))
        .fold(0.0, f64::max)
}

/// Explicit actor match scores 1.0. Without one, the request's
/// pre-materialized relationship decides; a consent with no actor
/// constraint at all is general access and floors at 0.5.
fn requester_axis(request: &ConsentRequest, root: &Provision) -> f64 {
    if root.actors.is_empty() {
        return request.relationship.score().max(0.5);
    }
    let admitted = root
        .actors
        .iter()
        .any(|actor| actor.admits(request.requester_role, &request.requester_organization));
    if admitted {
        1.0
    } else {
        request.relationship.score()
    }
}

/// 1.0 when the requested window lies inside the consent period, linearly
/// decaying with the uncovered portion otherwise.
fn temporal_axis(request: &ConsentRequest, consent: &Consent) -> f64 {
    if consent.data_period.encloses(&request.time_range) {
        1.0
    } else {
        consent.data_period.overlap_fraction(&request.time_range)
    }
}
