//! Scalar, block, and edge similarity scoring.
//!
//! Every score here lands in `[0, 1]` and every comparison is symmetric in
//! its two operands. The weights are fixed; which sub-scores participate is
//! decided by [`DiffConfig`].

use crate::config::{BlockTransform, DiffConfig, ScalarCurve};
use crate::model::BlockFeature;

const FINGERPRINT_WEIGHT: f64 = 10.0;
const CALL_WEIGHT: f64 = 8.0;
const INSTRUCTION_WEIGHT: f64 = 6.0;
const CODE_REF_WEIGHT: f64 = 3.0;
const DATA_REF_WEIGHT: f64 = 2.0;
const STRING_REF_WEIGHT: f64 = 2.0;
const DISTANCE_WEIGHT: f64 = 4.0;
const IN_DEGREE_WEIGHT: f64 = 5.0;

/// Ratio similarity of two same-kind counters.
///
/// Equal inputs score 1. Otherwise the min/max ratio is shifted past
/// `threshold` and renormalized into `(0, 1]` through the configured curve.
/// Symmetric, continuous, and `scalar_similarity(x, x, t, _) == 1` for any
/// `t < 1`.
pub fn scalar_similarity(x: u64, y: u64, threshold: f64, curve: ScalarCurve) -> f64 {
    if x == y {
        return 1.0;
    }
    let ratio = x.min(y) as f64 / x.max(y) as f64;
    if ratio <= threshold {
        return 0.0;
    }
    let base = (ratio - threshold) / (1.0 - threshold);
    match curve {
        ScalarCurve::Linear => base,
        ScalarCurve::Squared => base * base,
    }
}

/// Distance sub-score with the unreachable sentinel handled up front.
///
/// An unreachable block compared against any finite distance scores 0; two
/// unreachable blocks are equal inputs and score 1. The sentinel never
/// reaches the ratio arithmetic.
fn distance_similarity(a: Option<u32>, b: Option<u32>, curve: ScalarCurve) -> f64 {
    match (a, b) {
        (Some(x), Some(y)) => scalar_similarity(u64::from(x), u64::from(y), 0.0, curve),
        (None, None) => 1.0,
        _ => 0.0,
    }
}

/// Weighted blend of the per-feature sub-scores of two blocks.
///
/// `block_similarity(a, a, cfg) == 1` for any well-formed feature set.
pub fn block_similarity(a: &BlockFeature, b: &BlockFeature, config: &DiffConfig) -> f64 {
    let curve = config.scalar_curve;

    let fingerprint_score =
        if a.fingerprint == b.fingerprint { FINGERPRINT_WEIGHT } else { 0.0 };
    let call_score = CALL_WEIGHT
        * scalar_similarity(u64::from(a.call_count), u64::from(b.call_count), 0.0, curve);
    let instruction_score = INSTRUCTION_WEIGHT
        * scalar_similarity(
            u64::from(a.instruction_count),
            u64::from(b.instruction_count),
            0.0,
            curve,
        );
    let distance_score = DISTANCE_WEIGHT * distance_similarity(a.distance, b.distance, curve);
    let degree_score = IN_DEGREE_WEIGHT
        * scalar_similarity(u64::from(a.in_degree), u64::from(b.in_degree), 0.0, curve);

    let mut total_score = fingerprint_score
        + call_score
        + instruction_score
        + distance_score
        + degree_score;
    let mut total_weight = FINGERPRINT_WEIGHT
        + CALL_WEIGHT
        + INSTRUCTION_WEIGHT
        + DISTANCE_WEIGHT
        + IN_DEGREE_WEIGHT;

    if config.reference_features {
        total_score += CODE_REF_WEIGHT
            * scalar_similarity(
                u64::from(a.code_ref_count),
                u64::from(b.code_ref_count),
                0.0,
                curve,
            );
        total_score += DATA_REF_WEIGHT
            * scalar_similarity(
                u64::from(a.data_ref_count),
                u64::from(b.data_ref_count),
                0.0,
                curve,
            );
        total_score += STRING_REF_WEIGHT
            * scalar_similarity(
                u64::from(a.string_ref_count),
                u64::from(b.string_ref_count),
                0.0,
                curve,
            );
        total_weight += CODE_REF_WEIGHT + DATA_REF_WEIGHT + STRING_REF_WEIGHT;
    }

    let blended = total_score / total_weight;
    match config.block_transform {
        BlockTransform::Identity => blended,
        BlockTransform::Sqrt => blended.sqrt(),
    }
}

/// Edge-level score from two already-known endpoint vertex scores.
///
/// The multiplicative half punishes pairs where either endpoint is a poor
/// match; the additive half still rewards partial agreement.
pub fn edge_similarity(source_score: f64, target_score: f64) -> f64 {
    let strict = source_score * target_score;
    let lenient = (source_score + target_score) / 2.0;
    (strict + lenient) / 2.0
}
