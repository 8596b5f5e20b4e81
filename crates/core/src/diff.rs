//! Function-level similarity and the whole-binary diff orchestrator.
//!
//! Both levels reduce to the same shape: build a cost matrix of negated
//! similarities with the smaller collection as rows, hand it to
//! [`crate::matching::solve`], and normalize the result by the larger
//! collection's size. Every matrix cell depends only on its two immutable
//! inputs, so the function-level matrix is filled row-parallel.

use std::cmp::Ordering;

use log::debug;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::DiffConfig;
use crate::matching;
use crate::model::{BinaryModel, FunctionCfg};
use crate::similarity::{block_similarity, edge_similarity};

/// One matched function pair, always reported as `(address_a, address_b)`
/// regardless of which binary was oriented as the row side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FunctionMatch {
    pub address_a: u64,
    pub address_b: u64,
    pub similarity: f64,
}

/// Result of diffing two binaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffReport {
    /// Matched pairs, sorted descending by similarity.
    pub matches: Vec<FunctionMatch>,
    /// Number of matches at or above the acceptance threshold.
    pub accepted: usize,
    /// Function count of the larger binary.
    pub total_functions: usize,
    pub threshold: f64,
}

/// Structural similarity of two functions in `[0, 1]`.
///
/// Two independent assignment solves — block-vertex level and block-edge
/// level — each normalized by the larger collection's size, then averaged.
/// The edge solve reuses the vertex-level block similarities; nothing is
/// recomputed. A function pair with no edges on either side scores on
/// vertices alone.
pub fn function_similarity(a: &FunctionCfg, b: &FunctionCfg, config: &DiffConfig) -> f64 {
    let swapped = a.blocks.len() > b.blocks.len();
    let (left, right) = if swapped { (b, a) } else { (a, b) };
    let left_count = left.blocks.len();
    let right_count = right.blocks.len();

    if left_count == 0 {
        // Comparing two empty block sets is an exact match; one empty side
        // against a populated one shares nothing.
        return if right_count == 0 { 1.0 } else { 0.0 };
    }

    // Vertex level. The similarity matrix is kept for endpoint lookups.
    let block_scores: Vec<Vec<f64>> = left
        .blocks
        .iter()
        .map(|lb| right.blocks.iter().map(|rb| block_similarity(lb, rb, config)).collect())
        .collect();
    let vertex_costs: Vec<Vec<f64>> =
        block_scores.iter().map(|row| row.iter().map(|s| -s).collect()).collect();
    let (vertex_cost, _) = matching::solve(&vertex_costs);
    let vertex_score = -vertex_cost / right_count as f64;

    // Edge level. Orientation is decided by edge counts, which need not
    // agree with the block orientation above.
    let left_edges = left.edge_list();
    let right_edges = right.edge_list();
    if left_edges.is_empty() || right_edges.is_empty() {
        return vertex_score;
    }
    let (row_edges, col_edges, rows_are_left) = if left_edges.len() <= right_edges.len() {
        (&left_edges, &right_edges, true)
    } else {
        (&right_edges, &left_edges, false)
    };

    let edge_costs: Vec<Vec<f64>> = row_edges
        .iter()
        .map(|&(ru, rv)| {
            col_edges
                .iter()
                .map(|&(cu, cv)| {
                    let (source_score, target_score) = if rows_are_left {
                        (block_scores[ru][cu], block_scores[rv][cv])
                    } else {
                        (block_scores[cu][ru], block_scores[cv][rv])
                    };
                    -edge_similarity(source_score, target_score)
                })
                .collect()
        })
        .collect();
    let (edge_cost, _) = matching::solve(&edge_costs);
    let edge_score = -edge_cost / col_edges.len() as f64;

    let combined = (vertex_score + edge_score) / 2.0;
    debug!(
        "{:#x} vs {:#x} vertex {vertex_score:.3} edge {edge_score:.3} score {combined:.3}",
        a.entry_address, b.entry_address
    );
    combined
}

/// Diff two binary models: one top-level assignment over the
/// function-by-function similarity matrix, thresholded and ranked.
pub fn diff(a: &BinaryModel, b: &BinaryModel, config: &DiffConfig) -> DiffReport {
    let swapped = a.functions.len() > b.functions.len();
    let (left, right) = if swapped { (b, a) } else { (a, b) };
    let total_functions = right.functions.len();

    if left.functions.is_empty() {
        return DiffReport {
            matches: Vec::new(),
            accepted: 0,
            total_functions,
            threshold: config.match_threshold,
        };
    }

    // Each worker fills whole rows; collect() is the barrier before the solve.
    let costs: Vec<Vec<f64>> = left
        .functions
        .par_iter()
        .map(|fl| {
            right.functions.iter().map(|fr| -function_similarity(fl, fr, config)).collect()
        })
        .collect();

    let (_, assigned) = matching::solve(&costs);

    let mut matches: Vec<FunctionMatch> = assigned
        .iter()
        .enumerate()
        .map(|(i, &j)| {
            let similarity = -costs[i][j];
            let (address_a, address_b) = if swapped {
                (right.functions[j].entry_address, left.functions[i].entry_address)
            } else {
                (left.functions[i].entry_address, right.functions[j].entry_address)
            };
            FunctionMatch { address_a, address_b, similarity }
        })
        .collect();

    matches.sort_by(|x, y| {
        y.similarity
            .partial_cmp(&x.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| x.address_a.cmp(&y.address_a))
    });

    let accepted = matches.iter().filter(|m| m.similarity >= config.match_threshold).count();

    DiffReport { matches, accepted, total_functions, threshold: config.match_threshold }
}
