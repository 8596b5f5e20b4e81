//! Minimum-cost rectangular assignment.
//!
//! Successive shortest augmenting paths with vertex potentials (the
//! Jonker-Volgenant formulation of the Hungarian method). One row and
//! column of slack is kept at index 0 as the unmatched "dummy", which is
//! why the internal arrays are one longer than the matrix sides.
//!
//! The solver carries no knowledge of what the indices mean; it is reused
//! unchanged for block-vertex, block-edge, and whole-binary function
//! matching. Callers orient the smaller collection as the row side and
//! un-swap the result afterwards.

/// Solve an `L x R` cost matrix, `L <= R`, every cell finite.
///
/// Returns the minimum total cost and, for each row, the distinct column it
/// is assigned to. Deterministic: ties are broken by input order. An empty
/// matrix yields `(0.0, [])`.
///
/// Runs in `O(L * R^2)` time and `O(R)` extra space per augmentation.
pub fn solve(costs: &[Vec<f64>]) -> (f64, Vec<usize>) {
    if costs.is_empty() {
        return (0.0, Vec::new());
    }
    let rows = costs.len() + 1;
    let cols = costs[0].len() + 1;
    debug_assert!(rows <= cols, "caller must orient the smaller collection as rows");
    debug_assert!(costs.iter().flatten().all(|c| c.is_finite()));

    // Row/column potentials; matched row per column (0 = unmatched).
    let mut row_potential = vec![0.0f64; rows];
    let mut col_potential = vec![0.0f64; cols];
    let mut matched_row = vec![0usize; cols];
    let mut assigned = vec![0usize; rows - 1];

    for row in 1..rows {
        matched_row[0] = row;
        let mut current_col = 0usize;
        let mut min_slack = vec![f64::INFINITY; cols];
        let mut previous = vec![0usize; cols];
        let mut visited = vec![false; cols];

        // Dijkstra over columns until a free column is reached.
        loop {
            visited[current_col] = true;
            let slack_row = matched_row[current_col];
            let mut delta = f64::INFINITY;
            let mut next_col = 0usize;
            for col in 1..cols {
                if visited[col] {
                    continue;
                }
                let reduced =
                    costs[slack_row - 1][col - 1] - row_potential[slack_row] - col_potential[col];
                if reduced < min_slack[col] {
                    min_slack[col] = reduced;
                    previous[col] = current_col;
                }
                if min_slack[col] < delta {
                    delta = min_slack[col];
                    next_col = col;
                }
            }
            for col in 0..cols {
                if visited[col] {
                    row_potential[matched_row[col]] += delta;
                    col_potential[col] -= delta;
                } else {
                    min_slack[col] -= delta;
                }
            }
            current_col = next_col;
            if matched_row[current_col] == 0 {
                break;
            }
        }

        // Flip the alternating path back to the dummy column.
        while current_col != 0 {
            let prev_col = previous[current_col];
            matched_row[current_col] = matched_row[prev_col];
            current_col = prev_col;
        }
    }

    for col in 1..cols {
        if matched_row[col] > 0 {
            assigned[matched_row[col] - 1] = col - 1;
        }
    }
    (-col_potential[0], assigned)
}
