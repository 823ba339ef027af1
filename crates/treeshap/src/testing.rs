//! Testing utilities for treeshap.
//!
//! Assertion helpers, compact tree builders and brute-force Shapley oracles
//! shared by unit tests, integration tests and benchmarks.
//!
//! The oracles enumerate every coalition of features, so they are exponential
//! in the feature count and only meant for small models.
//!
//! ```
//! use treeshap::testing::{brute_force_shap, stump};
//! use treeshap::tree_contributions;
//!
//! let tree = stump(0, 0.5, -1.0, 1.0, 3.0, 1.0);
//! let mut phi = vec![0.0; 2];
//! tree_contributions(&tree, &[0.9, 0.0], &mut phi);
//!
//! let oracle = brute_force_shap(std::slice::from_ref(&tree), &[0.9, 0.0], 2);
//! treeshap::assert_approx_eq!(phi[0], oracle[0], 1e-12);
//! ```

use approx::AbsDiffEq;
use ndarray::ArrayView2;

use crate::repr::{FeatureRow, NodeId, TreeArrays, TreeRecord, TreeValidationError};

// =============================================================================
// Constants
// =============================================================================

/// Default tolerance when comparing against exact or brute-force values.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// Largest feature count the brute-force oracles accept.
pub const MAX_ORACLE_FEATURES: usize = 16;

// =============================================================================
// Floating Point Assertions
// =============================================================================

/// Assert that two f64 values are approximately equal.
///
/// Uses absolute difference comparison with the given tolerance.
///
/// # Examples
///
/// ```
/// # use treeshap::assert_approx_eq;
/// assert_approx_eq!(1.0, 1.0001, 0.001);
/// assert_approx_eq!(2.0, 2.0, 1e-12, "sample {}", 3);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let left_val: f64 = $left;
        let right_val: f64 = $right;
        let tol: f64 = $tolerance;
        let diff = (left_val - right_val).abs();
        if !(diff <= tol) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                left_val, right_val, diff, tol
            );
        }
    }};
    ($left:expr, $right:expr, $tolerance:expr, $($arg:tt)+) => {{
        let left_val: f64 = $left;
        let right_val: f64 = $right;
        let tol: f64 = $tolerance;
        let diff = (left_val - right_val).abs();
        if !(diff <= tol) {
            panic!(
                "assertion failed: `(left ≈ right)` - {}\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                format_args!($($arg)+), left_val, right_val, diff, tol
            );
        }
    }};
}

/// Assert that two slices are approximately equal element-wise.
///
/// # Panics
///
/// Panics if lengths differ or any element differs by more than tolerance.
pub fn assert_slice_approx_eq(actual: &[f64], expected: &[f64], tolerance: f64, context: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{context}: length mismatch - got {}, expected {}",
        actual.len(),
        expected.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        let diff = (a - e).abs();
        assert!(
            diff <= tolerance,
            "{context}[{i}]: {a} ≠ {e} (diff={diff}, tolerance={tolerance})"
        );
    }
}

/// Render the rows of two matrices that differ, git-diff style.
fn diff_rows(actual: ArrayView2<'_, f64>, expected: ArrayView2<'_, f64>, epsilon: f64) -> String {
    let mut result = format!("Shape: {:?}\nEpsilon: {epsilon:.0e}\n\n", actual.dim());

    for (i, (act_row, exp_row)) in actual.rows().into_iter().zip(expected.rows()).enumerate() {
        if act_row.abs_diff_eq(&exp_row, epsilon) {
            continue;
        }

        result.push_str(&format!("[{i:3}] -"));
        for val in exp_row {
            result.push_str(&format!(" {val:>12.6}"));
        }
        result.push_str("  (expected)\n      +");
        for val in act_row {
            result.push_str(&format!(" {val:>12.6}"));
        }
        result.push_str("  (actual)\n      Δ");
        for (a, e) in act_row.iter().zip(exp_row.iter()) {
            if a.abs_diff_eq(e, epsilon) {
                result.push_str(&format!(" {:>12}", "-"));
            } else {
                result.push_str(&format!(" {:>+12.2e}", a - e));
            }
        }
        result.push('\n');
    }

    result
}

/// Assert that two attribution matrices are approximately equal.
///
/// On failure, shows a diff of the differing rows.
pub fn assert_matrix_approx_eq(
    actual: ArrayView2<'_, f64>,
    expected: ArrayView2<'_, f64>,
    epsilon: f64,
    context: &str,
) {
    assert_eq!(
        actual.dim(),
        expected.dim(),
        "{context}: shape mismatch"
    );
    if !actual.abs_diff_eq(&expected, epsilon) {
        panic!(
            "{context}: matrices differ\n{}",
            diff_rows(actual, expected, epsilon)
        );
    }
}

// =============================================================================
// Tree Builders
// =============================================================================

/// Build a [`TreeRecord`] from a node list.
///
/// Nodes must be listed in index order. `split` sends missing values left,
/// `split_right` sends them right.
///
/// ```
/// let tree = treeshap::tree_record! {
///     0 => split(0, 0.5) -> 1, 2 @ 10.0,
///     1 => leaf(1.0) @ 4.0,
///     2 => split_right(1, 0.0) -> 3, 4 @ 6.0,
///     3 => leaf(2.0) @ 3.0,
///     4 => leaf(3.0) @ 3.0,
/// };
/// assert_eq!(tree.n_nodes(), 5);
/// assert!(!tree.default_left(2));
/// ```
#[macro_export]
macro_rules! tree_record {
    ($($id:literal => $kind:ident ( $($args:expr),* ) $(-> $left:literal, $right:literal)? @ $cover:expr),+ $(,)?) => {{
        let mut arrays = $crate::TreeArrays::new();
        $( $crate::tree_record!(@node arrays, $id, $kind ( $($args),* ) $(-> $left, $right)? @ $cover); )+
        $crate::TreeRecord::from_arrays(arrays).expect("tree_record! produced an invalid tree")
    }};
    (@node $arrays:ident, $id:literal, split($feature:expr, $threshold:expr) -> $left:literal, $right:literal @ $cover:expr) => {
        let id = $arrays.push_split($feature, $threshold, $left, $right, $cover);
        assert_eq!(id, $id, "tree_record! nodes must be listed in index order");
    };
    (@node $arrays:ident, $id:literal, split_right($feature:expr, $threshold:expr) -> $left:literal, $right:literal @ $cover:expr) => {
        let id = $arrays.push_split($feature, $threshold, $left, $right, $cover);
        assert_eq!(id, $id, "tree_record! nodes must be listed in index order");
        $arrays.set_default_left(id, false);
    };
    (@node $arrays:ident, $id:literal, leaf($value:expr) @ $cover:expr) => {
        let id = $arrays.push_leaf($value, $cover);
        assert_eq!(id, $id, "tree_record! nodes must be listed in index order");
    };
}

/// Single split on `feature`: left leaf when `x <= threshold`.
pub fn stump(
    feature: u32,
    threshold: f64,
    left_value: f64,
    right_value: f64,
    left_cover: f64,
    right_cover: f64,
) -> TreeRecord {
    let mut arrays = TreeArrays::new();
    arrays.push_split(feature, threshold, 1, 2, left_cover + right_cover);
    arrays.push_leaf(left_value, left_cover);
    arrays.push_leaf(right_value, right_cover);
    TreeRecord::from_arrays(arrays).expect("stump is a valid tree")
}

/// Complete binary tree of the given depth in breadth-first layout.
///
/// Split `i` uses `features[i % len]` and `thresholds[i % len]`, so short
/// feature lists produce repeated splits on the same feature. Leaves take
/// `leaf_values` and `leaf_covers` in order (both need `2^depth` entries) and
/// internal covers are the sums of their leaves.
pub fn balanced_tree(
    depth: usize,
    features: &[u32],
    thresholds: &[f64],
    leaf_values: &[f64],
    leaf_covers: &[f64],
) -> Result<TreeRecord, TreeValidationError> {
    let n_internal = (1usize << depth) - 1;
    let n_leaves = 1usize << depth;
    assert!(depth == 0 || (!features.is_empty() && !thresholds.is_empty()));
    assert_eq!(leaf_values.len(), n_leaves, "need one value per leaf");
    assert_eq!(leaf_covers.len(), n_leaves, "need one cover per leaf");

    let n_nodes = n_internal + n_leaves;
    let mut covers = vec![0.0; n_nodes];
    covers[n_internal..].copy_from_slice(leaf_covers);
    for node in (0..n_internal).rev() {
        covers[node] = covers[2 * node + 1] + covers[2 * node + 2];
    }

    let mut arrays = TreeArrays::new();
    for node in 0..n_internal {
        arrays.push_split(
            features[node % features.len()],
            thresholds[node % thresholds.len()],
            (2 * node + 1) as NodeId,
            (2 * node + 2) as NodeId,
            covers[node],
        );
    }
    for (leaf, &value) in leaf_values.iter().enumerate() {
        arrays.push_leaf(value, covers[n_internal + leaf]);
    }
    TreeRecord::from_arrays(arrays)
}

// =============================================================================
// Brute-Force Oracles
// =============================================================================

/// Value of `tree` for `row` when only features in `known` are observed.
///
/// Unknown features follow both children weighted by cover fraction.
pub fn coalition_value<R: FeatureRow + ?Sized>(tree: &TreeRecord, row: &R, known: u32) -> f64 {
    fn walk<R: FeatureRow + ?Sized>(tree: &TreeRecord, node: NodeId, row: &R, known: u32) -> f64 {
        if tree.is_leaf(node) {
            return tree.leaf_value(node);
        }
        let (left, right) = (tree.left_child(node), tree.right_child(node));
        if known & (1 << tree.split_feature(node)) != 0 {
            let next = if tree.goes_left(node, row) { left } else { right };
            walk(tree, next, row, known)
        } else {
            tree.node_fraction(left) * walk(tree, left, row, known)
                + tree.node_fraction(right) * walk(tree, right, row, known)
        }
    }
    walk(tree, 0, row, known)
}

fn ensemble_value<R: FeatureRow + ?Sized>(trees: &[TreeRecord], row: &R, known: u32) -> f64 {
    trees.iter().map(|t| coalition_value(t, row, known)).sum()
}

fn factorials(n: usize) -> Vec<f64> {
    let mut out = vec![1.0; n + 1];
    for i in 1..=n {
        out[i] = out[i - 1] * i as f64;
    }
    out
}

/// Shapley values by enumerating all coalitions.
///
/// Returns `n_features` values (no base value).
pub fn brute_force_shap<R: FeatureRow + ?Sized>(
    trees: &[TreeRecord],
    row: &R,
    n_features: usize,
) -> Vec<f64> {
    assert!(n_features <= MAX_ORACLE_FEATURES, "too many features for brute force");
    let fact = factorials(n_features);
    let values: Vec<f64> = (0..1u32 << n_features)
        .map(|mask| ensemble_value(trees, row, mask))
        .collect();

    (0..n_features)
        .map(|i| {
            let bit = 1u32 << i;
            (0..1u32 << n_features)
                .filter(|mask| mask & bit == 0)
                .map(|mask| {
                    let size = mask.count_ones() as usize;
                    let weight = fact[size] * fact[n_features - size - 1] / fact[n_features];
                    weight * (values[(mask | bit) as usize] - values[mask as usize])
                })
                .sum()
        })
        .collect()
}

/// Shapley interaction values by enumerating all coalitions.
///
/// Returns an `n_features x n_features` matrix; the diagonal holds each
/// feature's attribution minus its interactions.
pub fn brute_force_interactions<R: FeatureRow + ?Sized>(
    trees: &[TreeRecord],
    row: &R,
    n_features: usize,
) -> Vec<Vec<f64>> {
    assert!(n_features <= MAX_ORACLE_FEATURES, "too many features for brute force");
    let phi = brute_force_shap(trees, row, n_features);
    let mut matrix = vec![vec![0.0; n_features]; n_features];
    if n_features == 0 {
        return matrix;
    }

    let fact = factorials(n_features);
    let values: Vec<f64> = (0..1u32 << n_features)
        .map(|mask| ensemble_value(trees, row, mask))
        .collect();

    for i in 0..n_features {
        for j in (i + 1)..n_features {
            let (bi, bj) = (1u32 << i, 1u32 << j);
            let total: f64 = (0..1u32 << n_features)
                .filter(|mask| mask & (bi | bj) == 0)
                .map(|mask| {
                    let size = mask.count_ones() as usize;
                    let weight =
                        fact[size] * fact[n_features - size - 2] / (2.0 * fact[n_features - 1]);
                    let m = mask as usize;
                    let delta = values[m | (bi | bj) as usize] - values[m | bi as usize]
                        - values[m | bj as usize]
                        + values[m];
                    weight * delta
                })
                .sum();
            matrix[i][j] = total;
            matrix[j][i] = total;
        }
    }

    for i in 0..n_features {
        let off_diagonal: f64 = (0..n_features).filter(|&j| j != i).map(|j| matrix[i][j]).sum();
        matrix[i][i] = phi[i] - off_diagonal;
    }
    matrix
}
