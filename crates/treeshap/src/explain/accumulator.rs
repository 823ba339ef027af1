//! Per-tree Tree SHAP recursion.
//!
//! Walks every root-to-leaf path a sample can reach under some coalition of
//! known features and distributes each leaf's value over the features on the
//! path. Computing one tree costs `O(L * D^2)` for `L` leaves and depth `D`.
//!
//! Conditioning on a feature fixes it as known (`Present`) or unknown
//! (`Absent`) in every coalition. The feature is then never placed on the path,
//! which is what the interaction values are built from.

use std::ops::Range;

use crate::repr::{FeatureRow, NodeId, TreeRecord};

use super::path::{unwound_sum, PathStack};

/// Whether one feature is fixed inside or outside every coalition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Condition {
    None,
    Present(u32),
    Absent(u32),
}

impl Condition {
    #[inline]
    fn feature(self) -> Option<u32> {
        match self {
            Condition::None => None,
            Condition::Present(f) | Condition::Absent(f) => Some(f),
        }
    }
}

/// Adds one tree's attributions for one sample into `phi`.
pub(crate) struct PathAccumulator<'a, R: FeatureRow + ?Sized> {
    tree: &'a TreeRecord,
    row: &'a R,
    condition: Condition,
    phi: &'a mut [f64],
    path: &'a mut PathStack,
}

impl<'a, R: FeatureRow + ?Sized> PathAccumulator<'a, R> {
    pub(crate) fn new(
        tree: &'a TreeRecord,
        row: &'a R,
        condition: Condition,
        phi: &'a mut [f64],
        path: &'a mut PathStack,
    ) -> Self {
        Self {
            tree,
            row,
            condition,
            phi,
            path,
        }
    }

    /// Run the recursion from the root.
    pub(crate) fn run(mut self) {
        self.path.clear();
        self.recurse(0, 0..0, 1.0, 1.0, None, 1.0);
    }

    fn recurse(
        &mut self,
        node: NodeId,
        parent: Range<usize>,
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<u32>,
        condition_fraction: f64,
    ) {
        if condition_fraction == 0.0 {
            return;
        }
        let conditioned = feature.is_some() && feature == self.condition.feature();
        if !conditioned && zero_fraction == 0.0 && one_fraction == 0.0 {
            // No coalition reaches this node
            return;
        }

        let start = self.path.open(parent);
        if !conditioned {
            self.path.extend(start, zero_fraction, one_fraction, feature);
        }

        let tree = self.tree;
        if tree.is_leaf(node) {
            let scale = tree.leaf_value(node) * condition_fraction;
            let path = self.path.segment(start);
            for (i, entry) in path.iter().enumerate().skip(1) {
                if let Some(f) = entry.feature {
                    let weight = unwound_sum(path, i);
                    self.phi[f as usize] +=
                        weight * (entry.one_fraction - entry.zero_fraction) * scale;
                }
            }
            self.path.close(start);
            return;
        }

        let split = tree.split_feature(node);
        let (hot, cold) = if tree.goes_left(node, self.row) {
            (tree.left_child(node), tree.right_child(node))
        } else {
            (tree.right_child(node), tree.left_child(node))
        };
        let hot_zero = tree.node_fraction(hot);
        let cold_zero = tree.node_fraction(cold);

        // A feature split on again is merged into its existing entry
        let mut incoming_zero = 1.0;
        let mut incoming_one = 1.0;
        if let Some(index) = self
            .path
            .segment(start)
            .iter()
            .position(|e| e.feature == Some(split))
        {
            let entry = self.path.segment(start)[index];
            incoming_zero = entry.zero_fraction;
            incoming_one = entry.one_fraction;
            self.path.unwind(start, index);
        }

        let mut hot_condition = condition_fraction;
        let mut cold_condition = condition_fraction;
        match self.condition {
            Condition::Present(f) if f == split => cold_condition = 0.0,
            Condition::Absent(f) if f == split => {
                hot_condition *= hot_zero;
                cold_condition *= cold_zero;
            }
            _ => {}
        }

        let current = start..self.path.len();
        self.recurse(
            hot,
            current.clone(),
            hot_zero * incoming_zero,
            incoming_one,
            Some(split),
            hot_condition,
        );
        self.recurse(
            cold,
            current,
            cold_zero * incoming_zero,
            0.0,
            Some(split),
            cold_condition,
        );

        self.path.close(start);
    }
}

/// Add one tree's Shapley attributions for `row` into `phi`.
///
/// `phi` must have at least as many entries as the highest split feature + 1.
/// The base value is not touched; a tree's attributions sum to
/// `tree.predict(row) - tree.expected_value()`.
///
/// # Example
///
/// ```
/// use treeshap::{tree_contributions, TreeArrays, TreeRecord};
///
/// let mut arrays = TreeArrays::new();
/// arrays.push_split(1, 0.0, 1, 2, 4.0);
/// arrays.push_leaf(-2.0, 1.0);
/// arrays.push_leaf(2.0, 3.0);
/// let tree = TreeRecord::from_arrays(arrays).unwrap();
///
/// let mut phi = vec![0.0; 2];
/// tree_contributions(&tree, &[5.0, -1.0], &mut phi);
/// assert_eq!(phi[0], 0.0);
/// assert!((phi[1] - (-2.0 - tree.expected_value())).abs() < 1e-12);
/// ```
pub fn tree_contributions<R: FeatureRow + ?Sized>(tree: &TreeRecord, row: &R, phi: &mut [f64]) {
    let mut path = PathStack::with_max_depth(tree.max_depth());
    PathAccumulator::new(tree, row, Condition::None, phi, &mut path).run();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::TreeArrays;
    use approx::assert_abs_diff_eq;

    /// x0 <= 0.5 ? (x1 <= 0.5 ? 1 : 2) : (x1 <= 0.5 ? 3 : 4), uniform covers.
    fn two_feature_tree() -> TreeRecord {
        let mut arrays = TreeArrays::new();
        arrays.push_split(0, 0.5, 1, 2, 4.0);
        arrays.push_split(1, 0.5, 3, 4, 2.0);
        arrays.push_split(1, 0.5, 5, 6, 2.0);
        arrays.push_leaf(1.0, 1.0);
        arrays.push_leaf(2.0, 1.0);
        arrays.push_leaf(3.0, 1.0);
        arrays.push_leaf(4.0, 1.0);
        TreeRecord::from_arrays(arrays).unwrap()
    }

    fn contributions(tree: &TreeRecord, row: &[f64], condition: Condition) -> Vec<f64> {
        let mut phi = vec![0.0; row.len()];
        let mut path = PathStack::default();
        PathAccumulator::new(tree, row, condition, &mut phi, &mut path).run();
        phi
    }

    #[test]
    fn additive_tree_splits_evenly() {
        // f(x) = 1 + 2*[x0 > 0.5] + [x1 > 0.5]: no interaction
        let tree = two_feature_tree();
        let phi = contributions(&tree, &[1.0, 1.0], Condition::None);
        assert_abs_diff_eq!(phi[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(phi[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(phi.iter().sum::<f64>(), 4.0 - 2.5, epsilon = 1e-12);
    }

    #[test]
    fn present_condition_removes_feature() {
        let tree = two_feature_tree();
        let phi = contributions(&tree, &[1.0, 1.0], Condition::Present(0));
        assert_eq!(phi[0], 0.0);
        assert_abs_diff_eq!(phi[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn absent_condition_removes_feature() {
        let tree = two_feature_tree();
        let phi = contributions(&tree, &[1.0, 1.0], Condition::Absent(0));
        assert_eq!(phi[0], 0.0);
        assert_abs_diff_eq!(phi[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn repeated_split_merges_path_entry() {
        // x0 <= 0.5 ? (x0 <= 0.2 ? 1 : 2) : 3
        let mut arrays = TreeArrays::new();
        arrays.push_split(0, 0.5, 1, 2, 4.0);
        arrays.push_split(0, 0.2, 3, 4, 2.0);
        arrays.push_leaf(3.0, 2.0);
        arrays.push_leaf(1.0, 1.0);
        arrays.push_leaf(2.0, 1.0);
        let tree = TreeRecord::from_arrays(arrays).unwrap();

        let phi = contributions(&tree, &[0.1, 0.0], Condition::None);
        assert_abs_diff_eq!(phi[0], 1.0 - tree.expected_value(), epsilon = 1e-12);
        assert_eq!(phi[1], 0.0);
    }

    #[test]
    fn zero_cover_split_gives_finite_contributions() {
        let mut arrays = TreeArrays::new();
        arrays.push_split(0, 0.5, 1, 2, 2.0);
        arrays.push_leaf(1.0, 2.0);
        arrays.push_split(1, 0.5, 3, 4, 0.0);
        arrays.push_leaf(5.0, 0.0);
        arrays.push_leaf(7.0, 0.0);
        let tree = TreeRecord::from_arrays(arrays).unwrap();

        let phi = contributions(&tree, &[1.0, 1.0], Condition::None);
        assert!(phi.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(phi.iter().sum::<f64>(), 7.0 - tree.expected_value(), epsilon = 1e-12);
    }
}
