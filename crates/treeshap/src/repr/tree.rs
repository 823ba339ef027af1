//! Tree storage (SoA) and structural validation.
//!
//! This module provides:
//! - [`TreeArrays`]: Flat per-node arrays, the format model adapters produce
//! - [`TreeRecord`]: Immutable, validated SoA tree used for traversal
//! - [`TreeValidationError`]: Structural validation errors
//!
//! A [`TreeRecord`] precomputes everything traversal needs from the covers:
//! the fraction of its parent's cover that reaches each node, the set of
//! features the tree splits on, its depth and its expected value.

use thiserror::Error;
use tracing::warn;

use crate::config::BuildConfig;

use super::{FeatureRow, NodeId, NO_CHILD};

// ============================================================================
// SplitComparison
// ============================================================================

/// How a feature value is compared against a split threshold.
///
/// The comparison is a property of the whole tree since it follows from the
/// library the model was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SplitComparison {
    /// `value <= threshold` goes left.
    #[default]
    LessOrEqual,
    /// `value < threshold` goes left.
    Less,
}

impl SplitComparison {
    /// Whether a non-missing `value` goes to the left child.
    #[inline]
    pub fn goes_left(self, value: f64, threshold: f64) -> bool {
        match self {
            SplitComparison::LessOrEqual => value <= threshold,
            SplitComparison::Less => value < threshold,
        }
    }
}

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural validation errors for [`TreeRecord`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeValidationError {
    /// Tree has no nodes.
    #[error("tree has no nodes")]
    EmptyTree,
    /// A per-node array does not have one entry per node.
    #[error("array `{field}` has {len} entries, expected {n_nodes}")]
    LengthMismatch {
        field: &'static str,
        len: usize,
        n_nodes: usize,
    },
    /// A child pointer references an out-of-bounds node.
    #[error("node {node} has {side} child {child} out of bounds ({n_nodes} nodes)")]
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: NodeId,
        n_nodes: usize,
    },
    /// A node references itself as a child.
    #[error("node {node} references itself as a child")]
    SelfLoop { node: NodeId },
    /// Exactly one of the two children is absent.
    #[error("node {node} has exactly one child")]
    HalfLeaf { node: NodeId },
    /// A node was reached by more than one path.
    #[error("node {node} is reachable through more than one parent")]
    DuplicateVisit { node: NodeId },
    /// A cycle was detected during traversal.
    #[error("cycle detected at node {node}")]
    CycleDetected { node: NodeId },
    /// A node exists in storage but is unreachable from the root.
    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: NodeId },
    /// A leaf value is NaN or infinite.
    #[error("leaf {node} has non-finite value {value}")]
    NonFiniteLeafValue { node: NodeId, value: f64 },
    /// A split threshold is NaN or infinite.
    #[error("split node {node} has non-finite threshold {threshold}")]
    NonFiniteThreshold { node: NodeId, threshold: f64 },
    /// A cover is negative, NaN or infinite.
    #[error("node {node} has invalid cover {cover}")]
    InvalidCover { node: NodeId, cover: f64 },
    /// An internal node's cover disagrees with the sum of its children's.
    #[error("node {node} has cover {cover} but its children sum to {children}")]
    CoverMismatch {
        node: NodeId,
        cover: f64,
        children: f64,
    },
    /// The tree is deeper than the configured limit.
    #[error("tree depth {depth} exceeds the maximum of {max_depth}")]
    DepthExceeded { depth: usize, max_depth: usize },
}

// ============================================================================
// TreeArrays
// ============================================================================

/// Flat per-node arrays describing one tree.
///
/// Node 0 is the root. A node is a leaf when both children are [`NO_CHILD`].
/// `split_features` and `thresholds` are ignored on leaves and `leaf_values`
/// is ignored on internal nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeArrays {
    pub split_features: Vec<u32>,
    pub thresholds: Vec<f64>,
    pub children_left: Vec<NodeId>,
    pub children_right: Vec<NodeId>,
    pub default_left: Vec<bool>,
    pub leaf_values: Vec<f64>,
    pub covers: Vec<f64>,
    pub comparison: SplitComparison,
}

impl TreeArrays {
    /// Empty arrays with the default comparison.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the split comparison (builder pattern).
    pub fn with_comparison(mut self, comparison: SplitComparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// Number of nodes, taken from `children_left`.
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.children_left.len()
    }

    /// Append a split node. Missing values go left by default.
    pub fn push_split(
        &mut self,
        feature: u32,
        threshold: f64,
        left: NodeId,
        right: NodeId,
        cover: f64,
    ) -> NodeId {
        self.push(feature, threshold, left, right, 0.0, cover)
    }

    /// Append a leaf node.
    pub fn push_leaf(&mut self, value: f64, cover: f64) -> NodeId {
        self.push(0, 0.0, NO_CHILD, NO_CHILD, value, cover)
    }

    /// Set the missing-value direction of an existing node.
    ///
    /// # Panics
    ///
    /// Panics if `node` has not been pushed yet.
    pub fn set_default_left(&mut self, node: NodeId, default_left: bool) {
        self.default_left[node as usize] = default_left;
    }

    fn push(
        &mut self,
        feature: u32,
        threshold: f64,
        left: NodeId,
        right: NodeId,
        value: f64,
        cover: f64,
    ) -> NodeId {
        let id = self.n_nodes() as NodeId;
        self.split_features.push(feature);
        self.thresholds.push(threshold);
        self.children_left.push(left);
        self.children_right.push(right);
        self.default_left.push(true);
        self.leaf_values.push(value);
        self.covers.push(cover);
        id
    }
}

// ============================================================================
// TreeRecord
// ============================================================================

/// Structure-of-Arrays tree storage for traversal.
///
/// Built only through validation, so every node is reachable from the root
/// exactly once, children are in bounds and covers are consistent.
#[derive(Debug, Clone)]
pub struct TreeRecord {
    split_features: Box<[u32]>,
    thresholds: Box<[f64]>,
    children_left: Box<[NodeId]>,
    children_right: Box<[NodeId]>,
    default_left: Box<[bool]>,
    leaf_values: Box<[f64]>,
    covers: Box<[f64]>,
    comparison: SplitComparison,
    /// Share of the parent's cover reaching each node (1.0 at the root).
    fractions: Box<[f64]>,
    /// Internal nodes whose children carry no cover.
    degenerate: Box<[bool]>,
    /// Sorted, deduplicated split features.
    used_features: Box<[u32]>,
    max_depth: usize,
    expected_value: f64,
}

impl TreeRecord {
    /// Validate arrays with the default [`BuildConfig`].
    pub fn from_arrays(arrays: TreeArrays) -> Result<Self, TreeValidationError> {
        Self::from_arrays_with(arrays, &BuildConfig::default())
    }

    /// Validate arrays and precompute traversal data.
    pub fn from_arrays_with(
        arrays: TreeArrays,
        config: &BuildConfig,
    ) -> Result<Self, TreeValidationError> {
        let (preorder, max_depth) = validate_structure(&arrays, config.max_depth)?;
        validate_values(&arrays, config.cover_tolerance)?;

        let n_nodes = arrays.n_nodes();
        let mut fractions = vec![1.0; n_nodes];
        let mut degenerate = vec![false; n_nodes];
        let mut used_features = Vec::new();

        for node in 0..n_nodes {
            let left = arrays.children_left[node];
            if left == NO_CHILD {
                continue;
            }
            let right = arrays.children_right[node];
            used_features.push(arrays.split_features[node]);

            let (left_cover, right_cover) =
                (arrays.covers[left as usize], arrays.covers[right as usize]);
            let total = left_cover + right_cover;
            if total > 0.0 {
                fractions[left as usize] = left_cover / total;
                fractions[right as usize] = right_cover / total;
            } else {
                // Both children unweighted: each keeps the full path weight
                degenerate[node] = true;
            }
        }
        used_features.sort_unstable();
        used_features.dedup();

        // Reverse preorder visits children before their parent
        let mut subtree_expectation = vec![0.0; n_nodes];
        for &node in preorder.iter().rev() {
            let node = node as usize;
            let left = arrays.children_left[node];
            subtree_expectation[node] = if left == NO_CHILD {
                arrays.leaf_values[node]
            } else {
                let (left, right) = (left as usize, arrays.children_right[node] as usize);
                fractions[left] * subtree_expectation[left]
                    + fractions[right] * subtree_expectation[right]
            };
        }

        let n_uncovered = arrays.covers.iter().filter(|&&c| c == 0.0).count();
        if n_uncovered > 0 {
            warn!(
                n_uncovered,
                n_degenerate = degenerate.iter().filter(|&&d| d).count(),
                n_nodes,
                "tree has nodes without cover"
            );
        }

        Ok(Self {
            split_features: arrays.split_features.into_boxed_slice(),
            thresholds: arrays.thresholds.into_boxed_slice(),
            children_left: arrays.children_left.into_boxed_slice(),
            children_right: arrays.children_right.into_boxed_slice(),
            default_left: arrays.default_left.into_boxed_slice(),
            leaf_values: arrays.leaf_values.into_boxed_slice(),
            covers: arrays.covers.into_boxed_slice(),
            comparison: arrays.comparison,
            fractions: fractions.into_boxed_slice(),
            degenerate: degenerate.into_boxed_slice(),
            used_features: used_features.into_boxed_slice(),
            max_depth,
            expected_value: subtree_expectation[0],
        })
    }

    /// Copy the tree back into flat arrays.
    pub fn to_arrays(&self) -> TreeArrays {
        TreeArrays {
            split_features: self.split_features.to_vec(),
            thresholds: self.thresholds.to_vec(),
            children_left: self.children_left.to_vec(),
            children_right: self.children_right.to_vec(),
            default_left: self.default_left.to_vec(),
            leaf_values: self.leaf_values.to_vec(),
            covers: self.covers.to_vec(),
            comparison: self.comparison,
        }
    }

    // =========================================================================
    // Node Accessors
    // =========================================================================

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.children_left.len()
    }

    #[inline]
    pub fn n_leaves(&self) -> usize {
        self.children_left.iter().filter(|&&c| c == NO_CHILD).count()
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.children_left[node as usize] == NO_CHILD
    }

    #[inline]
    pub fn split_feature(&self, node: NodeId) -> u32 {
        self.split_features[node as usize]
    }

    #[inline]
    pub fn threshold(&self, node: NodeId) -> f64 {
        self.thresholds[node as usize]
    }

    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.children_left[node as usize]
    }

    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.children_right[node as usize]
    }

    #[inline]
    pub fn default_left(&self, node: NodeId) -> bool {
        self.default_left[node as usize]
    }

    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> f64 {
        self.leaf_values[node as usize]
    }

    #[inline]
    pub fn cover(&self, node: NodeId) -> f64 {
        self.covers[node as usize]
    }

    #[inline]
    pub fn comparison(&self) -> SplitComparison {
        self.comparison
    }

    /// Fraction of the parent's cover that reaches `node`.
    ///
    /// Children of a node without cover both get 1.0.
    #[inline]
    pub fn node_fraction(&self, node: NodeId) -> f64 {
        self.fractions[node as usize]
    }

    /// Whether `node` is a split whose children carry no cover.
    #[inline]
    pub fn is_degenerate(&self, node: NodeId) -> bool {
        self.degenerate[node as usize]
    }

    /// Whether any split node lacks cover.
    pub fn has_degenerate_nodes(&self) -> bool {
        self.degenerate.iter().any(|&d| d)
    }

    // =========================================================================
    // Tree Queries
    // =========================================================================

    /// Sorted features this tree splits on.
    #[inline]
    pub fn used_features(&self) -> &[u32] {
        &self.used_features
    }

    #[inline]
    pub fn uses_feature(&self, feature: u32) -> bool {
        self.used_features.binary_search(&feature).is_ok()
    }

    /// Length of the longest root-to-leaf path in edges.
    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Cover-weighted mean of the leaf values.
    #[inline]
    pub fn expected_value(&self) -> f64 {
        self.expected_value
    }

    /// Whether `row` goes to the left child at split `node`.
    #[inline]
    pub fn goes_left<R: FeatureRow + ?Sized>(&self, node: NodeId, row: &R) -> bool {
        let value = row.feature(self.split_feature(node) as usize);
        if value.is_nan() {
            self.default_left(node)
        } else {
            self.comparison.goes_left(value, self.threshold(node))
        }
    }

    /// Follow the sample's path from the root to a leaf.
    #[inline]
    pub fn traverse_to_leaf<R: FeatureRow + ?Sized>(&self, row: &R) -> NodeId {
        let mut node = 0;
        while !self.is_leaf(node) {
            node = if self.goes_left(node, row) {
                self.left_child(node)
            } else {
                self.right_child(node)
            };
        }
        node
    }

    /// Append every node without cover on the route `row` takes to its leaf.
    ///
    /// Covers both empty leaves and splits whose children carry no cover.
    pub fn uncovered_route<R: FeatureRow + ?Sized>(&self, row: &R, out: &mut Vec<NodeId>) {
        let mut node = 0;
        loop {
            if self.cover(node) == 0.0 {
                out.push(node);
            }
            if self.is_leaf(node) {
                return;
            }
            node = if self.goes_left(node, row) {
                self.left_child(node)
            } else {
                self.right_child(node)
            };
        }
    }

    /// Leaf value reached by `row`.
    #[inline]
    pub fn predict<R: FeatureRow + ?Sized>(&self, row: &R) -> f64 {
        self.leaf_value(self.traverse_to_leaf(row))
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Check array lengths and tree shape, returning the preorder and depth.
fn validate_structure(
    arrays: &TreeArrays,
    max_depth_limit: usize,
) -> Result<(Vec<NodeId>, usize), TreeValidationError> {
    let n_nodes = arrays.n_nodes();
    if n_nodes == 0 {
        return Err(TreeValidationError::EmptyTree);
    }

    let lengths = [
        ("split_features", arrays.split_features.len()),
        ("thresholds", arrays.thresholds.len()),
        ("children_right", arrays.children_right.len()),
        ("default_left", arrays.default_left.len()),
        ("leaf_values", arrays.leaf_values.len()),
        ("covers", arrays.covers.len()),
    ];
    for (field, len) in lengths {
        if len != n_nodes {
            return Err(TreeValidationError::LengthMismatch { field, len, n_nodes });
        }
    }

    // Iterative DFS with color marking.
    // 0 = unvisited, 1 = visiting, 2 = done
    let mut color = vec![0u8; n_nodes];
    let mut preorder = Vec::with_capacity(n_nodes);
    let mut max_depth = 0;
    let mut stack: Vec<(NodeId, u8, usize)> = vec![(0, 0, 0)];

    while let Some((node, phase, depth)) = stack.pop() {
        let node_usize = node as usize;

        if phase == 1 {
            color[node_usize] = 2;
            continue;
        }

        match color[node_usize] {
            0 => {}
            1 => return Err(TreeValidationError::CycleDetected { node }),
            _ => return Err(TreeValidationError::DuplicateVisit { node }),
        }
        color[node_usize] = 1;
        preorder.push(node);
        stack.push((node, 1, depth));
        max_depth = max_depth.max(depth);

        let left = arrays.children_left[node_usize];
        let right = arrays.children_right[node_usize];
        match (left == NO_CHILD, right == NO_CHILD) {
            (true, true) => continue,
            (false, false) => {}
            _ => return Err(TreeValidationError::HalfLeaf { node }),
        }

        if left == node || right == node {
            return Err(TreeValidationError::SelfLoop { node });
        }
        for (side, child) in [("left", left), ("right", right)] {
            if child as usize >= n_nodes {
                return Err(TreeValidationError::ChildOutOfBounds {
                    node,
                    side,
                    child,
                    n_nodes,
                });
            }
        }
        if depth + 1 > max_depth_limit {
            return Err(TreeValidationError::DepthExceeded {
                depth: depth + 1,
                max_depth: max_depth_limit,
            });
        }

        stack.push((right, 0, depth + 1));
        stack.push((left, 0, depth + 1));
    }

    if let Some(node) = color.iter().position(|&c| c == 0) {
        return Err(TreeValidationError::UnreachableNode {
            node: node as NodeId,
        });
    }

    Ok((preorder, max_depth))
}

/// Check per-node numbers: leaf values, thresholds and covers.
fn validate_values(arrays: &TreeArrays, cover_tolerance: f64) -> Result<(), TreeValidationError> {
    for (node, &cover) in arrays.covers.iter().enumerate() {
        if !cover.is_finite() || cover < 0.0 {
            return Err(TreeValidationError::InvalidCover {
                node: node as NodeId,
                cover,
            });
        }
    }

    for node in 0..arrays.n_nodes() {
        let id = node as NodeId;
        let left = arrays.children_left[node];

        if left == NO_CHILD {
            let value = arrays.leaf_values[node];
            if !value.is_finite() {
                return Err(TreeValidationError::NonFiniteLeafValue { node: id, value });
            }
            continue;
        }

        let threshold = arrays.thresholds[node];
        if !threshold.is_finite() {
            return Err(TreeValidationError::NonFiniteThreshold {
                node: id,
                threshold,
            });
        }

        let cover = arrays.covers[node];
        let children = arrays.covers[left as usize] + arrays.covers[arrays.children_right[node] as usize];
        if (cover - children).abs() > cover_tolerance * cover.max(children) {
            return Err(TreeValidationError::CoverMismatch {
                node: id,
                cover,
                children,
            });
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
