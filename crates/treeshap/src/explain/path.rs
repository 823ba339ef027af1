//! Feature path bookkeeping for the Tree SHAP recursion.
//!
//! A path holds one entry per distinct feature split on between the root and
//! the current node, plus a sentinel root entry. Each entry carries the
//! fraction of paths that flow through when the feature is absent from a
//! coalition (`zero_fraction`) or present (`one_fraction`), and a permutation
//! weight. The weights encode, for every coalition size, the proportion of
//! feature orderings that reach the current node.
//!
//! All recursion levels share one [`PathStack`]. A level copies its parent's
//! segment to the top of the stack, mutates the copy and truncates on return,
//! so the stack never holds more than `(d + 1)(d + 2) / 2` entries for depth `d`.

use std::ops::Range;

/// One feature on the current root-to-node path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PathEntry {
    /// `None` for the root sentinel.
    pub feature: Option<u32>,
    pub zero_fraction: f64,
    pub one_fraction: f64,
    pub pweight: f64,
}

/// Reusable scratch storage for path segments.
#[derive(Debug, Clone, Default)]
pub(crate) struct PathStack {
    entries: Vec<PathEntry>,
}

impl PathStack {
    /// Stack sized for trees up to `max_depth` deep.
    pub(crate) fn with_max_depth(max_depth: usize) -> Self {
        Self {
            entries: Vec::with_capacity((max_depth + 1) * (max_depth + 2) / 2),
        }
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Copy the `parent` segment to the top and return where the copy starts.
    #[inline]
    pub(crate) fn open(&mut self, parent: Range<usize>) -> usize {
        let start = self.entries.len();
        self.entries.extend_from_within(parent);
        start
    }

    /// Drop the segment starting at `start`.
    #[inline]
    pub(crate) fn close(&mut self, start: usize) {
        self.entries.truncate(start);
    }

    #[inline]
    pub(crate) fn segment(&self, start: usize) -> &[PathEntry] {
        &self.entries[start..]
    }

    /// Append a feature to the top segment and update the permutation weights.
    pub(crate) fn extend(
        &mut self,
        start: usize,
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<u32>,
    ) {
        let depth = self.entries.len() - start;
        self.entries.push(PathEntry {
            feature,
            zero_fraction,
            one_fraction,
            pweight: if depth == 0 { 1.0 } else { 0.0 },
        });

        let path = &mut self.entries[start..];
        let scale = (depth + 1) as f64;
        for i in (0..depth).rev() {
            path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / scale;
            path[i].pweight = zero_fraction * path[i].pweight * (depth - i) as f64 / scale;
        }
    }

    /// Remove the entry at `index` from the top segment, undoing its `extend`.
    pub(crate) fn unwind(&mut self, start: usize, index: usize) {
        let path = &mut self.entries[start..];
        let depth = path.len() - 1;
        let PathEntry {
            zero_fraction,
            one_fraction,
            ..
        } = path[index];
        let scale = (depth + 1) as f64;

        let mut next_one_portion = path[depth].pweight;
        for i in (0..depth).rev() {
            if one_fraction != 0.0 {
                let previous = path[i].pweight;
                path[i].pweight = next_one_portion * scale / ((i + 1) as f64 * one_fraction);
                next_one_portion =
                    previous - path[i].pweight * zero_fraction * (depth - i) as f64 / scale;
            } else {
                path[i].pweight = path[i].pweight * scale / (zero_fraction * (depth - i) as f64);
            }
        }

        for i in index..depth {
            path[i].feature = path[i + 1].feature;
            path[i].zero_fraction = path[i + 1].zero_fraction;
            path[i].one_fraction = path[i + 1].one_fraction;
        }
        self.entries.pop();
    }
}

/// Total permutation weight of `path` with the entry at `index` removed.
///
/// Equivalent to unwinding a copy and summing its weights, without mutating.
pub(crate) fn unwound_sum(path: &[PathEntry], index: usize) -> f64 {
    let depth = path.len() - 1;
    let PathEntry {
        zero_fraction,
        one_fraction,
        ..
    } = path[index];
    let mut total = 0.0;

    if one_fraction != 0.0 {
        let mut next_one_portion = path[depth].pweight;
        for i in (0..depth).rev() {
            let tmp = next_one_portion / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero_fraction * (depth - i) as f64;
        }
    } else if zero_fraction != 0.0 {
        for i in (0..depth).rev() {
            total += path[i].pweight / (zero_fraction * (depth - i) as f64);
        }
    }

    total * (depth + 1) as f64
}
