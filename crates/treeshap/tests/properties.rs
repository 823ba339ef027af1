//! Property tests for Tree SHAP attributions.
//!
//! Exact values are checked against the brute-force oracle in
//! [`treeshap::testing`], which enumerates every coalition of features.

use approx::assert_abs_diff_eq;
use ndarray::{Array2, array};
use proptest::collection::vec as prop_vec;
use proptest::prelude::*;
use rstest::rstest;

use treeshap::testing::{balanced_tree, brute_force_shap, stump};
use treeshap::{
    Ensemble, ExplainOptions, ExplainWarning, OutputTransform, SplitComparison, TreeArrays,
    TreeRecord, explain, tree_record,
};

// =============================================================================
// Helpers
// =============================================================================

fn ensemble(trees: Vec<TreeRecord>, n_features: usize, base_offset: f64) -> Ensemble {
    Ensemble::new(trees, n_features, base_offset, OutputTransform::Identity).unwrap()
}

fn sequential() -> ExplainOptions {
    ExplainOptions::builder().n_threads(1).build().unwrap()
}

/// Three features, one of them split twice along a path.
fn resplit_tree() -> TreeRecord {
    tree_record! {
        0 => split(0, 0.5) -> 1, 2 @ 10.0,
        1 => split(0, 0.2) -> 3, 4 @ 6.0,
        2 => split(1, 0.0) -> 5, 6 @ 4.0,
        3 => leaf(-2.0) @ 2.0,
        4 => leaf(1.0) @ 4.0,
        5 => leaf(3.0) @ 1.0,
        6 => leaf(0.5) @ 3.0,
    }
}

fn mixed_trees() -> Vec<TreeRecord> {
    vec![
        resplit_tree(),
        balanced_tree(
            3,
            &[2, 0, 1, 1, 2, 0, 3],
            &[0.1, -0.3, 0.4, 0.0, 0.7, 0.2, -0.5],
            &[1.0, -1.0, 2.5, 0.0, -0.5, 3.0, 1.5, -2.0],
            &[3.0, 1.0, 2.0, 2.0, 5.0, 1.0, 4.0, 2.0],
        )
        .unwrap(),
        stump(3, 0.25, -0.75, 0.25, 1.0, 3.0),
    ]
}

fn mixed_samples() -> Array2<f64> {
    Array2::from_shape_fn((32, 4), |(i, j)| {
        let x = ((i * 7 + j * 13) % 17) as f64 / 8.0 - 1.0;
        if (i + j) % 11 == 0 { f64::NAN } else { x }
    })
}

// =============================================================================
// Additivity
// =============================================================================

#[rstest]
#[case::all_left(vec![-1.0, -1.0, -1.0, -1.0])]
#[case::all_right(vec![1.0, 1.0, 1.0, 1.0])]
#[case::mixed(vec![0.3, -0.2, 0.9, 0.1])]
#[case::on_thresholds(vec![0.5, 0.0, 0.1, 0.25])]
#[case::missing(vec![f64::NAN, 0.4, f64::NAN, -0.3])]
fn attributions_sum_to_prediction(#[case] row: Vec<f64>) {
    let model = ensemble(mixed_trees(), 4, 0.3);
    let samples = Array2::from_shape_vec((1, 4), row.clone()).unwrap();
    let shap = explain(&model, samples.view(), &sequential()).unwrap();

    let total: f64 = shap.sample(0).sum();
    assert_abs_diff_eq!(total, model.predict_raw(&row), epsilon = 1e-10);
    assert_abs_diff_eq!(shap.base_value(0), model.expected_value(), epsilon = 1e-12);
    assert!(shap.verify(1e-9));
}

#[test]
fn zero_depth_tree_attributes_nothing() {
    let mut leaf = TreeArrays::new();
    leaf.push_leaf(2.5, 4.0);
    let model = ensemble(vec![TreeRecord::from_arrays(leaf).unwrap()], 3, 0.5);

    let shap = explain(&model, array![[1.0, 2.0, 3.0]].view(), &sequential()).unwrap();
    for feature in 0..3 {
        assert_eq!(shap.get(0, feature), 0.0);
    }
    assert_eq!(shap.base_value(0), 3.0);
    assert_eq!(shap.raw_prediction(0), 3.0);
}

#[test]
fn empty_ensemble_is_the_base_offset() {
    let model = ensemble(Vec::new(), 2, -1.25);
    let shap = explain(&model, array![[0.0, 0.0]].view(), &sequential()).unwrap();
    assert_eq!(shap.sample(0).to_vec(), vec![0.0, 0.0, -1.25]);
    assert_eq!(shap.raw_prediction(0), -1.25);
}

// =============================================================================
// Exactness
// =============================================================================

#[test]
fn single_feature_tree_credits_only_that_feature() {
    // expected = 0.75 * -1 + 0.25 * 1
    let model = ensemble(vec![stump(0, 0.5, -1.0, 1.0, 3.0, 1.0)], 3, 0.0);
    let shap = explain(&model, array![[0.9, 5.0, -5.0]].view(), &sequential()).unwrap();

    assert_abs_diff_eq!(shap.get(0, 0), 1.5, epsilon = 1e-12);
    assert_eq!(shap.get(0, 1), 0.0);
    assert_eq!(shap.get(0, 2), 0.0);
    assert_abs_diff_eq!(shap.base_value(0), -0.5, epsilon = 1e-12);
}

#[rstest]
#[case(vec![0.1, 5.0, 0.0])]
#[case(vec![0.3, -5.0, 0.0])]
#[case(vec![0.9, 0.0, 0.0])]
#[case(vec![0.9, 1.0, 0.0])]
fn resplit_feature_is_not_double_counted(#[case] row: Vec<f64>) {
    let tree = resplit_tree();
    let model = ensemble(vec![tree.clone()], 3, 0.0);
    let samples = Array2::from_shape_vec((1, 3), row.clone()).unwrap();
    let shap = explain(&model, samples.view(), &sequential()).unwrap();

    let oracle = brute_force_shap(std::slice::from_ref(&tree), &row, 3);
    for feature in 0..3 {
        assert_abs_diff_eq!(shap.get(0, feature), oracle[feature], epsilon = 1e-10);
    }
    assert_eq!(shap.get(0, 2), 0.0);
}

#[test]
fn matches_brute_force_on_mixed_ensemble() {
    let trees = mixed_trees();
    let model = ensemble(trees.clone(), 4, 0.0);
    let samples = mixed_samples();
    let shap = explain(&model, samples.view(), &sequential()).unwrap();

    for (i, row) in samples.outer_iter().enumerate() {
        let row = row.to_vec();
        let oracle = brute_force_shap(&trees, &row, 4);
        for (feature, &expected) in oracle.iter().enumerate() {
            assert_abs_diff_eq!(shap.get(i, feature), expected, epsilon = 1e-10);
        }
    }
}

#[test]
fn relabelling_features_permutes_attributions() {
    let perm = [2u32, 0, 1];
    let thresholds = [0.2, -0.4, 0.6];
    let values = [1.0, -2.0, 0.5, 3.0];
    let covers = [4.0, 1.0, 2.0, 3.0];

    let original = balanced_tree(2, &[0, 1, 2], &thresholds, &values, &covers).unwrap();
    let relabelled = balanced_tree(2, &perm, &thresholds, &values, &covers).unwrap();

    let row = [0.5, -0.1, 0.3];
    let mut permuted_row = [0.0; 3];
    for (feature, &target) in perm.iter().enumerate() {
        permuted_row[target as usize] = row[feature];
    }

    let samples = Array2::from_shape_vec((1, 3), row.to_vec()).unwrap();
    let permuted = Array2::from_shape_vec((1, 3), permuted_row.to_vec()).unwrap();
    let a = explain(&ensemble(vec![original], 3, 0.0), samples.view(), &sequential()).unwrap();
    let b = explain(&ensemble(vec![relabelled], 3, 0.0), permuted.view(), &sequential()).unwrap();

    for (feature, &target) in perm.iter().enumerate() {
        assert_abs_diff_eq!(a.get(0, feature), b.get(0, target as usize), epsilon = 1e-12);
    }
    assert_abs_diff_eq!(a.base_value(0), b.base_value(0), epsilon = 1e-12);
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(5)]
fn identical_trees_scale_linearly(#[case] copies: usize) {
    let tree = resplit_tree();
    let samples = array![[0.1, 5.0, 0.0], [0.9, -1.0, 0.0]];

    let one = explain(&ensemble(vec![tree.clone()], 3, 0.0), samples.view(), &sequential()).unwrap();
    let many = explain(&ensemble(vec![tree; copies], 3, 0.0), samples.view(), &sequential()).unwrap();

    for sample in 0..2 {
        for feature in 0..=3 {
            assert_abs_diff_eq!(
                many.get(sample, feature),
                copies as f64 * one.get(sample, feature),
                epsilon = 1e-10
            );
        }
    }
}

// =============================================================================
// Routing
// =============================================================================

#[rstest]
#[case::missing_goes_left(true, -1.5)]
#[case::missing_goes_right(false, 0.5)]
fn missing_values_follow_default_direction(#[case] default_left: bool, #[case] expected: f64) {
    let mut arrays = TreeArrays::new();
    arrays.push_split(0, 0.5, 1, 2, 4.0);
    arrays.push_leaf(-1.0, 1.0);
    arrays.push_leaf(1.0, 3.0);
    arrays.set_default_left(0, default_left);
    let model = ensemble(vec![TreeRecord::from_arrays(arrays).unwrap()], 1, 0.0);

    let shap = explain(&model, array![[f64::NAN]].view(), &sequential()).unwrap();
    assert_abs_diff_eq!(shap.get(0, 0), expected, epsilon = 1e-12);
}

#[rstest]
#[case::less_or_equal(SplitComparison::LessOrEqual, -1.0)]
#[case::strictly_less(SplitComparison::Less, 1.0)]
fn value_on_threshold_honours_comparison(
    #[case] comparison: SplitComparison,
    #[case] expected: f64,
) {
    let mut arrays = TreeArrays::new().with_comparison(comparison);
    arrays.push_split(0, 0.5, 1, 2, 2.0);
    arrays.push_leaf(-1.0, 1.0);
    arrays.push_leaf(1.0, 1.0);
    let model = ensemble(vec![TreeRecord::from_arrays(arrays).unwrap()], 1, 0.0);

    let shap = explain(&model, array![[0.5]].view(), &sequential()).unwrap();
    assert_abs_diff_eq!(shap.get(0, 0), expected, epsilon = 1e-12);
}

// =============================================================================
// Degenerate Cover
// =============================================================================

#[test]
fn zero_cover_split_warns_without_failing() {
    let tree = tree_record! {
        0 => split(0, 0.5) -> 1, 2 @ 2.0,
        1 => leaf(1.0) @ 2.0,
        2 => split(1, 0.5) -> 3, 4 @ 0.0,
        3 => leaf(5.0) @ 0.0,
        4 => leaf(7.0) @ 0.0,
    };
    let model = ensemble(vec![tree], 2, 0.0);
    let samples = array![[1.0, 1.0], [0.0, 1.0], [1.0, 0.0]];

    let shap = explain(&model, samples.view(), &sequential()).unwrap();
    assert!(shap.values().iter().all(|v| v.is_finite()));
    assert!(shap.verify(1e-9));
    assert_eq!(
        shap.warnings(),
        &[
            ExplainWarning::DegenerateCover { sample: 0, tree: 0, node: 2 },
            ExplainWarning::DegenerateCover { sample: 0, tree: 0, node: 4 },
            ExplainWarning::DegenerateCover { sample: 2, tree: 0, node: 2 },
            ExplainWarning::DegenerateCover { sample: 2, tree: 0, node: 3 },
        ]
    );
}

#[test]
fn empty_leaf_on_route_warns() {
    let mut arrays = TreeArrays::new();
    arrays.push_split(0, 0.5, 1, 2, 2.0);
    arrays.push_leaf(1.0, 2.0);
    arrays.push_leaf(9.0, 0.0);
    let model = ensemble(vec![TreeRecord::from_arrays(arrays).unwrap()], 1, 0.0);

    let shap = explain(&model, array![[1.0]].view(), &sequential()).unwrap();
    assert_abs_diff_eq!(shap.base_value(0), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(shap.get(0, 0), 8.0, epsilon = 1e-12);
    assert!(shap.verify(1e-9));
    assert_eq!(
        shap.warnings(),
        &[ExplainWarning::DegenerateCover { sample: 0, tree: 0, node: 2 }]
    );

    // The covered side never reaches the empty leaf
    let shap = explain(&model, array![[0.0]].view(), &sequential()).unwrap();
    assert!(shap.warnings().is_empty());
}

// =============================================================================
// Options
// =============================================================================

#[test]
fn tree_limit_matches_truncated_ensemble() {
    let trees = mixed_trees();
    let full = ensemble(trees.clone(), 4, 0.1);
    let truncated = ensemble(trees[..2].to_vec(), 4, 0.1);
    let samples = mixed_samples();

    let options = ExplainOptions::builder().tree_limit(2).n_threads(1).build().unwrap();
    let limited = explain(&full, samples.view(), &options).unwrap();
    let expected = explain(&truncated, samples.view(), &sequential()).unwrap();

    assert_eq!(limited.values(), expected.values());
    assert_eq!(limited.raw_predictions(), expected.raw_predictions());
}

#[test]
fn parallel_matches_sequential() {
    let model = ensemble(mixed_trees(), 4, 0.0);
    let samples = mixed_samples();

    let seq = explain(&model, samples.view(), &sequential()).unwrap();
    let options = ExplainOptions::builder().n_threads(4).interactions(true).build().unwrap();
    let par = explain(&model, samples.view(), &options).unwrap();

    assert_eq!(seq.values(), par.values());
    assert_eq!(seq.raw_predictions(), par.raw_predictions());
}

#[test]
fn logistic_transform_only_touches_predictions() {
    let trees = vec![stump(0, 0.5, -1.0, 1.0, 3.0, 1.0)];
    let margin = Ensemble::new(trees.clone(), 1, 0.2, OutputTransform::Identity).unwrap();
    let logistic = Ensemble::new(trees, 1, 0.2, OutputTransform::Logistic).unwrap();
    let samples = array![[0.0], [1.0]];

    let a = explain(&margin, samples.view(), &sequential()).unwrap();
    let b = explain(&logistic, samples.view(), &sequential()).unwrap();

    assert_eq!(a.values(), b.values());
    for sample in 0..2 {
        let raw = b.raw_prediction(sample);
        assert_abs_diff_eq!(b.prediction(sample), 1.0 / (1.0 + (-raw).exp()), epsilon = 1e-12);
    }
    assert_abs_diff_eq!(
        b.expected_output(),
        OutputTransform::Logistic.apply(b.expected_value()),
        epsilon = 1e-12
    );
}

#[test]
fn extra_columns_are_ignored() {
    let model = ensemble(vec![stump(0, 0.5, -1.0, 1.0, 1.0, 1.0)], 1, 0.0);
    let shap = explain(&model, array![[1.0, 99.0, -99.0]].view(), &sequential()).unwrap();
    assert_eq!(shap.n_features(), 1);
    assert_abs_diff_eq!(shap.get(0, 0), 1.0, epsilon = 1e-12);
}

// =============================================================================
// Random Trees
// =============================================================================

fn arb_tree(n_features: usize) -> impl Strategy<Value = TreeRecord> {
    (0usize..=4)
        .prop_flat_map(move |depth| {
            let n_internal = ((1usize << depth) - 1).max(1);
            let n_leaves = 1usize << depth;
            (
                Just(depth),
                prop_vec(0..n_features as u32, n_internal),
                prop_vec(-1.0..1.0f64, n_internal),
                prop_vec(-5.0..5.0f64, n_leaves),
                prop_vec(0.5..10.0f64, n_leaves),
            )
        })
        .prop_map(|(depth, features, thresholds, values, covers)| {
            balanced_tree(depth, &features, &thresholds, &values, &covers).unwrap()
        })
}

fn arb_value() -> impl Strategy<Value = f64> {
    prop_oneof![
        9 => -1.5..1.5f64,
        1 => Just(f64::NAN),
    ]
}

fn arb_case() -> impl Strategy<Value = (Vec<TreeRecord>, Vec<f64>, usize)> {
    (1usize..=5, 1usize..=3).prop_flat_map(|(n_features, n_trees)| {
        (
            prop_vec(arb_tree(n_features), n_trees),
            prop_vec(arb_value(), n_features),
            Just(n_features),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_trees_are_additive((trees, row, n_features) in arb_case(), base in -2.0..2.0f64) {
        let model = ensemble(trees, n_features, base);
        let samples = Array2::from_shape_vec((1, n_features), row.clone()).unwrap();
        let shap = explain(&model, samples.view(), &sequential()).unwrap();

        let total: f64 = shap.sample(0).sum();
        prop_assert!((total - model.predict_raw(&row)).abs() < 1e-9);
    }

    #[test]
    fn random_trees_match_brute_force((trees, row, n_features) in arb_case()) {
        let model = ensemble(trees.clone(), n_features, 0.0);
        let samples = Array2::from_shape_vec((1, n_features), row.clone()).unwrap();
        let shap = explain(&model, samples.view(), &sequential()).unwrap();

        let oracle = brute_force_shap(&trees, &row, n_features);
        for (feature, &expected) in oracle.iter().enumerate() {
            prop_assert!(
                (shap.get(0, feature) - expected).abs() < 1e-9,
                "feature {}: {} vs {}", feature, shap.get(0, feature), expected
            );
        }
    }
}
