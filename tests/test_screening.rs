//! Integration test: interaction screening end-to-end

use interaction_screening::prelude::*;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::path::Path;

/// Y = 3·A·SEP + B on uniform features
fn product_df(n_rows: usize) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let a: Vec<f64> = (0..n_rows).map(|_| rng.gen::<f64>()).collect();
    let b: Vec<f64> = (0..n_rows).map(|_| rng.gen::<f64>()).collect();
    let sep: Vec<f64> = (0..n_rows).map(|_| rng.gen::<f64>()).collect();
    let y: Vec<f64> = (0..n_rows).map(|i| 3.0 * a[i] * sep[i] + b[i]).collect();

    df!(
        "A" => a,
        "Y" => y,
        "B" => b,
        "SEP" => sep
    )
    .unwrap()
}

fn write_csv(df: &mut DataFrame, path: &Path) {
    let mut file = std::fs::File::create(path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();
}

fn quick_model() -> CatBoostConfig {
    CatBoostConfig {
        n_estimators: 150,
        learning_rate: 0.1,
        max_depth: 4,
        verbose: 0,
        ..Default::default()
    }
}

fn record<'a>(table: &'a RankedTable, feature: &str) -> &'a FeatureRecord {
    table.records().iter().find(|r| r.feature == feature).unwrap()
}

#[test]
fn test_full_run_ranks_product_partner_above_additive_feature() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(&mut product_df(400), &dir.path().join("data.csv"));

    let config = ScreeningConfig::default()
        .with_root_dir(dir.path())
        .with_data_file("data.csv")
        .with_n_folds(3)
        .with_grid_resolution(10)
        .with_model(quick_model());
    let config = ScreeningConfig { early_stopping_rounds: 20, ..config };

    let report = ScreeningPipeline::new(config).unwrap().run().unwrap();

    assert_eq!(report.n_samples, 400);
    assert_eq!(report.n_features, 3);
    assert_eq!(report.n_test, 80);
    assert_eq!(report.cv.n_folds, 3);
    assert!(report.test_metrics.r2 > 0.5, "r2 = {}", report.test_metrics.r2);
    assert!(report.output_path.exists());

    let table = &report.table;
    assert_eq!(table.len(), 3);
    let a = record(table, "A");
    let b = record(table, "B");
    assert!(a.pdp_cross_mixed_deriv > b.pdp_cross_mixed_deriv);
    assert!(a.shap_pair_interaction_mean_abs > b.shap_pair_interaction_mean_abs);
    assert!(a.interaction_score_combined > b.interaction_score_combined);

    // Screening a feature against itself: second grid write wins
    assert_eq!(record(table, "SEP").pdp_cross_mixed_deriv, 0.0);

    let saved = RankedTable::read_csv(&report.output_path).unwrap();
    let saved_order: Vec<&str> = saved.records().iter().map(|r| r.feature.as_str()).collect();
    let order: Vec<&str> = table.records().iter().map(|r| r.feature.as_str()).collect();
    assert_eq!(saved_order, order);
}

#[test]
fn test_missing_interaction_feature_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(&mut product_df(30), &dir.path().join("data.csv"));

    let config = ScreeningConfig::default()
        .with_root_dir(dir.path())
        .with_data_file("data.csv")
        .with_interaction_feature("AGE");
    let result = ScreeningPipeline::new(config).unwrap().load();
    assert!(matches!(result, Err(ScreeningError::FeatureNotFound(_))));
}

#[test]
fn test_unsupported_model_still_produces_table() {
    let x = Array2::from_shape_fn((50, 3), |(r, c)| ((r * (c + 2) + c) % 11) as f64);
    let model = FnRegressor::new(|x: &Array2<f64>| -> interaction_screening::Result<Array1<f64>> {
        Ok(x.rows().into_iter().map(|r| r[0] * r[2] + r[1]).collect())
    });
    let names = vec!["A".to_string(), "B".to_string(), "SEP".to_string()];

    let table = InteractionScreener::new(&model, names)
        .with_grid_resolution(20)
        .screen(&x, "SEP")
        .unwrap();

    assert_eq!(table.len(), 3);
    for r in table.records() {
        assert!(r.shap_pair_interaction_mean_abs.is_nan());
        assert!(r.shap_pair_interaction_mean_abs_norm01.is_nan());
        // Defined PDP score carries the combined score alone
        assert_eq!(r.interaction_score_combined, r.pdp_cross_mixed_deriv_norm01);
    }
    assert_eq!(table.records()[0].feature, "A");

    let propagated = InteractionScreener::new(&model, vec!["A".into(), "B".into(), "SEP".into()])
        .with_grid_resolution(20)
        .with_combine_policy(CombinePolicy::Propagate)
        .screen(&x, "SEP")
        .unwrap();
    assert!(propagated.records().iter().all(|r| r.interaction_score_combined.is_nan()));
    let order: Vec<usize> = propagated.records().iter().map(|r| r.rank_order).collect();
    assert_eq!(order, vec![1, 2, 3]);
}

#[test]
fn test_csv_round_trip_keeps_values_and_undefined() {
    let records = vec![
        FeatureRecord::new(1, "A", "SEP", 0.5, f64::NAN),
        FeatureRecord::new(2, "B", "SEP", 0.125, f64::NAN),
        FeatureRecord::new(3, "C", "SEP", 2.0, f64::NAN),
    ];
    let table = RankedTable::rank(records, CombinePolicy::SkipUndefined);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    table.write_csv(&path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..3], &[0xEF, 0xBB, 0xBF]);

    let restored = RankedTable::read_csv(&path).unwrap();
    assert_eq!(restored.len(), 3);
    for (a, b) in table.records().iter().zip(restored.records()) {
        assert_eq!(a.rank_order, b.rank_order);
        assert_eq!(a.feature, b.feature);
        assert_eq!(a.interaction_with, b.interaction_with);
        assert_eq!(a.pdp_cross_mixed_deriv, b.pdp_cross_mixed_deriv);
        assert!(b.shap_pair_interaction_mean_abs.is_nan());
        assert!((a.interaction_score_combined - b.interaction_score_combined).abs() < 1e-12);
    }
}

#[test]
fn test_ranked_order_is_non_increasing() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let records: Vec<FeatureRecord> = (0..25)
        .map(|i| {
            let pdp = if i % 7 == 0 { f64::NAN } else { rng.gen::<f64>() };
            let shap = if i % 5 == 0 { f64::NAN } else { rng.gen::<f64>() };
            FeatureRecord::new(i + 1, format!("f{}", i), "SEP", pdp, shap)
        })
        .collect();

    let table = RankedTable::rank(records, CombinePolicy::SkipUndefined);
    let combined: Vec<f64> = table.records().iter().map(|r| r.interaction_score_combined).collect();
    let defined: Vec<f64> = combined.iter().copied().filter(|v| !v.is_nan()).collect();

    assert!(defined.windows(2).all(|w| w[0] >= w[1]));
    // Undefined scores sit after every defined one
    let first_nan = combined.iter().position(|v| v.is_nan()).unwrap_or(combined.len());
    assert!(combined[first_nan..].iter().all(|v| v.is_nan()));
    for r in table.records() {
        if !r.pdp_cross_mixed_deriv.is_nan() {
            assert!((0.0..=1.0).contains(&r.pdp_cross_mixed_deriv_norm01));
        }
    }
}
