use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use interaction_screening::explainability::{pdp_cross_interaction_strength, InteractionExplainer};
use interaction_screening::interaction::InteractionScreener;
use interaction_screening::training::{CatBoostConfig, CatBoostRegressor};
use ndarray::{Array1, Array2};
use rand::prelude::*;

fn create_regression_data(n_rows: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = rand::thread_rng();
    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen::<f64>() * 10.0);
    let y = x
        .rows()
        .into_iter()
        .map(|r| r[0] * r[n_features - 1] + r.sum() + rng.gen::<f64>() * 0.1)
        .collect();
    (x, y)
}

fn fitted_model(x: &Array2<f64>, y: &Array1<f64>) -> CatBoostRegressor {
    let config = CatBoostConfig {
        n_estimators: 200,
        learning_rate: 0.1,
        verbose: 0,
        ..Default::default()
    };
    let mut model = CatBoostRegressor::new(config);
    model.fit(x, y).unwrap();
    model
}

fn bench_interaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("interaction");
    group.sample_size(10);

    for n_rows in [500, 2000].iter() {
        let (x, y) = create_regression_data(*n_rows, 10);
        let model = fitted_model(&x, &y);
        let names: Vec<String> = (0..10).map(|i| format!("feature_{}", i)).collect();

        group.bench_with_input(BenchmarkId::new("pdp_pair", n_rows), &x, |b, x| {
            b.iter(|| pdp_cross_interaction_strength(&model, black_box(x), 0, 9, 50).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("shap_interaction_values", n_rows), &x, |b, x| {
            b.iter(|| model.shap_interaction_values(black_box(x)).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("screen", n_rows), &x, |b, x| {
            b.iter(|| {
                InteractionScreener::new(&model, names.clone())
                    .screen(black_box(x), "feature_9")
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_interaction);
criterion_main!(benches);
