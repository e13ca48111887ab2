//! Benchmarks for composite model evaluation
//!
//! Evaluation dominates fit time, so these track the cost of one model call
//! for plain, structure-factor and polydisperse composites.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use sasfit_rs::catalog::ModelCatalog;
use sasfit_rs::composition::{compose, CompositionSpec, RadiusEffectiveMode};
use sasfit_rs::polydispersity::PdSettings;

fn q_grid(points: usize) -> Vec<f64> {
    (0..points)
        .map(|i| 0.005 * (0.3_f64 / 0.005).powf(i as f64 / (points - 1) as f64))
        .collect()
}

fn bench_form_factors(c: &mut Criterion) {
    let catalog = ModelCatalog::builtin();
    let q = q_grid(200);
    let mut group = c.benchmark_group("form_factor");

    for name in ["sphere", "core_shell_sphere", "cylinder", "ellipsoid"] {
        let model = compose(&catalog, &CompositionSpec::new(name)).unwrap();
        let values = model.values();
        group.bench_with_input(BenchmarkId::from_parameter(name), &q, |b, q| {
            b.iter(|| black_box(model.evaluate(q, &values)))
        });
    }
    group.finish();
}

fn bench_products(c: &mut Criterion) {
    let catalog = ModelCatalog::builtin();
    let q = q_grid(200);
    let mut group = c.benchmark_group("product");

    for structure in ["hardsphere", "stickyhardsphere"] {
        let spec = CompositionSpec {
            structure_factor: Some(structure.to_string()),
            radius_effective_mode: RadiusEffectiveMode::LinkRadius,
            ..CompositionSpec::new("cylinder")
        };
        let model = compose(&catalog, &spec).unwrap();
        let values = model.values();
        group.bench_with_input(BenchmarkId::from_parameter(structure), &q, |b, q| {
            b.iter(|| black_box(model.evaluate(q, &values)))
        });
    }
    group.finish();
}

fn bench_polydispersity(c: &mut Criterion) {
    let catalog = ModelCatalog::builtin();
    let q = q_grid(200);
    let mut group = c.benchmark_group("polydisperse_cylinder");
    group.sample_size(20);

    for pd_n in [11, 35] {
        let mut spec = CompositionSpec::new("cylinder");
        spec.polydispersity.insert(
            "radius".to_string(),
            PdSettings {
                pd_width: 0.1,
                pd_n,
                ..PdSettings::default()
            },
        );
        let model = compose(&catalog, &spec).unwrap();
        let values = model.values();
        group.bench_with_input(BenchmarkId::new("pd_n", pd_n), &q, |b, q| {
            b.iter(|| black_box(model.evaluate(q, &values)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_form_factors, bench_products, bench_polydispersity);
criterion_main!(benches);
