//! Shared fixtures: synthetic datasets and a context rooted in a temp directory.

#![allow(dead_code)]

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use sasfit_rs::catalog::ModelCatalog;
use sasfit_rs::composition::{compose, CompositionSpec};
use sasfit_rs::config::Config;
use sasfit_rs::data::Dataset;
use sasfit_rs::Context;

/// Relative noise on synthesized intensities.
pub const NOISE: f64 = 0.02;

/// Log-spaced q grid from 0.005 to about 0.3 1/Å.
pub fn q_grid(points: usize) -> Vec<f64> {
    let (lo, hi) = (0.005_f64.ln(), 0.3_f64.ln());
    (0..points)
        .map(|i| (lo + (hi - lo) * i as f64 / (points - 1) as f64).exp())
        .collect()
}

/// Intensities of `spec`'s model at its resolved values, with seeded Gaussian noise.
pub fn synthesize(spec: &CompositionSpec, points: usize, seed: u64) -> Dataset {
    let model = compose(&ModelCatalog::builtin(), spec).unwrap();
    let q = q_grid(points);
    let exact = model.evaluate(&q, &model.values()).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let unit = Normal::new(0.0, 1.0).unwrap();
    let error: Vec<f64> = exact.iter().map(|i| NOISE * i).collect();
    let intensity = exact
        .iter()
        .zip(&error)
        .map(|(i, e)| i + e * unit.sample(&mut rng))
        .collect();
    Dataset::new(q, intensity, error).unwrap()
}

/// A temp root with `uploads/` and `runs/`, and a context pointing at them.
pub struct Fixture {
    pub root: TempDir,
    pub context: Context,
}

impl Fixture {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("uploads")).unwrap();
        let context = Context::new(Config {
            runs_dir: root.path().join("runs"),
            upload_dir: root.path().join("uploads"),
            run_timeout_secs: 120,
            max_iterations: None,
        });
        Self { root, context }
    }

    /// Store `data` under `uploads/<relative>`.
    pub fn upload(&self, relative: &str, data: &Dataset) -> PathBuf {
        let path = self.root.path().join("uploads").join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        data.to_csv(&path).unwrap();
        path
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.path().join("runs")
    }
}
