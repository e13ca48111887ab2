//! Global optimization methods for finding global minima.
//!
//! Population-based search over a bounded box. The fitting engines run these
//! in the same internal coordinates as the local minimizers.

use ndarray::Array1;
use rand::Rng;

use crate::error::Result;
use crate::problem::{cost_or_infinity, Problem};

mod differential_evolution;

pub use differential_evolution::{DEStrategy, DifferentialEvolution};

/// Draw a point inside the box. Half-open boxes sample a width of 10 from the
/// finite side.
fn random_point(bounds: &[(f64, f64)], rng: &mut impl Rng) -> Array1<f64> {
    bounds
        .iter()
        .map(|&(min, max)| {
            if min.is_finite() && max.is_finite() && min < max {
                rng.gen_range(min..max)
            } else if min.is_finite() && max.is_finite() {
                min
            } else if min.is_finite() {
                min + rng.gen::<f64>() * 10.0
            } else if max.is_finite() {
                max - rng.gen::<f64>() * 10.0
            } else {
                rng.gen_range(-10.0..10.0)
            }
        })
        .collect()
}

/// Clip a point to the given bounds. Infinite bounds leave a coordinate free.
fn clip_to_bounds(point: &Array1<f64>, bounds: &[(f64, f64)]) -> Array1<f64> {
    point
        .iter()
        .zip(bounds)
        .map(|(&x, &(min, max))| x.max(min).min(max))
        .collect()
}

/// Create a population seeded with `initial` plus random points within the bounds.
///
/// # Arguments
///
/// * `initial` - The caller's starting point, kept as the first member
/// * `bounds` - Lower and upper bounds for each parameter
/// * `pop_size` - The size of the population
/// * `rng` - Random number generator
fn create_population(
    initial: &Array1<f64>,
    bounds: &[(f64, f64)],
    pop_size: usize,
    rng: &mut impl Rng,
) -> Vec<Array1<f64>> {
    std::iter::once(clip_to_bounds(initial, bounds))
        .chain((1..pop_size).map(|_| random_point(bounds, rng)))
        .collect()
}

/// Evaluate the cost for each point in a population.
///
/// Points where the model cannot be evaluated cost `+inf`.
fn evaluate_population<P: Problem>(problem: &P, population: &[Array1<f64>]) -> Result<Vec<f64>> {
    population
        .iter()
        .map(|point| cost_or_infinity(problem, point))
        .collect()
}
