//! SVG plot of a fit: data with error bars, model curve and normalized residuals.

use plotters::prelude::*;
use std::path::Path;
use tracing::debug;

use crate::data::Dataset;
use crate::error::{Result, SasFitError};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 640;

fn plot_error<E: std::fmt::Debug>(err: E) -> SasFitError {
    SasFitError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("plot rendering failed: {err:?}"),
    ))
}

/// Axis range of `values` with a small margin; `None` if nothing is finite.
fn padded_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return None;
    }
    let pad = if hi > lo { 0.05 * (hi - lo) } else { 0.5 * lo.abs().max(1.0) };
    Some((lo - pad, hi + pad))
}

/// Write the fit plot for `data` against the model curve to `path`.
///
/// With `log_scale` both axes show log10 values; non-positive intensities are
/// then dropped from the upper panel.
pub fn render_fit(
    path: &Path,
    title: &str,
    data: &Dataset,
    model: &[f64],
    log_scale: bool,
) -> Result<()> {
    if model.len() != data.len() {
        return Err(SasFitError::DimensionMismatch(format!(
            "{} model points for {} data points",
            model.len(),
            data.len()
        )));
    }
    let axis = |v: f64| if log_scale { v.log10() } else { v };

    let points: Vec<(f64, f64, f64, f64)> = data
        .q()
        .iter()
        .zip(data.intensity())
        .zip(data.error())
        .filter_map(|((&q, &i), &e)| {
            let (lo, hi) = if log_scale { ((i - e).max(i * 1e-3), i + e) } else { (i - e, i + e) };
            let p = (axis(q), axis(i), axis(lo), axis(hi));
            (p.1.is_finite() && p.2.is_finite()).then_some(p)
        })
        .collect();
    let curve: Vec<(f64, f64)> = data
        .q()
        .iter()
        .zip(model)
        .map(|(&q, &m)| (axis(q), axis(m)))
        .filter(|p| p.1.is_finite())
        .collect();
    let residuals: Vec<(f64, f64)> = data
        .q()
        .iter()
        .enumerate()
        .map(|(k, &q)| (axis(q), (data.intensity()[k] - model[k]) / data.error()[k]))
        .collect();

    let x_range = padded_range(data.q().iter().map(|&q| axis(q)))
        .ok_or_else(|| SasFitError::DataFile("no plottable q values".to_string()))?;
    let intensities = points
        .iter()
        .flat_map(|p| [p.2, p.3])
        .chain(curve.iter().map(|p| p.1));
    let y_range = padded_range(intensities)
        .ok_or_else(|| SasFitError::DataFile("no plottable intensities".to_string()))?;
    let r_extent = residuals
        .iter()
        .map(|r| r.1.abs())
        .filter(|r| r.is_finite())
        .fold(1.0_f64, f64::max)
        * 1.1;

    let (x_desc, y_desc) = if log_scale {
        ("log10 q (1/A)", "log10 I (1/cm)")
    } else {
        ("q (1/A)", "I (1/cm)")
    };

    let root = SVGBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let (upper, lower) = root.split_vertically(HEIGHT * 3 / 4);

    let mut chart = ChartBuilder::on(&upper)
        .caption(title, ("sans-serif", 18))
        .margin(10)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 30)
        .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)
        .map_err(plot_error)?;
    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()
        .map_err(plot_error)?;

    let data_color = RGBColor(31, 119, 180);
    chart
        .draw_series(
            points
                .iter()
                .map(|&(q, _, lo, hi)| PathElement::new(vec![(q, lo), (q, hi)], data_color)),
        )
        .map_err(plot_error)?;
    chart
        .draw_series(points.iter().map(|&(q, i, _, _)| Circle::new((q, i), 2, data_color.filled())))
        .map_err(plot_error)?;
    chart
        .draw_series(LineSeries::new(curve, RED.stroke_width(2)))
        .map_err(plot_error)?;

    let mut resid = ChartBuilder::on(&lower)
        .margin(10)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 30)
        .build_cartesian_2d(x_range.0..x_range.1, -r_extent..r_extent)
        .map_err(plot_error)?;
    resid
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc("(I - model) / dI")
        .y_labels(5)
        .draw()
        .map_err(plot_error)?;
    resid
        .draw_series(LineSeries::new(vec![(x_range.0, 0.0), (x_range.1, 0.0)], BLACK))
        .map_err(plot_error)?;
    resid
        .draw_series(
            residuals
                .iter()
                .filter(|r| r.1.is_finite())
                .map(|&(q, r)| Circle::new((q, r), 2, data_color.filled())),
        )
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    debug!(path = %path.display(), "rendered fit plot");
    Ok(())
}
