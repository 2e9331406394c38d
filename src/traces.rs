//! Time series trace descriptors for charting clients.
//!
//! The descriptors serialise to Plotly scatter trace objects.

use serde::Serialize;

/// Outline color of uncertainty bands. Transparent, so only the fill is drawn.
const BAND_OUTLINE_COLOR: &str = "rgba(255,255,255,0)";

/// Line style of a trace
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineStyle {
    pub color: String,
}

/// A closed ribbon between `mean + uncertainty` and `mean - uncertainty`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BandTrace<X> {
    /// X values forward, then reversed
    pub x: Vec<X>,
    /// Upper bound forward, then lower bound reversed
    pub y: Vec<f64>,
    pub fill: &'static str,
    pub fillcolor: String,
    pub line: LineStyle,
    pub name: String,
    pub showlegend: bool,
    pub legendgroup: String,
}

/// A mean time series line
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineTrace<X> {
    pub x: Vec<X>,
    pub y: Vec<f64>,
    pub mode: &'static str,
    pub name: String,
    pub line: LineStyle,
    pub legendgroup: String,
}

/// Either kind of trace
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Trace<X> {
    Band(BandTrace<X>),
    Line(LineTrace<X>),
}

/// Returns an uncertainty band trace.
///
/// The outline runs forward along `mean + uncertainty` and back along `mean - uncertainty`, with
/// the x values mirrored to match. Inputs of different lengths are truncated to the shortest.
///
/// # Arguments
///
/// * `x`: X values, typically dates
/// * `mean`: Mean series
/// * `uncertainty`: Uncertainty half-width series
/// * `fill_color`: Fill color of the band
/// * `name`: Series name. The trace is named `"<name> Uncertainty"` and grouped with the series.
pub fn uncertainty_band<X: Clone>(
    x: &[X],
    mean: &[f64],
    uncertainty: &[f64],
    fill_color: &str,
    name: &str,
) -> BandTrace<X> {
    let length = x.len().min(mean.len()).min(uncertainty.len());
    let (x, mean, uncertainty) = (&x[..length], &mean[..length], &uncertainty[..length]);
    let upper = mean.iter().zip(uncertainty).map(|(m, u)| m + u);
    let lower = mean.iter().zip(uncertainty).rev().map(|(m, u)| m - u);
    BandTrace {
        x: x.iter().chain(x.iter().rev()).cloned().collect(),
        y: upper.chain(lower).collect(),
        fill: "toself",
        fillcolor: fill_color.to_string(),
        line: LineStyle {
            color: BAND_OUTLINE_COLOR.to_string(),
        },
        name: format!("{} Uncertainty", name),
        showlegend: false,
        legendgroup: name.to_string(),
    }
}

/// Returns a line trace of a mean series.
pub fn line_plot<X: Clone>(x: &[X], mean: &[f64], color: &str, name: &str) -> LineTrace<X> {
    LineTrace {
        x: x.to_vec(),
        y: mean.to_vec(),
        mode: "lines",
        name: name.to_string(),
        line: LineStyle {
            color: color.to_string(),
        },
        legendgroup: name.to_string(),
    }
}
