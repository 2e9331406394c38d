//! Spatial aggregation of gridded time series.

use crate::array::SlicedArray;
use crate::error::AnalysisError;

use ndarray::{ArrayView2, Axis};

/// Returns the mean of the non-NaN values of a 2D view, or NaN if there are none.
fn mean_of_valid(frame: ArrayView2<f64>) -> f64 {
    let (sum, count) = frame
        .iter()
        .filter(|value| !value.is_nan())
        .fold((0.0, 0_usize), |(sum, count), value| (sum + value, count + 1));
    if count > 0 {
        sum / count as f64
    } else {
        f64::NAN
    }
}

/// Returns the spatial mean of each time step of a `[time, lat, lon]` array.
///
/// NaN values are ignored. A time step with no valid values has a NaN mean.
/// Values are addressed through the array's strides, so padded and permuted layouts give the
/// same result as a row-major layout of the same logical values.
///
/// # Arguments
///
/// * `array`: Three-dimensional array of values
pub fn mean_ignoring_missing(array: &SlicedArray) -> Result<Vec<f64>, AnalysisError> {
    let view = array.view3()?;
    Ok(view.outer_iter().map(mean_of_valid).collect())
}

/// Returns the values of a `[time, lat, lon]` array at one time step for a list of cells.
///
/// Cells outside the spatial extent of the array read as NaN.
///
/// # Arguments
///
/// * `array`: Three-dimensional array of values
/// * `time_step`: Index along the time dimension
/// * `cells`: (lat, lon) index pairs
pub fn cell_values_at(
    array: &SlicedArray,
    time_step: usize,
    cells: &[(usize, usize)],
) -> Result<Vec<f64>, AnalysisError> {
    let view = array.view3()?;
    let length = view.len_of(Axis(0));
    if time_step >= length {
        return Err(AnalysisError::TimeStepOutOfRange {
            step: time_step,
            length,
        });
    }
    let frame = view.index_axis(Axis(0), time_step);
    Ok(cells
        .iter()
        .map(|&(y, x)| frame.get((y, x)).copied().unwrap_or(f64::NAN))
        .collect())
}
