//! Functions and utilities for working with [ndarray] objects.

use crate::error::AnalysisError;

use ndarray::prelude::*;
use ndarray::{ErrorKind, ShapeError};
use std::ops::Range;

/// A selection along one axis of an array read
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AxisRange {
    /// The whole axis
    All,
    /// Indices `start <= i < stop`
    Range { start: usize, stop: usize },
}

impl AxisRange {
    /// Resolve to a concrete index range, validating it against the axis length.
    ///
    /// # Arguments
    ///
    /// * `dimension`: Index of the axis, for error reporting
    /// * `length`: Length of the axis
    pub fn resolve(self, dimension: usize, length: usize) -> Result<Range<usize>, AnalysisError> {
        match self {
            Self::All => Ok(0..length),
            Self::Range { start, stop } => {
                if start > stop || stop > length {
                    Err(AnalysisError::RangeError {
                        dimension,
                        start,
                        stop,
                        length,
                    })
                } else {
                    Ok(start..stop)
                }
            }
        }
    }
}

impl From<Range<usize>> for AxisRange {
    fn from(range: Range<usize>) -> Self {
        Self::Range {
            start: range.start,
            stop: range.end,
        }
    }
}

/// Resolve one [AxisRange] per dimension of an array with the given shape.
pub fn resolve_ranges(
    ranges: &[AxisRange],
    shape: &[usize],
) -> Result<Vec<Range<usize>>, AnalysisError> {
    if ranges.len() != shape.len() {
        return Err(AnalysisError::RangeRank {
            expected: shape.len(),
            actual: ranges.len(),
        });
    }
    std::iter::zip(ranges, shape)
        .enumerate()
        .map(|(dimension, (range, length))| range.resolve(dimension, *length))
        .collect()
}

/// Returns the element strides of a row-major (C order) array.
pub fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Values read from an array, with shape and element strides.
///
/// The value at index `[i, j, k]` is `data[i * stride[0] + j * stride[1] + k * stride[2]]`.
#[derive(Clone, Debug, PartialEq)]
pub struct SlicedArray {
    pub data: Vec<f64>,
    pub shape: Vec<usize>,
    pub stride: Vec<usize>,
}

impl SlicedArray {
    /// Returns a SlicedArray with explicit strides.
    ///
    /// Fails if the strides do not fit within `data` or alias elements.
    pub fn new(
        data: Vec<f64>,
        shape: Vec<usize>,
        stride: Vec<usize>,
    ) -> Result<Self, AnalysisError> {
        let array = SlicedArray {
            data,
            shape,
            stride,
        };
        array.view()?;
        Ok(array)
    }

    /// Returns a SlicedArray laid out in row-major order.
    pub fn from_row_major(data: Vec<f64>, shape: Vec<usize>) -> Self {
        let stride = row_major_strides(&shape);
        SlicedArray {
            data,
            shape,
            stride,
        }
    }

    /// Returns a dynamic-dimensional [ndarray::ArrayView] of the values.
    ///
    /// The array view borrows the data, so no copying takes place.
    pub fn view(&self) -> Result<ArrayViewD<f64>, AnalysisError> {
        if self.shape.len() != self.stride.len() {
            return Err(ShapeError::from_kind(ErrorKind::IncompatibleLayout).into());
        }
        let shape = IxDyn(&self.shape).strides(IxDyn(&self.stride));
        Ok(ArrayView::from_shape(shape, &self.data)?)
    }

    /// Returns a three-dimensional [ndarray::ArrayView] of the values.
    pub fn view3(&self) -> Result<ArrayView3<f64>, AnalysisError> {
        match (self.shape.as_slice(), self.stride.as_slice()) {
            ([d0, d1, d2], [s0, s1, s2]) => {
                let shape = (*d0, *d1, *d2).strides((*s0, *s1, *s2));
                Ok(ArrayView3::from_shape(shape, &self.data)?)
            }
            _ => Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into()),
        }
    }

    /// Returns the value at `index`, or `None` if the index lies outside the array.
    pub fn value_at(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0;
        for ((i, length), stride) in index.iter().zip(&self.shape).zip(&self.stride) {
            if i >= length {
                return None;
            }
            offset += i * stride;
        }
        self.data.get(offset).copied()
    }
}
