//! Grid cell geometry and area-weighted cell selection.

use crate::error::AnalysisError;

use geo::{
    BooleanOps, BoundingRect, Coord, GeodesicArea, Intersects, LineString, MultiPolygon, Polygon,
    Rect,
};
use rayon::prelude::*;
use serde::Serialize;
use std::ops::Range;

/// Number of cells the analysis window extends beyond the region's bounding box by default
pub const DEFAULT_PADDING_CELLS: f64 = 2.0;

/// Returns the square cell of side `2 * half_width` centred on `center`.
///
/// The exterior ring starts at the south-west corner and runs clockwise, closing on its first
/// point.
pub fn cell_polygon(center: Coord<f64>, half_width: f64) -> Polygon<f64> {
    let (x, y) = (center.x, center.y);
    Polygon::new(
        LineString::from(vec![
            (x - half_width, y - half_width),
            (x - half_width, y + half_width),
            (x + half_width, y + half_width),
            (x + half_width, y - half_width),
            (x - half_width, y - half_width),
        ]),
        vec![],
    )
}

/// Returns the grid spacing of a latitude axis.
///
/// Fails if the axis has fewer than two values or the spacing is not a positive finite number.
pub fn cell_size(lat_axis: &[f64]) -> Result<f64, AnalysisError> {
    let invalid = |reason: &str| AnalysisError::InvalidAxis {
        name: "lat".to_string(),
        reason: reason.to_string(),
    };
    match lat_axis {
        [first, second, ..] => {
            let size = (second - first).abs();
            if size.is_finite() && size > 0.0 {
                Ok(size)
            } else {
                Err(invalid("spacing must be a positive number"))
            }
        }
        _ => Err(invalid("fewer than two values")),
    }
}

/// Returns the index range of axis values within `[min, max]`.
///
/// The range runs from the first to the last matching index. It is empty if no value matches.
pub fn axis_window(axis: &[f64], min: f64, max: f64) -> Range<usize> {
    let within = |value: &f64| *value >= min && *value <= max;
    match (axis.iter().position(within), axis.iter().rposition(within)) {
        (Some(start), Some(last)) => start..last + 1,
        _ => 0..0,
    }
}

/// Index window of the grid covered by an analysis
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GridWindow {
    /// Latitude index range
    pub lat: Range<usize>,
    /// Longitude index range
    pub lon: Range<usize>,
}

impl GridWindow {
    /// Number of longitude columns.
    pub fn width(&self) -> usize {
        self.lon.len()
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.lat.len() * self.lon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the (latitude, longitude) offsets within the window of the cell with index `idx`.
    pub fn offsets(&self, idx: usize) -> (usize, usize) {
        let width = self.width().max(1);
        (idx / width, idx % width)
    }
}

/// Returns the index window of axis values within a bounding box padded by `padding_cells`
/// cells on each side.
///
/// A missing bounding box, as for an empty region, gives an empty window.
///
/// # Arguments
///
/// * `bounds`: Bounding box of the region
/// * `lat_axis`: Latitude cell centers
/// * `lon_axis`: Longitude cell centers
/// * `cell_size`: Grid spacing in degrees
/// * `padding_cells`: Padding in units of cells
pub fn grid_window(
    bounds: Option<Rect<f64>>,
    lat_axis: &[f64],
    lon_axis: &[f64],
    cell_size: f64,
    padding_cells: f64,
) -> GridWindow {
    let Some(bounds) = bounds else {
        return GridWindow::default();
    };
    let padding = padding_cells * cell_size;
    let (min, max) = (bounds.min(), bounds.max());
    GridWindow {
        lat: axis_window(lat_axis, min.y - padding, max.y + padding),
        lon: axis_window(lon_axis, min.x - padding, max.x + padding),
    }
}

/// A region with its bounding box computed once.
///
/// The bounding box rejects most cells far from the region before the exact intersection.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedRegion {
    region: MultiPolygon<f64>,
    bounds: Option<Rect<f64>>,
}

impl PreparedRegion {
    pub fn new(region: MultiPolygon<f64>) -> Self {
        let bounds = region.bounding_rect();
        Self { region, bounds }
    }

    /// Bounding box of the region, or `None` if it is empty.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.bounds
    }

    pub fn region(&self) -> &MultiPolygon<f64> {
        &self.region
    }

    /// Returns the fraction of the cell's geodesic area covered by the region.
    ///
    /// Zero when the region and cell are disjoint or touch only along edges or at points.
    pub fn coverage(&self, cell: &Polygon<f64>) -> f64 {
        let (Some(bounds), Some(cell_bounds)) = (self.bounds, cell.bounding_rect()) else {
            return 0.0;
        };
        if !bounds.intersects(&cell_bounds) {
            return 0.0;
        }
        let cell_area = cell.geodesic_area_unsigned();
        if cell_area <= 0.0 {
            return 0.0;
        }
        let overlap = self
            .region
            .intersection(&MultiPolygon::new(vec![cell.clone()]));
        if overlap.0.is_empty() {
            return 0.0;
        }
        overlap.geodesic_area_unsigned() / cell_area
    }
}

/// A grid cell examined for inclusion in an analysis
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateCell {
    /// Row-major index of the cell within the analysis window
    pub idx: usize,
    /// Cell center longitude
    pub lon: f64,
    /// Cell center latitude
    pub lat: f64,
    /// Fraction of the cell's area covered by the region, in [0, 1]
    pub frac: f64,
    /// Whether the region overlaps the cell with positive area
    pub intersects: bool,
    /// Cell polygon
    pub cell: Polygon<f64>,
}

impl CandidateCell {
    /// Whether the cell is included at the given area fraction threshold.
    pub fn is_included(&self, threshold: f64) -> bool {
        self.intersects && self.frac >= threshold
    }

    /// Closed exterior ring of the cell as [lon, lat] pairs.
    pub fn ring(&self) -> Vec<[f64; 2]> {
        self.cell
            .exterior()
            .coords()
            .map(|coord| [coord.x, coord.y])
            .collect()
    }
}

fn candidate(
    region: &PreparedRegion,
    idx: usize,
    lat: f64,
    lon: f64,
    half_width: f64,
) -> CandidateCell {
    let cell = cell_polygon(Coord { x: lon, y: lat }, half_width);
    // Geodesic areas carry rounding error, so a fully covered cell may come out fractionally
    // above one.
    let frac = region.coverage(&cell).clamp(0.0, 1.0);
    CandidateCell {
        idx,
        lon,
        lat,
        frac,
        intersects: frac > 0.0,
        cell,
    }
}

/// Returns a candidate for every cell of the window, in row-major order.
///
/// # Arguments
///
/// * `region`: Region to select cells for
/// * `lat_axis`: Latitude cell centers
/// * `lon_axis`: Longitude cell centers
/// * `window`: Index window of the axes to examine
/// * `cell_size`: Grid spacing in degrees
pub fn select_cells_in_window(
    region: &PreparedRegion,
    lat_axis: &[f64],
    lon_axis: &[f64],
    window: &GridWindow,
    cell_size: f64,
) -> Vec<CandidateCell> {
    let half_width = cell_size / 2.0;
    let width = window.width();
    lat_axis[window.lat.clone()]
        .iter()
        .enumerate()
        .flat_map(|(y, lat)| {
            lon_axis[window.lon.clone()]
                .iter()
                .enumerate()
                .map(move |(x, lon)| candidate(region, y * width + x, *lat, *lon, half_width))
        })
        .collect()
}

/// Parallel version of [select_cells_in_window], for use on a Rayon thread pool.
pub fn select_cells_in_window_par(
    region: &PreparedRegion,
    lat_axis: &[f64],
    lon_axis: &[f64],
    window: &GridWindow,
    cell_size: f64,
) -> Vec<CandidateCell> {
    let half_width = cell_size / 2.0;
    let width = window.width();
    let lons = &lon_axis[window.lon.clone()];
    lat_axis[window.lat.clone()]
        .par_iter()
        .enumerate()
        .flat_map_iter(|(y, lat)| {
            lons.iter()
                .enumerate()
                .map(move |(x, lon)| candidate(region, y * width + x, *lat, *lon, half_width))
        })
        .collect()
}

/// Returns a candidate for every cell near the region, in row-major order.
///
/// Cells are those of the window within `padding_cells` cells of the region's bounding box.
///
/// # Arguments
///
/// * `region`: Region to select cells for
/// * `lat_axis`: Latitude cell centers
/// * `lon_axis`: Longitude cell centers
/// * `cell_size`: Grid spacing in degrees
/// * `padding_cells`: Padding of the window in units of cells
pub fn select_cells(
    region: &PreparedRegion,
    lat_axis: &[f64],
    lon_axis: &[f64],
    cell_size: f64,
    padding_cells: f64,
) -> Vec<CandidateCell> {
    let window = grid_window(region.bounds(), lat_axis, lon_axis, cell_size, padding_cells);
    select_cells_in_window(region, lat_axis, lon_axis, &window, cell_size)
}
