//! Analysis of a region: cell selection, spatial means and time series traces.

use crate::aggregate;
use crate::array::{AxisRange, SlicedArray};
use crate::boundaries::{self, BoundaryIndex};
use crate::coord_cache::{CacheStore, CoordinateCache};
use crate::error::AnalysisError;
use crate::grid::{self, CandidateCell, GridWindow, PreparedRegion};
use crate::models::{AnalysisRequest, AnalysisResponse, CellFeature, Selection, SeriesSpec};
use crate::resource_manager::ResourceManager;
use crate::session::{AnalysisSession, SeriesValues};
use crate::time_axis;
use crate::traces::{self, Trace};
use crate::zarr::ArrayReader;

use futures::future::try_join_all;
use std::sync::Arc;
use time::Date;

/// Default minimum area fraction for a cell to be included
pub const DEFAULT_THRESHOLD: f64 = 0.35;

/// Dataset and selection settings
#[derive(Clone, Debug)]
pub struct DatasetConfig {
    /// URL of the Zarr dataset group
    pub url: String,
    /// Date of day offset zero on the time axis
    pub time_origin: Date,
    /// Padding of the analysis window beyond the region, in cells
    pub padding_cells: f64,
    /// Inclusion threshold used when a request does not give one
    pub default_threshold: f64,
    /// Whether to run cell selection on the Rayon thread pool
    pub use_rayon: bool,
}

/// Mean time series of one series
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesMeans {
    pub name: String,
    pub mean: Vec<f64>,
    pub uncertainty: Vec<f64>,
}

/// Result of an analysis
#[derive(Debug)]
pub struct Analysis {
    /// Session holding the state needed for time-step frames
    pub session: AnalysisSession,
    /// Mean series, in request order
    pub means: Vec<SeriesMeans>,
    /// Uncertainty band and line trace of each series
    pub traces: Vec<Trace<String>>,
}

/// Returns the response body of an analysis.
pub fn analysis_response(
    session: &AnalysisSession,
    traces: Vec<Trace<String>>,
) -> AnalysisResponse {
    let cells = session
        .included_cells()
        .map(|cell| CellFeature {
            idx: cell.idx,
            lon: cell.lon,
            lat: cell.lat,
            frac: cell.frac,
            ring: cell.ring(),
        })
        .collect();
    AnalysisResponse {
        session: session.id(),
        dates: time_axis::format_dates(session.dates()),
        window: session.window().clone(),
        candidates: session.candidates().len(),
        threshold: session.threshold(),
        cells,
        traces,
    }
}

/// Runs analyses against one dataset.
pub struct Analyser {
    config: DatasetConfig,
    reader: Arc<dyn ArrayReader>,
    coords: CoordinateCache,
    boundaries: Option<BoundaryIndex>,
    resource_manager: Arc<ResourceManager>,
}

impl Analyser {
    /// Returns a new Analyser.
    ///
    /// # Arguments
    ///
    /// * `config`: Dataset and selection settings
    /// * `reader`: Reader for the dataset's arrays
    /// * `cache_store`: Store backing the coordinate cache
    /// * `boundaries`: Aquifer boundaries, if configured
    /// * `resource_manager`: Limits on concurrent CPU-bound tasks
    pub fn new(
        config: DatasetConfig,
        reader: Arc<dyn ArrayReader>,
        cache_store: Arc<dyn CacheStore>,
        boundaries: Option<BoundaryIndex>,
        resource_manager: Arc<ResourceManager>,
    ) -> Self {
        let coords = CoordinateCache::new(cache_store, reader.clone());
        Self {
            config,
            reader,
            coords,
            boundaries,
            resource_manager,
        }
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Returns the region of a selection.
    pub fn resolve_region(&self, selection: &Selection) -> Result<PreparedRegion, AnalysisError> {
        let region = match selection {
            Selection::Polygon(geometry) => boundaries::region_from_geometry(geometry)?,
            Selection::Aquifer(id) => match &self.boundaries {
                Some(boundaries) => boundaries.lookup(id)?,
                None => {
                    return Err(AnalysisError::BoundaryNotFound { id: id.to_string() });
                }
            },
        };
        Ok(PreparedRegion::new(region))
    }

    /// Returns a coordinate axis as f64 values, through the coordinate cache.
    async fn coordinate_axis(&self, name: &str) -> Result<Vec<f64>, AnalysisError> {
        let axis = self.coords.get_or_fetch_axis(&self.config.url, name).await?;
        Ok(axis.data.to_f64_vec())
    }

    /// Returns the dates of the time axis.
    async fn dates(&self) -> Result<Vec<Date>, AnalysisError> {
        let handle = self.reader.open_variable(&self.config.url, "time").await?;
        let ranges = vec![AxisRange::All; handle.shape().len()];
        let offsets = self.reader.read(&handle, &ranges).await?;
        time_axis::dates_from_offsets(self.config.time_origin, &offsets.data)
    }

    /// Reads a `[time, lat, lon]` variable over a window.
    async fn read_window(
        &self,
        variable: &str,
        window: &GridWindow,
    ) -> Result<SlicedArray, AnalysisError> {
        let handle = self.reader.open_variable(&self.config.url, variable).await?;
        let ranges = [
            AxisRange::All,
            window.lat.clone().into(),
            window.lon.clone().into(),
        ];
        self.reader.read(&handle, &ranges).await
    }

    /// Reads the values and uncertainties of a series over a window.
    async fn read_series(
        &self,
        spec: &SeriesSpec,
        window: &GridWindow,
    ) -> Result<(SlicedArray, SlicedArray), AnalysisError> {
        tokio::try_join!(
            self.read_window(&spec.variable, window),
            self.read_window(&spec.uncertainty, window)
        )
    }

    /// Examines the cells of a window for inclusion.
    async fn select_cells(
        &self,
        region: Arc<PreparedRegion>,
        lat: Arc<Vec<f64>>,
        lon: Arc<Vec<f64>>,
        window: GridWindow,
        cell_size: f64,
    ) -> Result<Vec<CandidateCell>, AnalysisError> {
        if self.config.use_rayon {
            Ok(tokio_rayon::spawn(move || {
                grid::select_cells_in_window_par(&region, &lat, &lon, &window, cell_size)
            })
            .await)
        } else {
            let _task_permit = self.resource_manager.task().await?;
            Ok(grid::select_cells_in_window(
                &region, &lat, &lon, &window, cell_size,
            ))
        }
    }

    /// Analyses a region.
    ///
    /// Reads the coordinate axes, selects the cells near the region and computes the spatial
    /// mean of every series over the padded window.
    #[tracing::instrument(level = "DEBUG", skip_all)]
    pub async fn analyse(&self, request: &AnalysisRequest) -> Result<Analysis, AnalysisError> {
        let region = Arc::new(self.resolve_region(&request.selection)?);
        let threshold = request.threshold.unwrap_or(self.config.default_threshold);

        let (lat, lon, dates) = tokio::try_join!(
            self.coordinate_axis("lat"),
            self.coordinate_axis("lon"),
            self.dates()
        )?;
        let cell_size = grid::cell_size(&lat)?;
        let window = grid::grid_window(
            region.bounds(),
            &lat,
            &lon,
            cell_size,
            self.config.padding_cells,
        );
        tracing::debug!(?window, cell_size, "analysis window");

        let reads = try_join_all(
            request
                .series
                .iter()
                .map(|spec| self.read_series(spec, &window)),
        );
        let selection = self.select_cells(
            region,
            Arc::new(lat),
            Arc::new(lon),
            window.clone(),
            cell_size,
        );
        let (series_values, cells) = tokio::try_join!(reads, selection)?;

        let x = time_axis::format_dates(&dates);
        let mut means = Vec::with_capacity(request.series.len());
        let mut trace_list = Vec::with_capacity(2 * request.series.len());
        let mut values = Vec::with_capacity(request.series.len());
        for (spec, (value_array, uncertainty_array)) in request.series.iter().zip(series_values) {
            let mean = aggregate::mean_ignoring_missing(&value_array)?;
            let uncertainty = aggregate::mean_ignoring_missing(&uncertainty_array)?;
            trace_list.push(Trace::Band(traces::uncertainty_band(
                &x,
                &mean,
                &uncertainty,
                &spec.band_color,
                &spec.name,
            )));
            trace_list.push(Trace::Line(traces::line_plot(
                &x,
                &mean,
                &spec.color,
                &spec.name,
            )));
            means.push(SeriesMeans {
                name: spec.name.clone(),
                mean,
                uncertainty,
            });
            values.push(SeriesValues {
                name: spec.name.clone(),
                values: value_array,
            });
        }

        let session = AnalysisSession::new(dates, window, cells, threshold, values);
        tracing::info!(
            session = %session.id(),
            candidates = session.candidates().len(),
            included = session.included_cells().count(),
            "analysis complete"
        );
        Ok(Analysis {
            session,
            means,
            traces: trace_list,
        })
    }
}
