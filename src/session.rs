//! Analysis sessions and per-time-step frames.

use crate::aggregate;
use crate::array::SlicedArray;
use crate::error::AnalysisError;
use crate::grid::{CandidateCell, GridWindow};

use hashbrown::HashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use time::Date;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Ticket issued by [UpdateSequencer::begin]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

/// Orders concurrent updates so that only the most recently started one takes effect.
///
/// Each update takes a ticket with [begin](Self::begin) before doing its work and offers its
/// result with [apply](Self::apply). A result is recorded only if no newer update has started
/// since, so a slow stale update never overwrites a newer one.
#[derive(Debug)]
pub struct UpdateSequencer<T> {
    issued: AtomicU64,
    current: Mutex<Option<T>>,
}

impl<T: Clone> UpdateSequencer<T> {
    pub fn new() -> Self {
        Self {
            issued: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    /// Start an update, returning a ticket newer than all previous ones.
    pub fn begin(&self) -> Generation {
        Generation(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether no newer update has started since `generation`.
    pub fn is_latest(&self, generation: &Generation) -> bool {
        generation.0 == self.issued.load(Ordering::SeqCst)
    }

    /// Record the result of an update if it is still the latest.
    ///
    /// Returns whether the value was recorded.
    pub async fn apply(&self, generation: Generation, value: T) -> bool {
        let mut current = self.current.lock().await;
        if !self.is_latest(&generation) {
            return false;
        }
        *current = Some(value);
        true
    }

    /// The most recently recorded value.
    pub async fn current(&self) -> Option<T> {
        self.current.lock().await.clone()
    }
}

/// Values of one series over the analysis window
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesValues {
    /// Series name
    pub name: String,
    /// `[time, lat, lon]` values over the window
    pub values: SlicedArray,
}

/// Value of an included cell at one time step
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CellValue {
    /// Row-major index of the cell within the analysis window
    pub idx: usize,
    pub lon: f64,
    pub lat: f64,
    pub frac: f64,
    /// Value of each series, keyed by series name
    pub values: BTreeMap<String, f64>,
}

/// Included cell values at one time step
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub step: usize,
    pub date: Date,
    pub cells: Vec<CellValue>,
}

/// State of a completed analysis, kept to serve time-step frames.
#[derive(Debug)]
pub struct AnalysisSession {
    id: Uuid,
    dates: Vec<Date>,
    window: GridWindow,
    cells: Vec<CandidateCell>,
    threshold: f64,
    series: Vec<SeriesValues>,
    sequencer: UpdateSequencer<usize>,
}

impl AnalysisSession {
    /// Returns a new AnalysisSession with a random id.
    ///
    /// # Arguments
    ///
    /// * `dates`: Dates of the time axis
    /// * `window`: Index window of the grid covered by the series values
    /// * `cells`: Candidate cells of the window, in row-major order
    /// * `threshold`: Area fraction threshold for cell inclusion
    /// * `series`: Values of each series over the window
    pub fn new(
        dates: Vec<Date>,
        window: GridWindow,
        cells: Vec<CandidateCell>,
        threshold: f64,
        series: Vec<SeriesValues>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            dates,
            window,
            cells,
            threshold,
            series,
            sequencer: UpdateSequencer::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dates(&self) -> &[Date] {
        &self.dates
    }

    pub fn window(&self) -> &GridWindow {
        &self.window
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// All candidate cells, included or not.
    pub fn candidates(&self) -> &[CandidateCell] {
        &self.cells
    }

    /// Cells at or above the threshold, in candidate order.
    pub fn included_cells(&self) -> impl Iterator<Item = &CandidateCell> {
        self.cells
            .iter()
            .filter(move |cell| cell.is_included(self.threshold))
    }

    /// Returns the values of the included cells at a time step.
    pub fn frame(&self, step: usize) -> Result<Frame, AnalysisError> {
        let date = *self
            .dates
            .get(step)
            .ok_or(AnalysisError::TimeStepOutOfRange {
                step,
                length: self.dates.len(),
            })?;
        let included: Vec<&CandidateCell> = self.included_cells().collect();
        let offsets: Vec<(usize, usize)> = included
            .iter()
            .map(|cell| self.window.offsets(cell.idx))
            .collect();
        let mut cells: Vec<CellValue> = included
            .iter()
            .map(|cell| CellValue {
                idx: cell.idx,
                lon: cell.lon,
                lat: cell.lat,
                frac: cell.frac,
                values: BTreeMap::new(),
            })
            .collect();
        for series in &self.series {
            let values = aggregate::cell_values_at(&series.values, step, &offsets)?;
            for (cell, value) in cells.iter_mut().zip(values) {
                cell.values.insert(series.name.clone(), value);
            }
        }
        Ok(Frame { step, date, cells })
    }

    /// Builds a frame and makes it the session's current frame unless a newer request started
    /// in the meantime.
    ///
    /// Returns the frame and whether it became current.
    #[tracing::instrument(level = "DEBUG", skip(self), fields(session = %self.id))]
    pub async fn render_frame(&self, step: usize) -> Result<(Frame, bool), AnalysisError> {
        let generation = self.sequencer.begin();
        let frame = self.frame(step)?;
        let applied = self.sequencer.apply(generation, step).await;
        if !applied {
            tracing::debug!("discarding stale frame");
        }
        Ok((frame, applied))
    }

    /// Time step of the current frame, if any has been rendered.
    pub async fn current_step(&self) -> Option<usize> {
        self.sequencer.current().await
    }
}

/// Registry of live analysis sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<AnalysisSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session, returning a shared handle to it.
    pub async fn insert(&self, session: AnalysisSession) -> Arc<AnalysisSession> {
        let session = Arc::new(session);
        self.sessions
            .write()
            .await
            .insert(session.id(), session.clone());
        session
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<AnalysisSession>, AnalysisError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AnalysisError::SessionNotFound { session: id })
    }

    /// Remove a session. Frames in flight for it still complete.
    pub async fn remove(&self, id: Uuid) -> Result<(), AnalysisError> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(AnalysisError::SessionNotFound { session: id })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
