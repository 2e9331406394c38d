//! This crate provides a groundwater anomaly analysis service. Given an aquifer boundary or a
//! user-drawn polygon, it reads gridded groundwater anomaly time series from a Zarr v3 store served
//! over HTTP, selects the grid cells the region covers by fractional geodesic area, and returns the
//! spatial mean of each time step with uncertainty bands, ready for a charting client to plot.
//!
//! Per-cell values at any time step can then be requested for a choropleth map of the selection.
//!
//! The service is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Axum](axum) web framework, built by the Tokio team.
//! * [Serde](serde) performs (de)serialisation of JSON request and response data.
//! * [zarrs] decodes Zarr arrays, fetched over HTTP with [object_store].
//! * [ndarray] provides [NumPy](https://numpy.org)-like n-dimensional arrays used in numerical
//!   computation.
//! * [geo] computes polygon intersections and geodesic areas.

pub mod aggregate;
pub mod analysis;
pub mod app;
pub mod app_state;
pub mod array;
pub mod boundaries;
pub mod cli;
pub mod coord_cache;
pub mod error;
pub mod grid;
pub mod metrics;
pub mod models;
pub mod resource_manager;
pub mod server;
pub mod session;
#[cfg(test)]
pub mod test_utils;
pub mod time_axis;
pub mod traces;
pub mod tracing;
pub mod types;
pub mod validated_json;
pub mod zarr;
