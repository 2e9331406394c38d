//! Application router and request handlers.

use crate::analysis::analysis_response;
use crate::app_state::{AppState, SharedAppState};
use crate::cli::CommandLineArgs;
use crate::error::AnalysisError;
use crate::metrics::{metrics_handler, record_response_metrics, request_counter};
use crate::models::{AnalysisRequest, AnalysisResponse, FrameResponse};
use crate::validated_json::ValidatedJson;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::Layer;
use tower::ServiceBuilder;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Aquifer anomaly Service type alias
///
/// This type implements [tower::Service].
pub type Service = NormalizePath<Router>;

/// Returns a [crate::app::Service] for the aquifer anomaly web application.
///
/// The router is wrapped in a [NormalizePathLayer] so that URLs with a trailing slash are
/// accepted.
///
/// # Arguments
///
/// * `args`: Command line arguments
pub fn service(args: &CommandLineArgs) -> Result<Service, AnalysisError> {
    let state = Arc::new(AppState::new(args)?);
    Ok(service_with_state(state))
}

/// Returns a [crate::app::Service] around existing application state.
pub fn service_with_state(state: SharedAppState) -> Service {
    NormalizePathLayer::trim_trailing_slash().layer(router(state))
}

/// Returns a [axum::Router] for the aquifer anomaly application.
///
/// # Arguments
///
/// * `state`: Shared application state
fn router(state: SharedAppState) -> Router {
    fn v1() -> Router<SharedAppState> {
        Router::new()
            .route("/analyses", post(create_analysis))
            .route("/analyses/:session", delete(delete_analysis))
            .route("/analyses/:session/frames/:step", get(analysis_frame))
            .layer(
                ServiceBuilder::new().layer(
                    TraceLayer::new_for_http()
                        .on_request(request_counter)
                        .on_response(record_response_metrics),
                ),
            )
    }

    Router::new()
        .route("/.well-known/aquifer-anomaly-schema", get(schema))
        .route("/metrics", get(metrics_handler))
        .nest("/v1", v1())
        .with_state(state)
}

/// Describes the service.
async fn schema() -> &'static str {
    concat!(
        "Aquifer anomaly service: POST /v1/analyses to analyse a region, ",
        "GET /v1/analyses/{session}/frames/{step} for per-cell values at a time step, ",
        "DELETE /v1/analyses/{session} to reset a selection.",
    )
}

/// Handler for analysis requests
///
/// Analyses the requested region and registers a session for subsequent frame requests.
///
/// # Arguments
///
/// * `state`: Shared application state
/// * `request`: Analysis request
async fn create_analysis(
    State(state): State<SharedAppState>,
    ValidatedJson(request): ValidatedJson<AnalysisRequest>,
) -> Result<Json<AnalysisResponse>, AnalysisError> {
    let analysis = state.analyser.analyse(&request).await?;
    let session = state.sessions.insert(analysis.session).await;
    Ok(Json(analysis_response(&session, analysis.traces)))
}

/// Handler for time-step frame requests
///
/// # Arguments
///
/// * `state`: Shared application state
/// * `session`: Session id
/// * `step`: Index on the time axis
async fn analysis_frame(
    State(state): State<SharedAppState>,
    Path((session, step)): Path<(Uuid, usize)>,
) -> Result<Json<FrameResponse>, AnalysisError> {
    let session = state.sessions.get(session).await?;
    let (frame, applied) = session.render_frame(step).await?;
    Ok(Json(FrameResponse {
        step: frame.step,
        date: frame.date.to_string(),
        applied,
        cells: frame.cells,
    }))
}

/// Handler for session deletion
async fn delete_analysis(
    State(state): State<SharedAppState>,
    Path(session): Path<Uuid>,
) -> Result<StatusCode, AnalysisError> {
    state.sessions.remove(session).await?;
    Ok(StatusCode::NO_CONTENT)
}
