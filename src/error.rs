//! Error handling.

use axum::{
    extract::rejection::JsonRejection,
    http::header,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ndarray::ShapeError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;
use tokio::sync::AcquireError;
use tracing::{event, Level};
use uuid::Uuid;
use zarrs::array::{ArrayCreateError, ArrayError};

/// Aquifer anomaly server error type
///
/// This type encapsulates the various errors that may occur.
/// Each variant may result in a different API error response.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Failed to open an array variable of the dataset
    #[error("failed to open array {url}")]
    ArrayOpen {
        url: String,
        #[source]
        source: ArrayCreateError,
    },

    /// Failed to retrieve elements of an opened array
    #[error("failed to read array {url}")]
    ArrayRead {
        url: String,
        #[source]
        source: ArrayError,
    },

    /// Failed to load the aquifer boundary collection
    #[error("failed to load aquifer boundaries: {error}")]
    BoundaryLoad { error: String },

    /// No boundary feature matched the requested aquifer
    #[error("no boundary features found for aquifer {id}")]
    BoundaryNotFound { id: String },

    /// Error using the coordinate cache storage
    #[error("coordinate cache error {error}")]
    CacheStorage { error: String },

    /// A cache record declares more elements than its buffer holds
    #[error("corrupt cache record {key}: declared {declared} elements but buffer holds {available}")]
    CorruptCacheRecord {
        key: String,
        declared: usize,
        available: usize,
    },

    /// A day offset on the time axis cannot be represented as a calendar date
    #[error("time offset {offset} is not representable as a date")]
    DateOutOfRange { offset: f64 },

    /// Error converting from bytes to a type
    #[error("failed to convert from bytes to {type_name}")]
    FromBytes { type_name: &'static str },

    /// A coordinate axis is unusable for grid construction
    #[error("invalid {name} axis: {reason}")]
    InvalidAxis { name: String, reason: String },

    /// The selection geometry is not a polygon
    #[error("invalid selection geometry: {reason}")]
    InvalidGeometry { reason: String },

    /// The requested array variable does not exist
    #[error("array variable not found at {url}")]
    NotFound { url: String },

    /// An axis range lies outside the array
    #[error(
        "range [{start}, {stop}) is out of bounds for dimension {dimension} of length {length}"
    )]
    RangeError {
        dimension: usize,
        start: usize,
        stop: usize,
        length: usize,
    },

    /// The number of axis ranges does not match the array rank
    #[error("expected {expected} axis ranges but received {actual}")]
    RangeRank { expected: usize, actual: usize },

    /// Error deserialising request data into AnalysisRequest
    #[error("request data is not valid")]
    RequestDataJsonRejection(#[from] JsonRejection),

    /// Error validating AnalysisRequest (single error)
    #[error("request data is not valid")]
    RequestDataValidationSingle(#[from] validator::ValidationError),

    /// Error validating AnalysisRequest (multiple errors)
    #[error("request data is not valid")]
    RequestDataValidation(#[from] validator::ValidationErrors),

    /// Error acquiring a semaphore
    #[error("error acquiring resources")]
    SemaphoreAcquireError(#[from] AcquireError),

    /// The analysis session does not exist or has been reset
    #[error("analysis session {session} not found")]
    SessionNotFound { session: Uuid },

    /// Failed to create the object store backing a dataset
    #[error("failed to open dataset store {url}")]
    StoreOpen {
        url: String,
        #[source]
        source: object_store::Error,
    },

    /// Error creating ndarray ArrayView from Shape
    #[error("failed to create array from shape")]
    ShapeInvalid(#[from] ShapeError),

    /// A time step lies outside the session's time axis
    #[error("time step {step} is out of range for a time axis of length {length}")]
    TimeStepOutOfRange { step: usize, length: usize },

    /// Error converting between integer types
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),

    /// Array element type that cannot be read as numbers
    #[error("array {url} has unsupported data type {data_type}")]
    UnsupportedArrayType { url: String, data_type: String },

    /// Element type not supported by the cache codec
    #[error("unsupported data type {type_name}")]
    UnsupportedType { type_name: String },
}

impl AnalysisError {
    /// Whether the error originates from the coordinate cache storage layer or its codec.
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            Self::CacheStorage { .. }
                | Self::CorruptCacheRecord { .. }
                | Self::UnsupportedType { .. }
        )
    }
}

impl IntoResponse for AnalysisError {
    /// Convert from an `AnalysisError` into an [axum::response::Response].
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

/// Body of error response
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorBody {
    /// Main error message
    message: String,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    caused_by: Option<Vec<String>>,
}

impl ErrorBody {
    /// Return a new ErrorBody
    ///
    /// # Arguments
    ///
    /// * `error`: The error that occurred
    fn new<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        let message = error.to_string();
        let mut caused_by = None;
        let mut current = error.source();
        while let Some(source) = current {
            let mut causes: Vec<String> = caused_by.unwrap_or_default();
            causes.push(source.to_string());
            caused_by = Some(causes);
            current = source.source();
        }
        // Remove duplicate entries.
        if let Some(caused_by) = caused_by.as_mut() {
            caused_by.dedup()
        }
        ErrorBody { message, caused_by }
    }
}

/// A response to send in error cases
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorResponse {
    /// HTTP status of the response
    #[serde(skip)]
    status: StatusCode,

    /// Response body
    error: ErrorBody,
}

impl ErrorResponse {
    /// Return a new ErrorResponse
    ///
    /// # Arguments
    ///
    /// * `status`: HTTP status of the response
    /// * `error`: The error that occurred. This will be formatted into a suitable `ErrorBody`
    fn new<E>(status: StatusCode, error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        ErrorResponse {
            status,
            error: ErrorBody::new(error),
        }
    }

    /// Return a 400 bad request ErrorResponse
    fn bad_request<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    /// Return a 404 not found ErrorResponse
    fn not_found<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    /// Return a 500 internal server error ErrorResponse
    fn internal_server_error<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }

    /// Return a 502 bad gateway ErrorResponse
    fn bad_gateway<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::BAD_GATEWAY, error)
    }
}

impl From<AnalysisError> for ErrorResponse {
    /// Convert from an `AnalysisError` into an `ErrorResponse`.
    fn from(error: AnalysisError) -> Self {
        let response = match &error {
            // Bad request
            AnalysisError::InvalidAxis { .. }
            | AnalysisError::InvalidGeometry { .. }
            | AnalysisError::RangeError { .. }
            | AnalysisError::RangeRank { .. }
            | AnalysisError::RequestDataJsonRejection(_)
            | AnalysisError::RequestDataValidationSingle(_)
            | AnalysisError::RequestDataValidation(_)
            | AnalysisError::TimeStepOutOfRange { .. } => Self::bad_request(&error),

            // Not found
            AnalysisError::BoundaryNotFound { .. }
            | AnalysisError::NotFound { .. }
            | AnalysisError::SessionNotFound { .. } => Self::not_found(&error),

            // Bad gateway
            AnalysisError::ArrayOpen {
                source: ArrayCreateError::StorageError(_),
                ..
            }
            | AnalysisError::ArrayRead {
                source: ArrayError::StorageError(_),
                ..
            } => Self::bad_gateway(&error),

            // Internal server error
            AnalysisError::ArrayOpen { .. }
            | AnalysisError::ArrayRead { .. }
            | AnalysisError::BoundaryLoad { .. }
            | AnalysisError::CacheStorage { .. }
            | AnalysisError::CorruptCacheRecord { .. }
            | AnalysisError::DateOutOfRange { .. }
            | AnalysisError::FromBytes { .. }
            | AnalysisError::SemaphoreAcquireError(_)
            | AnalysisError::ShapeInvalid(_)
            | AnalysisError::StoreOpen { .. }
            | AnalysisError::TryFromInt(_)
            | AnalysisError::UnsupportedArrayType { .. }
            | AnalysisError::UnsupportedType { .. } => Self::internal_server_error(&error),
        };

        // Log server errors.
        if response.status.is_server_error() {
            event!(Level::ERROR, "{}", error.to_string());
            let mut current = error.source();
            while let Some(source) = current {
                event!(Level::ERROR, "Caused by: {}", source.to_string());
                current = source.source();
            }
        }

        response
    }
}

impl IntoResponse for ErrorResponse {
    /// Convert from an `ErrorResponse` into an `axum::response::Response`.
    ///
    /// Renders the response as JSON.
    fn into_response(self) -> Response {
        let json_body = serde_json::to_string_pretty(&self);
        match json_body {
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialise error response: {}", err),
            )
                .into_response(),
            Ok(json_body) => (
                self.status,
                [(&header::CONTENT_TYPE, mime::APPLICATION_JSON.to_string())],
                json_body,
            )
                .into_response(),
        }
    }
}
