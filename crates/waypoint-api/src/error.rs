//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use waypoint_core::{EngineError, Error as CoreError};

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The node cannot be completed yet; `missing` lists the prerequisites
  /// still outstanding.
  #[error("prerequisites not met for {node}")]
  PrerequisiteNotMet { node: String, missing: Vec<String> },

  #[error("internal error: {0}")]
  Internal(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<CoreError> for ApiError {
  fn from(e: CoreError) -> Self {
    match e {
      CoreError::InvalidInput(m) => ApiError::BadRequest(m),
      CoreError::UnknownNode(id) => ApiError::NotFound(format!("skill node {id:?} not found")),
      CoreError::UnknownCourse(id) => ApiError::NotFound(format!("course {id} not found")),
      CoreError::PrerequisiteNotMet { node, missing } => {
        ApiError::PrerequisiteNotMet { node, missing }
      }
      other @ (CoreError::Configuration(_) | CoreError::Serialization(_)) => {
        ApiError::Internal(other.to_string())
      }
    }
  }
}

impl<E> From<EngineError<E>> for ApiError
where
  E: std::error::Error + Send + Sync + 'static,
{
  fn from(e: EngineError<E>) -> Self {
    match e {
      EngineError::Core(e) => e.into(),
      EngineError::Store(e) => ApiError::Store(Box::new(e)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, json!({ "error": m })),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
      ApiError::PrerequisiteNotMet { node, missing } => (
        StatusCode::CONFLICT,
        json!({
          "error": self.to_string(),
          "node": node,
          "missing": missing
        }),
      ),
      ApiError::Internal(m) => {
        tracing::error!(error = %m, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": m }))
      }
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": e.to_string() }))
      }
    };
    (status, Json(body)).into_response()
  }
}
