//! Handler for `/courses` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `PUT`  | `/courses/:course` | Body: `{"lessons":[<uuid>, ...]}`; replaces the lesson list |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;
use waypoint_core::{Engine, store::ProgressStore};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct LessonsBody {
  /// Ordered; duplicates are rejected.
  pub lessons: Vec<Uuid>,
}

/// `PUT /courses/:course`
pub async fn put_lessons<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(course_id): Path<Uuid>,
  Json(body): Json<LessonsBody>,
) -> Result<StatusCode, ApiError>
where
  S: ProgressStore,
{
  engine.set_course_lessons(course_id, body.lessons).await?;
  Ok(StatusCode::NO_CONTENT)
}
