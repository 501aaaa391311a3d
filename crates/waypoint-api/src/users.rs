//! Handlers for per-user progress endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/users/:user/level` | Level, title, progress and streak |
//! | `POST` | `/users/:user/lessons/:lesson/progress` | Body: [`LessonBody`]; returns a progress report |
//! | `GET`  | `/users/:user/courses/:course/progress` | 404 if the course is unknown |
//! | `POST` | `/users/:user/activities` | Body: [`ActivityBody`]; returns a progress report |
//! | `GET`  | `/users/:user/achievements` | Unlocked achievements |
//!
//! Progress-changing bodies accept an optional `at` timestamp so hosts can
//! replay events; it defaults to the time of the request.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use waypoint_core::{
  Engine, ProgressReport, UserLevel,
  ledger::{CourseProgress, LessonProgressUpdate},
  stats::Activity,
  store::{ProgressStore, UserAchievement},
};

use crate::error::ApiError;

// ─── Level ───────────────────────────────────────────────────────────────────

/// `GET /users/:user/level`
pub async fn level<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(user_id): Path<Uuid>,
) -> Result<Json<UserLevel>, ApiError>
where
  S: ProgressStore,
{
  Ok(Json(engine.user_level(user_id).await?))
}

// ─── Lessons ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LessonBody {
  #[serde(flatten)]
  pub update: LessonProgressUpdate,
  pub at:     Option<DateTime<Utc>>,
}

/// `POST /users/:user/lessons/:lesson/progress`
pub async fn record_lesson<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path((user_id, lesson_id)): Path<(Uuid, Uuid)>,
  Json(body): Json<LessonBody>,
) -> Result<Json<ProgressReport>, ApiError>
where
  S: ProgressStore,
{
  let now = body.at.unwrap_or_else(Utc::now);
  let report = engine
    .record_lesson_progress(user_id, lesson_id, body.update, now)
    .await?;
  Ok(Json(report))
}

/// `GET /users/:user/courses/:course/progress`
pub async fn course_progress<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path((user_id, course_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<CourseProgress>, ApiError>
where
  S: ProgressStore,
{
  Ok(Json(engine.course_progress(user_id, course_id).await?))
}

// ─── Activities ──────────────────────────────────────────────────────────────

/// e.g. `{"kind":"share"}` or `{"kind":"impact","amount":500}`
#[derive(Debug, Deserialize)]
pub struct ActivityBody {
  #[serde(flatten)]
  pub activity: Activity,
  pub at:       Option<DateTime<Utc>>,
}

/// `POST /users/:user/activities`
pub async fn record_activity<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(user_id): Path<Uuid>,
  Json(body): Json<ActivityBody>,
) -> Result<Json<ProgressReport>, ApiError>
where
  S: ProgressStore,
{
  let now = body.at.unwrap_or_else(Utc::now);
  Ok(Json(engine.record_activity(user_id, body.activity, now).await?))
}

// ─── Achievements ────────────────────────────────────────────────────────────

/// `GET /users/:user/achievements`
pub async fn achievements<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<UserAchievement>>, ApiError>
where
  S: ProgressStore,
{
  Ok(Json(engine.achievements(user_id).await?))
}
