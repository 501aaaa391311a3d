//! Handlers for the skill tree.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/users/:user/skill-tree` | Every node with its derived status |
//! | `POST` | `/users/:user/skill-tree/:node/complete` | 409 while prerequisites are missing |
//!
//! The completion body is optional; `{"at": "..."}` sets the event time.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use waypoint_core::{Engine, ProgressReport, skill::NodeState, store::ProgressStore};

use crate::error::ApiError;

/// `GET /users/:user/skill-tree`
pub async fn tree<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<NodeState>>, ApiError>
where
  S: ProgressStore,
{
  Ok(Json(engine.skill_tree(user_id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteBody {
  pub at: Option<DateTime<Utc>>,
}

/// `POST /users/:user/skill-tree/:node/complete`
pub async fn complete<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path((user_id, node_id)): Path<(Uuid, String)>,
  body: Option<Json<CompleteBody>>,
) -> Result<Json<ProgressReport>, ApiError>
where
  S: ProgressStore,
{
  let body = body.map(|Json(b)| b).unwrap_or_default();
  let now = body.at.unwrap_or_else(Utc::now);
  let report = engine.complete_node(user_id, &node_id, now).await?;
  Ok(Json(report))
}
