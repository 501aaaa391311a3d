//! Handler for `/reference`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/reference` | Version hash plus the active rules |

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Serialize;
use waypoint_core::{
  Engine,
  achievement::Achievement,
  level::TitleBand,
  reference::Rewards,
  skill::SkillNode,
  store::ProgressStore,
};

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct ReferenceView<'a> {
  pub version:      &'a str,
  pub thresholds:   &'a [u64],
  pub titles:       &'a [TitleBand],
  pub rewards:      Rewards,
  pub achievements: &'a [Achievement],
  pub skill_tree:   &'a [SkillNode],
}

/// `GET /reference`
pub async fn get<S>(
  State(engine): State<Arc<Engine<S>>>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: ProgressStore,
{
  let rules = engine.rules();
  let view = ReferenceView {
    version:      &rules.version,
    thresholds:   rules.levels.thresholds(),
    titles:       rules.levels.titles(),
    rewards:      rules.rewards,
    achievements: &rules.achievements,
    skill_tree:   rules.skill_tree.nodes(),
  };
  let body = serde_json::to_value(view).map_err(|e| ApiError::Internal(e.to_string()))?;
  Ok(Json(body))
}
