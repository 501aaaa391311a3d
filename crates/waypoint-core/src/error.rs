//! Error types for `waypoint-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("skill node {node:?} is locked; missing prerequisites: {missing:?}")]
  PrerequisiteNotMet { node: String, missing: Vec<String> },

  /// Reference data that must prevent the engine from starting.
  #[error("configuration error: {0}")]
  Configuration(String),

  #[error("unknown skill node: {0:?}")]
  UnknownNode(String),

  #[error("course not found: {0}")]
  UnknownCourse(Uuid),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
