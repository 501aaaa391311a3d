//! JSON REST API for Waypoint.
//!
//! Exposes an axum [`Router`] backed by an [`Engine`] over any
//! [`ProgressStore`]. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", waypoint_api::api_router(engine.clone()))
//! ```

pub mod courses;
pub mod error;
pub mod reference;
pub mod skills;
pub mod users;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use waypoint_core::{Engine, store::ProgressStore};

pub use error::ApiError;

/// Build the API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: Arc<Engine<S>>) -> Router<()>
where
  S: ProgressStore + 'static,
{
  Router::new()
    // Reference data
    .route("/reference", get(reference::get::<S>))
    // Course structure
    .route("/courses/{course}", put(courses::put_lessons::<S>))
    // Per-user progress
    .route("/users/{user}/level", get(users::level::<S>))
    .route(
      "/users/{user}/lessons/{lesson}/progress",
      post(users::record_lesson::<S>),
    )
    .route(
      "/users/{user}/courses/{course}/progress",
      get(users::course_progress::<S>),
    )
    .route("/users/{user}/activities", post(users::record_activity::<S>))
    .route("/users/{user}/achievements", get(users::achievements::<S>))
    // Skill tree
    .route("/users/{user}/skill-tree", get(skills::tree::<S>))
    .route(
      "/users/{user}/skill-tree/{node}/complete",
      post(skills::complete::<S>),
    )
    .with_state(engine)
}
