//! Core types and rules for the Waypoint progression engine.
//!
//! Leveling, streaks, achievement evaluation, lesson/course progress and the
//! skill tree are pure functions over in-memory data. The [`engine`] module
//! wires them to persistence through the [`store::ProgressStore`] trait.
//! Nothing here depends on HTTP or a database.

// Store implementations use native `async fn` against the `impl Future + Send`
// trait signatures.
#![allow(async_fn_in_trait)]

pub mod achievement;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod level;
pub mod reference;
pub mod skill;
pub mod stats;
pub mod store;
pub mod streak;

pub use engine::{Engine, EngineError, ProgressReport, UserLevel};
pub use error::{Error, Result};

#[cfg(test)]
mod memory;
