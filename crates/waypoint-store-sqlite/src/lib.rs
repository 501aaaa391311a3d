//! SQLite backend for the Waypoint progression engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write that can trigger an XP
//! award is a single conditional statement or an `IMMEDIATE` transaction, so
//! concurrent requests observe each state transition exactly once.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
