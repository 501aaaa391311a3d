//! Error type for `waypoint-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] waypoint_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored value that does not map back onto a domain type.
  #[error("corrupt column {column}: {value}")]
  Decode { column: &'static str, value: String },

  /// A count too large for SQLite's signed 64-bit integers.
  #[error("value {0} does not fit in an INTEGER column")]
  Overflow(u64),

  /// Adding `amount` would push a stored total past the INTEGER range.
  /// Nothing was written.
  #[error("adding {amount} to {column} would overflow")]
  AddOverflow { column: &'static str, amount: u64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
