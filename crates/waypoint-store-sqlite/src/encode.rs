//! Encoding and decoding helpers between domain types and the plain values
//! stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar dates are `YYYY-MM-DD`, UUIDs
//! are hyphenated lowercase strings. Counts are stored as `INTEGER` and
//! checked on the way in and out since SQLite has no unsigned type.

use std::str::FromStr as _;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;
use waypoint_core::{
  ledger::LessonProgress,
  stats::{Counter, UserStats},
  store::UserAchievement,
  streak::Streak,
};

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Dates ───────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn encode_date(d: NaiveDate) -> String { d.format(DATE_FORMAT).to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Integers ────────────────────────────────────────────────────────────────

pub fn encode_count(n: u64) -> Result<i64> {
  i64::try_from(n).map_err(|_| Error::Overflow(n))
}

pub fn decode_count(column: &'static str, n: i64) -> Result<u64> {
  u64::try_from(n).map_err(|_| Error::Decode { column, value: n.to_string() })
}

fn decode_small<T: TryFrom<i64>>(column: &'static str, n: i64) -> Result<T> {
  T::try_from(n).map_err(|_| Error::Decode { column, value: n.to_string() })
}

// ─── Counter ─────────────────────────────────────────────────────────────────

pub fn encode_counter(c: Counter) -> &'static str { c.into() }

pub fn decode_counter(s: &str) -> Result<Counter> {
  Counter::from_str(s)
    .map_err(|_| Error::Decode { column: "activity_counters.counter", value: s.to_owned() })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw `user_levels` row.
pub struct RawUserLevel {
  pub xp:                 i64,
  pub streak_days:        i64,
  pub longest_streak:     i64,
  pub last_activity_date: Option<String>,
}

impl RawUserLevel {
  pub fn into_streak(self) -> Result<Streak> {
    Ok(Streak {
      days:          decode_small("user_levels.streak_days", self.streak_days)?,
      longest:       decode_small("user_levels.longest_streak", self.longest_streak)?,
      last_activity: self.last_activity_date.as_deref().map(decode_date).transpose()?,
    })
  }
}

/// Raw `lesson_progress` row.
pub struct RawLessonProgress {
  pub user_id:          String,
  pub lesson_id:        String,
  pub is_completed:     bool,
  pub position_seconds: i64,
  pub last_accessed_at: String,
  pub completed_at:     Option<String>,
}

impl RawLessonProgress {
  pub const COLUMNS: &'static str = "user_id, lesson_id, is_completed, position_seconds, \
                                     last_accessed_at, completed_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:          row.get(0)?,
      lesson_id:        row.get(1)?,
      is_completed:     row.get(2)?,
      position_seconds: row.get(3)?,
      last_accessed_at: row.get(4)?,
      completed_at:     row.get(5)?,
    })
  }

  pub fn into_progress(self) -> Result<LessonProgress> {
    Ok(LessonProgress {
      user_id:          decode_uuid(&self.user_id)?,
      lesson_id:        decode_uuid(&self.lesson_id)?,
      is_completed:     self.is_completed,
      position_seconds: decode_small(
        "lesson_progress.position_seconds",
        self.position_seconds,
      )?,
      last_accessed_at: decode_dt(&self.last_accessed_at)?,
      completed_at:     self.completed_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw `user_achievements` row.
pub struct RawUserAchievement {
  pub user_id:     String,
  pub code:        String,
  pub unlocked_at: String,
}

impl RawUserAchievement {
  pub fn into_achievement(self) -> Result<UserAchievement> {
    Ok(UserAchievement {
      user_id:     decode_uuid(&self.user_id)?,
      code:        self.code,
      unlocked_at: decode_dt(&self.unlocked_at)?,
    })
  }
}

/// One course's totals for a single user, as produced by the stats query.
pub struct RawCourseTally {
  pub total:     i64,
  pub completed: i64,
}

/// Everything `load_stats` reads, before decoding.
pub struct RawStats {
  pub level:             Option<RawUserLevel>,
  pub lessons_completed: i64,
  pub courses:           Vec<RawCourseTally>,
  pub counters:          Vec<(String, i64)>,
}

impl RawStats {
  pub fn into_stats(self) -> Result<UserStats> {
    let mut stats = UserStats {
      lessons_completed: decode_count("lesson_progress", self.lessons_completed)?,
      ..UserStats::default()
    };

    if let Some(level) = self.level {
      stats.xp = decode_count("user_levels.xp", level.xp)?;
      stats.streak_days = decode_small("user_levels.streak_days", level.streak_days)?;
    }

    for tally in self.courses {
      let total = decode_small::<usize>("course_lessons", tally.total)?;
      let completed = decode_small::<usize>("lesson_progress", tally.completed)?;
      if total > 0 && completed == total {
        stats.courses_completed += 1;
      }
      stats.best_course_percentage = stats
        .best_course_percentage
        .max(waypoint_core::ledger::completion_percentage(completed, total));
    }

    for (name, value) in self.counters {
      let counter = decode_counter(&name)?;
      *stats.counter_mut(counter) = decode_count("activity_counters.value", value)?;
    }

    Ok(stats)
  }
}
