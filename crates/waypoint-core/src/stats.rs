//! User statistics and the activity events that feed them.

use serde::{Deserialize, Serialize};

// ─── Counters ────────────────────────────────────────────────────────────────

/// Monotonic per-user activity counters kept by the store. The string form
/// is the `counter` column value.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
  strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Counter {
  CourseViews,
  PromptCopies,
  PlatformVisits,
  Shares,
  Bookmarks,
  ImpactValue,
}

/// A non-completion event reported by the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Activity {
  CourseView,
  PromptCopy,
  PlatformVisit,
  Share,
  Bookmark,
  /// Money value the user reports having gained from the platform.
  Impact { amount: u64 },
}

impl Activity {
  /// The counter this activity bumps, and by how much.
  pub fn increment(&self) -> (Counter, u64) {
    match *self {
      Self::CourseView => (Counter::CourseViews, 1),
      Self::PromptCopy => (Counter::PromptCopies, 1),
      Self::PlatformVisit => (Counter::PlatformVisits, 1),
      Self::Share => (Counter::Shares, 1),
      Self::Bookmark => (Counter::Bookmarks, 1),
      Self::Impact { amount } => (Counter::ImpactValue, amount),
    }
  }
}

// ─── Stats ───────────────────────────────────────────────────────────────────

/// Raw per-user aggregates as assembled by a [`ProgressStore`].
///
/// [`ProgressStore`]: crate::store::ProgressStore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
  pub xp:                     u64,
  pub streak_days:            u32,
  pub lessons_completed:      u64,
  /// Courses whose every lesson is completed.
  pub courses_completed:      u64,
  /// Highest completion percentage across the user's courses.
  pub best_course_percentage: u8,
  pub course_views:           u64,
  pub prompt_copies:          u64,
  pub platform_visits:        u64,
  pub shares:                 u64,
  pub bookmarks:              u64,
  pub impact_value:           u64,
}

impl UserStats {
  pub fn counter(&self, counter: Counter) -> u64 {
    match counter {
      Counter::CourseViews => self.course_views,
      Counter::PromptCopies => self.prompt_copies,
      Counter::PlatformVisits => self.platform_visits,
      Counter::Shares => self.shares,
      Counter::Bookmarks => self.bookmarks,
      Counter::ImpactValue => self.impact_value,
    }
  }

  pub fn counter_mut(&mut self, counter: Counter) -> &mut u64 {
    match counter {
      Counter::CourseViews => &mut self.course_views,
      Counter::PromptCopies => &mut self.prompt_copies,
      Counter::PlatformVisits => &mut self.platform_visits,
      Counter::Shares => &mut self.shares,
      Counter::Bookmarks => &mut self.bookmarks,
      Counter::ImpactValue => &mut self.impact_value,
    }
  }
}

/// Read-only input to achievement evaluation: the store's aggregates plus
/// the level derived from them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
  pub level: u8,
  #[serde(flatten)]
  pub stats: UserStats,
}

#[cfg(test)]
mod tests {
  use std::str::FromStr as _;

  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn counter_names_roundtrip() {
    for c in Counter::iter() {
      let name: &'static str = c.into();
      assert_eq!(Counter::from_str(name).unwrap(), c);
    }
    assert_eq!(Counter::PromptCopies.to_string(), "prompt_copies");
  }

  #[test]
  fn activity_deserializes_from_tagged_json() {
    let a: Activity = serde_json::from_str(r#"{"kind":"impact","amount":250}"#).unwrap();
    assert_eq!(a.increment(), (Counter::ImpactValue, 250));
    let a: Activity = serde_json::from_str(r#"{"kind":"prompt_copy"}"#).unwrap();
    assert_eq!(a.increment(), (Counter::PromptCopies, 1));
  }

  #[test]
  fn counter_mut_targets_matching_field() {
    let mut stats = UserStats::default();
    *stats.counter_mut(Counter::Shares) += 3;
    assert_eq!(stats.shares, 3);
    assert_eq!(stats.counter(Counter::Shares), 3);
  }
}
