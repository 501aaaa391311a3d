//! The `ProgressStore` trait and the records it persists.
//!
//! The engine only ever talks to persistence through this trait.
//! Implementations must make every "first time" write conditional so that
//! concurrent callers cannot both observe the transition:
//!
//! - `save_lesson_progress` flips `is_completed` with a write that only
//!   succeeds while it is still `false`;
//! - `award_xp` grants an award key at most once per user;
//! - `save_unlock` inserts at most once, together with its reward;
//! - `save_node_completion` inserts at most once;
//! - `save_streak` is a compare-and-set on the previous activity date.

use std::{collections::HashSet, future::Future};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  ledger::{LessonProgress, LessonProgressUpdate, LessonWrite},
  skill::NodeId,
  stats::{Counter, UserStats},
  streak::Streak,
};

// ─── Records ─────────────────────────────────────────────────────────────────

/// A one-time XP grant, identified per user by `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpAward {
  pub key:    String,
  pub amount: u64,
}

impl XpAward {
  pub fn lesson(lesson_id: Uuid, amount: u64) -> Self {
    Self { key: format!("lesson:{lesson_id}"), amount }
  }

  pub fn course(course_id: Uuid, amount: u64) -> Self {
    Self { key: format!("course:{course_id}"), amount }
  }

  pub fn achievement(code: &str, amount: u64) -> Self {
    Self { key: format!("achievement:{code}"), amount }
  }
}

/// Records that a user unlocked an achievement. At most one per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAchievement {
  pub user_id:     Uuid,
  pub code:        String,
  pub unlocked_at: DateTime<Utc>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a progression persistence backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait ProgressStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Snapshot ──────────────────────────────────────────────────────────

  /// Aggregate the user's statistics. Unknown users yield all-zero stats.
  fn load_stats(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<UserStats, Self::Error>> + Send + '_;

  fn load_streak(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Streak, Self::Error>> + Send + '_;

  /// Store `streak` only if the stored last-activity date still equals
  /// `expected`. Returns whether the write happened.
  fn save_streak(
    &self,
    user_id: Uuid,
    expected: Option<NaiveDate>,
    streak: Streak,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── XP ────────────────────────────────────────────────────────────────

  /// Grant `award` unless its key was already granted to this user.
  /// Returns the new XP total when granted, `None` otherwise. A grant that
  /// would overflow the total fails without writing anything.
  fn award_xp(
    &self,
    user_id: Uuid,
    award: XpAward,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<u64>, Self::Error>> + Send + '_;

  // ── Ledger ────────────────────────────────────────────────────────────

  /// Upsert the (user, lesson) row following [`LessonProgress::apply`].
  /// `newly_completed` must be `true` for exactly one caller per row.
  fn save_lesson_progress(
    &self,
    user_id: Uuid,
    lesson_id: Uuid,
    update: LessonProgressUpdate,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<LessonWrite, Self::Error>> + Send + '_;

  /// Progress rows for the given lessons; lessons never accessed are
  /// absent.
  fn lesson_progress(
    &self,
    user_id: Uuid,
    lesson_ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<Vec<LessonProgress>, Self::Error>> + Send + '_;

  /// Replace the ordered lesson list of a course.
  fn set_course_lessons(
    &self,
    course_id: Uuid,
    lesson_ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The lesson list of a course, or `None` if the course is unknown.
  fn course_lessons(
    &self,
    course_id: Uuid,
  ) -> impl Future<Output = Result<Option<Vec<Uuid>>, Self::Error>> + Send + '_;

  fn courses_containing(
    &self,
    lesson_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  // ── Activity ──────────────────────────────────────────────────────────

  /// Add `amount` to a counter and return its new value. An addition that
  /// would overflow fails and leaves the counter unchanged.
  fn bump_counter(
    &self,
    user_id: Uuid,
    counter: Counter,
    amount: u64,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Achievements ──────────────────────────────────────────────────────

  fn unlocked_achievements(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<UserAchievement>, Self::Error>> + Send + '_;

  /// Record an unlock and grant `xp_reward` under the
  /// [`XpAward::achievement`] key in the same write.
  ///
  /// Returns `None` if the achievement was already unlocked, otherwise the
  /// XP actually granted (`0` if the award key had been spent before).
  fn save_unlock(
    &self,
    user_id: Uuid,
    code: String,
    xp_reward: u64,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<u64>, Self::Error>> + Send + '_;

  // ── Skill tree ────────────────────────────────────────────────────────

  fn completed_nodes(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<HashSet<NodeId>, Self::Error>> + Send + '_;

  /// Record a node completion; returns `false` if it already existed.
  fn save_node_completion(
    &self,
    user_id: Uuid,
    node_id: NodeId,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
