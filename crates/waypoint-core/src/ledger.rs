//! Lesson progress records and course-level aggregation.
//!
//! A lesson's completion flag only ever moves from `false` to `true`; that
//! transition is the completion event that drives XP awards. Course progress
//! is never stored, it is recomputed from the lesson rows on every read.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Lesson progress ─────────────────────────────────────────────────────────

/// One row per (user, lesson), created on first access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
  pub user_id:          Uuid,
  pub lesson_id:        Uuid,
  pub is_completed:     bool,
  /// Playback offset; may move backwards on seek.
  pub position_seconds: u32,
  pub last_accessed_at: DateTime<Utc>,
  /// Set by the completion event and never changed afterwards.
  pub completed_at:     Option<DateTime<Utc>>,
}

/// Input to [`crate::store::ProgressStore::save_lesson_progress`]. Absent
/// fields leave the stored value alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgressUpdate {
  pub is_completed:     Option<bool>,
  pub position_seconds: Option<u32>,
}

impl LessonProgressUpdate {
  pub fn completed() -> Self {
    Self { is_completed: Some(true), position_seconds: None }
  }

  pub fn position(seconds: u32) -> Self {
    Self { is_completed: None, position_seconds: Some(seconds) }
  }

  pub fn completes(&self) -> bool { self.is_completed == Some(true) }
}

/// Outcome of an upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonWrite {
  pub progress:        LessonProgress,
  /// `true` only for the single write that flipped `is_completed`.
  pub newly_completed: bool,
}

impl LessonProgress {
  pub fn new(user_id: Uuid, lesson_id: Uuid, now: DateTime<Utc>) -> Self {
    Self {
      user_id,
      lesson_id,
      is_completed: false,
      position_seconds: 0,
      last_accessed_at: now,
      completed_at: None,
    }
  }

  /// Apply `update` to an existing row (or a fresh one). This is the
  /// reference semantics every store must reproduce atomically.
  pub fn apply(
    existing: Option<Self>,
    user_id: Uuid,
    lesson_id: Uuid,
    update: LessonProgressUpdate,
    now: DateTime<Utc>,
  ) -> LessonWrite {
    let mut progress =
      existing.unwrap_or_else(|| Self::new(user_id, lesson_id, now));

    progress.last_accessed_at = now;
    if let Some(pos) = update.position_seconds {
      progress.position_seconds = pos;
    }

    let newly_completed = update.completes() && !progress.is_completed;
    if newly_completed {
      progress.is_completed = true;
      progress.completed_at = Some(now);
    }

    LessonWrite { progress, newly_completed }
  }
}

// ─── Course progress ─────────────────────────────────────────────────────────

/// Derived completion summary for one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgress {
  pub course_id:            Uuid,
  pub completed_lessons:    usize,
  pub total_lessons:        usize,
  /// `round(completed / total * 100)`, held at 99 until every lesson is
  /// done; `0` for a course without lessons.
  pub percentage:           u8,
  /// The lesson to resume from, by most recent access.
  pub last_accessed_lesson: Option<Uuid>,
  pub last_accessed_at:     Option<DateTime<Utc>>,
}

impl CourseProgress {
  pub fn is_complete(&self) -> bool {
    self.total_lessons > 0 && self.completed_lessons == self.total_lessons
  }
}

/// `round(completed / total * 100)`, or `0` when `total` is zero.
///
/// Only a finished course reads 100, so the percentage agrees with
/// [`CourseProgress::is_complete`] and `course_completion` triggers.
pub fn completion_percentage(completed: usize, total: usize) -> u8 {
  if total == 0 {
    return 0;
  }
  let completed = completed.min(total);
  let rounded = (completed as f64 / total as f64 * 100.0).round() as u8;
  if completed < total { rounded.min(99) } else { rounded }
}

/// Aggregate `progress` rows against the course's lesson list. Rows for
/// lessons outside the course are ignored.
pub fn course_progress(
  course_id: Uuid,
  lessons: &[Uuid],
  progress: &[LessonProgress],
) -> CourseProgress {
  let lesson_set: HashSet<Uuid> = lessons.iter().copied().collect();
  let rows: Vec<&LessonProgress> = progress
    .iter()
    .filter(|p| lesson_set.contains(&p.lesson_id))
    .collect();

  let completed: HashSet<Uuid> = rows
    .iter()
    .filter(|p| p.is_completed)
    .map(|p| p.lesson_id)
    .collect();

  let last = rows.iter().max_by_key(|p| p.last_accessed_at);

  let total = lesson_set.len();

  CourseProgress {
    course_id,
    completed_lessons: completed.len(),
    total_lessons: total,
    percentage: completion_percentage(completed.len(), total),
    last_accessed_lesson: last.map(|p| p.lesson_id),
    last_accessed_at: last.map(|p| p.last_accessed_at),
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap() }

  fn row(lesson: Uuid, completed: bool, accessed: i64) -> LessonProgress {
    LessonProgress {
      user_id:          Uuid::nil(),
      lesson_id:        lesson,
      is_completed:     completed,
      position_seconds: 0,
      last_accessed_at: at(accessed),
      completed_at:     completed.then(|| at(accessed)),
    }
  }

  #[test]
  fn first_access_creates_incomplete_row() {
    let lesson = Uuid::new_v4();
    let w = LessonProgress::apply(
      None,
      Uuid::nil(),
      lesson,
      LessonProgressUpdate::position(42),
      at(0),
    );
    assert!(!w.newly_completed);
    assert!(!w.progress.is_completed);
    assert_eq!(w.progress.position_seconds, 42);
  }

  #[test]
  fn completion_fires_once() {
    let lesson = Uuid::new_v4();
    let first = LessonProgress::apply(
      None,
      Uuid::nil(),
      lesson,
      LessonProgressUpdate::completed(),
      at(0),
    );
    assert!(first.newly_completed);
    assert_eq!(first.progress.completed_at, Some(at(0)));

    let second = LessonProgress::apply(
      Some(first.progress),
      Uuid::nil(),
      lesson,
      LessonProgressUpdate::completed(),
      at(10),
    );
    assert!(!second.newly_completed);
    assert_eq!(second.progress.completed_at, Some(at(0)));
    assert_eq!(second.progress.last_accessed_at, at(10));
  }

  #[test]
  fn completion_cannot_be_undone() {
    let lesson = Uuid::new_v4();
    let done = row(lesson, true, 0);
    let w = LessonProgress::apply(
      Some(done),
      Uuid::nil(),
      lesson,
      LessonProgressUpdate { is_completed: Some(false), position_seconds: Some(3) },
      at(5),
    );
    assert!(w.progress.is_completed);
    assert_eq!(w.progress.position_seconds, 3);
  }

  #[test]
  fn course_percentage_rounds() {
    let lessons: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    let progress = vec![row(lessons[0], true, 0), row(lessons[1], false, 5)];

    let cp = course_progress(Uuid::nil(), &lessons, &progress);
    assert_eq!(cp.completed_lessons, 1);
    assert_eq!(cp.total_lessons, 3);
    assert_eq!(cp.percentage, 33);
    assert!(!cp.is_complete());

    let progress = vec![row(lessons[0], true, 0), row(lessons[1], true, 5)];
    assert_eq!(course_progress(Uuid::nil(), &lessons, &progress).percentage, 67);
  }

  #[test]
  fn nearly_finished_course_is_not_100() {
    assert_eq!(completion_percentage(199, 200), 99);
    assert_eq!(completion_percentage(1, 200), 1);
    assert_eq!(completion_percentage(200, 200), 100);

    let lessons: Vec<Uuid> = (0..200).map(|_| Uuid::new_v4()).collect();
    let progress: Vec<LessonProgress> =
      lessons[..199].iter().map(|l| row(*l, true, 0)).collect();
    let cp = course_progress(Uuid::nil(), &lessons, &progress);
    assert_eq!(cp.percentage, 99);
    assert!(!cp.is_complete());
  }

  #[test]
  fn resume_points_at_most_recent_access() {
    let lessons: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    let progress = vec![
      row(lessons[0], true, 100),
      row(lessons[2], false, 300),
      row(lessons[1], false, 200),
    ];
    let cp = course_progress(Uuid::nil(), &lessons, &progress);
    assert_eq!(cp.last_accessed_lesson, Some(lessons[2]));
    assert_eq!(cp.last_accessed_at, Some(at(0) + Duration::seconds(300)));
  }

  #[test]
  fn rows_outside_course_are_ignored() {
    let lessons = vec![Uuid::new_v4()];
    let progress = vec![row(Uuid::new_v4(), true, 999), row(lessons[0], true, 1)];
    let cp = course_progress(Uuid::nil(), &lessons, &progress);
    assert_eq!(cp.percentage, 100);
    assert!(cp.is_complete());
    assert_eq!(cp.last_accessed_lesson, Some(lessons[0]));
  }

  #[test]
  fn empty_course_is_zero_percent() {
    let cp = course_progress(Uuid::nil(), &[], &[]);
    assert_eq!(cp.percentage, 0);
    assert!(!cp.is_complete());
    assert_eq!(cp.last_accessed_lesson, None);
  }
}
