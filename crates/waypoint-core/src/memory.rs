//! In-memory [`ProgressStore`] used by the engine tests.
//!
//! [`MemoryStore::fail_next`] makes the next call of one operation fail, for
//! checking what the engine leaves behind after a store error.

use std::{
  collections::{HashMap, HashSet},
  sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  ledger::{LessonProgress, LessonProgressUpdate, LessonWrite, course_progress},
  skill::NodeId,
  stats::{Counter, UserStats},
  store::{ProgressStore, UserAchievement, XpAward},
  streak::Streak,
};

#[derive(Debug, Default)]
struct Inner {
  xp:           HashMap<Uuid, u64>,
  award_keys:   HashSet<(Uuid, String)>,
  streaks:      HashMap<Uuid, Streak>,
  lessons:      HashMap<(Uuid, Uuid), LessonProgress>,
  courses:      HashMap<Uuid, Vec<Uuid>>,
  counters:     HashMap<(Uuid, Counter), u64>,
  achievements: Vec<UserAchievement>,
  nodes:        HashSet<(Uuid, NodeId)>,
  fail_next:    HashSet<&'static str>,
}

#[derive(Debug, Error)]
#[error("injected failure in {0}")]
pub struct Injected(&'static str);

type Result<T, E = Injected> = std::result::Result<T, E>;

#[derive(Debug, Default)]
pub struct MemoryStore {
  inner: Mutex<Inner>,
}

impl MemoryStore {
  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Fail the next call of `op` (a [`ProgressStore`] method name).
  pub fn fail_next(&self, op: &'static str) { self.lock().fail_next.insert(op); }

  fn check(inner: &mut Inner, op: &'static str) -> Result<()> {
    if inner.fail_next.remove(op) {
      return Err(Injected(op));
    }
    Ok(())
  }
}

impl ProgressStore for MemoryStore {
  type Error = Injected;

  async fn load_stats(&self, user_id: Uuid) -> Result<UserStats> {
    let inner = self.lock();

    let rows: Vec<LessonProgress> = inner
      .lessons
      .values()
      .filter(|p| p.user_id == user_id)
      .cloned()
      .collect();

    let mut stats = UserStats {
      xp: inner.xp.get(&user_id).copied().unwrap_or(0),
      streak_days: inner.streaks.get(&user_id).map_or(0, |s| s.days),
      lessons_completed: rows.iter().filter(|p| p.is_completed).count() as u64,
      ..UserStats::default()
    };

    for (&course_id, lessons) in &inner.courses {
      let cp = course_progress(course_id, lessons, &rows);
      if cp.is_complete() {
        stats.courses_completed += 1;
      }
      stats.best_course_percentage = stats.best_course_percentage.max(cp.percentage);
    }

    for (&(uid, counter), &value) in &inner.counters {
      if uid == user_id {
        *stats.counter_mut(counter) = value;
      }
    }

    Ok(stats)
  }

  async fn load_streak(&self, user_id: Uuid) -> Result<Streak> {
    Ok(self.lock().streaks.get(&user_id).copied().unwrap_or_default())
  }

  async fn save_streak(
    &self,
    user_id: Uuid,
    expected: Option<NaiveDate>,
    streak: Streak,
  ) -> Result<bool> {
    let mut inner = self.lock();
    let entry = inner.streaks.entry(user_id).or_default();
    if entry.last_activity != expected {
      return Ok(false);
    }
    *entry = streak;
    Ok(true)
  }

  async fn award_xp(
    &self,
    user_id: Uuid,
    award: XpAward,
    _at: DateTime<Utc>,
  ) -> Result<Option<u64>> {
    let mut inner = self.lock();
    Self::check(&mut inner, "award_xp")?;
    if !inner.award_keys.insert((user_id, award.key)) {
      return Ok(None);
    }
    let xp = inner.xp.entry(user_id).or_default();
    *xp += award.amount;
    Ok(Some(*xp))
  }

  async fn save_lesson_progress(
    &self,
    user_id: Uuid,
    lesson_id: Uuid,
    update: LessonProgressUpdate,
    now: DateTime<Utc>,
  ) -> Result<LessonWrite> {
    let mut inner = self.lock();
    let existing = inner.lessons.get(&(user_id, lesson_id)).cloned();
    let write = LessonProgress::apply(existing, user_id, lesson_id, update, now);
    inner.lessons.insert((user_id, lesson_id), write.progress.clone());
    Ok(write)
  }

  async fn lesson_progress(
    &self,
    user_id: Uuid,
    lesson_ids: Vec<Uuid>,
  ) -> Result<Vec<LessonProgress>> {
    let inner = self.lock();
    Ok(
      lesson_ids
        .iter()
        .filter_map(|l| inner.lessons.get(&(user_id, *l)).cloned())
        .collect(),
    )
  }

  async fn set_course_lessons(
    &self,
    course_id: Uuid,
    lesson_ids: Vec<Uuid>,
  ) -> Result<()> {
    self.lock().courses.insert(course_id, lesson_ids);
    Ok(())
  }

  async fn course_lessons(&self, course_id: Uuid) -> Result<Option<Vec<Uuid>>> {
    Ok(self.lock().courses.get(&course_id).cloned())
  }

  async fn courses_containing(&self, lesson_id: Uuid) -> Result<Vec<Uuid>> {
    Ok(
      self
        .lock()
        .courses
        .iter()
        .filter(|(_, lessons)| lessons.contains(&lesson_id))
        .map(|(&c, _)| c)
        .collect(),
    )
  }

  async fn bump_counter(
    &self,
    user_id: Uuid,
    counter: Counter,
    amount: u64,
  ) -> Result<u64> {
    let mut inner = self.lock();
    let value = inner.counters.entry((user_id, counter)).or_default();
    *value += amount;
    Ok(*value)
  }

  async fn unlocked_achievements(
    &self,
    user_id: Uuid,
  ) -> Result<Vec<UserAchievement>> {
    Ok(
      self
        .lock()
        .achievements
        .iter()
        .filter(|ua| ua.user_id == user_id)
        .cloned()
        .collect(),
    )
  }

  async fn save_unlock(
    &self,
    user_id: Uuid,
    code: String,
    xp_reward: u64,
    at: DateTime<Utc>,
  ) -> Result<Option<u64>> {
    let mut inner = self.lock();
    Self::check(&mut inner, "save_unlock")?;
    if inner
      .achievements
      .iter()
      .any(|ua| ua.user_id == user_id && ua.code == code)
    {
      return Ok(None);
    }

    let key = XpAward::achievement(&code, xp_reward).key;
    let granted = if inner.award_keys.insert((user_id, key)) { xp_reward } else { 0 };
    *inner.xp.entry(user_id).or_default() += granted;
    inner.achievements.push(UserAchievement { user_id, code, unlocked_at: at });
    Ok(Some(granted))
  }

  async fn completed_nodes(&self, user_id: Uuid) -> Result<HashSet<NodeId>> {
    Ok(
      self
        .lock()
        .nodes
        .iter()
        .filter(|(uid, _)| *uid == user_id)
        .map(|(_, node)| node.clone())
        .collect(),
    )
  }

  async fn save_node_completion(
    &self,
    user_id: Uuid,
    node_id: NodeId,
    _at: DateTime<Utc>,
  ) -> Result<bool> {
    Ok(self.lock().nodes.insert((user_id, node_id)))
  }
}
