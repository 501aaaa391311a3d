//! The progression engine.
//!
//! [`Engine`] is the explicit progression context: validated [`Rules`] plus
//! an injected [`ProgressStore`]. Every progress-changing call runs the same
//! pipeline:
//!
//! 1. the event-specific ledger write (lesson, activity counter, skill node)
//!    and the XP it grants;
//! 2. the daily streak update;
//! 3. a full-catalog achievement pass, repeated while unlock rewards keep
//!    raising XP;
//! 4. the level recomputation reported back to the caller.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
  Error,
  achievement::{EvaluationFailure, evaluate_all},
  ledger::{self, CourseProgress, LessonProgress, LessonProgressUpdate},
  level::LevelInfo,
  reference::{ReferenceData, Rules},
  skill::{NodeId, NodeState},
  stats::{Activity, StatsSnapshot},
  store::{ProgressStore, UserAchievement, XpAward},
  streak::Streak,
};

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError<E> {
  #[error(transparent)]
  Core(#[from] Error),

  #[error("store error: {0}")]
  Store(#[source] E),
}

pub type EngineResult<T, E> = std::result::Result<T, EngineError<E>>;

// ─── Outputs ─────────────────────────────────────────────────────────────────

/// A user's current level and streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserLevel {
  pub user_id: Uuid,
  #[serde(flatten)]
  pub level:   LevelInfo,
  pub streak:  Streak,
}

/// Everything a progress-changing call caused, for the host's notification
/// layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
  pub xp_awarded:            u64,
  pub level_before:          u8,
  pub level:                 LevelInfo,
  pub leveled_up:            bool,
  pub streak:                Streak,
  /// The lesson row after the write, for lesson progress calls.
  pub lesson:                Option<LessonProgress>,
  /// Courses that reached 100% because of this call.
  pub completed_courses:     Vec<Uuid>,
  pub unlocked_achievements: Vec<String>,
  /// Skill nodes that moved from locked to available.
  pub newly_available_nodes: Vec<NodeId>,
  pub evaluation_failures:   Vec<EvaluationFailure>,
}

/// Event-specific results carried into the shared tail of the pipeline.
struct Pending {
  xp_before:             u64,
  xp_awarded:            u64,
  lesson:                Option<LessonProgress>,
  completed_courses:     Vec<Uuid>,
  newly_available_nodes: Vec<NodeId>,
}

impl Pending {
  fn new(xp_before: u64) -> Self {
    Self {
      xp_before,
      xp_awarded: 0,
      lesson: None,
      completed_courses: Vec::new(),
      newly_available_nodes: Vec::new(),
    }
  }
}

#[derive(Default)]
struct Unlocks {
  codes:    Vec<String>,
  xp:       u64,
  failures: Vec<EvaluationFailure>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Engine<S> {
  store: S,
  rules: Arc<Rules>,
}

impl<S: ProgressStore> Engine<S> {
  /// Validate `reference` and build an engine around `store`. Bad reference
  /// data fails here with [`Error::Configuration`].
  pub fn new(store: S, reference: ReferenceData) -> crate::Result<Self> {
    Ok(Self::with_rules(store, Rules::new(reference)?))
  }

  pub fn with_rules(store: S, rules: Rules) -> Self {
    Self { store, rules: Arc::new(rules) }
  }

  pub fn rules(&self) -> &Rules { &self.rules }

  pub fn store(&self) -> &S { &self.store }

  // ── Reads ─────────────────────────────────────────────────────────────

  pub async fn user_level(&self, user_id: Uuid) -> EngineResult<UserLevel, S::Error> {
    let xp = self.xp(user_id).await?;
    let streak = self
      .store
      .load_streak(user_id)
      .await
      .map_err(EngineError::Store)?;

    Ok(UserLevel { user_id, level: self.rules.levels.info(xp), streak })
  }

  /// Completion percentage of a course plus the lesson to resume from.
  pub async fn course_progress(
    &self,
    user_id: Uuid,
    course_id: Uuid,
  ) -> EngineResult<CourseProgress, S::Error> {
    let lessons = self
      .store
      .course_lessons(course_id)
      .await
      .map_err(EngineError::Store)?
      .ok_or(Error::UnknownCourse(course_id))?;

    let rows = self
      .store
      .lesson_progress(user_id, lessons.clone())
      .await
      .map_err(EngineError::Store)?;

    Ok(ledger::course_progress(course_id, &lessons, &rows))
  }

  pub async fn achievements(
    &self,
    user_id: Uuid,
  ) -> EngineResult<Vec<UserAchievement>, S::Error> {
    self
      .store
      .unlocked_achievements(user_id)
      .await
      .map_err(EngineError::Store)
  }

  pub async fn skill_tree(&self, user_id: Uuid) -> EngineResult<Vec<NodeState>, S::Error> {
    let completed = self
      .store
      .completed_nodes(user_id)
      .await
      .map_err(EngineError::Store)?;
    Ok(self.rules.skill_tree.statuses(&completed))
  }

  // ── Course structure ──────────────────────────────────────────────────

  /// Register the ordered lesson list of a course.
  pub async fn set_course_lessons(
    &self,
    course_id: Uuid,
    lesson_ids: Vec<Uuid>,
  ) -> EngineResult<(), S::Error> {
    let mut seen = HashSet::with_capacity(lesson_ids.len());
    if let Some(dup) = lesson_ids.iter().find(|id| !seen.insert(**id)) {
      return Err(
        Error::InvalidInput(format!("lesson {dup} is listed twice")).into(),
      );
    }

    self
      .store
      .set_course_lessons(course_id, lesson_ids)
      .await
      .map_err(EngineError::Store)
  }

  // ── Progress-changing events ──────────────────────────────────────────

  /// Upsert a lesson's progress. The first completion awards the lesson XP
  /// and, for every course the lesson closes out, the course XP.
  ///
  /// Awards are keyed, so they are re-attempted on every call that finds the
  /// lesson completed. A grant lost to a store error after the completion
  /// was committed is made up by the next call for that lesson.
  pub async fn record_lesson_progress(
    &self,
    user_id: Uuid,
    lesson_id: Uuid,
    update: LessonProgressUpdate,
    now: DateTime<Utc>,
  ) -> EngineResult<ProgressReport, S::Error> {
    let mut pending = Pending::new(self.xp(user_id).await?);

    let write = self
      .store
      .save_lesson_progress(user_id, lesson_id, update, now)
      .await
      .map_err(EngineError::Store)?;

    if write.newly_completed {
      tracing::debug!(%user_id, %lesson_id, "lesson completed");
    }

    if write.progress.is_completed {
      let reward = self.rules.rewards.lesson_completion;
      pending.xp_awarded += self
        .award(user_id, XpAward::lesson(lesson_id, reward), now)
        .await?
        .unwrap_or(0);

      let courses = self
        .store
        .courses_containing(lesson_id)
        .await
        .map_err(EngineError::Store)?;

      for course_id in courses {
        if !self.course_progress(user_id, course_id).await?.is_complete() {
          continue;
        }
        let reward = self.rules.rewards.course_completion;
        if let Some(xp) = self.award(user_id, XpAward::course(course_id, reward), now).await? {
          tracing::info!(%user_id, %course_id, "course completed");
          pending.xp_awarded += xp;
          pending.completed_courses.push(course_id);
        }
      }
    }

    pending.lesson = Some(write.progress);
    self.finish(user_id, now, pending).await
  }

  /// Count a non-completion activity (course view, prompt copy, ...).
  pub async fn record_activity(
    &self,
    user_id: Uuid,
    activity: Activity,
    now: DateTime<Utc>,
  ) -> EngineResult<ProgressReport, S::Error> {
    let pending = Pending::new(self.xp(user_id).await?);

    let (counter, amount) = activity.increment();
    let total = self
      .store
      .bump_counter(user_id, counter, amount)
      .await
      .map_err(EngineError::Store)?;
    tracing::debug!(%user_id, %counter, total, "activity recorded");

    self.finish(user_id, now, pending).await
  }

  /// Complete a skill node. Fails with [`Error::PrerequisiteNotMet`] while
  /// the node is locked.
  pub async fn complete_node(
    &self,
    user_id: Uuid,
    node_id: &str,
    now: DateTime<Utc>,
  ) -> EngineResult<ProgressReport, S::Error> {
    let mut pending = Pending::new(self.xp(user_id).await?);

    let mut completed = self
      .store
      .completed_nodes(user_id)
      .await
      .map_err(EngineError::Store)?;
    let was_completed = completed.contains(node_id);

    let unlocked = self.rules.skill_tree.complete_node(&mut completed, node_id)?;

    if !was_completed {
      let saved = self
        .store
        .save_node_completion(user_id, node_id.to_owned(), now)
        .await
        .map_err(EngineError::Store)?;

      // A concurrent request got there first and reports the unlocks.
      if saved {
        tracing::debug!(%user_id, node_id, ?unlocked, "skill node completed");
        pending.newly_available_nodes = unlocked;
      }
    }

    self.finish(user_id, now, pending).await
  }

  // ── Pipeline internals ────────────────────────────────────────────────

  async fn xp(&self, user_id: Uuid) -> EngineResult<u64, S::Error> {
    Ok(
      self
        .store
        .load_stats(user_id)
        .await
        .map_err(EngineError::Store)?
        .xp,
    )
  }

  /// Grant an award; `Some(amount)` only for the first grant of its key.
  async fn award(
    &self,
    user_id: Uuid,
    award: XpAward,
    now: DateTime<Utc>,
  ) -> EngineResult<Option<u64>, S::Error> {
    let amount = award.amount;
    let key = award.key.clone();
    let total = self
      .store
      .award_xp(user_id, award, now)
      .await
      .map_err(EngineError::Store)?;

    match total {
      Some(total) => {
        tracing::debug!(%user_id, %key, amount, total, "xp awarded");
        Ok(Some(amount))
      }
      None => Ok(None),
    }
  }

  async fn finish(
    &self,
    user_id: Uuid,
    now: DateTime<Utc>,
    mut pending: Pending,
  ) -> EngineResult<ProgressReport, S::Error> {
    let streak = self.touch_streak(user_id, now.date_naive()).await?;
    let unlocks = self.unlock_achievements(user_id, now).await?;
    pending.xp_awarded += unlocks.xp;

    let level = self.rules.levels.info(self.xp(user_id).await?);
    let level_before = self.rules.levels.level_for(pending.xp_before);
    let leveled_up = level.level > level_before;
    if leveled_up {
      tracing::info!(
        %user_id,
        from = level_before,
        to = level.level,
        title = %level.title,
        "level up"
      );
    }

    Ok(ProgressReport {
      xp_awarded: pending.xp_awarded,
      level_before,
      level,
      leveled_up,
      streak,
      lesson: pending.lesson,
      completed_courses: pending.completed_courses,
      unlocked_achievements: unlocks.codes,
      newly_available_nodes: pending.newly_available_nodes,
      evaluation_failures: unlocks.failures,
    })
  }

  /// Advance the streak at most once per calendar day.
  async fn touch_streak(
    &self,
    user_id: Uuid,
    today: NaiveDate,
  ) -> EngineResult<Streak, S::Error> {
    let current = self
      .store
      .load_streak(user_id)
      .await
      .map_err(EngineError::Store)?;
    if !current.is_stale(today) {
      return Ok(current);
    }

    let next = current.advance(today);
    let saved = self
      .store
      .save_streak(user_id, current.last_activity, next)
      .await
      .map_err(EngineError::Store)?;

    if saved {
      tracing::debug!(%user_id, days = next.days, "streak updated");
      return Ok(next);
    }

    self
      .store
      .load_streak(user_id)
      .await
      .map_err(EngineError::Store)
  }

  /// Evaluate the whole catalog, unlocking and rewarding what qualifies.
  ///
  /// Rewards raise XP and therefore the level, which `level` requirements
  /// read, so evaluation repeats until a pass grants no XP. Each pass
  /// unlocks at least one new code, which bounds the loop by the catalog
  /// size.
  async fn unlock_achievements(
    &self,
    user_id: Uuid,
    now: DateTime<Utc>,
  ) -> EngineResult<Unlocks, S::Error> {
    let mut unlocked: HashSet<String> = self
      .store
      .unlocked_achievements(user_id)
      .await
      .map_err(EngineError::Store)?
      .into_iter()
      .map(|ua| ua.code)
      .collect();

    let mut out = Unlocks::default();
    let catalog = &self.rules.achievements;

    for pass in 0..=catalog.len() {
      let stats = self
        .store
        .load_stats(user_id)
        .await
        .map_err(EngineError::Store)?;
      let snapshot = StatsSnapshot { level: self.rules.levels.level_for(stats.xp), stats };

      let evaluation = evaluate_all(catalog, &snapshot, &unlocked);
      if pass == 0 {
        out.failures = evaluation.failures;
      }
      if evaluation.unlocked.is_empty() {
        break;
      }

      let mut granted = false;
      for achievement in evaluation.unlocked {
        unlocked.insert(achievement.code.clone());

        // The unlock and its reward land in one write, so an error leaves
        // neither behind and the next evaluation retries both.
        let Some(xp) = self
          .store
          .save_unlock(user_id, achievement.code.clone(), achievement.xp_reward, now)
          .await
          .map_err(EngineError::Store)?
        else {
          continue;
        };

        tracing::info!(
          %user_id,
          code = %achievement.code,
          tier = %achievement.tier,
          xp,
          "achievement unlocked"
        );
        out.codes.push(achievement.code.clone());
        out.xp += xp;
        granted |= xp > 0;
      }

      if !granted {
        break;
      }
    }

    Ok(out)
  }
}
