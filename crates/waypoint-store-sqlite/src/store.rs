//! [`SqliteStore`], the SQLite implementation of [`ProgressStore`].

use std::{collections::HashSet, fmt, path::Path};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;
use waypoint_core::{
  ledger::{LessonProgress, LessonProgressUpdate, LessonWrite},
  skill::NodeId,
  stats::{Counter, UserStats},
  store::{ProgressStore, UserAchievement, XpAward},
  streak::Streak,
};

use crate::{
  Error, Result,
  encode::{
    RawCourseTally, RawLessonProgress, RawStats, RawUserAchievement, RawUserLevel,
    decode_count, decode_uuid, encode_count, encode_counter, encode_date, encode_dt,
    encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A progression store backed by a single SQLite file.
///
/// Cloning is cheap; clones share the same connection thread.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl fmt::Debug for SqliteStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SqliteStore").finish_non_exhaustive()
  }
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    tracing::debug!("sqlite schema ready");
    Ok(())
  }

  /// When `key` was granted to `user_id`, if it was.
  #[cfg(test)]
  pub(crate) async fn awarded_at(
    &self,
    user_id: Uuid,
    key: &str,
  ) -> Result<Option<DateTime<Utc>>> {
    let user_str = encode_uuid(user_id);
    let key      = key.to_owned();

    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT awarded_at FROM xp_awards WHERE user_id = ?1 AND award_key = ?2",
              rusqlite::params![user_str, key],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    raw.as_deref().map(crate::encode::decode_dt).transpose()
  }
}

fn ensure_user(conn: &rusqlite::Connection, user_id: &str) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO user_levels (user_id) VALUES (?1) ON CONFLICT(user_id) DO NOTHING",
    rusqlite::params![user_id],
  )?;
  Ok(())
}

/// Outcome of granting an award inside a transaction.
enum Grant {
  /// The key was granted before; nothing changed.
  Spent,
  /// The new total would not fit; the caller must roll back.
  Overflow,
  /// The new XP total.
  Total(i64),
}

/// Record the award key and add `amount` to the user's XP within the
/// caller's transaction.
fn grant(
  conn: &rusqlite::Connection,
  user_id: &str,
  key: &str,
  amount: i64,
  at: &str,
) -> rusqlite::Result<Grant> {
  let inserted = conn.execute(
    "INSERT INTO xp_awards (user_id, award_key, amount, awarded_at)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT(user_id, award_key) DO NOTHING",
    rusqlite::params![user_id, key, amount, at],
  )?;
  if inserted == 0 {
    return Ok(Grant::Spent);
  }

  ensure_user(conn, user_id)?;
  let current: i64 = conn.query_row(
    "SELECT xp FROM user_levels WHERE user_id = ?1",
    rusqlite::params![user_id],
    |row| row.get(0),
  )?;
  let Some(total) = current.checked_add(amount) else {
    return Ok(Grant::Overflow);
  };

  conn.execute(
    "UPDATE user_levels SET xp = ?2 WHERE user_id = ?1",
    rusqlite::params![user_id, total],
  )?;
  Ok(Grant::Total(total))
}

fn decode_uuids(raw: Vec<String>) -> Result<Vec<Uuid>> {
  raw.iter().map(|s| decode_uuid(s)).collect()
}

// ─── ProgressStore impl ──────────────────────────────────────────────────────

impl ProgressStore for SqliteStore {
  type Error = Error;

  // ── Snapshot ──────────────────────────────────────────────────────────────

  async fn load_stats(&self, user_id: Uuid) -> Result<UserStats> {
    let user_str = encode_uuid(user_id);

    let raw: RawStats = self
      .conn
      .call(move |conn| {
        let level = conn
          .query_row(
            "SELECT xp, streak_days, longest_streak, last_activity_date
             FROM user_levels WHERE user_id = ?1",
            rusqlite::params![user_str],
            |row| {
              Ok(RawUserLevel {
                xp:                 row.get(0)?,
                streak_days:        row.get(1)?,
                longest_streak:     row.get(2)?,
                last_activity_date: row.get(3)?,
              })
            },
          )
          .optional()?;

        let lessons_completed: i64 = conn.query_row(
          "SELECT COUNT(*) FROM lesson_progress WHERE user_id = ?1 AND is_completed = 1",
          rusqlite::params![user_str],
          |row| row.get(0),
        )?;

        // Only courses the user has touched can contribute a completion or
        // a non-zero percentage.
        let mut stmt = conn.prepare(
          "SELECT COUNT(*) AS total, COUNT(lp.lesson_id) AS completed
           FROM course_lessons cl
           LEFT JOIN lesson_progress lp
             ON lp.lesson_id = cl.lesson_id
            AND lp.user_id = ?1
            AND lp.is_completed = 1
           WHERE cl.course_id IN (
             SELECT DISTINCT c.course_id
             FROM course_lessons c
             JOIN lesson_progress p ON p.lesson_id = c.lesson_id
             WHERE p.user_id = ?1 AND p.is_completed = 1
           )
           GROUP BY cl.course_id",
        )?;
        let courses = stmt
          .query_map(rusqlite::params![user_str], |row| {
            Ok(RawCourseTally { total: row.get(0)?, completed: row.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt =
          conn.prepare("SELECT counter, value FROM activity_counters WHERE user_id = ?1")?;
        let counters = stmt
          .query_map(rusqlite::params![user_str], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(RawStats { level, lessons_completed, courses, counters })
      })
      .await?;

    raw.into_stats()
  }

  async fn load_streak(&self, user_id: Uuid) -> Result<Streak> {
    let user_str = encode_uuid(user_id);

    let raw: Option<RawUserLevel> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT xp, streak_days, longest_streak, last_activity_date
               FROM user_levels WHERE user_id = ?1",
              rusqlite::params![user_str],
              |row| {
                Ok(RawUserLevel {
                  xp:                 row.get(0)?,
                  streak_days:        row.get(1)?,
                  longest_streak:     row.get(2)?,
                  last_activity_date: row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map_or(Ok(Streak::default()), RawUserLevel::into_streak)
  }

  async fn save_streak(
    &self,
    user_id: Uuid,
    expected: Option<NaiveDate>,
    streak: Streak,
  ) -> Result<bool> {
    let user_str     = encode_uuid(user_id);
    let expected_str = expected.map(encode_date);
    let last_str     = streak.last_activity.map(encode_date);

    let changed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_user(&tx, &user_str)?;
        // `IS` so that a NULL expectation matches a NULL column.
        let changed = tx.execute(
          "UPDATE user_levels
           SET streak_days = ?2, longest_streak = ?3, last_activity_date = ?4
           WHERE user_id = ?1 AND last_activity_date IS ?5",
          rusqlite::params![user_str, streak.days, streak.longest, last_str, expected_str],
        )?;
        tx.commit()?;
        Ok(changed)
      })
      .await?;

    Ok(changed == 1)
  }

  // ── XP ────────────────────────────────────────────────────────────────────

  async fn award_xp(
    &self,
    user_id: Uuid,
    award: XpAward,
    at: DateTime<Utc>,
  ) -> Result<Option<u64>> {
    let user_str = encode_uuid(user_id);
    let amount   = encode_count(award.amount)?;
    let at_str   = encode_dt(at);
    let key      = award.key;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = grant(&tx, &user_str, &key, amount, &at_str)?;
        if let Grant::Total(_) = outcome {
          tx.commit()?;
        }
        Ok(outcome)
      })
      .await?;

    match outcome {
      Grant::Spent => Ok(None),
      Grant::Overflow => {
        Err(Error::AddOverflow { column: "user_levels.xp", amount: award.amount })
      }
      Grant::Total(total) => Ok(Some(decode_count("user_levels.xp", total)?)),
    }
  }

  // ── Ledger ────────────────────────────────────────────────────────────────

  async fn save_lesson_progress(
    &self,
    user_id: Uuid,
    lesson_id: Uuid,
    update: LessonProgressUpdate,
    now: DateTime<Utc>,
  ) -> Result<LessonWrite> {
    let user_str   = encode_uuid(user_id);
    let lesson_str = encode_uuid(lesson_id);
    let now_str    = encode_dt(now);

    let (raw, newly_completed): (RawLessonProgress, bool) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
          "INSERT INTO lesson_progress (user_id, lesson_id, last_accessed_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(user_id, lesson_id)
           DO UPDATE SET last_accessed_at = excluded.last_accessed_at",
          rusqlite::params![user_str, lesson_str, now_str],
        )?;

        if let Some(pos) = update.position_seconds {
          tx.execute(
            "UPDATE lesson_progress SET position_seconds = ?3
             WHERE user_id = ?1 AND lesson_id = ?2",
            rusqlite::params![user_str, lesson_str, pos],
          )?;
        }

        // The completion event: only the write that sees `is_completed = 0`
        // changes a row.
        let newly_completed = update.completes()
          && tx.execute(
            "UPDATE lesson_progress SET is_completed = 1, completed_at = ?3
             WHERE user_id = ?1 AND lesson_id = ?2 AND is_completed = 0",
            rusqlite::params![user_str, lesson_str, now_str],
          )? == 1;

        let raw = tx.query_row(
          &format!(
            "SELECT {} FROM lesson_progress WHERE user_id = ?1 AND lesson_id = ?2",
            RawLessonProgress::COLUMNS
          ),
          rusqlite::params![user_str, lesson_str],
          RawLessonProgress::from_row,
        )?;

        tx.commit()?;
        Ok((raw, newly_completed))
      })
      .await?;

    Ok(LessonWrite { progress: raw.into_progress()?, newly_completed })
  }

  async fn lesson_progress(
    &self,
    user_id: Uuid,
    lesson_ids: Vec<Uuid>,
  ) -> Result<Vec<LessonProgress>> {
    let user_str = encode_uuid(user_id);
    let lesson_strs: Vec<String> = lesson_ids.into_iter().map(encode_uuid).collect();

    let raws: Vec<RawLessonProgress> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM lesson_progress WHERE user_id = ?1 AND lesson_id = ?2",
          RawLessonProgress::COLUMNS
        ))?;
        let mut rows = Vec::with_capacity(lesson_strs.len());
        for lesson in &lesson_strs {
          if let Some(raw) = stmt
            .query_row(rusqlite::params![user_str, lesson], RawLessonProgress::from_row)
            .optional()?
          {
            rows.push(raw);
          }
        }
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLessonProgress::into_progress).collect()
  }

  async fn set_course_lessons(&self, course_id: Uuid, lesson_ids: Vec<Uuid>) -> Result<()> {
    let course_str  = encode_uuid(course_id);
    let now_str     = encode_dt(Utc::now());
    let lesson_strs: Vec<String> = lesson_ids.into_iter().map(encode_uuid).collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
          "INSERT INTO courses (course_id, updated_at) VALUES (?1, ?2)
           ON CONFLICT(course_id) DO UPDATE SET updated_at = excluded.updated_at",
          rusqlite::params![course_str, now_str],
        )?;
        tx.execute(
          "DELETE FROM course_lessons WHERE course_id = ?1",
          rusqlite::params![course_str],
        )?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO course_lessons (course_id, lesson_id, position) VALUES (?1, ?2, ?3)",
          )?;
          for (position, lesson) in lesson_strs.iter().enumerate() {
            stmt.execute(rusqlite::params![course_str, lesson, position as i64])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!(%course_id, "course lessons replaced");
    Ok(())
  }

  async fn course_lessons(&self, course_id: Uuid) -> Result<Option<Vec<Uuid>>> {
    let course_str = encode_uuid(course_id);

    let raw: Option<Vec<String>> = self
      .conn
      .call(move |conn| {
        let known = conn
          .query_row(
            "SELECT 1 FROM courses WHERE course_id = ?1",
            rusqlite::params![course_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if !known {
          return Ok(None);
        }

        let mut stmt = conn.prepare(
          "SELECT lesson_id FROM course_lessons WHERE course_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![course_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(Some(rows))
      })
      .await?;

    raw.map(decode_uuids).transpose()
  }

  async fn courses_containing(&self, lesson_id: Uuid) -> Result<Vec<Uuid>> {
    let lesson_str = encode_uuid(lesson_id);

    let raw: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT course_id FROM course_lessons WHERE lesson_id = ?1 ORDER BY course_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![lesson_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    decode_uuids(raw)
  }

  // ── Activity ──────────────────────────────────────────────────────────────

  async fn bump_counter(&self, user_id: Uuid, counter: Counter, amount: u64) -> Result<u64> {
    let user_str = encode_uuid(user_id);
    let name     = encode_counter(counter);
    let delta    = encode_count(amount)?;

    let value: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current: i64 = tx
          .query_row(
            "SELECT value FROM activity_counters WHERE user_id = ?1 AND counter = ?2",
            rusqlite::params![user_str, name],
            |row| row.get(0),
          )
          .optional()?
          .unwrap_or(0);
        let Some(value) = current.checked_add(delta) else {
          return Ok(None);
        };

        tx.execute(
          "INSERT INTO activity_counters (user_id, counter, value) VALUES (?1, ?2, ?3)
           ON CONFLICT(user_id, counter) DO UPDATE SET value = excluded.value",
          rusqlite::params![user_str, name, value],
        )?;
        tx.commit()?;
        Ok(Some(value))
      })
      .await?;

    let value =
      value.ok_or(Error::AddOverflow { column: "activity_counters.value", amount })?;
    decode_count("activity_counters.value", value)
  }

  // ── Achievements ──────────────────────────────────────────────────────────

  async fn unlocked_achievements(&self, user_id: Uuid) -> Result<Vec<UserAchievement>> {
    let user_str = encode_uuid(user_id);

    let raws: Vec<RawUserAchievement> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT user_id, code, unlocked_at FROM user_achievements
           WHERE user_id = ?1 ORDER BY unlocked_at, code",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![user_str], |row| {
            Ok(RawUserAchievement {
              user_id:     row.get(0)?,
              code:        row.get(1)?,
              unlocked_at: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawUserAchievement::into_achievement).collect()
  }

  async fn save_unlock(
    &self,
    user_id: Uuid,
    code: String,
    xp_reward: u64,
    at: DateTime<Utc>,
  ) -> Result<Option<u64>> {
    let user_str = encode_uuid(user_id);
    let amount   = encode_count(xp_reward)?;
    let at_str   = encode_dt(at);
    let key      = XpAward::achievement(&code, xp_reward).key;

    let outcome: Option<Grant> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
          "INSERT INTO user_achievements (user_id, code, unlocked_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(user_id, code) DO NOTHING",
          rusqlite::params![user_str, code, at_str],
        )?;
        if inserted == 0 {
          return Ok(None);
        }

        let outcome = grant(&tx, &user_str, &key, amount, &at_str)?;
        if !matches!(outcome, Grant::Overflow) {
          tx.commit()?;
        }
        Ok(Some(outcome))
      })
      .await?;

    match outcome {
      None => Ok(None),
      Some(Grant::Spent) => Ok(Some(0)),
      Some(Grant::Total(_)) => Ok(Some(xp_reward)),
      Some(Grant::Overflow) => {
        Err(Error::AddOverflow { column: "user_levels.xp", amount: xp_reward })
      }
    }
  }

  // ── Skill tree ────────────────────────────────────────────────────────────

  async fn completed_nodes(&self, user_id: Uuid) -> Result<HashSet<NodeId>> {
    let user_str = encode_uuid(user_id);

    let nodes = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare("SELECT node_id FROM node_completions WHERE user_id = ?1")?;
        let rows = stmt
          .query_map(rusqlite::params![user_str], |row| row.get(0))?
          .collect::<rusqlite::Result<HashSet<NodeId>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(nodes)
  }

  async fn save_node_completion(
    &self,
    user_id: Uuid,
    node_id: NodeId,
    at: DateTime<Utc>,
  ) -> Result<bool> {
    let user_str = encode_uuid(user_id);
    let at_str   = encode_dt(at);

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO node_completions (user_id, node_id, completed_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(user_id, node_id) DO NOTHING",
          rusqlite::params![user_str, node_id, at_str],
        )?)
      })
      .await?;

    Ok(inserted == 1)
  }
}
