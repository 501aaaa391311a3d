//! Achievements and the declarative trigger grammar that unlocks them.
//!
//! Trigger conditions are stored on each [`Achievement`] as raw JSON and
//! interpreted here by a single evaluator, so adding an achievement is a data
//! change. A condition that fails to parse disqualifies only its own
//! achievement.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, stats::StatsSnapshot};

// ─── Catalog types ───────────────────────────────────────────────────────────

/// Difficulty band, ordered from most to least common.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Tier {
  Bronze,
  Silver,
  Gold,
  Platinum,
}

/// A catalog entry. Immutable reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
  pub code:               String,
  pub name:               String,
  #[serde(default)]
  pub description:        String,
  pub tier:               Tier,
  /// Raw predicate; see [`TriggerCondition`] for the accepted shapes.
  pub trigger_conditions: serde_json::Value,
  pub xp_reward:          u64,
}

// ─── Grammar ─────────────────────────────────────────────────────────────────

/// Top-level trigger predicate, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerCondition {
  LessonCompletion { count: u64 },
  CourseViews { count: u64 },
  PromptCopies { count: u64 },
  PlatformVisits { count: u64 },
  Streak { days: u32 },
  /// Holds once any course reaches `percentage` completion.
  CourseCompletion { percentage: u8 },
  Shares { count: u64 },
  /// Conjunction: every requirement must hold.
  Combined { requirements: Vec<Requirement> },
}

/// A clause inside [`TriggerCondition::Combined`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
  Level { value: u8 },
  CourseCompletion { count: u64 },
  Streak { days: u32 },
  ImpactValue { min_money: u64 },
}

impl TriggerCondition {
  /// Parse and validate a raw condition. Unknown kinds, missing fields,
  /// empty conjunctions and percentages above 100 are all
  /// [`Error::InvalidInput`].
  pub fn parse(raw: &serde_json::Value) -> Result<Self> {
    let condition: Self = serde_json::from_value(raw.clone())
      .map_err(|e| Error::InvalidInput(format!("trigger condition: {e}")))?;

    match &condition {
      Self::CourseCompletion { percentage } if *percentage > 100 => {
        Err(Error::InvalidInput(format!(
          "course completion percentage must be at most 100, got {percentage}"
        )))
      }
      Self::Combined { requirements } if requirements.is_empty() => Err(
        Error::InvalidInput("combined condition has no requirements".into()),
      ),
      _ => Ok(condition),
    }
  }

  pub fn is_met(&self, s: &StatsSnapshot) -> bool {
    let stats = &s.stats;
    match self {
      Self::LessonCompletion { count } => stats.lessons_completed >= *count,
      Self::CourseViews { count } => stats.course_views >= *count,
      Self::PromptCopies { count } => stats.prompt_copies >= *count,
      Self::PlatformVisits { count } => stats.platform_visits >= *count,
      Self::Streak { days } => stats.streak_days >= *days,
      Self::CourseCompletion { percentage } => {
        stats.best_course_percentage >= *percentage
      }
      Self::Shares { count } => stats.shares >= *count,
      Self::Combined { requirements } => {
        requirements.iter().all(|r| r.is_met(s))
      }
    }
  }
}

impl Requirement {
  pub fn is_met(&self, s: &StatsSnapshot) -> bool {
    match self {
      Self::Level { value } => s.level >= *value,
      Self::CourseCompletion { count } => s.stats.courses_completed >= *count,
      Self::Streak { days } => s.stats.streak_days >= *days,
      Self::ImpactValue { min_money } => s.stats.impact_value >= *min_money,
    }
  }
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

/// An achievement whose condition could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationFailure {
  pub code:   String,
  pub reason: String,
}

/// Result of one pass over the catalog.
#[derive(Debug, Default)]
pub struct Evaluation<'a> {
  /// Newly qualifying achievements, in catalog order.
  pub unlocked: Vec<&'a Achievement>,
  pub failures: Vec<EvaluationFailure>,
}

impl Evaluation<'_> {
  pub fn codes(&self) -> Vec<&str> {
    self.unlocked.iter().map(|a| a.code.as_str()).collect()
  }
}

/// Test every achievement not in `already_unlocked` against `snapshot`.
///
/// Never returns a code from `already_unlocked`. Achievements with a bad
/// condition are logged and reported in [`Evaluation::failures`] without
/// affecting the rest.
pub fn evaluate_all<'a>(
  catalog: &'a [Achievement],
  snapshot: &StatsSnapshot,
  already_unlocked: &HashSet<String>,
) -> Evaluation<'a> {
  let mut out = Evaluation::default();

  for achievement in catalog {
    if already_unlocked.contains(&achievement.code) {
      continue;
    }

    match TriggerCondition::parse(&achievement.trigger_conditions) {
      Ok(condition) => {
        if condition.is_met(snapshot) {
          out.unlocked.push(achievement);
        }
      }
      Err(e) => {
        tracing::warn!(
          code = %achievement.code,
          error = %e,
          "skipping achievement with unusable trigger condition"
        );
        out.failures.push(EvaluationFailure {
          code:   achievement.code.clone(),
          reason: e.to_string(),
        });
      }
    }
  }

  out
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::stats::UserStats;

  fn achievement(code: &str, condition: serde_json::Value) -> Achievement {
    Achievement {
      code:               code.into(),
      name:               code.into(),
      description:        String::new(),
      tier:               Tier::Bronze,
      trigger_conditions: condition,
      xp_reward:          50,
    }
  }

  fn snapshot(f: impl FnOnce(&mut StatsSnapshot)) -> StatsSnapshot {
    let mut s = StatsSnapshot { level: 1, stats: UserStats::default() };
    f(&mut s);
    s
  }

  #[test]
  fn parses_every_top_level_kind() {
    let cases = [
      json!({"type": "lesson_completion", "count": 1}),
      json!({"type": "course_views", "count": 5}),
      json!({"type": "prompt_copies", "count": 5}),
      json!({"type": "platform_visits", "count": 5}),
      json!({"type": "streak", "days": 7}),
      json!({"type": "course_completion", "percentage": 100}),
      json!({"type": "shares", "count": 3}),
      json!({"type": "combined", "requirements": [{"type": "level", "value": 5}]}),
    ];
    for raw in cases {
      TriggerCondition::parse(&raw).unwrap_or_else(|e| panic!("{raw}: {e}"));
    }
  }

  #[test]
  fn unknown_kind_is_invalid_input() {
    let err = TriggerCondition::parse(&json!({"type": "karma", "count": 1}))
      .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
  }

  #[test]
  fn empty_conjunction_is_invalid_input() {
    let err = TriggerCondition::parse(&json!({"type": "combined", "requirements": []}))
      .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
  }

  #[test]
  fn percentage_above_hundred_is_invalid_input() {
    let err =
      TriggerCondition::parse(&json!({"type": "course_completion", "percentage": 120}))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
  }

  #[test]
  fn count_thresholds_are_inclusive() {
    let c = TriggerCondition::LessonCompletion { count: 3 };
    assert!(!c.is_met(&snapshot(|s| s.stats.lessons_completed = 2)));
    assert!(c.is_met(&snapshot(|s| s.stats.lessons_completed = 3)));
  }

  #[test]
  fn course_completion_reads_best_percentage() {
    let c = TriggerCondition::CourseCompletion { percentage: 100 };
    assert!(!c.is_met(&snapshot(|s| s.stats.best_course_percentage = 99)));
    assert!(c.is_met(&snapshot(|s| s.stats.best_course_percentage = 100)));
  }

  #[test]
  fn combined_requires_all() {
    let c = TriggerCondition::parse(&json!({
      "type": "combined",
      "requirements": [
        {"type": "level", "value": 5},
        {"type": "course_completion", "count": 2},
        {"type": "streak", "days": 7},
        {"type": "impact_value", "min_money": 1000},
      ]
    }))
    .unwrap();

    let all = snapshot(|s| {
      s.level = 5;
      s.stats.courses_completed = 2;
      s.stats.streak_days = 7;
      s.stats.impact_value = 1000;
    });
    assert!(c.is_met(&all));

    let mut short = all.clone();
    short.stats.impact_value = 999;
    assert!(!c.is_met(&short));

    let mut low_level = all;
    low_level.level = 4;
    assert!(!c.is_met(&low_level));
  }

  #[test]
  fn evaluate_all_skips_already_unlocked() {
    let catalog = vec![
      achievement("first_lesson", json!({"type": "lesson_completion", "count": 1})),
      achievement("five_lessons", json!({"type": "lesson_completion", "count": 5})),
    ];
    let s = snapshot(|s| s.stats.lessons_completed = 5);

    let first = evaluate_all(&catalog, &s, &HashSet::new());
    assert_eq!(first.codes(), ["first_lesson", "five_lessons"]);

    let unlocked: HashSet<String> = ["first_lesson".to_string()].into();
    let second = evaluate_all(&catalog, &s, &unlocked);
    assert_eq!(second.codes(), ["five_lessons"]);

    let unlocked: HashSet<String> =
      ["first_lesson".to_string(), "five_lessons".to_string()].into();
    assert!(evaluate_all(&catalog, &s, &unlocked).unlocked.is_empty());
  }

  #[test]
  fn bad_condition_is_isolated() {
    let catalog = vec![
      achievement("broken", json!({"type": "moon_phase", "phase": "full"})),
      achievement("sharer", json!({"type": "shares", "count": 1})),
    ];
    let s = snapshot(|s| s.stats.shares = 1);

    let eval = evaluate_all(&catalog, &s, &HashSet::new());
    assert_eq!(eval.codes(), ["sharer"]);
    assert_eq!(eval.failures.len(), 1);
    assert_eq!(eval.failures[0].code, "broken");
  }

  #[test]
  fn tiers_are_ordered() {
    assert!(Tier::Bronze < Tier::Silver);
    assert!(Tier::Gold < Tier::Platinum);
    assert_eq!(Tier::Gold.to_string(), "gold");
  }
}
