//! Versioned reference data: the level table, XP rewards, the achievement
//! catalog and the skill tree.
//!
//! [`ReferenceData`] is the raw, deserialisable form. [`Rules`] is the
//! validated form the engine runs on; building it is where configuration
//! errors surface.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::{
  Error, Result,
  achievement::{Achievement, Tier},
  level::{DEFAULT_THRESHOLDS, LevelTable, TitleBand, default_title_bands},
  skill::{SkillGraph, SkillNode},
};

// ─── Raw form ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelConfig {
  pub thresholds: Vec<u64>,
  pub titles:     Vec<TitleBand>,
}

impl Default for LevelConfig {
  fn default() -> Self {
    Self {
      thresholds: DEFAULT_THRESHOLDS.to_vec(),
      titles:     default_title_bands(),
    }
  }
}

/// Fixed XP amounts for ledger events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rewards {
  pub lesson_completion: u64,
  /// Granted once when every lesson of a course is completed.
  pub course_completion: u64,
}

impl Default for Rewards {
  fn default() -> Self {
    Self { lesson_completion: 25, course_completion: 200 }
  }
}

/// Reference data as loaded from configuration. Missing sections fall back
/// to the built-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
  #[serde(default)]
  pub levels:       LevelConfig,
  #[serde(default)]
  pub rewards:      Rewards,
  #[serde(default = "default_achievements")]
  pub achievements: Vec<Achievement>,
  #[serde(default = "default_skill_tree")]
  pub skill_tree:   Vec<SkillNode>,
}

impl Default for ReferenceData {
  fn default() -> Self {
    Self {
      levels:       LevelConfig::default(),
      rewards:      Rewards::default(),
      achievements: default_achievements(),
      skill_tree:   default_skill_tree(),
    }
  }
}

impl ReferenceData {
  /// SHA-256 hex digest over the canonical JSON form.
  ///
  /// Object keys are emitted sorted, so two documents differing only in key
  /// order share a version.
  pub fn version(&self) -> Result<String> {
    let canonical = serde_json::to_vec(&serde_json::to_value(self)?)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
  }
}

fn achievement(
  code: &str,
  name: &str,
  description: &str,
  tier: Tier,
  xp_reward: u64,
  trigger_conditions: serde_json::Value,
) -> Achievement {
  Achievement {
    code: code.into(),
    name: name.into(),
    description: description.into(),
    tier,
    trigger_conditions,
    xp_reward,
  }
}

pub fn default_achievements() -> Vec<Achievement> {
  vec![
    achievement(
      "first_lesson",
      "First Steps",
      "Complete your first lesson",
      Tier::Bronze,
      50,
      json!({"type": "lesson_completion", "count": 1}),
    ),
    achievement(
      "lesson_marathon",
      "Marathon Learner",
      "Complete 25 lessons",
      Tier::Silver,
      150,
      json!({"type": "lesson_completion", "count": 25}),
    ),
    achievement(
      "course_explorer",
      "Explorer",
      "Open 10 course pages",
      Tier::Bronze,
      50,
      json!({"type": "course_views", "count": 10}),
    ),
    achievement(
      "prompt_collector",
      "Prompt Collector",
      "Copy 10 prompts from the library",
      Tier::Bronze,
      50,
      json!({"type": "prompt_copies", "count": 10}),
    ),
    achievement(
      "regular",
      "Regular",
      "Visit the platform 30 times",
      Tier::Silver,
      150,
      json!({"type": "platform_visits", "count": 30}),
    ),
    achievement(
      "week_streak",
      "On a Roll",
      "Keep a 7 day streak",
      Tier::Silver,
      150,
      json!({"type": "streak", "days": 7}),
    ),
    achievement(
      "month_streak",
      "Unstoppable",
      "Keep a 30 day streak",
      Tier::Gold,
      400,
      json!({"type": "streak", "days": 30}),
    ),
    achievement(
      "graduate",
      "Graduate",
      "Finish every lesson of a course",
      Tier::Gold,
      300,
      json!({"type": "course_completion", "percentage": 100}),
    ),
    achievement(
      "ambassador",
      "Ambassador",
      "Share the platform 5 times",
      Tier::Silver,
      100,
      json!({"type": "shares", "count": 5}),
    ),
    achievement(
      "champion",
      "Champion",
      "Reach level 10, finish 3 courses, keep a 14 day streak and report \
       10000 in impact",
      Tier::Platinum,
      1000,
      json!({
        "type": "combined",
        "requirements": [
          {"type": "level", "value": 10},
          {"type": "course_completion", "count": 3},
          {"type": "streak", "days": 14},
          {"type": "impact_value", "min_money": 10000}
        ]
      }),
    ),
  ]
}

pub fn default_skill_tree() -> Vec<SkillNode> {
  let node = |id: &str, title: &str, prereqs: &[&str]| SkillNode {
    id:            id.into(),
    title:         title.into(),
    prerequisites: prereqs.iter().map(|p| p.to_string()).collect(),
  };
  vec![
    node("foundations", "AI Foundations", &[]),
    node("prompt-basics", "Prompt Basics", &["foundations"]),
    node("context-design", "Context Design", &["prompt-basics"]),
    node("output-formatting", "Output Formatting", &["prompt-basics"]),
    node("chaining", "Prompt Chaining", &["context-design", "output-formatting"]),
    node("automation", "Workflow Automation", &["chaining"]),
    node("agents", "Agents", &["chaining"]),
  ]
}

// ─── Validated form ──────────────────────────────────────────────────────────

/// Validated reference data.
#[derive(Debug, Clone)]
pub struct Rules {
  pub levels:       LevelTable,
  pub rewards:      Rewards,
  pub achievements: Vec<Achievement>,
  pub skill_tree:   SkillGraph,
  pub version:      String,
}

impl Rules {
  /// Validate `data`. Any inconsistency is [`Error::Configuration`].
  ///
  /// Trigger conditions are not validated here; a bad one
  /// only disables its own achievement at evaluation time.
  pub fn new(data: ReferenceData) -> Result<Self> {
    let version = data.version()?;

    {
      let mut codes = HashSet::new();
      for a in &data.achievements {
        if !codes.insert(a.code.as_str()) {
          return Err(Error::Configuration(format!(
            "duplicate achievement code {:?}",
            a.code
          )));
        }
      }
    }

    Ok(Self {
      levels: LevelTable::new(data.levels.thresholds, data.levels.titles)?,
      rewards: data.rewards,
      skill_tree: SkillGraph::new(data.skill_tree)?,
      achievements: data.achievements,
      version,
    })
  }
}
