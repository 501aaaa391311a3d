//! Level calculation: maps cumulative XP onto a fixed 20-step threshold
//! table and a set of title bands.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The highest reachable level. XP beyond the last threshold is kept but
/// does not raise the level further.
pub const MAX_LEVEL: u8 = 20;

/// XP required to reach each level; index `i` holds the threshold for level
/// `i + 1`.
pub const DEFAULT_THRESHOLDS: [u64; MAX_LEVEL as usize] = [
  0, 100, 250, 450, 700, 1000, 1400, 1900, 2500, 3200, 4000, 5000, 6200, 7600,
  9200, 11000, 13000, 15500, 18500, 22000,
];

// ─── Title bands ─────────────────────────────────────────────────────────────

/// A contiguous, inclusive range of levels sharing one display title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleBand {
  pub min_level: u8,
  pub max_level: u8,
  pub title:     String,
}

impl TitleBand {
  pub fn new(min_level: u8, max_level: u8, title: impl Into<String>) -> Self {
    Self { min_level, max_level, title: title.into() }
  }

  fn contains(&self, level: u8) -> bool {
    (self.min_level..=self.max_level).contains(&level)
  }
}

pub fn default_title_bands() -> Vec<TitleBand> {
  vec![
    TitleBand::new(1, 2, "Novice"),
    TitleBand::new(3, 5, "Apprentice"),
    TitleBand::new(6, 8, "Practitioner"),
    TitleBand::new(9, 11, "Adept"),
    TitleBand::new(12, 14, "Expert"),
    TitleBand::new(15, 17, "Master"),
    TitleBand::new(18, 19, "Grandmaster"),
    TitleBand::new(20, 20, "Legend"),
  ]
}

// ─── Level info ──────────────────────────────────────────────────────────────

/// The derived view of a user's XP total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelInfo {
  pub xp:                  u64,
  pub level:               u8,
  pub title:               String,
  /// XP still needed for the next level; `0` at [`MAX_LEVEL`].
  pub xp_to_next_level:    u64,
  /// Progress through the current level, `0..=100`.
  pub progress_percentage: u8,
}

impl LevelInfo {
  pub fn is_max_level(&self) -> bool { self.level >= MAX_LEVEL }
}

// ─── Table ───────────────────────────────────────────────────────────────────

/// A validated threshold table plus its title bands.
///
/// Construction fails with [`Error::Configuration`] unless there are exactly
/// [`MAX_LEVEL`] thresholds, starting at zero and strictly ascending, and the
/// title bands tile `1..=MAX_LEVEL` without gaps or overlaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelTable {
  thresholds: Vec<u64>,
  titles:     Vec<TitleBand>,
}

impl LevelTable {
  pub fn new(thresholds: Vec<u64>, mut titles: Vec<TitleBand>) -> Result<Self> {
    if thresholds.len() != MAX_LEVEL as usize {
      return Err(Error::Configuration(format!(
        "expected {MAX_LEVEL} level thresholds, got {}",
        thresholds.len()
      )));
    }
    if thresholds[0] != 0 {
      return Err(Error::Configuration(format!(
        "the level 1 threshold must be 0, got {}",
        thresholds[0]
      )));
    }
    if let Some(w) = thresholds.windows(2).find(|w| w[0] >= w[1]) {
      return Err(Error::Configuration(format!(
        "level thresholds must be strictly ascending ({} >= {})",
        w[0], w[1]
      )));
    }

    titles.sort_by_key(|b| b.min_level);
    let mut next = 1u8;
    for band in &titles {
      if band.min_level > band.max_level {
        return Err(Error::Configuration(format!(
          "title band {:?} has min level {} above max level {}",
          band.title, band.min_level, band.max_level
        )));
      }
      if band.min_level != next {
        return Err(Error::Configuration(format!(
          "title bands must tile levels 1..={MAX_LEVEL}: band {:?} starts at \
           {} but level {next} is next",
          band.title, band.min_level
        )));
      }
      next = band.max_level.saturating_add(1);
    }
    if next != MAX_LEVEL + 1 {
      return Err(Error::Configuration(format!(
        "title bands must tile levels 1..={MAX_LEVEL}: coverage ends at level {}",
        next - 1
      )));
    }

    Ok(Self { thresholds, titles })
  }

  pub fn thresholds(&self) -> &[u64] { &self.thresholds }

  pub fn titles(&self) -> &[TitleBand] { &self.titles }

  /// Level for a (valid, non-negative) XP total. Reaching a threshold
  /// exactly counts as reaching the level.
  pub fn level_for(&self, xp: u64) -> u8 {
    self
      .thresholds
      .iter()
      .rposition(|&t| xp >= t)
      .map_or(1, |i| i as u8 + 1)
  }

  pub fn title_for(&self, level: u8) -> &str {
    self
      .titles
      .iter()
      .find(|b| b.contains(level))
      .map(|b| b.title.as_str())
      .unwrap_or_default()
  }

  /// Full level breakdown for a stored XP total.
  pub fn info(&self, xp: u64) -> LevelInfo {
    let level = self.level_for(xp);
    let title = self.title_for(level).to_owned();

    if level >= MAX_LEVEL {
      return LevelInfo {
        xp,
        level,
        title,
        xp_to_next_level: 0,
        progress_percentage: 100,
      };
    }

    let floor = self.thresholds[level as usize - 1];
    let ceiling = self.thresholds[level as usize];
    let pct = (xp - floor) as f64 / (ceiling - floor) as f64 * 100.0;

    LevelInfo {
      xp,
      level,
      title,
      xp_to_next_level: ceiling - xp,
      progress_percentage: pct.round() as u8,
    }
  }

  /// Validating entry point for externally supplied XP values.
  pub fn calculate(&self, xp: i64) -> Result<LevelInfo> {
    let xp = u64::try_from(xp).map_err(|_| {
      Error::InvalidInput(format!("xp must be non-negative, got {xp}"))
    })?;
    Ok(self.info(xp))
  }
}

impl Default for LevelTable {
  fn default() -> Self {
    Self {
      thresholds: DEFAULT_THRESHOLDS.to_vec(),
      titles:     default_title_bands(),
    }
  }
}
