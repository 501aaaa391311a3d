//! Daily activity streaks.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Consecutive-day activity streak for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
  pub days:          u32,
  /// Best streak ever reached.
  pub longest:       u32,
  /// Calendar date of the most recent activity; `None` before the first.
  pub last_activity: Option<NaiveDate>,
}

impl Streak {
  pub fn new(days: u32, last_activity: Option<NaiveDate>) -> Self {
    Self { days, longest: days, last_activity }
  }

  /// Apply an activity on `today`.
  ///
  /// Same-day activity leaves the streak untouched, activity on the day
  /// after `last_activity` extends it, anything else restarts it at 1. A
  /// `last_activity` later than `today` is left alone.
  #[must_use]
  pub fn advance(self, today: NaiveDate) -> Self {
    let days = match self.last_activity {
      Some(last) if last >= today => return self,
      Some(last) if today.pred_opt() == Some(last) => self.days.saturating_add(1),
      _ => 1,
    };

    Self {
      days,
      longest: self.longest.max(days),
      last_activity: Some(today),
    }
  }

  /// Whether an activity on `today` would change anything.
  pub fn is_stale(&self, today: NaiveDate) -> bool {
    self.last_activity.is_none_or(|last| last < today)
  }
}
