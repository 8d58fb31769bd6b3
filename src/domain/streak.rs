/// Streak calculation
///
/// All streak numbers in the system come from this module, whichever backend
/// stores the habit. A streak counts logged days and tolerates a single missed
/// day between two logs (the grace day); two or more missed days in a row
/// start the count over.
///
/// Day differences are calendar-date subtractions on `NaiveDate`, so time
/// zones and DST never shift a log into a neighbouring day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Missed days tolerated between two logs before the streak resets
pub const GRACE_DAYS: u32 = 1;

/// Derived streak fields of a habit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StreakState {
    /// Length of the run ending at `last_check_date`
    pub current_streak: u32,
    /// Best run ever seen; never decreases
    pub longest_streak: u32,
    /// Most recent logged day
    pub last_check_date: Option<NaiveDate>,
    /// Days missed since `last_check_date`, as of the evaluation date
    pub missed_days: u32,
}

/// Outcome of feeding one new log date to the incremental path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEffect {
    /// The date is already the last logged day; the caller toggles it off
    AlreadyLogged,
    /// The date lies before the last logged day; only a full recompute is exact
    Backfill,
    /// The new state after appending the date
    Applied(StreakState),
}

/// Read-model of where a streak stands on a given day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakStatus {
    /// Never logged
    NotStarted,
    /// Logged on the evaluation day
    CompletedToday,
    /// Logged yesterday; logging today extends the streak
    Pending,
    /// The grace day is being used; logging today keeps the streak
    AtRisk,
    /// More than the grace day has passed; the next log starts over at 1
    Lapsed,
}

/// Whole days from `from` to `to`, clamped at zero
fn days_between(from: NaiveDate, to: NaiveDate) -> u32 {
    let days = (to - from).num_days().max(0);
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Stateless streak calculator shared by the local and remote code paths
pub struct StreakEngine;

impl StreakEngine {
    /// Recompute the streak from the complete set of log dates
    ///
    /// This is the canonical algorithm: order of input and duplicates do not
    /// matter, and the result only depends on the set of dates, `as_of` and the
    /// longest streak recorded so far. Un-logging and repair go through here.
    pub fn recompute(dates: &[NaiveDate], as_of: NaiveDate, previous_longest: u32) -> StreakState {
        let mut sorted = dates.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let Some(&last) = sorted.last() else {
            return StreakState {
                current_streak: 0,
                longest_streak: previous_longest,
                last_check_date: None,
                missed_days: 0,
            };
        };

        let mut run: u32 = 1;
        let mut longest = previous_longest.max(run);
        let mut missed: u32 = 0;

        for pair in sorted.windows(2) {
            missed = missed.saturating_add(days_between(pair[0], pair[1]).saturating_sub(1));
            if missed > GRACE_DAYS {
                run = 1;
            } else {
                run += 1;
            }
            // Either way the log landed, so the lapse counter starts over
            missed = 0;
            longest = longest.max(run);
        }

        let missed_days = days_between(last, as_of).saturating_sub(1);
        let current_streak = if missed_days > GRACE_DAYS { 0 } else { run };

        StreakState {
            current_streak,
            longest_streak: longest,
            last_check_date: Some(last),
            missed_days,
        }
    }

    /// Recompute evaluated at the newest log itself
    ///
    /// This is the form persisted on habits: the run as it stood on the day it
    /// was last extended, independent of when the recompute happens to run.
    pub fn recompute_at_last_log(dates: &[NaiveDate], previous_longest: u32) -> StreakState {
        match dates.iter().max() {
            Some(&last) => Self::recompute(dates, last, previous_longest),
            None => Self::recompute(dates, NaiveDate::MIN, previous_longest),
        }
    }

    /// Incremental path for appending one log after the last logged day
    ///
    /// Agrees with `recompute_at_last_log` over the extended date set as long
    /// as `state` itself was produced by the engine.
    pub fn apply_log(state: &StreakState, date: NaiveDate) -> LogEffect {
        let Some(last) = state.last_check_date else {
            return LogEffect::Applied(StreakState {
                current_streak: 1,
                longest_streak: state.longest_streak.max(1),
                last_check_date: Some(date),
                missed_days: 0,
            });
        };

        if date == last {
            return LogEffect::AlreadyLogged;
        }
        if date < last {
            return LogEffect::Backfill;
        }

        let missed = state
            .missed_days
            .saturating_add(days_between(last, date).saturating_sub(1));

        let current_streak = if missed > GRACE_DAYS {
            1
        } else {
            state.current_streak.saturating_add(1)
        };

        LogEffect::Applied(StreakState {
            current_streak,
            longest_streak: state.longest_streak.max(current_streak),
            last_check_date: Some(date),
            missed_days: 0,
        })
    }

    /// Where the streak stands on `today`
    pub fn status(state: &StreakState, today: NaiveDate) -> StreakStatus {
        let Some(last) = state.last_check_date else {
            return StreakStatus::NotStarted;
        };

        match (today - last).num_days() {
            d if d <= 0 => StreakStatus::CompletedToday,
            1 => StreakStatus::Pending,
            d if d <= i64::from(GRACE_DAYS) + 1 => StreakStatus::AtRisk,
            _ => StreakStatus::Lapsed,
        }
    }

    /// Streak to show on `today`: the stored run, or 0 once it has lapsed
    pub fn effective_streak(state: &StreakState, today: NaiveDate) -> u32 {
        match Self::status(state, today) {
            StreakStatus::Lapsed | StreakStatus::NotStarted => 0,
            _ => state.current_streak,
        }
    }
}

impl StreakState {
    /// Same state re-evaluated on `today`, with `missed_days` filled in
    pub fn evaluated_at(&self, today: NaiveDate) -> StreakState {
        let Some(last) = self.last_check_date else {
            return *self;
        };
        StreakState {
            current_streak: StreakEngine::effective_streak(self, today),
            longest_streak: self.longest_streak,
            last_check_date: Some(last),
            missed_days: days_between(last, today).saturating_sub(1),
        }
    }

    pub fn is_at_risk(&self, today: NaiveDate) -> bool {
        StreakEngine::status(self, today) == StreakStatus::AtRisk
    }
}
