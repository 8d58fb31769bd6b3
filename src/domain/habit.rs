/// Habit entity and related functionality
///
/// This module defines the Habit struct that represents a habit an owner wants
/// to track, along with its validation rules.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, Frequency, HabitId, StreakState};

/// Longest emoji/title accepted, in characters
const MAX_EMOJI_CHARS: usize = 100;

/// A habit represents something the owner wants to do regularly
///
/// The emoji doubles as the habit's title. The streak fields are derived:
/// they are only ever written from a `StreakState` computed by the streak
/// engine, evaluated at `last_check_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    /// Unique identifier for this habit
    pub id: HabitId,
    /// Anonymous device id or authenticated user id that owns this row
    pub owner_id: String,
    /// Display glyph, also used as the title
    pub emoji: String,
    /// How often this habit should be performed
    #[serde(default)]
    pub frequency: Frequency,
    /// First day the habit is tracked; never changes after creation
    pub start_date: NaiveDate,
    /// Consecutive-day run ending at `last_check_date`
    #[serde(default)]
    pub current_streak: u32,
    /// Best run ever recorded; never decreases
    #[serde(default)]
    pub longest_streak: u32,
    /// Most recent logged day (None if never logged)
    #[serde(default)]
    pub last_check_date: Option<NaiveDate>,
    /// When this habit was created
    pub created_at: DateTime<Utc>,
}

/// Input for creating a habit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHabit {
    pub emoji: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub frequency: Frequency,
}

impl NewHabit {
    /// Daily habit starting on `start_date`
    pub fn daily(emoji: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            emoji: emoji.into(),
            start_date,
            frequency: Frequency::Daily,
        }
    }
}

impl Habit {
    /// Create a new habit with validation
    ///
    /// Streak counters start at zero and `last_check_date` is unset.
    pub fn new(owner_id: &str, input: NewHabit) -> Result<Self, DomainError> {
        let emoji = Self::validate_emoji(&input.emoji)?;
        input.frequency.validate()?;

        Ok(Self {
            id: HabitId::new(),
            owner_id: owner_id.to_string(),
            emoji,
            frequency: input.frequency,
            start_date: input.start_date,
            current_streak: 0,
            longest_streak: 0,
            last_check_date: None,
            created_at: Utc::now(),
        })
    }

    /// Snapshot of the derived streak fields
    pub fn streak_state(&self) -> StreakState {
        StreakState {
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            last_check_date: self.last_check_date,
            missed_days: 0,
        }
    }

    /// Overwrite the derived fields with a freshly computed state
    pub fn apply_streak(&mut self, state: &StreakState) {
        self.current_streak = state.current_streak;
        self.longest_streak = state.longest_streak;
        self.last_check_date = state.last_check_date;
    }

    /// Validate the emoji/title and return its trimmed form
    pub fn validate_emoji(emoji: &str) -> Result<String, DomainError> {
        let trimmed = emoji.trim();

        if trimmed.is_empty() {
            return Err(DomainError::InvalidEmoji(
                "Habit emoji cannot be empty".to_string(),
            ));
        }

        if trimmed.chars().count() > MAX_EMOJI_CHARS {
            return Err(DomainError::InvalidEmoji(format!(
                "Habit emoji cannot be longer than {} characters",
                MAX_EMOJI_CHARS
            )));
        }

        Ok(trimmed.to_string())
    }
}
