/// HabitLog entity for tracking habit completions
///
/// A HabitLog marks one habit as done on one calendar day. There is at most
/// one log per `(habit_id, log_date)`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, HabitId};

/// Longest note accepted on a log
const MAX_NOTE_CHARS: usize = 500;

/// A record of completing a habit on a specific day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitLog {
    /// Which habit this log is for
    pub habit_id: HabitId,
    /// Owner of the habit (and therefore of the log)
    pub owner_id: String,
    /// Which day was completed, no time-of-day component
    pub log_date: NaiveDate,
    /// Optional free-text note
    #[serde(default)]
    pub note: Option<String>,
    /// When the log was written
    pub created_at: DateTime<Utc>,
}

impl HabitLog {
    /// Create a new log with validation
    pub fn new(
        owner_id: &str,
        habit_id: HabitId,
        log_date: NaiveDate,
        note: Option<String>,
    ) -> Result<Self, DomainError> {
        let note = Self::validate_note(note)?;

        Ok(Self {
            habit_id,
            owner_id: owner_id.to_string(),
            log_date,
            note,
            created_at: Utc::now(),
        })
    }

    /// Blank notes are dropped; long notes are rejected
    fn validate_note(note: Option<String>) -> Result<Option<String>, DomainError> {
        match note {
            Some(text) if text.trim().is_empty() => Ok(None),
            Some(text) if text.chars().count() > MAX_NOTE_CHARS => Err(DomainError::InvalidValue {
                message: format!("Notes cannot be longer than {} characters", MAX_NOTE_CHARS),
            }),
            other => Ok(other),
        }
    }
}

/// Inclusive date window used when listing logs; either side may be open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        Self::between(Some(start), Some(end))
    }

    /// Range that may be open on either side
    pub fn between(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, DomainError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(DomainError::InvalidDate(format!(
                    "Range start {} is after end {}",
                    start, end
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

/// Parse a `YYYY-MM-DD` calendar date
pub fn parse_date(s: &str) -> Result<NaiveDate, DomainError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| DomainError::InvalidDate(format!("Expected YYYY-MM-DD, got '{}'", s)))
}
