/// Focus timer sessions
///
/// A timer session records a block of focused time, optionally attached to a
/// habit. Sessions are append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, HabitId, TimerSessionId};

/// Twelve hours; anything longer is a stuck timer
const MAX_DURATION_SECONDS: u32 = 12 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSession {
    pub id: TimerSessionId,
    pub owner_id: String,
    #[serde(default)]
    pub habit_id: Option<HabitId>,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u32,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTimerSession {
    #[serde(default)]
    pub habit_id: Option<HabitId>,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u32,
    #[serde(default)]
    pub completed: bool,
}

impl TimerSession {
    pub fn new(owner_id: &str, input: NewTimerSession) -> Result<Self, DomainError> {
        Self::validate_duration(input.duration_seconds)?;

        Ok(Self {
            id: TimerSessionId::new(),
            owner_id: owner_id.to_string(),
            habit_id: input.habit_id,
            started_at: input.started_at,
            duration_seconds: input.duration_seconds,
            completed: input.completed,
        })
    }

    pub fn validate_duration(duration_seconds: u32) -> Result<(), DomainError> {
        if duration_seconds == 0 || duration_seconds > MAX_DURATION_SECONDS {
            return Err(DomainError::InvalidValue {
                message: format!(
                    "Timer duration must be between 1 and {} seconds, got {}",
                    MAX_DURATION_SECONDS, duration_seconds
                ),
            });
        }
        Ok(())
    }
}
