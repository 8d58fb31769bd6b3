/// Focus timer tool

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, HabitId, NewTimerSession, TimerSession};
use crate::limits::{FeatureLimitPolicy, Resource};
use crate::tools::ToolError;
use crate::HabitTrackerServer;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RecordTimerParams {
    /// Length of the session in seconds (1 to 43200)
    pub duration_seconds: u32,
    /// Habit the session was spent on (optional)
    pub habit_id: Option<String>,
    /// RFC 3339 start time (defaults to now minus the duration)
    pub started_at: Option<String>,
    /// Whether the timer ran to the end (defaults to true)
    pub completed: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RecordTimerResponse {
    pub success: bool,
    pub session: TimerSession,
    pub message: String,
}

/// Record a finished timer session after checking the plan's session limit
pub async fn record_timer(server: &HabitTrackerServer, params: RecordTimerParams) -> Result<RecordTimerResponse, ToolError> {
    let identity = server.identity();
    let usage = server.repository().usage(&identity).await?;
    FeatureLimitPolicy::check(&server.limits(), Resource::TimerSessions, usage.timer_sessions)?;

    let started_at = match params.started_at.as_deref() {
        Some(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| DomainError::InvalidDate(format!("Expected an RFC 3339 timestamp, got '{}'", s)))?,
        None => Utc::now() - chrono::Duration::seconds(i64::from(params.duration_seconds)),
    };
    let habit_id = params.habit_id.as_deref().map(HabitId::from_string).transpose()?;

    let session = server
        .repository()
        .record_timer_session(
            &identity,
            NewTimerSession {
                habit_id,
                started_at,
                duration_seconds: params.duration_seconds,
                completed: params.completed.unwrap_or(true),
            },
        )
        .await?;

    Ok(RecordTimerResponse {
        success: true,
        message: format!("Recorded {} minutes of focus", session.duration_seconds / 60),
        session,
    })
}
