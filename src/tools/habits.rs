/// Habit tools: create, list, log, unlog, delete and log history

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::{parse_date, DateRange, Frequency, Habit, HabitId, HabitLog, NewHabit, StreakEngine, StreakStatus};
use crate::limits::{FeatureLimitPolicy, Resource};
use crate::repository::Completion;
use crate::tools::{date_or_today, days, ToolError};
use crate::HabitTrackerServer;

/// Parameters for creating a habit
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateHabitParams {
    /// Emoji or short title of the habit
    pub emoji: String,
    /// First day of the habit (YYYY-MM-DD, defaults to today)
    pub start_date: Option<String>,
    /// daily, weekdays or weekends (defaults to daily)
    pub frequency: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateHabitResponse {
    pub success: bool,
    pub habit_id: String,
    pub message: String,
}

/// Create a habit after checking the plan's habit limit
pub async fn create_habit(
    server: &HabitTrackerServer,
    params: CreateHabitParams,
) -> Result<CreateHabitResponse, ToolError> {
    let identity = server.identity();
    let usage = server.repository().usage(&identity).await?;
    FeatureLimitPolicy::check(&server.limits(), Resource::Habits, usage.habits)?;

    let input = NewHabit {
        emoji: params.emoji,
        start_date: date_or_today(params.start_date.as_deref())?,
        frequency: match params.frequency.as_deref() {
            Some(f) => Frequency::parse(f)?,
            None => Frequency::Daily,
        },
    };
    let habit = server.repository().create_habit(&identity, input).await?;

    Ok(CreateHabitResponse {
        success: true,
        habit_id: habit.id.to_string(),
        message: format!("Created habit {} starting {}", habit.emoji, habit.start_date),
    })
}

/// Parameters for listing habits
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListHabitsParams {
    /// Day to evaluate streaks on (YYYY-MM-DD, defaults to today)
    pub as_of: Option<String>,
}

/// A habit as seen on the evaluation day
#[derive(Debug, Serialize)]
pub struct HabitSummary {
    pub id: String,
    pub emoji: String,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    /// Streak still alive on the evaluation day (0 once lapsed)
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_check_date: Option<NaiveDate>,
    pub status: StreakStatus,
}

impl HabitSummary {
    fn from_habit(habit: Habit, today: NaiveDate) -> Self {
        let state = habit.streak_state();
        Self {
            id: habit.id.to_string(),
            current_streak: StreakEngine::effective_streak(&state, today),
            status: StreakEngine::status(&state, today),
            emoji: habit.emoji,
            frequency: habit.frequency,
            start_date: habit.start_date,
            longest_streak: habit.longest_streak,
            last_check_date: habit.last_check_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListHabitsResponse {
    pub as_of: NaiveDate,
    pub habits: Vec<HabitSummary>,
    pub message: String,
}

pub async fn list_habits(server: &HabitTrackerServer, params: ListHabitsParams) -> Result<ListHabitsResponse, ToolError> {
    let today = date_or_today(params.as_of.as_deref())?;
    let habits: Vec<HabitSummary> = server
        .repository()
        .list_habits(&server.identity())
        .await?
        .into_iter()
        .map(|habit| HabitSummary::from_habit(habit, today))
        .collect();

    let at_risk = habits.iter().filter(|h| h.status == StreakStatus::AtRisk).count();
    let message = if habits.is_empty() {
        "No habits yet. Create your first habit to get started!".to_string()
    } else if at_risk > 0 {
        format!("{} habits, {} at risk of losing their streak", habits.len(), at_risk)
    } else {
        format!("{} habits", habits.len())
    };

    Ok(ListHabitsResponse {
        as_of: today,
        habits,
        message,
    })
}

/// Parameters for logging (or toggling off) a completion
#[derive(Debug, Deserialize, JsonSchema)]
pub struct LogHabitParams {
    pub habit_id: String,
    /// Day completed (YYYY-MM-DD, defaults to today)
    pub date: Option<String>,
    /// Optional note, at most 500 characters
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogHabitResponse {
    pub success: bool,
    /// False when the call removed an existing log instead
    pub logged: bool,
    pub date: NaiveDate,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub message: String,
}

impl LogHabitResponse {
    fn new(habit: &Habit, date: NaiveDate, logged: bool) -> Self {
        let message = if logged {
            format!(
                "Logged {} on {}. Current streak: {}",
                habit.emoji,
                date,
                days(habit.current_streak)
            )
        } else {
            format!(
                "Removed the {} log on {}. Current streak: {}",
                habit.emoji,
                date,
                days(habit.current_streak)
            )
        };
        Self {
            success: true,
            logged,
            date,
            current_streak: habit.current_streak,
            longest_streak: habit.longest_streak,
            message,
        }
    }
}

/// Log a completion; logging an already logged day removes it
pub async fn log_habit(server: &HabitTrackerServer, params: LogHabitParams) -> Result<LogHabitResponse, ToolError> {
    let habit_id = HabitId::from_string(&params.habit_id)?;
    let date = date_or_today(params.date.as_deref())?;

    let completion = server
        .repository()
        .log_completion(&server.identity(), &habit_id, date, params.note)
        .await?;

    let logged = matches!(completion, Completion::Logged { .. });
    Ok(LogHabitResponse::new(completion.habit(), date, logged))
}

/// Parameters for removing a completion
#[derive(Debug, Deserialize, JsonSchema)]
pub struct UnlogHabitParams {
    pub habit_id: String,
    /// Day to remove (YYYY-MM-DD, defaults to today)
    pub date: Option<String>,
}

pub async fn unlog_habit(server: &HabitTrackerServer, params: UnlogHabitParams) -> Result<LogHabitResponse, ToolError> {
    let habit_id = HabitId::from_string(&params.habit_id)?;
    let date = date_or_today(params.date.as_deref())?;

    let habit = server
        .repository()
        .unlog_completion(&server.identity(), &habit_id, date)
        .await?;

    Ok(LogHabitResponse::new(&habit, date, false))
}

/// Parameters for deleting a habit
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteHabitParams {
    pub habit_id: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Delete a habit together with its logs
pub async fn delete_habit(server: &HabitTrackerServer, params: DeleteHabitParams) -> Result<DeleteResponse, ToolError> {
    let habit_id = HabitId::from_string(&params.habit_id)?;
    server.repository().delete_habit(&server.identity(), &habit_id).await?;

    Ok(DeleteResponse {
        success: true,
        message: format!("Deleted habit {} and its logs", habit_id),
    })
}

/// Parameters for reading a habit's log history
#[derive(Debug, Deserialize, JsonSchema)]
pub struct HabitLogsParams {
    pub habit_id: String,
    /// First day to include (YYYY-MM-DD, optional)
    pub start_date: Option<String>,
    /// Last day to include (YYYY-MM-DD, optional)
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HabitLogsResponse {
    pub habit_id: String,
    pub logs: Vec<HabitLog>,
    pub message: String,
}

pub async fn habit_logs(server: &HabitTrackerServer, params: HabitLogsParams) -> Result<HabitLogsResponse, ToolError> {
    let habit_id = HabitId::from_string(&params.habit_id)?;
    let start = params.start_date.as_deref().map(parse_date).transpose()?;
    let end = params.end_date.as_deref().map(parse_date).transpose()?;

    let range = match (start, end) {
        (None, None) => None,
        (start, end) => Some(DateRange::between(start, end)?),
    };
    let logs = server
        .repository()
        .list_logs(&server.identity(), &habit_id, range)
        .await?;

    Ok(HabitLogsResponse {
        message: format!("{} logs", logs.len()),
        habit_id: habit_id.to_string(),
        logs,
    })
}
