/// Habit repository
///
/// The one entry point the presentation layer uses for habits, logs, todos and
/// timer sessions. Each call names its `Identity`; anonymous identities are
/// served from device storage and authenticated ones from the remote store,
/// with identical signatures and identical streak rules either way.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{
    DateRange, DomainError, Habit, HabitId, HabitLog, Identity, LogEffect, NewHabit, NewTimerSession, NewTodo,
    StreakEngine, StreakState, TimerSession, Todo, TodoId,
};
use crate::storage::{HabitStore, LocalHabitStore, StorageError};

/// Errors surfaced by repository operations
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RepositoryError {
    /// Whether repeating the call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::Storage(e) if e.is_retryable())
    }
}

/// Result of `log_completion`
///
/// Logging an already logged day toggles it off instead of duplicating it.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Logged { log: HabitLog, habit: Habit },
    Unlogged { habit: Habit },
}

impl Completion {
    /// The habit with its recomputed streak fields
    pub fn habit(&self) -> &Habit {
        match self {
            Completion::Logged { habit, .. } | Completion::Unlogged { habit } => habit,
        }
    }
}

/// Live entity counts of an owner, compared against feature limits by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub habits: usize,
    pub todos: usize,
    pub timer_sessions: usize,
}

/// Façade over the local and remote stores
///
/// Calls are not serialized against each other: two `log_completion` calls for
/// the same habit racing on one device both recompute from what they read, and
/// the later write wins until the next recompute.
pub struct HabitRepository {
    local: Arc<LocalHabitStore>,
    remote: Arc<dyn HabitStore>,
}

impl HabitRepository {
    pub fn new(local: Arc<LocalHabitStore>, remote: Arc<dyn HabitStore>) -> Self {
        Self { local, remote }
    }

    /// Device storage, for device-level state such as the anonymous id
    pub fn local(&self) -> &Arc<LocalHabitStore> {
        &self.local
    }

    /// Backend serving `identity`
    fn store(&self, identity: &Identity) -> &dyn HabitStore {
        match identity {
            Identity::Anonymous(_) => self.local.as_ref(),
            Identity::Authenticated(_) => self.remote.as_ref(),
        }
    }

    // Habits

    pub async fn list_habits(&self, identity: &Identity) -> Result<Vec<Habit>, RepositoryError> {
        Ok(self.store(identity).list_habits(identity.id()).await?)
    }

    pub async fn get_habit(&self, identity: &Identity, habit_id: &HabitId) -> Result<Habit, RepositoryError> {
        Ok(self.store(identity).get_habit(identity.id(), habit_id).await?)
    }

    /// Create a habit with zeroed streak fields
    pub async fn create_habit(&self, identity: &Identity, input: NewHabit) -> Result<Habit, RepositoryError> {
        let habit = Habit::new(identity.id(), input)?;
        self.store(identity).insert_habit(&habit).await?;

        tracing::info!("Created habit {} ({}) for {}", habit.emoji, habit.id, identity);
        Ok(habit)
    }

    /// Delete a habit and all of its logs
    pub async fn delete_habit(&self, identity: &Identity, habit_id: &HabitId) -> Result<(), RepositoryError> {
        self.store(identity).delete_habit(identity.id(), habit_id).await?;
        tracing::info!("Deleted habit {} for {}", habit_id, identity);
        Ok(())
    }

    /// Mark `date` as done, or undo it if it is already done
    ///
    /// The log insert and the habit update succeed together: if the habit
    /// cannot be saved the log is removed again before the error is returned.
    pub async fn log_completion(
        &self,
        identity: &Identity,
        habit_id: &HabitId,
        date: NaiveDate,
        note: Option<String>,
    ) -> Result<Completion, RepositoryError> {
        let store = self.store(identity);
        let owner = identity.id();
        let mut habit = store.get_habit(owner, habit_id).await?;

        let same_day = DateRange::new(date, date)?;
        if !store.list_logs(owner, habit_id, Some(same_day)).await?.is_empty() {
            let habit = self.unlog_completion(identity, habit_id, date).await?;
            return Ok(Completion::Unlogged { habit });
        }

        let log = HabitLog::new(owner, habit_id.clone(), date, note)?;
        store.insert_log(&log).await?;

        let state = match StreakEngine::apply_log(&habit.streak_state(), date) {
            LogEffect::Applied(state) => Ok(state),
            // Backfilled day, or stored fields out of step with the logs
            LogEffect::Backfill | LogEffect::AlreadyLogged => {
                Self::recompute(store, owner, &habit).await
            }
        };

        let saved = match state {
            Ok(state) => {
                habit.apply_streak(&state);
                store.update_habit(&habit).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = saved {
            tracing::warn!("Rolling back log of habit {} on {}: {}", habit_id, date, e);
            if let Err(rollback) = store.delete_log(owner, habit_id, date).await {
                tracing::error!("Rollback of log {} on {} failed: {}", habit_id, date, rollback);
            }
            return Err(e.into());
        }

        tracing::debug!(
            "Logged habit {} on {}: streak {} (best {})",
            habit_id,
            date,
            habit.current_streak,
            habit.longest_streak
        );
        Ok(Completion::Logged { log, habit })
    }

    /// Remove the log of `date` and recompute the streak from what remains
    pub async fn unlog_completion(
        &self,
        identity: &Identity,
        habit_id: &HabitId,
        date: NaiveDate,
    ) -> Result<Habit, RepositoryError> {
        let store = self.store(identity);
        let owner = identity.id();
        let mut habit = store.get_habit(owner, habit_id).await?;

        let same_day = DateRange::new(date, date)?;
        let removed = store
            .list_logs(owner, habit_id, Some(same_day))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::LogNotFound {
                habit_id: habit_id.to_string(),
                date,
            })?;

        store.delete_log(owner, habit_id, date).await?;

        let saved = match Self::recompute(store, owner, &habit).await {
            Ok(state) => {
                habit.apply_streak(&state);
                store.update_habit(&habit).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = saved {
            tracing::warn!("Restoring log of habit {} on {}: {}", habit_id, date, e);
            if let Err(rollback) = store.insert_log(&removed).await {
                tracing::error!("Restore of log {} on {} failed: {}", habit_id, date, rollback);
            }
            return Err(e.into());
        }

        tracing::debug!("Unlogged habit {} on {}: streak {}", habit_id, date, habit.current_streak);
        Ok(habit)
    }

    pub async fn list_logs(
        &self,
        identity: &Identity,
        habit_id: &HabitId,
        range: Option<DateRange>,
    ) -> Result<Vec<HabitLog>, RepositoryError> {
        Ok(self.store(identity).list_logs(identity.id(), habit_id, range).await?)
    }

    /// Recompute every habit of the owner from its logs, saving the ones that drifted
    pub async fn repair_streaks(&self, identity: &Identity) -> Result<Vec<Habit>, RepositoryError> {
        let store = self.store(identity);
        let owner = identity.id();
        let mut repaired = Vec::new();

        for mut habit in store.list_habits(owner).await? {
            let state = Self::recompute(store, owner, &habit).await?;
            if state != habit.streak_state() {
                tracing::warn!(
                    "Habit {} streak drifted: stored {}/{}, recomputed {}/{}",
                    habit.id,
                    habit.current_streak,
                    habit.longest_streak,
                    state.current_streak,
                    state.longest_streak
                );
                habit.apply_streak(&state);
                store.update_habit(&habit).await?;
                repaired.push(habit);
            }
        }

        Ok(repaired)
    }

    /// Canonical streak of `habit`, evaluated at its newest log
    async fn recompute(store: &dyn HabitStore, owner: &str, habit: &Habit) -> Result<StreakState, StorageError> {
        let dates: Vec<NaiveDate> = store
            .list_logs(owner, &habit.id, None)
            .await?
            .into_iter()
            .map(|log| log.log_date)
            .collect();
        Ok(StreakEngine::recompute_at_last_log(&dates, habit.longest_streak))
    }

    // Todos

    pub async fn list_todos(&self, identity: &Identity) -> Result<Vec<Todo>, RepositoryError> {
        Ok(self.store(identity).list_todos(identity.id()).await?)
    }

    pub async fn create_todo(&self, identity: &Identity, input: NewTodo) -> Result<Todo, RepositoryError> {
        let todo = Todo::new(identity.id(), input)?;
        self.store(identity).insert_todo(&todo).await?;

        tracing::info!("Created todo {} for {}", todo.id, identity);
        Ok(todo)
    }

    /// Set a todo's completion flag; `completed_at` follows the transition
    pub async fn set_todo_completed(
        &self,
        identity: &Identity,
        todo_id: &TodoId,
        completed: bool,
    ) -> Result<Todo, RepositoryError> {
        let store = self.store(identity);
        let mut todo = store.get_todo(identity.id(), todo_id).await?;
        if todo.set_completed(completed) {
            store.update_todo(&todo).await?;
        }
        Ok(todo)
    }

    pub async fn delete_todo(&self, identity: &Identity, todo_id: &TodoId) -> Result<(), RepositoryError> {
        Ok(self.store(identity).delete_todo(identity.id(), todo_id).await?)
    }

    // Timer sessions

    pub async fn list_timer_sessions(&self, identity: &Identity) -> Result<Vec<TimerSession>, RepositoryError> {
        Ok(self.store(identity).list_timer_sessions(identity.id()).await?)
    }

    pub async fn record_timer_session(
        &self,
        identity: &Identity,
        input: NewTimerSession,
    ) -> Result<TimerSession, RepositoryError> {
        let store = self.store(identity);
        if let Some(habit_id) = &input.habit_id {
            store.get_habit(identity.id(), habit_id).await?;
        }

        let session = TimerSession::new(identity.id(), input)?;
        store.insert_timer_session(&session).await?;
        Ok(session)
    }

    /// Live counts used for feature-limit pre-checks
    pub async fn usage(&self, identity: &Identity) -> Result<Usage, RepositoryError> {
        let store = self.store(identity);
        let owner = identity.id();
        Ok(Usage {
            habits: store.list_habits(owner).await?.len(),
            todos: store.list_todos(owner).await?.len(),
            timer_sessions: store.list_timer_sessions(owner).await?.len(),
        })
    }

    /// Drop everything stored on the device for an anonymous owner
    pub async fn clear_local(&self, anonymous_id: &str) -> Result<(), RepositoryError> {
        Ok(self.local.clear_owner(anonymous_id).await?)
    }
}
