/// Anonymous-to-account migration
///
/// Moves everything an anonymous device owner created into the signed-in
/// user's remote store, once. Entities are migrated one by one and a failure
/// on one of them is recorded without stopping the rest.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::domain::{HabitId, Identity, NewHabit, NewTimerSession, NewTodo, TimerSessionId, TodoId};
use crate::identity::AuthProvider;
use crate::repository::HabitRepository;
use crate::storage::{HabitStore, StorageError};

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Cannot migrate: {0}")]
    InvalidIdentity(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Migration behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Clear the device data even when some entities failed to migrate.
    /// The failed entities are then lost. With this off, only the migrated
    /// entities leave the device and no migration marker is written, so the
    /// next sign-in migrates the rest.
    pub clear_on_partial_failure: bool,

    /// Replay habit logs onto the migrated habits and re-record timer sessions.
    /// Off by default: logs and sessions are counted but stay behind.
    pub migrate_history: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            clear_on_partial_failure: true,
            migrate_history: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigratedCounts {
    pub habits: usize,
    pub todos: usize,
    pub habit_logs: usize,
    pub timer_sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    /// True iff no entity failed
    pub success: bool,
    pub migrated_counts: MigratedCounts,
    pub errors: Vec<String>,
    pub local_cleared: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationValidation {
    pub is_valid: bool,
    pub warnings: Vec<String>,
}

/// Device ids of the entities that reached the account
#[derive(Debug, Default)]
struct Migrated {
    habits: Vec<HabitId>,
    /// Habits whose history only partly made it; they stay on the device
    incomplete_habits: HashSet<HabitId>,
    todos: Vec<TodoId>,
    timer_sessions: Vec<TimerSessionId>,
}

pub struct MigrationCoordinator {
    repository: Arc<HabitRepository>,
    options: MigrationOptions,
}

impl MigrationCoordinator {
    pub fn new(repository: Arc<HabitRepository>) -> Self {
        Self::with_options(repository, MigrationOptions::default())
    }

    pub fn with_options(repository: Arc<HabitRepository>, options: MigrationOptions) -> Self {
        Self { repository, options }
    }

    pub fn options(&self) -> MigrationOptions {
        self.options
    }

    /// Migrate the anonymous owner's device data to `user_id`
    ///
    /// Fails only when the device data cannot be read; in that case nothing is
    /// created remotely and nothing is cleared.
    pub async fn migrate(&self, anonymous_id: &str, user_id: &str) -> Result<MigrationResult, MigrationError> {
        if anonymous_id.trim().is_empty() {
            return Err(MigrationError::InvalidIdentity("empty anonymous id".to_string()));
        }
        if user_id.trim().is_empty() {
            return Err(StorageError::NotAuthenticated.into());
        }

        let local = self.repository.local();
        let snapshot = local.snapshot(anonymous_id).await?;
        let user = Identity::Authenticated(user_id.to_string());

        tracing::info!(
            "Migrating {} habits, {} todos, {} logs, {} timer sessions from {} to {}",
            snapshot.habits.len(),
            snapshot.todos.len(),
            snapshot.habit_logs.len(),
            snapshot.timer_sessions.len(),
            anonymous_id,
            user_id
        );

        let mut counts = MigratedCounts::default();
        let mut errors: Vec<String> = snapshot
            .report
            .dropped
            .iter()
            .map(|dropped| format!("Unreadable record skipped: {}", dropped))
            .collect();
        let mut habit_ids: HashMap<HabitId, HabitId> = HashMap::new();
        let mut migrated = Migrated::default();

        for habit in &snapshot.habits {
            // Streak counters start over on the new row
            let input = NewHabit {
                emoji: habit.emoji.clone(),
                start_date: habit.start_date,
                frequency: habit.frequency.clone(),
            };
            match self.repository.create_habit(&user, input).await {
                Ok(created) => {
                    counts.habits += 1;
                    habit_ids.insert(habit.id.clone(), created.id);
                }
                Err(e) => {
                    tracing::warn!("Failed to migrate habit {}: {}", habit.emoji, e);
                    errors.push(format!("Habit \"{}\": {}", habit.emoji, e));
                }
            }
        }

        for todo in &snapshot.todos {
            let input = NewTodo {
                content: todo.content.clone(),
                is_completed: todo.is_completed,
            };
            match self.repository.create_todo(&user, input).await {
                Ok(_) => {
                    counts.todos += 1;
                    migrated.todos.push(todo.id.clone());
                }
                Err(e) => {
                    tracing::warn!("Failed to migrate todo {}: {}", todo.content, e);
                    errors.push(format!("Todo \"{}\": {}", todo.content, e));
                }
            }
        }

        if self.options.migrate_history {
            let mut logs = snapshot.habit_logs.clone();
            logs.sort_by_key(|log| log.log_date);

            for log in &logs {
                // Logs of habits that failed to migrate have nowhere to go
                let Some(new_id) = habit_ids.get(&log.habit_id) else {
                    continue;
                };
                match self
                    .repository
                    .log_completion(&user, new_id, log.log_date, log.note.clone())
                    .await
                {
                    Ok(_) => counts.habit_logs += 1,
                    Err(e) => {
                        migrated.incomplete_habits.insert(log.habit_id.clone());
                        errors.push(format!("Habit log {} on {}: {}", log.habit_id, log.log_date, e));
                    }
                }
            }

            for session in &snapshot.timer_sessions {
                let input = NewTimerSession {
                    habit_id: session.habit_id.as_ref().and_then(|id| habit_ids.get(id).cloned()),
                    started_at: session.started_at,
                    duration_seconds: session.duration_seconds,
                    completed: session.completed,
                };
                match self.repository.record_timer_session(&user, input).await {
                    Ok(_) => {
                        counts.timer_sessions += 1;
                        migrated.timer_sessions.push(session.id.clone());
                    }
                    Err(e) => errors.push(format!("Timer session {}: {}", session.id, e)),
                }
            }
        } else if !snapshot.habit_logs.is_empty() || !snapshot.timer_sessions.is_empty() {
            tracing::info!(
                "Leaving {} habit logs and {} timer sessions unmigrated",
                snapshot.habit_logs.len(),
                snapshot.timer_sessions.len()
            );
        }

        migrated.habits = habit_ids
            .into_keys()
            .filter(|id| !migrated.incomplete_habits.contains(id))
            .collect();

        let mut local_cleared = false;
        let keep_device_data = !errors.is_empty() && !self.options.clear_on_partial_failure;
        if keep_device_data {
            tracing::warn!(
                "Keeping unmigrated device data of {} after {} migration errors",
                anonymous_id,
                errors.len()
            );
            self.remove_migrated(anonymous_id, &migrated, &mut errors).await;
        } else {
            if !errors.is_empty() {
                tracing::warn!(
                    "Clearing device data of {} despite {} migration errors",
                    anonymous_id,
                    errors.len()
                );
            }
            match self.repository.clear_local(anonymous_id).await {
                Ok(()) => local_cleared = true,
                Err(e) => errors.push(format!("Clearing device data: {}", e)),
            }
            if let Err(e) = local.set_migration_marker(anonymous_id, user_id).await {
                errors.push(format!("Recording migration: {}", e));
            }
        }

        let result = MigrationResult {
            success: errors.is_empty(),
            migrated_counts: counts,
            errors,
            local_cleared,
        };

        tracing::info!(
            "Migration of {} finished: success={}, {} errors",
            anonymous_id,
            result.success,
            result.errors.len()
        );
        Ok(result)
    }

    /// Drop what already reached the account from the device, so a later
    /// attempt only sends the rest
    async fn remove_migrated(&self, anonymous_id: &str, migrated: &Migrated, errors: &mut Vec<String>) {
        let local = self.repository.local();

        for habit_id in &migrated.habits {
            if let Err(e) = local.delete_habit(anonymous_id, habit_id).await {
                errors.push(format!("Removing migrated habit {}: {}", habit_id, e));
            }
        }
        for todo_id in &migrated.todos {
            if let Err(e) = local.delete_todo(anonymous_id, todo_id).await {
                errors.push(format!("Removing migrated todo {}: {}", todo_id, e));
            }
        }
        if !migrated.timer_sessions.is_empty() {
            if let Err(e) = local.remove_timer_sessions(anonymous_id, &migrated.timer_sessions).await {
                errors.push(format!("Removing migrated timer sessions: {}", e));
            }
        }
    }

    /// Migrate when an identity change is a first sign-in from anonymous
    ///
    /// Returns `None` for any other transition and for an anonymous owner
    /// already migrated.
    pub async fn migrate_on_sign_in(
        &self,
        previous: &Identity,
        current: &Identity,
    ) -> Result<Option<MigrationResult>, MigrationError> {
        let (Identity::Anonymous(anonymous_id), Identity::Authenticated(user_id)) = (previous, current) else {
            return Ok(None);
        };

        if let Some(target) = self.repository.local().migration_marker(anonymous_id).await? {
            tracing::debug!("Device data of {} already migrated to {}", anonymous_id, target);
            return Ok(None);
        }

        self.migrate(anonymous_id, user_id).await.map(Some)
    }

    /// Check the auth collaborator and migrate the device's anonymous data if
    /// the caller is now signed in
    pub async fn check_auth_transition(
        &self,
        auth: &dyn AuthProvider,
    ) -> Result<Option<MigrationResult>, MigrationError> {
        let current = auth.current_identity();
        if current.is_anonymous() {
            return Ok(None);
        }

        let Some(anonymous_id) = self.repository.local().device_anonymous_id().await? else {
            return Ok(None);
        };

        self.migrate_on_sign_in(&Identity::Anonymous(anonymous_id), &current)
            .await
    }

    /// Report device records that would be repaired, skipped or orphaned by a migration
    pub async fn validate_migration_data(&self, anonymous_id: &str) -> Result<MigrationValidation, StorageError> {
        let snapshot = self.repository.local().snapshot(anonymous_id).await?;

        let mut warnings: Vec<String> = snapshot.report.dropped.clone();
        let mut is_valid = warnings.is_empty();

        for log in &snapshot.habit_logs {
            if !snapshot.habits.iter().any(|habit| habit.id == log.habit_id) {
                is_valid = false;
                warnings.push(format!("Habit log on {} refers to unknown habit {}", log.log_date, log.habit_id));
            }
        }

        warnings.extend(snapshot.report.repaired.iter().cloned());

        Ok(MigrationValidation { is_valid, warnings })
    }
}
