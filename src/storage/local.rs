/// Device-local storage for anonymous owners
///
/// Each entity type of an owner is one JSON array stored under
/// `local_<entityType>_<ownerId>`; preferences are a JSON object under the
/// same scheme, and the device's anonymous id is the scalar string under
/// `anonymous_user_id`. Every read goes through the repair rules. Repaired
/// records are saved back on the spot so generated ids stay stable, and
/// records that cannot be repaired are written back untouched until a
/// migration reports them.
///
/// Writes are read-modify-write on whole arrays and are not serialized
/// against each other: two overlapping writes for the same owner keep
/// whichever finishes last.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::domain::repair::{self, RepairReport};
use crate::domain::{
    DateRange, Habit, HabitId, HabitLog, Identity, TimerSession, TimerSessionId, Todo, TodoId,
};
use crate::storage::{HabitStore, KeyValueStore, StorageError};

/// Scalar key holding the device's anonymous id
pub const ANONYMOUS_USER_ID_KEY: &str = "anonymous_user_id";

/// Entity types persisted per owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Habits,
    Todos,
    HabitLogs,
    TimerSessions,
    Preferences,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Habits,
        EntityType::Todos,
        EntityType::HabitLogs,
        EntityType::TimerSessions,
        EntityType::Preferences,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Habits => "habits",
            EntityType::Todos => "todos",
            EntityType::HabitLogs => "habit_logs",
            EntityType::TimerSessions => "timer_sessions",
            EntityType::Preferences => "preferences",
        }
    }

    /// Storage key of this entity type for `owner_id`
    pub fn key(&self, owner_id: &str) -> String {
        format!("local_{}_{}", self.as_str(), owner_id)
    }
}

/// Key recording that an anonymous owner's data was already migrated
fn migration_marker_key(anonymous_id: &str) -> String {
    format!("local_migrated_{}", anonymous_id)
}

/// Everything stored locally for one owner, after repair
#[derive(Debug, Clone, Default)]
pub struct LocalSnapshot {
    pub habits: Vec<Habit>,
    pub todos: Vec<Todo>,
    pub habit_logs: Vec<HabitLog>,
    pub timer_sessions: Vec<TimerSession>,
    pub report: RepairReport,
}

/// Usable records of one entity type, plus the raw ones repair rejected
struct Loaded<T> {
    records: Vec<T>,
    rejected: Vec<Value>,
}

/// `HabitStore` over a device key/value store
pub struct LocalHabitStore {
    kv: Arc<dyn KeyValueStore>,
}

impl LocalHabitStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Raw records of one entity type; a missing key is an empty list
    async fn read_raw(&self, entity: EntityType, owner_id: &str) -> Result<Vec<Value>, StorageError> {
        match self.kv.get(&entity.key(owner_id)).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Store `records` followed by the rejected raw records, unchanged
    async fn write<T: Serialize + Sync>(
        &self,
        entity: EntityType,
        owner_id: &str,
        records: &[T],
        rejected: &[Value],
    ) -> Result<(), StorageError> {
        let mut values = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        values.extend(rejected.iter().cloned());
        let bytes = serde_json::to_vec(&values)?;
        self.kv.set(&entity.key(owner_id), bytes).await
    }

    async fn save<T: Serialize + Sync>(
        &self,
        entity: EntityType,
        owner_id: &str,
        loaded: &Loaded<T>,
    ) -> Result<(), StorageError> {
        self.write(entity, owner_id, &loaded.records, &loaded.rejected).await
    }

    /// Log what repair did and persist it when any record changed
    async fn settle<T: Serialize + Sync>(
        &self,
        entity: EntityType,
        owner_id: &str,
        records: Vec<T>,
        report: &RepairReport,
    ) -> Result<Loaded<T>, StorageError> {
        Self::warn_on_repairs(entity, owner_id, report);
        let loaded = Loaded {
            records,
            rejected: report.rejected.clone(),
        };
        if !report.repaired.is_empty() {
            self.save(entity, owner_id, &loaded).await?;
        }
        Ok(loaded)
    }

    async fn load_habits(&self, owner_id: &str) -> Result<(Vec<Habit>, RepairReport), StorageError> {
        let raw = self.read_raw(EntityType::Habits, owner_id).await?;
        Ok(repair::repair_all(raw, "Habit", |r| repair::repair_habit(r, owner_id)))
    }

    async fn load_todos(&self, owner_id: &str) -> Result<(Vec<Todo>, RepairReport), StorageError> {
        let raw = self.read_raw(EntityType::Todos, owner_id).await?;
        Ok(repair::repair_all(raw, "Todo", |r| repair::repair_todo(r, owner_id)))
    }

    async fn load_logs(&self, owner_id: &str) -> Result<(Vec<HabitLog>, RepairReport), StorageError> {
        let raw = self.read_raw(EntityType::HabitLogs, owner_id).await?;
        let (logs, mut report) = repair::repair_all(raw, "Habit log", |r| repair::repair_log(r, owner_id));
        let logs = repair::dedupe_logs(logs, &mut report);
        Ok((logs, report))
    }

    async fn load_timer_sessions(
        &self,
        owner_id: &str,
    ) -> Result<(Vec<TimerSession>, RepairReport), StorageError> {
        let raw = self.read_raw(EntityType::TimerSessions, owner_id).await?;
        Ok(repair::repair_all(raw, "Timer session", |r| {
            repair::repair_timer_session(r, owner_id)
        }))
    }

    fn warn_on_repairs(entity: EntityType, owner_id: &str, report: &RepairReport) {
        if report.is_clean() {
            return;
        }
        tracing::warn!(
            "Repaired local {} for {}: {} fixed, {} dropped",
            entity.as_str(),
            owner_id,
            report.repaired.len(),
            report.dropped.len()
        );
        for line in report.repaired.iter().chain(report.dropped.iter()) {
            tracing::debug!("  {}", line);
        }
    }

    async fn habits(&self, owner_id: &str) -> Result<Loaded<Habit>, StorageError> {
        let (habits, report) = self.load_habits(owner_id).await?;
        self.settle(EntityType::Habits, owner_id, habits, &report).await
    }

    async fn todos(&self, owner_id: &str) -> Result<Loaded<Todo>, StorageError> {
        let (todos, report) = self.load_todos(owner_id).await?;
        self.settle(EntityType::Todos, owner_id, todos, &report).await
    }

    async fn logs(&self, owner_id: &str) -> Result<Loaded<HabitLog>, StorageError> {
        let (logs, report) = self.load_logs(owner_id).await?;
        self.settle(EntityType::HabitLogs, owner_id, logs, &report).await
    }

    async fn timer_sessions(&self, owner_id: &str) -> Result<Loaded<TimerSession>, StorageError> {
        let (sessions, report) = self.load_timer_sessions(owner_id).await?;
        self.settle(EntityType::TimerSessions, owner_id, sessions, &report).await
    }

    /// Read and repair everything stored for `owner_id`
    ///
    /// The report lists every repair made, including the ones this read saved.
    pub async fn snapshot(&self, owner_id: &str) -> Result<LocalSnapshot, StorageError> {
        let (habits, habit_report) = self.load_habits(owner_id).await?;
        let (todos, todo_report) = self.load_todos(owner_id).await?;
        let (habit_logs, log_report) = self.load_logs(owner_id).await?;
        let (timer_sessions, timer_report) = self.load_timer_sessions(owner_id).await?;

        let habits = self.settle(EntityType::Habits, owner_id, habits, &habit_report).await?.records;
        let todos = self.settle(EntityType::Todos, owner_id, todos, &todo_report).await?.records;
        let habit_logs = self
            .settle(EntityType::HabitLogs, owner_id, habit_logs, &log_report)
            .await?
            .records;
        let timer_sessions = self
            .settle(EntityType::TimerSessions, owner_id, timer_sessions, &timer_report)
            .await?
            .records;

        let mut report = RepairReport::default();
        for part in [habit_report, todo_report, log_report, timer_report] {
            report.repaired.extend(part.repaired);
            report.dropped.extend(part.dropped);
            report.rejected.extend(part.rejected);
        }

        Ok(LocalSnapshot {
            habits,
            todos,
            habit_logs,
            timer_sessions,
            report,
        })
    }

    /// Preferences object of an owner, if any was saved
    pub async fn preferences(&self, owner_id: &str) -> Result<Option<Value>, StorageError> {
        match self.kv.get(&EntityType::Preferences.key(owner_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn set_preferences(&self, owner_id: &str, preferences: &Value) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(preferences)?;
        self.kv.set(&EntityType::Preferences.key(owner_id), bytes).await
    }

    /// The device's anonymous id, if one was ever generated
    pub async fn device_anonymous_id(&self) -> Result<Option<String>, StorageError> {
        let Some(bytes) = self.kv.get(ANONYMOUS_USER_ID_KEY).await? else {
            return Ok(None);
        };
        let id = String::from_utf8(bytes)
            .map_err(|e| StorageError::Connection(format!("Unreadable anonymous id: {}", e)))?;
        Ok(Some(id).filter(|id| !id.trim().is_empty()))
    }

    /// The device's anonymous identity, generating and saving one on first use
    pub async fn ensure_anonymous_identity(&self) -> Result<Identity, StorageError> {
        if let Some(id) = self.device_anonymous_id().await? {
            return Ok(Identity::Anonymous(id));
        }

        let identity = Identity::new_anonymous();
        self.kv
            .set(ANONYMOUS_USER_ID_KEY, identity.id().as_bytes().to_vec())
            .await?;
        tracing::info!("Generated device anonymous id {}", identity.id());
        Ok(identity)
    }

    /// User id the anonymous owner's data was migrated to, if it was
    pub async fn migration_marker(&self, anonymous_id: &str) -> Result<Option<String>, StorageError> {
        let value = self.kv.get(&migration_marker_key(anonymous_id)).await?;
        Ok(value.and_then(|bytes| String::from_utf8(bytes).ok()))
    }

    pub async fn set_migration_marker(&self, anonymous_id: &str, user_id: &str) -> Result<(), StorageError> {
        self.kv
            .set(&migration_marker_key(anonymous_id), user_id.as_bytes().to_vec())
            .await
    }

    /// Remove timer sessions by id; unknown ids are ignored
    pub async fn remove_timer_sessions(&self, owner_id: &str, ids: &[TimerSessionId]) -> Result<(), StorageError> {
        let mut sessions = self.timer_sessions(owner_id).await?;
        sessions.records.retain(|s| !ids.contains(&s.id));
        self.save(EntityType::TimerSessions, owner_id, &sessions).await
    }

    fn habit_not_found(habit_id: &HabitId) -> StorageError {
        StorageError::HabitNotFound {
            habit_id: habit_id.to_string(),
        }
    }

    fn todo_not_found(todo_id: &TodoId) -> StorageError {
        StorageError::TodoNotFound {
            todo_id: todo_id.to_string(),
        }
    }
}

#[async_trait]
impl HabitStore for LocalHabitStore {
    async fn list_habits(&self, owner_id: &str) -> Result<Vec<Habit>, StorageError> {
        let mut habits = self.habits(owner_id).await?.records;
        habits.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(habits)
    }

    async fn get_habit(&self, owner_id: &str, habit_id: &HabitId) -> Result<Habit, StorageError> {
        self.habits(owner_id)
            .await?
            .records
            .into_iter()
            .find(|h| &h.id == habit_id)
            .ok_or_else(|| Self::habit_not_found(habit_id))
    }

    async fn insert_habit(&self, habit: &Habit) -> Result<(), StorageError> {
        let mut habits = self.habits(&habit.owner_id).await?;
        habits.records.push(habit.clone());
        self.save(EntityType::Habits, &habit.owner_id, &habits).await?;

        tracing::debug!("Created local habit {} ({})", habit.emoji, habit.id);
        Ok(())
    }

    async fn update_habit(&self, habit: &Habit) -> Result<(), StorageError> {
        let mut habits = self.habits(&habit.owner_id).await?;
        let slot = habits
            .records
            .iter_mut()
            .find(|h| h.id == habit.id)
            .ok_or_else(|| Self::habit_not_found(&habit.id))?;
        *slot = habit.clone();
        self.save(EntityType::Habits, &habit.owner_id, &habits).await?;

        tracing::debug!("Updated local habit {}", habit.id);
        Ok(())
    }

    async fn delete_habit(&self, owner_id: &str, habit_id: &HabitId) -> Result<(), StorageError> {
        let mut habits = self.habits(owner_id).await?;
        let before = habits.records.len();
        habits.records.retain(|h| &h.id != habit_id);
        if habits.records.len() == before {
            return Err(Self::habit_not_found(habit_id));
        }

        let mut logs = self.logs(owner_id).await?;
        logs.records.retain(|l| &l.habit_id != habit_id);

        self.save(EntityType::HabitLogs, owner_id, &logs).await?;
        self.save(EntityType::Habits, owner_id, &habits).await?;

        tracing::debug!("Deleted local habit {} and its logs", habit_id);
        Ok(())
    }

    async fn insert_log(&self, log: &HabitLog) -> Result<(), StorageError> {
        self.get_habit(&log.owner_id, &log.habit_id).await?;

        let mut logs = self.logs(&log.owner_id).await?;
        if logs
            .records
            .iter()
            .any(|l| l.habit_id == log.habit_id && l.log_date == log.log_date)
        {
            return Err(StorageError::DuplicateLog {
                habit_id: log.habit_id.to_string(),
                date: log.log_date,
            });
        }
        logs.records.push(log.clone());
        self.save(EntityType::HabitLogs, &log.owner_id, &logs).await?;

        tracing::debug!("Logged local habit {} on {}", log.habit_id, log.log_date);
        Ok(())
    }

    async fn delete_log(&self, owner_id: &str, habit_id: &HabitId, date: NaiveDate) -> Result<(), StorageError> {
        let mut logs = self.logs(owner_id).await?;
        let before = logs.records.len();
        logs.records.retain(|l| !(&l.habit_id == habit_id && l.log_date == date));
        if logs.records.len() == before {
            return Err(StorageError::LogNotFound {
                habit_id: habit_id.to_string(),
                date,
            });
        }
        self.save(EntityType::HabitLogs, owner_id, &logs).await?;

        tracing::debug!("Removed local log of habit {} on {}", habit_id, date);
        Ok(())
    }

    async fn list_logs(
        &self,
        owner_id: &str,
        habit_id: &HabitId,
        range: Option<DateRange>,
    ) -> Result<Vec<HabitLog>, StorageError> {
        self.get_habit(owner_id, habit_id).await?;

        let mut logs: Vec<HabitLog> = self
            .logs(owner_id)
            .await?
            .records
            .into_iter()
            .filter(|l| &l.habit_id == habit_id)
            .filter(|l| range.map_or(true, |r| r.contains(l.log_date)))
            .collect();
        logs.sort_by_key(|l| l.log_date);
        Ok(logs)
    }

    async fn list_todos(&self, owner_id: &str) -> Result<Vec<Todo>, StorageError> {
        let mut todos = self.todos(owner_id).await?.records;
        todos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(todos)
    }

    async fn get_todo(&self, owner_id: &str, todo_id: &TodoId) -> Result<Todo, StorageError> {
        self.todos(owner_id)
            .await?
            .records
            .into_iter()
            .find(|t| &t.id == todo_id)
            .ok_or_else(|| Self::todo_not_found(todo_id))
    }

    async fn insert_todo(&self, todo: &Todo) -> Result<(), StorageError> {
        let mut todos = self.todos(&todo.owner_id).await?;
        todos.records.push(todo.clone());
        self.save(EntityType::Todos, &todo.owner_id, &todos).await?;

        tracing::debug!("Created local todo {}", todo.id);
        Ok(())
    }

    async fn update_todo(&self, todo: &Todo) -> Result<(), StorageError> {
        let mut todos = self.todos(&todo.owner_id).await?;
        let slot = todos
            .records
            .iter_mut()
            .find(|t| t.id == todo.id)
            .ok_or_else(|| Self::todo_not_found(&todo.id))?;
        *slot = todo.clone();
        self.save(EntityType::Todos, &todo.owner_id, &todos).await
    }

    async fn delete_todo(&self, owner_id: &str, todo_id: &TodoId) -> Result<(), StorageError> {
        let mut todos = self.todos(owner_id).await?;
        let before = todos.records.len();
        todos.records.retain(|t| &t.id != todo_id);
        if todos.records.len() == before {
            return Err(Self::todo_not_found(todo_id));
        }
        self.save(EntityType::Todos, owner_id, &todos).await
    }

    async fn list_timer_sessions(&self, owner_id: &str) -> Result<Vec<TimerSession>, StorageError> {
        let mut sessions = self.timer_sessions(owner_id).await?.records;
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(sessions)
    }

    async fn insert_timer_session(&self, session: &TimerSession) -> Result<(), StorageError> {
        let mut sessions = self.timer_sessions(&session.owner_id).await?;
        sessions.records.push(session.clone());
        self.save(EntityType::TimerSessions, &session.owner_id, &sessions).await
    }

    async fn clear_owner(&self, owner_id: &str) -> Result<(), StorageError> {
        for entity in EntityType::ALL {
            self.kv.remove(&entity.key(owner_id)).await?;
        }
        tracing::info!("Cleared local storage for {}", owner_id);
        Ok(())
    }
}
