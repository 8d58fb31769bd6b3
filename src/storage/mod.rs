/// Storage layer for persisting habit data
///
/// Two backends implement the same `HabitStore` contract:
/// - `LocalHabitStore` keeps an anonymous owner's data as JSON arrays in a
///   device key/value store
/// - `SqliteStorage` is the multi-tenant relational store used for
///   authenticated owners, filtering every statement on `owner_id`
///
/// Neither backend computes streaks; the repository does that through the
/// streak engine and writes the result back with `update_habit`.

pub mod kv;
pub mod local;
pub mod schema;
pub mod sqlite;

// Re-export the main storage types
pub use kv::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
pub use local::{EntityType, LocalHabitStore};
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{DateRange, Habit, HabitId, HabitLog, TimerSession, Todo, TodoId};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not authenticated: remote storage needs a signed-in owner")]
    NotAuthenticated,

    #[error("Habit not found: {habit_id}")]
    HabitNotFound { habit_id: String },

    #[error("Todo not found: {todo_id}")]
    TodoNotFound { todo_id: String },

    #[error("Log not found: habit {habit_id} has no log on {date}")]
    LogNotFound { habit_id: String, date: NaiveDate },

    #[error("Duplicate log: habit {habit_id} already logged for date {date}")]
    DuplicateLog { habit_id: String, date: NaiveDate },

    #[error("Permission denied: {resource} is not owned by {owner_id}")]
    PermissionDenied { owner_id: String, resource: String },

    #[error("Transient storage failure: {0}")]
    TransientIo(String),

    #[error("Storage quota exceeded: {needed} bytes requested, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database query error: {0}")]
    Query(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Whether repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::TransientIo(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::HabitNotFound { .. }
                | StorageError::TodoNotFound { .. }
                | StorageError::LogNotFound { .. }
        )
    }
}

impl From<rusqlite::Error> for StorageError {
    /// Busy/locked databases and I/O failures are worth retrying; everything
    /// else is a query error.
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if matches!(
                    code.code,
                    ErrorCode::DatabaseBusy
                        | ErrorCode::DatabaseLocked
                        | ErrorCode::SystemIoFailure
                        | ErrorCode::CannotOpen
                ) =>
            {
                StorageError::TransientIo(err.to_string())
            }
            _ => StorageError::Query(err),
        }
    }
}

/// Storage contract shared by the local and remote backends
///
/// Every method is scoped by `owner_id`; a backend never returns or touches a
/// row belonging to another owner.
#[async_trait]
pub trait HabitStore: Send + Sync {
    /// List the owner's habits, oldest first
    async fn list_habits(&self, owner_id: &str) -> Result<Vec<Habit>, StorageError>;

    /// Get one habit
    async fn get_habit(&self, owner_id: &str, habit_id: &HabitId) -> Result<Habit, StorageError>;

    /// Insert a new habit
    async fn insert_habit(&self, habit: &Habit) -> Result<(), StorageError>;

    /// Overwrite an existing habit (used to persist derived streak fields)
    async fn update_habit(&self, habit: &Habit) -> Result<(), StorageError>;

    /// Delete a habit together with all of its logs
    async fn delete_habit(&self, owner_id: &str, habit_id: &HabitId) -> Result<(), StorageError>;

    /// Insert a log; fails with `DuplicateLog` if the day is already logged
    async fn insert_log(&self, log: &HabitLog) -> Result<(), StorageError>;

    /// Delete the log of one day; fails with `LogNotFound` if there is none
    async fn delete_log(&self, owner_id: &str, habit_id: &HabitId, date: NaiveDate) -> Result<(), StorageError>;

    /// List a habit's logs ordered by date, optionally within an inclusive range
    async fn list_logs(
        &self,
        owner_id: &str,
        habit_id: &HabitId,
        range: Option<DateRange>,
    ) -> Result<Vec<HabitLog>, StorageError>;

    /// List the owner's todos, oldest first
    async fn list_todos(&self, owner_id: &str) -> Result<Vec<Todo>, StorageError>;

    async fn get_todo(&self, owner_id: &str, todo_id: &TodoId) -> Result<Todo, StorageError>;

    async fn insert_todo(&self, todo: &Todo) -> Result<(), StorageError>;

    async fn update_todo(&self, todo: &Todo) -> Result<(), StorageError>;

    async fn delete_todo(&self, owner_id: &str, todo_id: &TodoId) -> Result<(), StorageError>;

    /// List the owner's timer sessions, oldest first
    async fn list_timer_sessions(&self, owner_id: &str) -> Result<Vec<TimerSession>, StorageError>;

    async fn insert_timer_session(&self, session: &TimerSession) -> Result<(), StorageError>;

    /// Remove every row of the owner
    async fn clear_owner(&self, owner_id: &str) -> Result<(), StorageError>;
}
