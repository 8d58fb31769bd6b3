/// Relational implementation of the habit storage interface
///
/// This module plays the role of the hosted multi-tenant backend: every table
/// carries an `owner_id` column and every statement filters on it. Writes to
/// a row owned by somebody else fail with `PermissionDenied`, never touching
/// the row.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use crate::domain::{DateRange, Frequency, Habit, HabitId, HabitLog, TimerSession, Todo, TodoId};
use crate::storage::{schema, HabitStore, StorageError};

const HABIT_COLUMNS: &str = "id, owner_id, emoji, frequency, start_date, current_streak, \
                             longest_streak, last_check_date, created_at";
const TODO_COLUMNS: &str = "id, owner_id, content, is_completed, completed_at, created_at";

/// SQLite-based multi-tenant storage
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open the database file and bring its schema up to date
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path.as_ref())
            .map_err(|e| StorageError::Connection(format!("Failed to open database: {}", e)))?;
        let storage = Self::from_connection(conn)?;

        tracing::info!("Remote store initialized at: {:?}", db_path.as_ref());
        Ok(storage)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(format!("Failed to open database: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| StorageError::Connection(format!("Failed to enable foreign keys: {}", e)))?;
        schema::initialize_database(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remote rows always belong to a signed-in owner
    fn require_owner(owner_id: &str) -> Result<(), StorageError> {
        if owner_id.trim().is_empty() {
            return Err(StorageError::NotAuthenticated);
        }
        Ok(())
    }

    /// Resolve who owns a row of `table`, mapping absence and foreign ownership
    fn check_owner(
        conn: &Connection,
        table: &str,
        id: &str,
        owner_id: &str,
        not_found: impl FnOnce() -> StorageError,
    ) -> Result<(), StorageError> {
        Self::require_owner(owner_id)?;

        let sql = format!("SELECT owner_id FROM {} WHERE id = ?1", table);
        let found: Option<String> = conn
            .query_row(&sql, params![id], |row| row.get(0))
            .optional()?;

        match found {
            None => Err(not_found()),
            Some(owner) if owner != owner_id => {
                tracing::warn!("Denied access to {} {} for {}", table, id, owner_id);
                Err(StorageError::PermissionDenied {
                    owner_id: owner_id.to_string(),
                    resource: format!("{} {}", table, id),
                })
            }
            Some(_) => Ok(()),
        }
    }

    fn check_habit_owner(conn: &Connection, owner_id: &str, habit_id: &HabitId) -> Result<(), StorageError> {
        Self::check_owner(conn, "habits", habit_id.as_str(), owner_id, || {
            StorageError::HabitNotFound {
                habit_id: habit_id.to_string(),
            }
        })
    }

    fn check_todo_owner(conn: &Connection, owner_id: &str, todo_id: &TodoId) -> Result<(), StorageError> {
        Self::check_owner(conn, "todos", todo_id.as_str(), owner_id, || StorageError::TodoNotFound {
            todo_id: todo_id.to_string(),
        })
    }

    fn habit_from_row(row: &Row<'_>) -> rusqlite::Result<Habit> {
        let frequency_json: String = row.get(3)?;
        let frequency: Frequency = serde_json::from_str(&frequency_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

        Ok(Habit {
            id: HabitId(row.get(0)?),
            owner_id: row.get(1)?,
            emoji: row.get(2)?,
            frequency,
            start_date: row.get(4)?,
            current_streak: row.get(5)?,
            longest_streak: row.get(6)?,
            last_check_date: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn log_from_row(row: &Row<'_>) -> rusqlite::Result<HabitLog> {
        Ok(HabitLog {
            habit_id: HabitId(row.get(0)?),
            owner_id: row.get(1)?,
            log_date: row.get(2)?,
            note: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<Todo> {
        Ok(Todo {
            id: TodoId(row.get(0)?),
            owner_id: row.get(1)?,
            content: row.get(2)?,
            is_completed: row.get(3)?,
            completed_at: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn timer_session_from_row(row: &Row<'_>) -> rusqlite::Result<TimerSession> {
        Ok(TimerSession {
            id: crate::domain::TimerSessionId(row.get(0)?),
            owner_id: row.get(1)?,
            habit_id: row.get::<_, Option<String>>(2)?.map(HabitId),
            started_at: row.get(3)?,
            duration_seconds: row.get(4)?,
            completed: row.get(5)?,
        })
    }
}

#[async_trait]
impl HabitStore for SqliteStorage {
    async fn list_habits(&self, owner_id: &str) -> Result<Vec<Habit>, StorageError> {
        Self::require_owner(owner_id)?;
        let conn = self.conn();

        let sql = format!(
            "SELECT {} FROM habits WHERE owner_id = ?1 ORDER BY created_at, id",
            HABIT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let habits = stmt
            .query_map(params![owner_id], Self::habit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(habits)
    }

    async fn get_habit(&self, owner_id: &str, habit_id: &HabitId) -> Result<Habit, StorageError> {
        let conn = self.conn();
        Self::check_habit_owner(&conn, owner_id, habit_id)?;

        let sql = format!(
            "SELECT {} FROM habits WHERE id = ?1 AND owner_id = ?2",
            HABIT_COLUMNS
        );
        let habit = conn.query_row(&sql, params![habit_id.as_str(), owner_id], Self::habit_from_row)?;
        Ok(habit)
    }

    async fn insert_habit(&self, habit: &Habit) -> Result<(), StorageError> {
        Self::require_owner(&habit.owner_id)?;
        let frequency_json = serde_json::to_string(&habit.frequency)?;

        self.conn().execute(
            "INSERT INTO habits (
                id, owner_id, emoji, frequency, start_date,
                current_streak, longest_streak, last_check_date, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                habit.id.as_str(),
                habit.owner_id,
                habit.emoji,
                frequency_json,
                habit.start_date,
                habit.current_streak,
                habit.longest_streak,
                habit.last_check_date,
                habit.created_at,
            ],
        )?;

        tracing::debug!("Created remote habit {} ({}) for {}", habit.emoji, habit.id, habit.owner_id);
        Ok(())
    }

    async fn update_habit(&self, habit: &Habit) -> Result<(), StorageError> {
        let frequency_json = serde_json::to_string(&habit.frequency)?;
        let conn = self.conn();
        Self::check_habit_owner(&conn, &habit.owner_id, &habit.id)?;

        // start_date and created_at are immutable
        conn.execute(
            "UPDATE habits SET
                emoji = ?3,
                frequency = ?4,
                current_streak = ?5,
                longest_streak = ?6,
                last_check_date = ?7
             WHERE id = ?1 AND owner_id = ?2",
            params![
                habit.id.as_str(),
                habit.owner_id,
                habit.emoji,
                frequency_json,
                habit.current_streak,
                habit.longest_streak,
                habit.last_check_date,
            ],
        )?;

        tracing::debug!("Updated remote habit {}", habit.id);
        Ok(())
    }

    async fn delete_habit(&self, owner_id: &str, habit_id: &HabitId) -> Result<(), StorageError> {
        let mut conn = self.conn();
        Self::check_habit_owner(&conn, owner_id, habit_id)?;

        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM habit_logs WHERE habit_id = ?1 AND owner_id = ?2",
            params![habit_id.as_str(), owner_id],
        )?;
        tx.execute(
            "DELETE FROM habits WHERE id = ?1 AND owner_id = ?2",
            params![habit_id.as_str(), owner_id],
        )?;
        tx.commit()?;

        tracing::debug!("Deleted remote habit {} and its logs", habit_id);
        Ok(())
    }

    async fn insert_log(&self, log: &HabitLog) -> Result<(), StorageError> {
        let conn = self.conn();
        Self::check_habit_owner(&conn, &log.owner_id, &log.habit_id)?;

        let result = conn.execute(
            "INSERT INTO habit_logs (habit_id, owner_id, log_date, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![log.habit_id.as_str(), log.owner_id, log.log_date, log.note, log.created_at],
        );

        match result {
            Ok(_) => {
                tracing::debug!("Logged remote habit {} on {}", log.habit_id, log.log_date);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StorageError::DuplicateLog {
                    habit_id: log.habit_id.to_string(),
                    date: log.log_date,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_log(&self, owner_id: &str, habit_id: &HabitId, date: NaiveDate) -> Result<(), StorageError> {
        let conn = self.conn();
        Self::check_habit_owner(&conn, owner_id, habit_id)?;

        let rows_affected = conn.execute(
            "DELETE FROM habit_logs WHERE habit_id = ?1 AND owner_id = ?2 AND log_date = ?3",
            params![habit_id.as_str(), owner_id, date],
        )?;

        if rows_affected == 0 {
            return Err(StorageError::LogNotFound {
                habit_id: habit_id.to_string(),
                date,
            });
        }

        tracing::debug!("Removed remote log of habit {} on {}", habit_id, date);
        Ok(())
    }

    async fn list_logs(
        &self,
        owner_id: &str,
        habit_id: &HabitId,
        range: Option<DateRange>,
    ) -> Result<Vec<HabitLog>, StorageError> {
        let conn = self.conn();
        Self::check_habit_owner(&conn, owner_id, habit_id)?;

        let start = range.and_then(|r| r.start);
        let end = range.and_then(|r| r.end);

        let mut stmt = conn.prepare(
            "SELECT habit_id, owner_id, log_date, note, created_at
             FROM habit_logs
             WHERE habit_id = ?1 AND owner_id = ?2
               AND (?3 IS NULL OR log_date >= ?3)
               AND (?4 IS NULL OR log_date <= ?4)
             ORDER BY log_date",
        )?;
        let logs = stmt
            .query_map(params![habit_id.as_str(), owner_id, start, end], Self::log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    async fn list_todos(&self, owner_id: &str) -> Result<Vec<Todo>, StorageError> {
        Self::require_owner(owner_id)?;
        let conn = self.conn();

        let sql = format!(
            "SELECT {} FROM todos WHERE owner_id = ?1 ORDER BY created_at, id",
            TODO_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let todos = stmt
            .query_map(params![owner_id], Self::todo_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(todos)
    }

    async fn get_todo(&self, owner_id: &str, todo_id: &TodoId) -> Result<Todo, StorageError> {
        let conn = self.conn();
        Self::check_todo_owner(&conn, owner_id, todo_id)?;

        let sql = format!("SELECT {} FROM todos WHERE id = ?1 AND owner_id = ?2", TODO_COLUMNS);
        let todo = conn.query_row(&sql, params![todo_id.as_str(), owner_id], Self::todo_from_row)?;
        Ok(todo)
    }

    async fn insert_todo(&self, todo: &Todo) -> Result<(), StorageError> {
        Self::require_owner(&todo.owner_id)?;

        self.conn().execute(
            "INSERT INTO todos (id, owner_id, content, is_completed, completed_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                todo.id.as_str(),
                todo.owner_id,
                todo.content,
                todo.is_completed,
                todo.completed_at,
                todo.created_at,
            ],
        )?;

        tracing::debug!("Created remote todo {} for {}", todo.id, todo.owner_id);
        Ok(())
    }

    async fn update_todo(&self, todo: &Todo) -> Result<(), StorageError> {
        let conn = self.conn();
        Self::check_todo_owner(&conn, &todo.owner_id, &todo.id)?;

        conn.execute(
            "UPDATE todos SET content = ?3, is_completed = ?4, completed_at = ?5
             WHERE id = ?1 AND owner_id = ?2",
            params![
                todo.id.as_str(),
                todo.owner_id,
                todo.content,
                todo.is_completed,
                todo.completed_at,
            ],
        )?;
        Ok(())
    }

    async fn delete_todo(&self, owner_id: &str, todo_id: &TodoId) -> Result<(), StorageError> {
        let conn = self.conn();
        Self::check_todo_owner(&conn, owner_id, todo_id)?;

        conn.execute(
            "DELETE FROM todos WHERE id = ?1 AND owner_id = ?2",
            params![todo_id.as_str(), owner_id],
        )?;
        Ok(())
    }

    async fn list_timer_sessions(&self, owner_id: &str) -> Result<Vec<TimerSession>, StorageError> {
        Self::require_owner(owner_id)?;
        let conn = self.conn();

        let mut stmt = conn.prepare(
            "SELECT id, owner_id, habit_id, started_at, duration_seconds, completed
             FROM timer_sessions WHERE owner_id = ?1 ORDER BY started_at, id",
        )?;
        let sessions = stmt
            .query_map(params![owner_id], Self::timer_session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    async fn insert_timer_session(&self, session: &TimerSession) -> Result<(), StorageError> {
        let conn = self.conn();
        Self::require_owner(&session.owner_id)?;
        if let Some(habit_id) = &session.habit_id {
            Self::check_habit_owner(&conn, &session.owner_id, habit_id)?;
        }

        conn.execute(
            "INSERT INTO timer_sessions (id, owner_id, habit_id, started_at, duration_seconds, completed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id.as_str(),
                session.owner_id,
                session.habit_id.as_ref().map(|h| h.as_str()),
                session.started_at,
                session.duration_seconds,
                session.completed,
            ],
        )?;
        Ok(())
    }

    async fn clear_owner(&self, owner_id: &str) -> Result<(), StorageError> {
        Self::require_owner(owner_id)?;
        let mut conn = self.conn();

        let tx = conn.transaction()?;
        for table in ["habit_logs", "habits", "todos", "timer_sessions"] {
            tx.execute(&format!("DELETE FROM {} WHERE owner_id = ?1", table), params![owner_id])?;
        }
        tx.commit()?;

        tracing::info!("Cleared remote rows for {}", owner_id);
        Ok(())
    }
}
