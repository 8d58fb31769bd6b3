/// Database schema management
///
/// This module creates and upgrades the relational schema of the remote
/// store, and the single table used by the file-backed key/value store.

use rusqlite::Connection;

use crate::storage::StorageError;

/// Current schema version of the relational store
///
/// Increment this when you add new migrations
const CURRENT_VERSION: i32 = 1;

/// Initialize the relational schema
///
/// Creates all tables and indexes if they don't exist and records the
/// schema version for future migrations.
pub fn initialize_database(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let current_version = get_current_version(conn)?;

    if current_version < CURRENT_VERSION {
        run_migrations(conn, current_version)?;
        set_version(conn, CURRENT_VERSION)?;
    }

    Ok(())
}

/// Create the key/value table used for device storage
pub fn initialize_kv_store(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value BLOB NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn get_current_version(conn: &Connection) -> Result<i32, StorageError> {
    let version = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get::<_, i32>(0)
        })
        .unwrap_or(0); // No version row yet means a fresh database

    Ok(version)
}

fn set_version(conn: &Connection, version: i32) -> Result<(), StorageError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

fn run_migrations(conn: &Connection, from_version: i32) -> Result<(), StorageError> {
    if from_version < 1 {
        migration_v1(conn)?;
    }

    Ok(())
}

/// Version 1: owner-scoped tables for habits, logs, todos and timer sessions
fn migration_v1(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS habits (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            emoji TEXT NOT NULL,
            frequency TEXT NOT NULL,
            start_date TEXT NOT NULL,
            current_streak INTEGER NOT NULL DEFAULT 0,
            longest_streak INTEGER NOT NULL DEFAULT 0,
            last_check_date TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS habit_logs (
            habit_id TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            log_date TEXT NOT NULL,
            note TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (habit_id) REFERENCES habits (id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS todos (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            content TEXT NOT NULL,
            is_completed BOOLEAN NOT NULL DEFAULT FALSE,
            completed_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS timer_sessions (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            habit_id TEXT,
            started_at TEXT NOT NULL,
            duration_seconds INTEGER NOT NULL,
            completed BOOLEAN NOT NULL DEFAULT FALSE
        );",
    )?;

    create_indexes_v1(conn)?;

    tracing::info!("Applied schema v1: created owner-scoped tables");
    Ok(())
}

fn create_indexes_v1(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_habits_owner ON habits (owner_id);
         CREATE INDEX IF NOT EXISTS idx_todos_owner ON todos (owner_id);
         CREATE INDEX IF NOT EXISTS idx_timer_sessions_owner ON timer_sessions (owner_id);
         -- One log per habit and day
         CREATE UNIQUE INDEX IF NOT EXISTS idx_habit_logs_unique
            ON habit_logs (habit_id, log_date);",
    )?;
    Ok(())
}
