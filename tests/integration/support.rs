/// Shared fixtures for the integration tests
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use habit_sync::storage::MemoryKeyValueStore;
use habit_sync::*;

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn local_store() -> (Arc<MemoryKeyValueStore>, Arc<LocalHabitStore>) {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let local = Arc::new(LocalHabitStore::new(kv.clone()));
    (kv, local)
}

pub fn repository() -> Arc<HabitRepository> {
    let (_, local) = local_store();
    let remote = Arc::new(SqliteStorage::open_in_memory().unwrap());
    Arc::new(HabitRepository::new(local, remote))
}

/// One identity per backend, same call signatures for both
pub fn identities() -> [Identity; 2] {
    [
        Identity::Anonymous("anon_1700000000000_abcdefghi".to_string()),
        Identity::Authenticated("user_alice".to_string()),
    ]
}

/// Remote store that can be told to fail specific writes
pub struct FlakyStore {
    inner: SqliteStorage,
    /// Todo inserts whose content contains this text fail with a transient error
    pub fail_todo_containing: Mutex<Option<String>>,
    pub fail_habit_updates: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStorage::open_in_memory().unwrap(),
            fail_todo_containing: Mutex::new(None),
            fail_habit_updates: AtomicBool::new(false),
        }
    }

    pub fn failing_todos(text: &str) -> Self {
        Self {
            fail_todo_containing: Mutex::new(Some(text.to_string())),
            ..Self::new()
        }
    }

    pub fn stop_failing_todos(&self) {
        *self.fail_todo_containing.lock().unwrap() = None;
    }
}

#[async_trait]
impl HabitStore for FlakyStore {
    async fn list_habits(&self, owner_id: &str) -> Result<Vec<Habit>, StorageError> {
        self.inner.list_habits(owner_id).await
    }

    async fn get_habit(&self, owner_id: &str, habit_id: &HabitId) -> Result<Habit, StorageError> {
        self.inner.get_habit(owner_id, habit_id).await
    }

    async fn insert_habit(&self, habit: &Habit) -> Result<(), StorageError> {
        self.inner.insert_habit(habit).await
    }

    async fn update_habit(&self, habit: &Habit) -> Result<(), StorageError> {
        if self.fail_habit_updates.load(Ordering::SeqCst) {
            return Err(StorageError::TransientIo("connection reset".to_string()));
        }
        self.inner.update_habit(habit).await
    }

    async fn delete_habit(&self, owner_id: &str, habit_id: &HabitId) -> Result<(), StorageError> {
        self.inner.delete_habit(owner_id, habit_id).await
    }

    async fn insert_log(&self, log: &HabitLog) -> Result<(), StorageError> {
        self.inner.insert_log(log).await
    }

    async fn delete_log(&self, owner_id: &str, habit_id: &HabitId, date: NaiveDate) -> Result<(), StorageError> {
        self.inner.delete_log(owner_id, habit_id, date).await
    }

    async fn list_logs(
        &self,
        owner_id: &str,
        habit_id: &HabitId,
        range: Option<DateRange>,
    ) -> Result<Vec<HabitLog>, StorageError> {
        self.inner.list_logs(owner_id, habit_id, range).await
    }

    async fn list_todos(&self, owner_id: &str) -> Result<Vec<Todo>, StorageError> {
        self.inner.list_todos(owner_id).await
    }

    async fn get_todo(&self, owner_id: &str, todo_id: &TodoId) -> Result<Todo, StorageError> {
        self.inner.get_todo(owner_id, todo_id).await
    }

    async fn insert_todo(&self, todo: &Todo) -> Result<(), StorageError> {
        let failing = self.fail_todo_containing.lock().unwrap().clone();
        if let Some(text) = failing {
            if todo.content.contains(text.as_str()) {
                return Err(StorageError::TransientIo("request timed out".to_string()));
            }
        }
        self.inner.insert_todo(todo).await
    }

    async fn update_todo(&self, todo: &Todo) -> Result<(), StorageError> {
        self.inner.update_todo(todo).await
    }

    async fn delete_todo(&self, owner_id: &str, todo_id: &TodoId) -> Result<(), StorageError> {
        self.inner.delete_todo(owner_id, todo_id).await
    }

    async fn list_timer_sessions(&self, owner_id: &str) -> Result<Vec<TimerSession>, StorageError> {
        self.inner.list_timer_sessions(owner_id).await
    }

    async fn insert_timer_session(&self, session: &TimerSession) -> Result<(), StorageError> {
        self.inner.insert_timer_session(session).await
    }

    async fn clear_owner(&self, owner_id: &str) -> Result<(), StorageError> {
        self.inner.clear_owner(owner_id).await
    }
}
