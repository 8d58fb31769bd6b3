/// Todo entity
///
/// Todos are plain checklist items. `completed_at` follows `is_completed`:
/// it is stamped on the false -> true transition and cleared on the way back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, TodoId};

const MAX_CONTENT_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: TodoId,
    pub owner_id: String,
    pub content: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a todo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTodo {
    pub content: String,
    #[serde(default)]
    pub is_completed: bool,
}

impl NewTodo {
    pub fn open(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_completed: false,
        }
    }
}

impl Todo {
    pub fn new(owner_id: &str, input: NewTodo) -> Result<Self, DomainError> {
        let content = Self::validate_content(&input.content)?;
        let now = Utc::now();

        Ok(Self {
            id: TodoId::new(),
            owner_id: owner_id.to_string(),
            content,
            is_completed: input.is_completed,
            completed_at: input.is_completed.then_some(now),
            created_at: now,
        })
    }

    /// Set the completion flag, keeping `completed_at` in step.
    ///
    /// Returns false when the flag already had that value.
    pub fn set_completed(&mut self, completed: bool) -> bool {
        if self.is_completed == completed {
            return false;
        }
        self.is_completed = completed;
        self.completed_at = completed.then(Utc::now);
        true
    }

    pub fn validate_content(content: &str) -> Result<String, DomainError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidContent(
                "Todo content cannot be empty".to_string(),
            ));
        }
        if trimmed.chars().count() > MAX_CONTENT_CHARS {
            return Err(DomainError::InvalidContent(format!(
                "Todo content cannot be longer than {} characters",
                MAX_CONTENT_CHARS
            )));
        }
        Ok(trimmed.to_string())
    }
}
