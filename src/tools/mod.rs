/// MCP tools over the habit-sync core
///
/// Each tool is a parameter struct (deserialized from the call arguments, its
/// JSON schema advertised in `tools/list`), a response struct, and a function
/// taking the server context. Create tools check the plan limits before
/// touching the repository.

use chrono::{NaiveDate, Utc};
use thiserror::Error;

use crate::domain::{parse_date, DomainError};
use crate::limits::LimitError;
use crate::migration::MigrationError;
use crate::repository::RepositoryError;
use crate::storage::StorageError;

pub mod account;
pub mod habits;
pub mod timer;
pub mod todos;

pub use account::*;
pub use habits::*;
pub use timer::*;
pub use todos::*;

/// Errors returned by tool functions
#[derive(Error, Debug)]
pub enum ToolError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Limit(#[from] LimitError),

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

impl ToolError {
    /// Stable error kind reported to MCP clients
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Domain(_) => "validation",
            ToolError::Limit(_) => "quota_exceeded",
            ToolError::Storage(e) => storage_kind(e),
            ToolError::Repository(RepositoryError::Domain(_)) => "validation",
            ToolError::Repository(RepositoryError::Storage(e)) => storage_kind(e),
            ToolError::Migration(MigrationError::InvalidIdentity(_)) => "validation",
            ToolError::Migration(MigrationError::Storage(e)) => storage_kind(e),
        }
    }
}

fn storage_kind(error: &StorageError) -> &'static str {
    match error {
        StorageError::NotAuthenticated => "not_authenticated",
        StorageError::HabitNotFound { .. } | StorageError::TodoNotFound { .. } | StorageError::LogNotFound { .. } => {
            "not_found"
        }
        StorageError::DuplicateLog { .. } => "duplicate",
        StorageError::PermissionDenied { .. } => "permission_denied",
        StorageError::TransientIo(_) => "transient_io",
        StorageError::QuotaExceeded { .. } => "storage_quota",
        StorageError::Connection(_) | StorageError::Query(_) | StorageError::Serialization(_) => "storage",
    }
}

/// Parse an optional `YYYY-MM-DD` argument, defaulting to today (UTC)
pub(crate) fn date_or_today(date: Option<&str>) -> Result<NaiveDate, DomainError> {
    match date {
        Some(s) => parse_date(s),
        None => Ok(Utc::now().date_naive()),
    }
}

/// "1 day" / "3 days"
pub(crate) fn days(n: u32) -> String {
    format!("{} day{}", n, if n == 1 { "" } else { "s" })
}
