/// Domain module containing core business logic and data types
///
/// This module defines the core entities (Habit, HabitLog, Todo, TimerSession),
/// the caller Identity, the streak engine and the repair rules applied to
/// records read back from device storage.

pub mod habit;
pub mod log;
pub mod repair;
pub mod streak;
pub mod timer;
pub mod todo;
pub mod types;

// Re-export public types for easy access
pub use habit::*;
pub use log::*;
pub use streak::*;
pub use timer::*;
pub use todo::*;
pub use types::*;

use thiserror::Error;

/// Errors that can occur during domain operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Invalid habit emoji: {0}")]
    InvalidEmoji(String),

    #[error("Invalid todo content: {0}")]
    InvalidContent(String),

    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid value: {message}")]
    InvalidValue { message: String },
}
