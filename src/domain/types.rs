/// Core types shared across the domain layer
///
/// This module defines the identifier newtypes, the caller `Identity` and the
/// `Frequency` descriptor used by Habit, HabitLog, Todo and TimerSession.

use std::fmt;

use chrono::{Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::DomainError;

/// Generates an id newtype over an opaque string.
///
/// Ids are opaque: rows created on a device may carry ids that are not UUIDs,
/// so parsing never rejects a non-empty string.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random id
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Wrap an existing id (useful when loading rows or parsing tool input)
            pub fn from_string(s: &str) -> Result<Self, DomainError> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::Validation {
                        message: concat!(stringify!($name), " cannot be empty").to_string(),
                    });
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a habit
    HabitId
);

string_id!(
    /// Unique identifier for a todo item
    TodoId
);

string_id!(
    /// Unique identifier for a focus timer session
    TimerSessionId
);

/// Prefix carried by device-generated anonymous ids
pub const ANONYMOUS_ID_PREFIX: &str = "anon_";

/// Which kind of identity is calling into the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    Anonymous,
    Authenticated,
}

/// The owner on whose behalf an operation runs
///
/// Anonymous identities live only on the device and are routed to local
/// storage. Authenticated identities are issued by the auth provider and are
/// routed to the remote store. The variant decides the routing, never the
/// shape of the id string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Identity {
    Anonymous(String),
    Authenticated(String),
}

impl Identity {
    /// Generate a fresh device-local anonymous identity
    ///
    /// Ids look like `anon_<unix millis>_<9 random chars>`.
    pub fn new_anonymous() -> Self {
        let random = Uuid::new_v4().simple().to_string();
        Identity::Anonymous(format!(
            "{}{}_{}",
            ANONYMOUS_ID_PREFIX,
            Utc::now().timestamp_millis(),
            &random[..9]
        ))
    }

    /// The owner id used to partition rows
    pub fn id(&self) -> &str {
        match self {
            Identity::Anonymous(id) | Identity::Authenticated(id) => id,
        }
    }

    pub fn kind(&self) -> IdentityKind {
        match self {
            Identity::Anonymous(_) => IdentityKind::Anonymous,
            Identity::Authenticated(_) => IdentityKind::Authenticated,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Anonymous(id) => write!(f, "anonymous:{}", id),
            Identity::Authenticated(id) => write!(f, "user:{}", id),
        }
    }
}

/// How often a habit should be performed
///
/// Only `Daily` is interpreted by the streak engine. The other schedules are
/// stored and round-tripped so clients that know them keep their data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frequency {
    /// Every single day
    #[default]
    Daily,
    /// Specific days of the week
    Weekly { days: Vec<Weekday> },
    /// Specific days of the month (1-31)
    Monthly { days: Vec<u8> },
    /// Every N days
    Custom { interval_days: u32 },
}

impl Frequency {
    /// Validate that a frequency value is reasonable
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            Frequency::Weekly { days } => {
                if days.is_empty() || days.len() > 7 {
                    return Err(DomainError::InvalidFrequency(format!(
                        "Weekly frequency needs 1-7 days, got {}",
                        days.len()
                    )));
                }
            }
            Frequency::Monthly { days } => {
                if days.is_empty() {
                    return Err(DomainError::InvalidFrequency(
                        "Monthly frequency must specify at least one day".to_string(),
                    ));
                }
                if let Some(bad) = days.iter().find(|d| **d == 0 || **d > 31) {
                    return Err(DomainError::InvalidFrequency(format!(
                        "Day of month must be 1-31, got {}",
                        bad
                    )));
                }
            }
            Frequency::Custom { interval_days } => {
                if *interval_days == 0 || *interval_days > 365 {
                    return Err(DomainError::InvalidFrequency(format!(
                        "Interval must be 1-365 days, got {}",
                        interval_days
                    )));
                }
            }
            Frequency::Daily => {}
        }
        Ok(())
    }

    /// Parse the short names accepted by the tool surface
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s.trim().to_lowercase().as_str() {
            "" | "daily" => Ok(Frequency::Daily),
            "weekdays" => Ok(Frequency::Weekly {
                days: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
            }),
            "weekends" => Ok(Frequency::Weekly {
                days: vec![Weekday::Sat, Weekday::Sun],
            }),
            other => Err(DomainError::InvalidFrequency(format!(
                "Unknown frequency '{}'. Valid options: daily, weekdays, weekends",
                other
            ))),
        }
    }
}
