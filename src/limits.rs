/// Feature limits per account tier
///
/// A pure function of identity kind and premium flag. Callers fetch the live
/// count themselves and ask the policy before a create; the repository never
/// enforces limits on its own.

use serde::Serialize;
use thiserror::Error;

use crate::domain::IdentityKind;

/// Account tier derived from identity kind and premium flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Anonymous,
    Free,
    Premium,
    /// Inconsistent or unknown state, most restrictive
    Fallback,
}

impl Tier {
    /// Resolve a tier; premium without an account is treated as inconsistent
    pub fn resolve(kind: Option<IdentityKind>, is_premium: bool) -> Self {
        match (kind, is_premium) {
            (Some(IdentityKind::Anonymous), false) => Tier::Anonymous,
            (Some(IdentityKind::Authenticated), false) => Tier::Free,
            (Some(IdentityKind::Authenticated), true) => Tier::Premium,
            (Some(IdentityKind::Anonymous), true) | (None, _) => Tier::Fallback,
        }
    }
}

/// Limited resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Habits,
    Todos,
    TimerSessions,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Resource::Habits => "habits",
            Resource::Todos => "todos",
            Resource::TimerSessions => "timer sessions",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimitError {
    #[error("Limit reached: at most {limit} {resource} on this plan")]
    QuotaExceeded { resource: Resource, limit: u32 },
}

/// Limits of one tier; `None` means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureLimits {
    pub max_habits: Option<u32>,
    pub max_todos: Option<u32>,
    pub max_timer_sessions: Option<u32>,
    pub can_sync: bool,
    pub can_export: bool,
}

impl FeatureLimits {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Anonymous => Self {
                max_habits: Some(3),
                max_todos: Some(3),
                max_timer_sessions: Some(10),
                can_sync: false,
                can_export: true,
            },
            Tier::Free => Self {
                max_habits: Some(3),
                max_todos: Some(3),
                max_timer_sessions: Some(10),
                can_sync: true,
                can_export: true,
            },
            Tier::Premium => Self {
                max_habits: None,
                max_todos: None,
                max_timer_sessions: None,
                can_sync: true,
                can_export: true,
            },
            Tier::Fallback => Self {
                max_habits: Some(1),
                max_todos: Some(1),
                max_timer_sessions: Some(5),
                can_sync: false,
                can_export: false,
            },
        }
    }

    pub fn limit(&self, resource: Resource) -> Option<u32> {
        match resource {
            Resource::Habits => self.max_habits,
            Resource::Todos => self.max_todos,
            Resource::TimerSessions => self.max_timer_sessions,
        }
    }
}

/// Stateless limit lookups
pub struct FeatureLimitPolicy;

impl FeatureLimitPolicy {
    pub fn limits(kind: Option<IdentityKind>, is_premium: bool) -> FeatureLimits {
        FeatureLimits::for_tier(Tier::resolve(kind, is_premium))
    }

    /// Whether one more `resource` may be created given `current_count` existing ones
    pub fn check(limits: &FeatureLimits, resource: Resource, current_count: usize) -> Result<(), LimitError> {
        match limits.limit(resource) {
            Some(limit) if current_count >= limit as usize => Err(LimitError::QuotaExceeded { resource, limit }),
            _ => Ok(()),
        }
    }
}
