/// Account tools: plan limits, sign-in with migration, migration dry check

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, Identity};
use crate::limits::{FeatureLimits, Tier};
use crate::migration::{MigrationResult, MigrationValidation};
use crate::repository::Usage;
use crate::tools::ToolError;
use crate::{AuthProvider, HabitTrackerServer};

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct AccountLimitsParams {}

#[derive(Debug, Serialize)]
pub struct AccountLimitsResponse {
    pub identity: Identity,
    pub tier: Tier,
    pub limits: FeatureLimits,
    pub usage: Usage,
    pub message: String,
}

/// Current plan limits next to live usage
pub async fn account_limits(
    server: &HabitTrackerServer,
    _params: AccountLimitsParams,
) -> Result<AccountLimitsResponse, ToolError> {
    let identity = server.identity();
    let limits = server.limits();
    let usage = server.repository().usage(&identity).await?;

    let cap = |limit: Option<u32>| limit.map_or_else(|| "unlimited".to_string(), |l| l.to_string());
    let message = format!(
        "Habits {}/{}, todos {}/{}, timer sessions {}/{}",
        usage.habits,
        cap(limits.max_habits),
        usage.todos,
        cap(limits.max_todos),
        usage.timer_sessions,
        cap(limits.max_timer_sessions)
    );

    Ok(AccountLimitsResponse {
        tier: Tier::resolve(Some(identity.kind()), server.is_premium()),
        identity,
        limits,
        usage,
        message,
    })
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SignInParams {
    /// Account id reported by the auth provider
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub success: bool,
    pub identity: Identity,
    /// Present when this sign-in moved device data to the account
    pub migration: Option<MigrationResult>,
    pub message: String,
}

/// Switch to an account, migrating the device's anonymous data the first time
pub async fn account_sign_in(server: &HabitTrackerServer, params: SignInParams) -> Result<SignInResponse, ToolError> {
    let user_id = params.user_id.trim();
    if user_id.is_empty() {
        return Err(DomainError::Validation {
            message: "user_id cannot be empty".to_string(),
        }
        .into());
    }

    server.auth().sign_in(user_id);
    let migration = server.coordinator().check_auth_transition(server.auth()).await?;

    let message = match &migration {
        Some(result) if result.success => format!(
            "Signed in as {}. Moved {} habits and {} todos from this device",
            user_id, result.migrated_counts.habits, result.migrated_counts.todos
        ),
        Some(result) => format!(
            "Signed in as {}. Migration finished with {} errors",
            user_id,
            result.errors.len()
        ),
        None => format!("Signed in as {}", user_id),
    };

    Ok(SignInResponse {
        success: true,
        identity: server.auth().current_identity(),
        migration,
        message,
    })
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ValidateMigrationParams {
    /// Anonymous owner to check (defaults to this device's anonymous id)
    pub anonymous_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateMigrationResponse {
    pub anonymous_id: String,
    #[serde(flatten)]
    pub validation: MigrationValidation,
    pub message: String,
}

/// Report device records a migration would repair or skip, without migrating
pub async fn account_validate_migration(
    server: &HabitTrackerServer,
    params: ValidateMigrationParams,
) -> Result<ValidateMigrationResponse, ToolError> {
    let anonymous_id = match params.anonymous_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => match server.identity() {
            Identity::Anonymous(id) => id,
            Identity::Authenticated(_) => server
                .repository()
                .local()
                .device_anonymous_id()
                .await?
                .ok_or_else(|| DomainError::Validation {
                    message: "This device has no anonymous data".to_string(),
                })?,
        },
    };

    let validation = server.coordinator().validate_migration_data(&anonymous_id).await?;
    let message = if validation.warnings.is_empty() {
        "Device data is ready to migrate".to_string()
    } else {
        format!("{} warnings", validation.warnings.len())
    };

    Ok(ValidateMigrationResponse {
        anonymous_id,
        validation,
        message,
    })
}

