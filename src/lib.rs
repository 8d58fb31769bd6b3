/// Public library interface for the habit-sync core
///
/// Habits, todos and focus timer sessions for a device that starts anonymous
/// and later signs in. Anonymous data lives in device key/value storage,
/// signed-in data in a multi-tenant SQLite store, and the first sign-in moves
/// the device data across. The same core is exposed as an MCP server.

use std::sync::Arc;

use thiserror::Error;

pub mod domain;
pub mod identity;
pub mod limits;
pub mod mcp;
pub mod migration;
pub mod repository;
pub mod storage;
pub mod tools;

pub use domain::*;
pub use identity::{AuthProvider, StaticAuthProvider};
pub use limits::{FeatureLimitPolicy, FeatureLimits, LimitError, Resource, Tier};
pub use migration::{MigrationCoordinator, MigrationError, MigrationOptions, MigrationResult, MigrationValidation};
pub use repository::{Completion, HabitRepository, RepositoryError, Usage};
pub use storage::{HabitStore, KeyValueStore, LocalHabitStore, SqliteStorage, StorageError};

/// Errors that can occur during server operation
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything a tool call needs: the repository, the caller's identity,
/// the plan flag and the migration coordinator
pub struct HabitTrackerServer {
    repository: Arc<HabitRepository>,
    auth: Arc<StaticAuthProvider>,
    coordinator: MigrationCoordinator,
    is_premium: bool,
}

impl HabitTrackerServer {
    /// Assemble a server over the given stores
    ///
    /// Without `user_id` the caller is the device's anonymous identity,
    /// generated and saved on first use.
    pub async fn new(
        local: Arc<LocalHabitStore>,
        remote: Arc<dyn HabitStore>,
        user_id: Option<String>,
        is_premium: bool,
    ) -> Result<Self, ServerError> {
        let anonymous = local.ensure_anonymous_identity().await?;
        let repository = Arc::new(HabitRepository::new(local, remote));
        let auth = Arc::new(StaticAuthProvider::new(anonymous));
        let coordinator = MigrationCoordinator::new(Arc::clone(&repository));

        let server = Self {
            repository,
            auth,
            coordinator,
            is_premium,
        };

        if let Some(user_id) = user_id.filter(|id| !id.trim().is_empty()) {
            server.auth.sign_in(&user_id);
            if let Err(e) = server.coordinator.check_auth_transition(server.auth.as_ref()).await {
                tracing::warn!("Migration on startup failed: {}", e);
            }
        }

        tracing::info!("Serving as {}", server.identity());
        Ok(server)
    }

    /// Run the MCP server, handling JSON-RPC requests over stdin/stdout
    pub async fn run(self) -> Result<(), ServerError> {
        let habits = self.repository.list_habits(&self.identity()).await?;
        tracing::info!("Server started, {} habits for the current identity", habits.len());

        let mut mcp_server = mcp::McpServer::new(self);
        mcp_server.run().await
    }

    /// The caller, as the auth collaborator currently reports it
    pub fn identity(&self) -> Identity {
        self.auth.current_identity()
    }

    pub fn repository(&self) -> &HabitRepository {
        &self.repository
    }

    pub fn auth(&self) -> &StaticAuthProvider {
        &self.auth
    }

    pub fn coordinator(&self) -> &MigrationCoordinator {
        &self.coordinator
    }

    pub fn is_premium(&self) -> bool {
        self.is_premium
    }

    /// Limits of the current caller's plan
    pub fn limits(&self) -> FeatureLimits {
        FeatureLimitPolicy::limits(Some(self.identity().kind()), self.is_premium)
    }
}
