/// Authentication collaborator contract
///
/// Sign-in itself happens in an external auth provider. This crate only needs
/// to ask who is calling right now; the answer drives storage routing and the
/// anonymous-to-account migration.

use std::sync::RwLock;

use crate::domain::Identity;

/// Source of the caller's current identity
pub trait AuthProvider: Send + Sync {
    fn current_identity(&self) -> Identity;
}

/// Auth provider whose identity is set explicitly
///
/// Used by the server binary (identity comes from the command line and the
/// `account_sign_in` tool) and by tests.
#[derive(Debug)]
pub struct StaticAuthProvider {
    identity: RwLock<Identity>,
}

impl StaticAuthProvider {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity: RwLock::new(identity),
        }
    }

    /// Switch to an authenticated user, returning the identity that was active
    pub fn sign_in(&self, user_id: &str) -> Identity {
        self.replace(Identity::Authenticated(user_id.to_string()))
    }

    /// Switch back to a device-local identity, returning the previous one
    pub fn sign_out(&self, anonymous: Identity) -> Identity {
        self.replace(anonymous)
    }

    fn replace(&self, next: Identity) -> Identity {
        let mut guard = self.identity.write().unwrap_or_else(|e| e.into_inner());
        tracing::info!("Identity changed: {} -> {}", *guard, next);
        std::mem::replace(&mut *guard, next)
    }
}

impl AuthProvider for StaticAuthProvider {
    fn current_identity(&self) -> Identity {
        self.identity.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
