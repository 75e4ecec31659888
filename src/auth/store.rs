//! Credential storage and login validation.
//!
//! The store is built once from configuration and never mutated, so every
//! session can hold it behind an `Arc` without synchronization. Login
//! failures deliberately collapse to one reply on the wire: a client must
//! not be able to distinguish an unknown user from a wrong password.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::Permissions;
use crate::config::ServerConfig;
use crate::error::AuthError;

/// The conventional anonymous account name.
pub const ANONYMOUS: &str = "anonymous";

/// An immutable user record.
#[derive(Debug)]
pub struct User {
    pub username: String,
    password: String,
    pub home_dir: PathBuf,
    pub permissions: Permissions,
    pub is_anonymous: bool,
}

/// Read-only lookup table of user records plus the anonymous policy.
pub struct CredentialStore {
    users: HashMap<String, Arc<User>>,
    anonymous: Option<Arc<User>>,
}

impl CredentialStore {
    /// Builds the store from validated configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut users = HashMap::new();
        for entry in &config.users {
            let user = Arc::new(User {
                username: entry.username.clone(),
                password: entry.password.clone(),
                home_dir: PathBuf::from(&entry.home_dir),
                permissions: Permissions::parse(&entry.permissions),
                is_anonymous: false,
            });
            users.insert(entry.username.clone(), user);
        }

        let anonymous = if config.anonymous_enabled {
            config.anonymous_root_path().map(|root| {
                Arc::new(User {
                    username: ANONYMOUS.to_string(),
                    password: String::new(),
                    home_dir: root,
                    permissions: Permissions::parse(ServerConfig::anonymous_permissions()),
                    is_anonymous: true,
                })
            })
        } else {
            None
        };

        Self { users, anonymous }
    }

    /// Whether `username` is plausibly known, used to answer USER before a
    /// password arrives. Always claims to know the user so that USER does
    /// not leak account existence; the actual check happens in
    /// [`CredentialStore::authenticate`].
    pub fn wants_password(&self, username: &str) -> bool {
        !username.is_empty() && !username.contains(['\r', '\n', '\0'])
    }

    /// Validates a (username, password) pair.
    ///
    /// Usernames are case-sensitive exact matches. The anonymous account
    /// accepts any password (conventionally an email address) when enabled.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Arc<User>, AuthError> {
        if username.is_empty() || username.contains(['\r', '\n', '\0']) {
            return Err(AuthError::MalformedInput);
        }

        if username == ANONYMOUS {
            return self
                .anonymous
                .clone()
                .ok_or(AuthError::AnonymousDisabled);
        }

        match self.users.get(username) {
            Some(user) if user.password == password => Ok(Arc::clone(user)),
            Some(_) => Err(AuthError::BadPassword(username.to_string())),
            None => Err(AuthError::UnknownUser(username.to_string())),
        }
    }
}
