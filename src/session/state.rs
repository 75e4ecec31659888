//! Session state for one control connection.
//!
//! Tracks the authentication state machine, the virtual working directory,
//! the transfer type, the pending data channel and the pending rename
//! source. The state lives on the session's own task and is never shared,
//! so no synchronization is required; the passive port pool is the only
//! cross-session resource.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::auth::User;
use crate::transfer::DataChannel;

/// Login attempts allowed before the connection is dropped.
pub const MAX_LOGIN_ATTEMPTS: u8 = 3;

/// Oversized command lines tolerated before the connection is dropped.
pub const MAX_OVERSIZED_LINES: u8 = 3;

/// The authentication state machine.
///
/// `Unauthenticated -> AuthPending -> Authenticated`; a failed PASS falls
/// back to `Unauthenticated`, a fresh USER restarts from `AuthPending`.
pub enum AuthState {
    Unauthenticated,
    /// USER received, PASS expected. Holds the claimed username.
    AuthPending(String),
    Authenticated(Arc<User>),
}

/// Data representation negotiated with TYPE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Ascii,
    Binary,
}

/// Per-connection state machine.
pub struct Session {
    pub peer: SocketAddr,
    pub auth: AuthState,
    /// Virtual working directory, always absolute and inside the home dir.
    pub cwd: String,
    pub transfer_type: TransferType,
    /// RNFR source awaiting its RNTO.
    pub rename_from: Option<PathBuf>,
    /// Pending PASV/PORT negotiation, consumed by the next transfer.
    pub data_channel: DataChannel,
    pub failed_logins: u8,
    pub oversized_lines: u8,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl Session {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            auth: AuthState::Unauthenticated,
            cwd: "/".to_string(),
            // ASCII is the RFC 959 default representation.
            transfer_type: TransferType::Ascii,
            rename_from: None,
            data_channel: DataChannel::None,
            failed_logins: 0,
            oversized_lines: 0,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.auth, AuthState::Authenticated(_))
    }

    pub fn user(&self) -> Option<&Arc<User>> {
        match &self.auth {
            AuthState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// The sandbox root of the logged-in user.
    pub fn home_dir(&self) -> Option<&Path> {
        self.user().map(|u| u.home_dir.as_path())
    }

    /// Completes a successful login: working directory and any pending
    /// negotiation state are reset.
    pub fn login(&mut self, user: Arc<User>) {
        self.auth = AuthState::Authenticated(user);
        self.cwd = "/".to_string();
        self.rename_from = None;
        self.data_channel = DataChannel::None;
        self.failed_logins = 0;
    }

    /// Records a failed login; returns true once the lockout threshold is
    /// reached. Revoking authentication also discards any pending data
    /// channel, so an in-flight negotiation cannot outlive the auth state.
    pub fn login_failed(&mut self) -> bool {
        self.auth = AuthState::Unauthenticated;
        self.data_channel = DataChannel::None;
        self.failed_logins += 1;
        self.failed_logins >= MAX_LOGIN_ATTEMPTS
    }

    /// Takes the pending data channel, leaving `None` behind. Transfers own
    /// the channel for their duration; it is never reused.
    pub fn take_data_channel(&mut self) -> DataChannel {
        std::mem::replace(&mut self.data_channel, DataChannel::None)
    }
}
