//! Concrete error enums for the auth, sandbox, storage and transfer modules.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Authentication module errors.
///
/// `UnknownUser` and `BadPassword` must produce identical replies on the
/// wire so a probing client cannot tell which half of the pair was wrong.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("bad password for user: {0}")]
    BadPassword(String),
    #[error("anonymous access is disabled")]
    AnonymousDisabled,
    #[error("malformed credential input")]
    MalformedInput,
}

/// Path sandbox errors.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("path escapes the sandbox root: {0}")]
    PathEscape(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Storage module errors, produced by filesystem-touching commands.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Data channel and transfer errors.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("no data connection has been set up")]
    NoDataChannel,
    #[error("no free port in the passive range")]
    NoPortsAvailable,
    #[error("timed out establishing the data connection")]
    DataTimeout,
    #[error("failed to bind data listener on {0}: {1}")]
    BindFailed(SocketAddr, io::Error),
    #[error("failed to connect to client data address {0}: {1}")]
    ConnectFailed(SocketAddr, io::Error),
    #[error("invalid PORT argument: {0}")]
    InvalidPortArgument(String),
    #[error("data address {provided} does not match control peer {expected}")]
    AddressMismatch { expected: String, provided: String },
    #[error("data connection I/O error: {0}")]
    Io(#[from] io::Error),
}
