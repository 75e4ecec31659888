//! Error types
//!
//! Domain-specific error types for each module of the FTP server.
//! Every error caused by a client command is translated into a protocol
//! reply at the dispatch boundary; nothing in here tears down a session
//! on its own.

mod types;

pub use types::{AuthError, SandboxError, StorageError, TransferError};
