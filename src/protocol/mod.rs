//! FTP protocol implementation.
//!
//! Command parsing, reply formatting, and the dispatcher that routes
//! parsed commands to their handlers with state and permission checks.

pub mod commands;
pub mod handlers;
pub mod replies;

pub use commands::{Command, parse_command};
pub use handlers::{Outcome, handle_command};
pub use replies::Reply;
