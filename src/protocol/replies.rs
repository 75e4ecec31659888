//! FTP reply formatting.
//!
//! Replies are `<3-digit code> <SP> <message> <CRLF>`. Code classes follow
//! RFC 959: 1xx preliminary, 2xx success, 3xx intermediate, 4xx transient
//! failure, 5xx permanent failure.
//!
//! Codes used per command:
//! - 220 greeting, 221 QUIT
//! - 200 TYPE/PORT/NOOP, 215 SYST, 211 FEAT, 213 SIZE/MDTM/MFMT
//! - 227 PASV, 150 transfer start, 226 transfer complete
//! - 250 CWD/CDUP/DELE/RMD/RNTO, 257 PWD/MKD, 331 need password,
//!   230 logged in, 350 RNFR accepted
//! - 421 service unavailable (too busy, idle timeout, login lockout)
//! - 425 can't open data connection, 426 transfer aborted
//! - 451 local processing error, 500 unknown/oversized command,
//!   501 bad argument, 503 bad sequence, 504 unsupported TYPE parameter,
//!   530 not logged in / authentication failed, 550 file or permission error

use crate::error::{StorageError, TransferError};

/// One reply ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    wire: String,
}

impl Reply {
    pub fn new(code: u16, message: &str) -> Self {
        Self {
            wire: format!("{code} {message}\r\n"),
        }
    }

    /// Multi-line reply in `nnn-` ... `nnn end` form (FEAT).
    pub fn multiline(code: u16, header: &str, lines: &[&str], footer: &str) -> Self {
        let mut wire = format!("{code}-{header}\r\n");
        for line in lines {
            wire.push(' ');
            wire.push_str(line);
            wire.push_str("\r\n");
        }
        wire.push_str(&format!("{code} {footer}\r\n"));
        Self { wire }
    }

    pub fn as_wire(&self) -> &str {
        &self.wire
    }

    /// The reply's numeric code, for logging and tests.
    pub fn code(&self) -> u16 {
        self.wire[..3].parse().unwrap_or(0)
    }

    // Common fixed replies.

    pub fn greeting() -> Self {
        Reply::new(220, "ferric-ftp-server ready.")
    }

    pub fn goodbye() -> Self {
        Reply::new(221, "Goodbye.")
    }

    pub fn not_logged_in() -> Self {
        Reply::new(530, "Not logged in.")
    }

    pub fn auth_failed() -> Self {
        // Deliberately identical for unknown user and bad password.
        Reply::new(530, "Authentication failed.")
    }

    pub fn permission_denied() -> Self {
        Reply::new(550, "Permission denied.")
    }

    pub fn syntax_error() -> Self {
        Reply::new(501, "Syntax error in parameters or arguments.")
    }

    pub fn unrecognized(verb: &str) -> Self {
        Reply::new(500, &format!("Command \"{verb}\" not understood."))
    }

    pub fn command_too_long() -> Self {
        Reply::new(500, "Command line too long.")
    }

    pub fn too_many_connections() -> Self {
        Reply::new(421, "Too many connections. Try again later.")
    }

    pub fn idle_timeout() -> Self {
        Reply::new(421, "Idle timeout, closing control connection.")
    }

    pub fn shutting_down() -> Self {
        Reply::new(421, "Server shutting down.")
    }
}

/// Maps a storage error onto its protocol reply.
pub fn storage_reply(error: &StorageError) -> Reply {
    match error {
        StorageError::FileNotFound(path) => Reply::new(550, &format!("{path}: No such file or directory.")),
        StorageError::DirectoryNotFound(path) => {
            Reply::new(550, &format!("{path}: No such file or directory."))
        }
        StorageError::NotADirectory(path) => Reply::new(550, &format!("{path}: Not a directory.")),
        StorageError::NotAFile(path) => Reply::new(550, &format!("{path}: Not a regular file.")),
        StorageError::DirectoryNotEmpty(path) => {
            Reply::new(550, &format!("{path}: Directory not empty."))
        }
        StorageError::AlreadyExists(path) => Reply::new(550, &format!("{path}: Already exists.")),
        StorageError::Sandbox(_) => Reply::new(550, "Invalid path."),
        StorageError::Io(_) => Reply::new(451, "Local error in processing."),
    }
}

/// Maps a data-channel error onto its protocol reply.
pub fn transfer_reply(error: &TransferError) -> Reply {
    match error {
        TransferError::NoDataChannel => Reply::new(425, "Use PORT or PASV first."),
        TransferError::NoPortsAvailable => Reply::new(425, "No free passive ports; try again later."),
        TransferError::DataTimeout => Reply::new(425, "Data connection timed out."),
        TransferError::BindFailed(..) | TransferError::ConnectFailed(..) => {
            Reply::new(425, "Can't open data connection.")
        }
        TransferError::InvalidPortArgument(_) => Reply::syntax_error(),
        TransferError::AddressMismatch { .. } => {
            Reply::new(501, "PORT address must match the control connection.")
        }
        TransferError::Io(_) => Reply::new(426, "Connection closed; transfer aborted."),
    }
}
