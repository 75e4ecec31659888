//! An async FTP server engine.
//!
//! Implements the RFC 959 core: control-connection command handling, a
//! per-session authentication state machine with per-user permission bits,
//! passive and active data channels drawing from a bounded port pool, and
//! ASCII/binary transfers confined to each user's sandbox directory.
//!
//! [`ServerConfig`] describes the deployment, [`Server`] runs it:
//!
//! ```no_run
//! use ferric_ftp_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = ServerConfig::default();
//!     Server::bind(config).await?.run().await
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod storage;
pub mod transfer;

pub use config::ServerConfig;
pub use server::Server;
