//! Per-connection session management.
//!
//! One [`state::Session`] exists per control connection; [`handler`] runs
//! its command loop on a dedicated tokio task.

pub mod handler;
pub mod state;

pub use handler::run_session;
pub use state::{AuthState, Session, TransferType};
