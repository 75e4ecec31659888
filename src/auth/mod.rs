//! Authentication system
//!
//! Holds the read-only credential store built from configuration, the
//! per-user permission bitset, and the login validation logic.

pub mod permissions;
pub mod store;

pub use permissions::{Permission, Permissions};
pub use store::{CredentialStore, User};
