//! Filesystem sandbox and storage operations.
//!
//! Every client-supplied path goes through [`validation`] before any
//! filesystem call; the resulting real path is a descendant of the user's
//! home directory by construction, not by convention.

pub mod listing;
pub mod operations;
pub mod validation;

pub use validation::{resolve_virtual_path, virtual_to_real};
