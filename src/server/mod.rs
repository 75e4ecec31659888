//! Control listener and session supervision.

pub mod core;

pub use core::{Server, ServerContext};
