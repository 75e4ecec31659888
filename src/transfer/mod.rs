//! Data channel management and transfer execution.
//!
//! Covers passive/active negotiation, the shared passive port pool, the
//! ASCII/binary translation layer, and the byte streaming for uploads,
//! downloads and listings.

pub mod ascii;
pub mod channel;
pub mod port_pool;
pub mod stream;

pub use ascii::AsciiCodec;
pub use channel::DataChannel;
pub use port_pool::{PassivePortPool, ReservedPort};
