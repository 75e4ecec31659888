//! Passive-mode port pool.
//!
//! A bounded, shared set of ports for PASV listeners. Reservation hands out
//! the lowest free port; the reservation itself is a guard object that
//! returns the port on drop. Completed transfers, timeouts, aborts and
//! session teardown all release the port without manual bookkeeping.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::error::TransferError;

/// Shared pool of passive data ports.
pub struct PassivePortPool {
    free: Mutex<BTreeSet<u16>>,
}

impl PassivePortPool {
    pub fn new(range: RangeInclusive<u16>) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(range.collect()),
        })
    }

    /// Reserves the lowest free port. Fails immediately with
    /// `NoPortsAvailable` when the pool is exhausted; callers reply `425`
    /// and the client retries.
    pub fn reserve(self: &Arc<Self>) -> Result<ReservedPort, TransferError> {
        let mut free = self.free.lock().expect("port pool lock poisoned");
        let port = free.iter().next().copied().ok_or(TransferError::NoPortsAvailable)?;
        free.remove(&port);
        debug!("Reserved passive port {port} ({} left)", free.len());
        Ok(ReservedPort {
            port,
            pool: Arc::clone(self),
        })
    }

    /// Number of ports currently free.
    pub fn available(&self) -> usize {
        self.free.lock().expect("port pool lock poisoned").len()
    }

    fn release(&self, port: u16) {
        let mut free = self.free.lock().expect("port pool lock poisoned");
        free.insert(port);
        debug!("Released passive port {port} ({} free)", free.len());
    }
}

/// A reserved passive port. Returned to the pool when dropped.
pub struct ReservedPort {
    port: u16,
    pool: Arc<PassivePortPool>,
}

impl ReservedPort {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for ReservedPort {
    fn drop(&mut self) {
        self.pool.release(self.port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserves_lowest_free_port_first() {
        let pool = PassivePortPool::new(2558..=2560);
        let first = pool.reserve().unwrap();
        assert_eq!(first.port(), 2558);
        let second = pool.reserve().unwrap();
        assert_eq!(second.port(), 2559);
    }

    #[test]
    fn exhausted_pool_rejects_immediately() {
        let pool = PassivePortPool::new(3000..=3000);
        let _held = pool.reserve().unwrap();
        assert!(matches!(
            pool.reserve(),
            Err(TransferError::NoPortsAvailable)
        ));
    }

    #[test]
    fn drop_returns_port_to_pool() {
        let pool = PassivePortPool::new(2558..=2560);
        assert_eq!(pool.available(), 3);
        {
            let _a = pool.reserve().unwrap();
            let _b = pool.reserve().unwrap();
            assert_eq!(pool.available(), 1);
        }
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn repeated_cycles_do_not_leak() {
        let pool = PassivePortPool::new(4000..=4002);
        for _ in 0..50 {
            let reservation = pool.reserve().unwrap();
            drop(reservation);
        }
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn contention_for_last_port_has_one_winner() {
        let pool = PassivePortPool::new(5000..=5000);
        let mut handles = Vec::new();
        for _ in 0..2 {
            let pool = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || pool.reserve().is_ok()));
        }
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
    }
}
