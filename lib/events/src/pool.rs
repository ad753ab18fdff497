//! Shared counter of open event slots.
//!
//! One pool per process, shared by every concurrent call. Reserving is a
//! single check-and-decrement under the lock, so two callers racing for the
//! last slot can never both win.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Slot pool configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPoolConfig {
    /// Open slots at start-up.
    #[serde(default)]
    pub capacity: u32,
}

/// Result of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// A slot was taken.
    Granted { remaining: u32 },
    /// No slot was open; nothing changed.
    Denied,
}

impl Reservation {
    /// Returns true if a slot was taken.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

/// Counter of open slots for the event.
#[derive(Debug)]
pub struct SlotPool {
    capacity: u32,
    open: Mutex<u32>,
}

impl SlotPool {
    /// Creates a pool with `capacity` open slots.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            open: Mutex::new(capacity),
        }
    }

    /// Creates a pool from configuration.
    #[must_use]
    pub fn from_config(config: SlotPoolConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Returns the number of open slots. Never changes the pool.
    #[must_use]
    pub fn availability(&self) -> u32 {
        *self.lock()
    }

    /// Returns the number of slots the pool started with.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Takes one slot if any is open.
    pub fn reserve(&self) -> Reservation {
        let mut open = self.lock();
        if *open == 0 {
            return Reservation::Denied;
        }
        *open -= 1;
        Reservation::Granted { remaining: *open }
    }

    // The counter stays consistent even if a holder panicked: every update
    // is a single assignment.
    fn lock(&self) -> MutexGuard<'_, u32> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn availability_does_not_change_pool() {
        let pool = SlotPool::new(3);
        assert_eq!(pool.availability(), 3);
        assert_eq!(pool.availability(), 3);
        assert_eq!(pool.capacity(), 3);
    }

    #[test]
    fn reserve_decrements_until_empty() {
        let pool = SlotPool::new(2);
        assert_eq!(pool.reserve(), Reservation::Granted { remaining: 1 });
        assert_eq!(pool.reserve(), Reservation::Granted { remaining: 0 });
        assert_eq!(pool.reserve(), Reservation::Denied);
        assert_eq!(pool.availability(), 0);
    }

    #[test]
    fn empty_pool_denies() {
        let pool = SlotPool::from_config(SlotPoolConfig::default());
        assert!(!pool.reserve().is_granted());
        assert_eq!(pool.availability(), 0);
    }

    #[test]
    fn concurrent_reservations_never_oversell() {
        const CALLERS: usize = 32;
        const SLOTS: u32 = 5;

        let pool = Arc::new(SlotPool::new(SLOTS));
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    pool.reserve()
                })
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .filter(Reservation::is_granted)
            .count();

        assert_eq!(granted, SLOTS as usize);
        assert_eq!(pool.availability(), 0);
    }

    #[test]
    fn config_deserializes_with_default_capacity() {
        let config: SlotPoolConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config.capacity, 0);
    }
}
