//! Admission gate
//!
//! A counting limiter that bounds how many task bodies execute at once.
//! Backed by a fair `tokio::sync::Semaphore`, so waiters are admitted in
//! the order they started waiting.
//!
//! Permits are RAII guards: dropping a [`GatePermit`] releases the slot,
//! which means the slot comes back on every exit path of a task execution.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};

struct GateInner {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_use: AtomicUsize,
    peak_in_use: AtomicUsize,
}

/// Counting gate shared by every executor of one dispatcher.
///
/// Cloning is cheap and every clone refers to the same counter.
#[derive(Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

impl AdmissionGate {
    /// Create a gate admitting at most `capacity` concurrent holders.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::config_field_invalid(
                "dispatcher.capacity",
                "capacity must be at least 1",
            ));
        }
        if capacity > Semaphore::MAX_PERMITS {
            return Err(Error::config_field_invalid(
                "dispatcher.capacity",
                format!("capacity must not exceed {}", Semaphore::MAX_PERMITS),
            ));
        }

        Ok(Self {
            inner: Arc::new(GateInner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
                in_use: AtomicUsize::new(0),
                peak_in_use: AtomicUsize::new(0),
            }),
        })
    }

    /// Wait until a slot is free and take it.
    pub async fn acquire(&self) -> GatePermit {
        // The semaphore is private to the gate and never closed.
        match self.inner.semaphore.clone().acquire_owned().await {
            Ok(permit) => self.admit(permit),
            Err(_) => unreachable!("admission gate semaphore closed"),
        }
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<GatePermit> {
        let permit = self.inner.semaphore.clone().try_acquire_owned().ok()?;
        Some(self.admit(permit))
    }

    fn admit(&self, permit: OwnedSemaphorePermit) -> GatePermit {
        let current = self.inner.in_use.fetch_add(1, Ordering::AcqRel) + 1;
        self.update_peak(current);

        GatePermit {
            _permit: permit,
            inner: Arc::clone(&self.inner),
        }
    }

    fn update_peak(&self, current: usize) {
        let mut peak = self.inner.peak_in_use.load(Ordering::Relaxed);
        while current > peak {
            match self.inner.peak_in_use.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
    }

    /// Maximum number of concurrent holders
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots currently held
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Highest number of slots ever held at the same time
    pub fn peak_in_use(&self) -> usize {
        self.inner.peak_in_use.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .field("peak_in_use", &self.peak_in_use())
            .finish()
    }
}

/// One held slot of an [`AdmissionGate`].
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    inner: Arc<GateInner>,
}

impl GatePermit {
    /// Give the slot back.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        // Runs before `_permit` is dropped, so the counter never
        // overshoots capacity while the next waiter is being admitted.
        self.inner.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(AdmissionGate::new(0).is_err());
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let gate = AdmissionGate::new(2).unwrap();
        assert_eq!(gate.capacity(), 2);
        assert_eq!(gate.in_use(), 0);

        let a = gate.acquire().await;
        let b = gate.acquire().await;
        assert_eq!(gate.in_use(), 2);
        assert_eq!(gate.available(), 0);
        assert!(gate.try_acquire().is_none());

        a.release();
        assert_eq!(gate.in_use(), 1);
        assert!(gate.try_acquire().is_some());

        drop(b);
        assert_eq!(gate.in_use(), 0);
        assert_eq!(gate.peak_in_use(), 2);
    }

    #[tokio::test]
    async fn test_waiter_admitted_on_release() {
        let gate = AdmissionGate::new(1).unwrap();
        let held = gate.acquire().await;

        let waiter_gate = gate.clone();
        let waiter = tokio::spawn(async move {
            let _permit = waiter_gate.acquire().await;
            waiter_gate.in_use()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let seen = waiter.await.unwrap();
        assert_eq!(seen, 1);
        assert_eq!(gate.in_use(), 0);
    }

    #[tokio::test]
    async fn test_waiters_served_in_order() {
        let gate = AdmissionGate::new(1).unwrap();
        let held = gate.acquire().await;
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let gate = gate.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire().await;
                order.lock().push(i);
            }));
            // Let each waiter enqueue before the next one starts
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }
}
