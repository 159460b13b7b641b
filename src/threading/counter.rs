//! Shared in-flight counter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Atomic counter shared between a handle and its worker.
///
/// Cloning yields another view of the same count.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicUsize>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the new value.
    pub fn increment(&self) -> usize {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrement and return the new value. Never goes below zero.
    pub fn decrement(&self) -> usize {
        self.sub(1)
    }

    /// Subtract `n`, saturating at zero, and return the new value.
    pub fn sub(&self, n: usize) -> usize {
        let previous = self
            .value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(n))
            })
            .unwrap_or_else(|v| v);
        previous.saturating_sub(n)
    }

    pub fn value(&self) -> usize {
        self.value.load(Ordering::SeqCst)
    }

    pub fn is_zero(&self) -> bool {
        self.value() == 0
    }
}
