//! Crash propagation to waiting callers.
//!
//! # Data Flow
//! ```text
//! Client::group()
//!     → Monitor::register(condition) → Registration guard
//!     → RequestGroup::flush() waits on the condition
//!
//! Connection worker hits a fatal fault
//!     → Monitor::broadcast(error)
//!     → every registered condition fails (unless already resolved)
//!     → waiting flush() returns Error::GroupWait
//!
//! Registration dropped → condition removed from the registry
//! ```
//!
//! # Design Decisions
//! - One monitor per connection pool; all of a pool's connections report
//!   to it
//! - Conditions are single-shot, so a late crash cannot override a group
//!   that already finished
//! - Broadcast signals under the registry lock; signaling runs no caller
//!   code

pub mod condition;

pub use condition::{Condition, Outcome};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Error;

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    conditions: HashMap<u64, Condition>,
}

/// Registry of conditions to fail when a connection dies.
#[derive(Debug, Clone, Default)]
pub struct Monitor {
    registry: Arc<Mutex<Registry>>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `condition` until the returned guard is dropped.
    pub fn register(&self, condition: Condition) -> Registration {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.conditions.insert(id, condition);
        Registration {
            monitor: self.clone(),
            id,
        }
    }

    /// Fail every registered condition with `error`. Returns how many
    /// conditions this call resolved.
    pub fn broadcast(&self, error: Arc<Error>) -> usize {
        let registry = self.lock();
        let resolved = registry
            .conditions
            .values()
            .filter(|condition| condition.fail(Arc::clone(&error)))
            .count();
        if resolved > 0 {
            tracing::debug!(waiters = resolved, error = %error, "Propagated connection failure");
        }
        resolved
    }

    /// Number of registered conditions.
    pub fn len(&self) -> usize {
        self.lock().conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn deregister(&self, id: u64) {
        self.lock().conditions.remove(&id);
    }
}

/// Keeps a condition registered with a [`Monitor`]. Deregisters on drop.
#[derive(Debug)]
pub struct Registration {
    monitor: Monitor,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.monitor.deregister(self.id);
    }
}
