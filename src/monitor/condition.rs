//! Single-shot completion signal.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::Error;

/// How a condition was resolved.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The waited-for work completed.
    Finished,
    /// A fatal error was propagated to the waiter.
    Failed(Arc<Error>),
}

/// A signal that fires at most once.
///
/// The first call to [`Condition::signal`] wins; later calls are ignored
/// and return `false`. Any number of tasks may wait on clones of the same
/// condition.
#[derive(Debug, Clone)]
pub struct Condition {
    slot: Arc<watch::Sender<Option<Outcome>>>,
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

impl Condition {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { slot: Arc::new(tx) }
    }

    /// Resolve the condition. Returns `true` if this call resolved it.
    pub fn signal(&self, outcome: Outcome) -> bool {
        let mut outcome = Some(outcome);
        self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = outcome.take();
            true
        })
    }

    pub fn finish(&self) -> bool {
        self.signal(Outcome::Finished)
    }

    pub fn fail(&self, error: Arc<Error>) -> bool {
        self.signal(Outcome::Failed(error))
    }

    /// The outcome, if already resolved.
    pub fn outcome(&self) -> Option<Outcome> {
        self.slot.borrow().clone()
    }

    pub fn is_signaled(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Wait until the condition is resolved.
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.slot.subscribe();
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Unreachable while `self` holds the sender.
                std::future::pending::<()>().await;
            }
        }
    }
}
