//! Completion tracking for supervised units.
//!
//! The supervisor sets the counter to the number of units it is about to
//! launch, hands each unit one [`CompletionGuard`], and on shutdown waits
//! for the count to reach zero.
//!
//! # Invariants
//!
//! - At most `expected` guards are ever issued.
//! - Each guard decrements exactly once, when it is dropped. Dropping
//!   happens on normal return, on error and on panic unwind alike, so a
//!   unit cannot forget to record completion or record it twice.
//! - `completed() <= expected()` at all times; equality holds once every
//!   issued guard is gone.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

/// Counts in-flight units and lets the supervisor wait for all of them.
#[derive(Debug, Clone)]
pub struct CompletionCounter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    expected: usize,
    issued: AtomicUsize,
    /// Pending count; `watch` so waiters see the latest value without races.
    pending: watch::Sender<usize>,
}

impl CompletionCounter {
    /// Creates a counter expecting `expected` units.
    pub fn new(expected: usize) -> Self {
        let (pending, _) = watch::channel(expected);
        Self {
            inner: Arc::new(Inner {
                expected,
                issued: AtomicUsize::new(0),
                pending,
            }),
        }
    }

    /// Issues a guard for one unit.
    ///
    /// Returns `None` if every expected guard has already been issued.
    pub fn guard(&self, unit: impl Into<String>) -> Option<CompletionGuard> {
        let unit = unit.into();
        let issued = self
            .inner
            .issued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.inner.expected).then_some(n + 1)
            });

        match issued {
            Ok(_) => Some(CompletionGuard {
                counter: self.clone(),
                unit,
            }),
            Err(_) => {
                warn!(
                    unit = %unit,
                    expected = self.inner.expected,
                    "Refusing to issue completion guard beyond expected units"
                );
                None
            }
        }
    }

    /// Number of units the counter was created for.
    pub fn expected(&self) -> usize {
        self.inner.expected
    }

    /// Number of guards handed out so far.
    pub fn issued(&self) -> usize {
        self.inner.issued.load(Ordering::Acquire)
    }

    /// Units that have not completed yet.
    pub fn pending(&self) -> usize {
        *self.inner.pending.borrow()
    }

    /// Units that have completed.
    pub fn completed(&self) -> usize {
        self.inner.expected - self.pending()
    }

    /// Waits until every expected unit has completed.
    ///
    /// Returns immediately when nothing is pending. There is no timeout:
    /// a unit that never finishes keeps this waiting.
    pub async fn wait(&self) {
        let mut rx = self.inner.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }

    fn complete_one(&self, unit: &str) {
        let mut remaining = 0;
        self.inner.pending.send_modify(|pending| {
            *pending = pending.saturating_sub(1);
            remaining = *pending;
        });
        debug!(unit = %unit, remaining, "Unit completed");
    }
}

/// Records completion of one unit when dropped.
#[derive(Debug)]
#[must_use = "dropping the guard marks the unit as completed"]
pub struct CompletionGuard {
    counter: CompletionCounter,
    unit: String,
}

impl CompletionGuard {
    /// Name of the unit this guard belongs to.
    pub fn unit(&self) -> &str {
        &self.unit
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.counter.complete_one(&self.unit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_counter() {
        let counter = CompletionCounter::new(3);
        assert_eq!(counter.expected(), 3);
        assert_eq!(counter.pending(), 3);
        assert_eq!(counter.completed(), 0);
        assert_eq!(counter.issued(), 0);
    }

    #[test]
    fn test_guard_drop_decrements_once() {
        let counter = CompletionCounter::new(2);
        let guard = counter.guard("algo-stats").unwrap();
        assert_eq!(guard.unit(), "algo-stats");
        assert_eq!(counter.pending(), 2);

        drop(guard);
        assert_eq!(counter.pending(), 1);
        assert_eq!(counter.completed(), 1);
    }

    #[test]
    fn test_cannot_issue_more_than_expected() {
        let counter = CompletionCounter::new(1);
        let _first = counter.guard("a").unwrap();
        assert!(counter.guard("b").is_none());
        assert_eq!(counter.issued(), 1);
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_for_zero() {
        let counter = CompletionCounter::new(0);
        tokio::time::timeout(Duration::from_millis(100), counter.wait())
            .await
            .expect("nothing pending");
    }

    #[tokio::test]
    async fn test_wait_blocks_until_all_complete() {
        let counter = CompletionCounter::new(2);
        let a = counter.guard("a").unwrap();
        let b = counter.guard("b").unwrap();

        drop(a);
        let early = tokio::time::timeout(Duration::from_millis(50), counter.wait()).await;
        assert!(early.is_err(), "one unit still pending");

        drop(b);
        tokio::time::timeout(Duration::from_millis(100), counter.wait())
            .await
            .expect("all units completed");
        assert_eq!(counter.completed(), 2);
    }

    #[tokio::test]
    async fn test_guard_released_when_task_panics() {
        let counter = CompletionCounter::new(1);
        let guard = counter.guard("panicky").unwrap();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("unit blew up");
        });
        assert!(handle.await.is_err());

        assert_eq!(counter.pending(), 0);
        counter.wait().await;
    }

    #[tokio::test]
    async fn test_guards_across_tasks() {
        let counter = CompletionCounter::new(8);
        for i in 0..8 {
            let guard = counter.guard(format!("unit-{i}")).unwrap();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                drop(guard);
            });
        }

        tokio::time::timeout(Duration::from_secs(1), counter.wait())
            .await
            .expect("all spawned units complete");
        assert_eq!(counter.completed(), counter.issued());
    }
}
