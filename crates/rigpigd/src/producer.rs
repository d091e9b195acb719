//! Periodic update producers.
//!
//! An [`UpdateProducer`] asks a [`SnapshotSource`] for the latest snapshot,
//! publishes it on its own queue for the event multiplexor, then sleeps
//! for a fixed interval and repeats.
//!
//! # Cancellation
//!
//! Every producer follows the same cooperative policy: the running flag is
//! checked before each iteration, and the fetch, the publish and the sleep
//! all race against the stop notification. Shutdown therefore never waits
//! for a full interval to elapse.
//!
//! # Failures
//!
//! A failed fetch is logged and the loop carries on with the next
//! interval. Producers never end because their source misbehaves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use rigpig_core::DomainError;

use crate::completion::CompletionGuard;
use crate::state::StateReader;

/// Queue depth between a producer and the multiplexor.
pub const UPDATE_BUFFER: usize = 8;

// ============================================================================
// Source contract
// ============================================================================

/// Errors a snapshot source can report.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid record at index {index}: {source}")]
    Invalid {
        index: usize,
        #[source]
        source: DomainError,
    },

    #[error("{0}")]
    Other(String),
}

/// Computes the latest snapshot of some domain value.
///
/// How the snapshot is obtained is entirely up to the implementation.
#[async_trait]
pub trait SnapshotSource<T>: Send + Sync {
    async fn fetch(&self) -> Result<Vec<T>, SourceError>;
}

// ============================================================================
// Producer
// ============================================================================

/// One periodic producer.
pub struct UpdateProducer<T> {
    name: &'static str,
    source: Arc<dyn SnapshotSource<T>>,
    interval: Duration,
    updates: mpsc::Sender<Vec<T>>,
}

impl<T: Send + 'static> UpdateProducer<T> {
    /// Creates a producer publishing onto `updates`.
    pub fn new(
        name: &'static str,
        source: Arc<dyn SnapshotSource<T>>,
        interval: Duration,
        updates: mpsc::Sender<Vec<T>>,
    ) -> Self {
        Self {
            name,
            source,
            interval,
            updates,
        }
    }

    /// Runs until the running flag flips or the queue closes.
    ///
    /// Returns the number of snapshots published.
    pub async fn run(self, state: StateReader) -> u64 {
        info!(
            producer = self.name,
            interval_secs = self.interval.as_secs(),
            "Update producer started"
        );

        let mut published = 0u64;

        loop {
            if !state.is_running() {
                break;
            }

            let fetched = tokio::select! {
                biased;
                _ = state.stopped() => break,
                fetched = self.source.fetch() => fetched,
            };

            match fetched {
                Ok(snapshot) => {
                    let count = snapshot.len();
                    tokio::select! {
                        biased;
                        _ = state.stopped() => break,
                        sent = self.updates.send(snapshot) => {
                            if sent.is_err() {
                                debug!(producer = self.name, "Update queue closed");
                                break;
                            }
                            published += 1;
                            debug!(producer = self.name, count, "Published snapshot");
                        }
                    }
                }
                Err(e) => {
                    warn!(producer = self.name, error = %e, "Snapshot fetch failed");
                }
            }

            tokio::select! {
                biased;
                _ = state.stopped() => break,
                _ = sleep(self.interval) => {}
            }
        }

        info!(producer = self.name, published, "Update producer stopped");
        published
    }
}

/// Spawns a producer as a supervised unit.
///
/// The guard is released when the producer task ends.
pub fn spawn_producer<T: Send + 'static>(
    producer: UpdateProducer<T>,
    state: StateReader,
    guard: CompletionGuard,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let _guard = guard;
        producer.run(state).await
    })
}
