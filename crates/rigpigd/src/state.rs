//! Shared state store.
//!
//! Holds the latest algorithm stats, the latest currency rates and the
//! running flag. There is exactly one [`StateWriter`], owned by the event
//! multiplexor; everyone else gets a cheap-to-clone [`StateReader`].
//!
//! # Consistency
//!
//! The store is backed by a `tokio::sync::watch` channel. Each write
//! replaces a whole sequence inside a single `send_modify`, so a reader
//! sees either the previous snapshot or the new one, never a mix.
//! Readers are eventually consistent: a snapshot may be stale, but it is
//! always self-consistent.
//!
//! # Running flag
//!
//! `running` starts `true` and flips to `false` exactly once, via
//! [`StateWriter::stop`]. The flip also cancels a token that producers
//! and services wait on, so nobody has to poll the flag.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, warn};

use rigpig_core::{AlgoStat, CurrencyRate};

// ============================================================================
// Snapshot
// ============================================================================

/// A self-consistent copy of the shared state.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    /// Latest algorithm stats, in producer order
    pub algo_stats: Vec<AlgoStat>,

    /// Latest currency rates, in producer order
    pub currency_rates: Vec<CurrencyRate>,

    /// False once shutdown has been observed
    pub running: bool,

    /// When `algo_stats` was last replaced
    pub algo_stats_updated_at: Option<DateTime<Utc>>,

    /// When `currency_rates` was last replaced
    pub currency_rates_updated_at: Option<DateTime<Utc>>,

    /// Number of algo stats writes applied so far
    pub algo_stats_version: u64,

    /// Number of currency rates writes applied so far
    pub currency_rates_version: u64,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            algo_stats: Vec::new(),
            currency_rates: Vec::new(),
            running: true,
            algo_stats_updated_at: None,
            currency_rates_updated_at: None,
            algo_stats_version: 0,
            currency_rates_version: 0,
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Constructor for a writer/reader pair.
pub struct StateStore;

impl StateStore {
    /// Creates an empty store in the running state.
    pub fn new() -> (StateWriter, StateReader) {
        let (tx, rx) = watch::channel(StateSnapshot::default());
        let stop_token = CancellationToken::new();

        let writer = StateWriter {
            tx,
            stop_token: stop_token.clone(),
        };
        let reader = StateReader { rx, stop_token };

        (writer, reader)
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Exclusive write access to the shared state.
///
/// Not `Clone`: there is one writer for the life of the store.
#[derive(Debug)]
pub struct StateWriter {
    tx: watch::Sender<StateSnapshot>,
    stop_token: CancellationToken,
}

impl StateWriter {
    /// Replaces the latest algorithm stats.
    ///
    /// Returns `false` (and writes nothing) once the store is stopped.
    pub fn set_algo_stats(&self, stats: Vec<AlgoStat>) -> bool {
        if !self.is_running() {
            warn!("Dropping algo stats update after shutdown");
            return false;
        }

        let count = stats.len();
        self.tx.send_modify(|state| {
            state.algo_stats = stats;
            state.algo_stats_updated_at = Some(Utc::now());
            state.algo_stats_version += 1;
        });
        debug!(count, "Applied algo stats update");
        true
    }

    /// Replaces the latest currency rates.
    ///
    /// Returns `false` (and writes nothing) once the store is stopped.
    pub fn set_currency_rates(&self, rates: Vec<CurrencyRate>) -> bool {
        if !self.is_running() {
            warn!("Dropping currency rates update after shutdown");
            return false;
        }

        let count = rates.len();
        self.tx.send_modify(|state| {
            state.currency_rates = rates;
            state.currency_rates_updated_at = Some(Utc::now());
            state.currency_rates_version += 1;
        });
        debug!(count, "Applied currency rates update");
        true
    }

    /// Flips `running` to false and wakes everyone waiting on it.
    ///
    /// Idempotent.
    pub fn stop(&self) {
        self.tx.send_if_modified(|state| {
            let was_running = state.running;
            state.running = false;
            was_running
        });
        self.stop_token.cancel();
    }

    /// Returns the current value of the running flag.
    pub fn is_running(&self) -> bool {
        self.tx.borrow().running
    }

    /// Creates a new read handle.
    pub fn reader(&self) -> StateReader {
        StateReader {
            rx: self.tx.subscribe(),
            stop_token: self.stop_token.clone(),
        }
    }
}

impl Drop for StateWriter {
    fn drop(&mut self) {
        // Readers must never wait on a writer that is gone.
        self.stop_token.cancel();
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Read-only handle to the shared state.
#[derive(Debug, Clone)]
pub struct StateReader {
    rx: watch::Receiver<StateSnapshot>,
    stop_token: CancellationToken,
}

impl StateReader {
    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> StateSnapshot {
        self.rx.borrow().clone()
    }

    pub fn latest_algo_stats(&self) -> Vec<AlgoStat> {
        self.rx.borrow().algo_stats.clone()
    }

    pub fn latest_currency_rates(&self) -> Vec<CurrencyRate> {
        self.rx.borrow().currency_rates.clone()
    }

    /// Returns the current value of the running flag.
    pub fn is_running(&self) -> bool {
        self.rx.borrow().running && !self.stop_token.is_cancelled()
    }

    /// Waits for the next write.
    ///
    /// Returns `false` if the writer has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Completes once the running flag has flipped to false.
    pub fn stopped(&self) -> WaitForCancellationFuture<'_> {
        self.stop_token.cancelled()
    }

    /// Token cancelled when the running flag flips to false.
    ///
    /// Handed to services so their listeners can unwind.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop_token.clone()
    }
}
