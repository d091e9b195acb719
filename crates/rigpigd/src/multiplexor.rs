//! Event multiplexor - the supervisor's main loop.
//!
//! Merges the algo-stats queue, the currency-rates queue and the shutdown
//! signal, and applies whatever arrives first to the shared state.
//!
//! ```text
//!  algo-stats producer ──┐
//!                        │  mpsc
//! currency producer ─────┼──────▶ EventMultiplexor ──▶ StateWriter
//!                        │                 (single writer)
//!    OS signal ──────────┘  CancellationToken
//! ```
//!
//! # States
//!
//! `Running` until the shutdown token fires, then `Stopping`, which is
//! terminal: the loop flips the running flag, returns, and drops the
//! writer, so no write can follow.
//!
//! Sources are polled without a fixed priority. Within one source the
//! queue order is preserved.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use rigpig_core::{AlgoStat, CurrencyRate};

use crate::state::StateWriter;

/// Multiplexor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplexorState {
    Running,
    Stopping,
}

/// Counts of updates applied during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiplexorStats {
    pub algo_updates: u64,
    pub currency_updates: u64,
}

/// The central update loop.
pub struct EventMultiplexor {
    algo_updates: mpsc::Receiver<Vec<AlgoStat>>,
    currency_updates: mpsc::Receiver<Vec<CurrencyRate>>,
    shutdown: CancellationToken,
    writer: StateWriter,
    state: MultiplexorState,
    stats: MultiplexorStats,
}

impl EventMultiplexor {
    pub fn new(
        algo_updates: mpsc::Receiver<Vec<AlgoStat>>,
        currency_updates: mpsc::Receiver<Vec<CurrencyRate>>,
        shutdown: CancellationToken,
        writer: StateWriter,
    ) -> Self {
        Self {
            algo_updates,
            currency_updates,
            shutdown,
            writer,
            state: MultiplexorState::Running,
            stats: MultiplexorStats::default(),
        }
    }

    pub fn state(&self) -> MultiplexorState {
        self.state
    }

    /// Runs until the shutdown token is cancelled.
    ///
    /// On return the running flag is false and the writer has been dropped.
    pub async fn run(mut self) -> MultiplexorStats {
        info!("Event multiplexor running");

        let mut algo_open = true;
        let mut currency_open = true;

        while self.state == MultiplexorState::Running {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.state = MultiplexorState::Stopping;
                }

                update = self.algo_updates.recv(), if algo_open => match update {
                    Some(stats) => {
                        if self.writer.set_algo_stats(stats) {
                            self.stats.algo_updates += 1;
                        }
                    }
                    None => {
                        debug!("Algo stats queue closed");
                        algo_open = false;
                    }
                },

                update = self.currency_updates.recv(), if currency_open => match update {
                    Some(rates) => {
                        if self.writer.set_currency_rates(rates) {
                            self.stats.currency_updates += 1;
                        }
                    }
                    None => {
                        debug!("Currency rates queue closed");
                        currency_open = false;
                    }
                },
            }
        }

        info!("Shutdown observed, clearing running flag");
        self.writer.stop();

        info!(
            algo_updates = self.stats.algo_updates,
            currency_updates = self.stats.currency_updates,
            "Event multiplexor stopped"
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{StateReader, StateStore};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    struct Harness {
        algo_tx: mpsc::Sender<Vec<AlgoStat>>,
        currency_tx: mpsc::Sender<Vec<CurrencyRate>>,
        shutdown: CancellationToken,
        reader: StateReader,
        handle: JoinHandle<MultiplexorStats>,
    }

    fn spawn_multiplexor() -> Harness {
        let (writer, reader) = StateStore::new();
        let (algo_tx, algo_rx) = mpsc::channel(8);
        let (currency_tx, currency_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let mux = EventMultiplexor::new(algo_rx, currency_rx, shutdown.clone(), writer);
        assert_eq!(mux.state(), MultiplexorState::Running);
        let handle = tokio::spawn(mux.run());

        Harness {
            algo_tx,
            currency_tx,
            shutdown,
            reader,
            handle,
        }
    }

    async fn wait_for_version(reader: &mut StateReader, algo: u64, currency: u64) {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let snapshot = reader.snapshot();
                if snapshot.algo_stats_version >= algo
                    && snapshot.currency_rates_version >= currency
                {
                    return;
                }
                reader.changed().await;
            }
        })
        .await
        .expect("state should reach the expected version");
    }

    #[tokio::test]
    async fn test_algo_update_overwrites_state() {
        let mut h = spawn_multiplexor();

        h.algo_tx
            .send(vec![AlgoStat::new("ethash", "ETC", 1.0), AlgoStat::new("kawpow", "RVN", 0.5)])
            .await
            .unwrap();
        let latest = vec![AlgoStat::new("randomx", "XMR", 2.0)];
        h.algo_tx.send(latest.clone()).await.unwrap();

        wait_for_version(&mut h.reader, 2, 0).await;
        assert_eq!(h.reader.latest_algo_stats(), latest);

        h.shutdown.cancel();
        let stats = h.handle.await.unwrap();
        assert_eq!(stats.algo_updates, 2);
        assert_eq!(stats.currency_updates, 0);
    }

    #[tokio::test]
    async fn test_currency_update_overwrites_state() {
        let mut h = spawn_multiplexor();

        let rates = vec![CurrencyRate::new("USD", 1.0)];
        h.currency_tx.send(rates.clone()).await.unwrap();

        wait_for_version(&mut h.reader, 0, 1).await;
        assert_eq!(h.reader.latest_currency_rates(), rates);
        assert!(h.reader.latest_algo_stats().is_empty());

        h.shutdown.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_both_sources_ready() {
        let mut h = spawn_multiplexor();

        h.algo_tx.send(vec![AlgoStat::new("ethash", "ETC", 1.0)]).await.unwrap();
        h.currency_tx.send(vec![CurrencyRate::new("EUR", 0.9)]).await.unwrap();

        wait_for_version(&mut h.reader, 1, 1).await;

        h.shutdown.cancel();
        let stats = h.handle.await.unwrap();
        assert_eq!(stats, MultiplexorStats { algo_updates: 1, currency_updates: 1 });
    }

    #[tokio::test]
    async fn test_per_source_order_preserved() {
        let mut h = spawn_multiplexor();

        for i in 1..=5 {
            h.currency_tx
                .send(vec![CurrencyRate::new("USD", i as f64)])
                .await
                .unwrap();
        }

        wait_for_version(&mut h.reader, 0, 5).await;
        assert_eq!(h.reader.latest_currency_rates(), vec![CurrencyRate::new("USD", 5.0)]);

        h.shutdown.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_clears_running_and_exits() {
        let h = spawn_multiplexor();
        assert!(h.reader.is_running());

        h.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), h.handle)
            .await
            .expect("multiplexor exits on shutdown")
            .unwrap();

        assert!(!h.reader.is_running());
        assert!(!h.reader.snapshot().running);
    }

    #[tokio::test]
    async fn test_no_writes_after_shutdown() {
        let h = spawn_multiplexor();

        h.shutdown.cancel();
        h.handle.await.unwrap();

        // The receiver is gone with the multiplexor; late sends fail
        assert!(h
            .currency_tx
            .send(vec![CurrencyRate::new("USD", 9.0)])
            .await
            .is_err());
        assert!(h.reader.latest_currency_rates().is_empty());
        assert_eq!(h.reader.snapshot().currency_rates_version, 0);
    }

    #[tokio::test]
    async fn test_closed_queues_still_wait_for_shutdown() {
        let h = spawn_multiplexor();
        drop(h.algo_tx);
        drop(h.currency_tx);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!h.handle.is_finished());
        assert!(h.reader.is_running());

        h.shutdown.cancel();
        h.handle.await.unwrap();
    }
}
