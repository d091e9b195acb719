//! Operator console.
//!
//! Reads shared state through a [`StateReader`] and reports a summary to
//! the log on every state change and on a fixed refresh, together with the
//! daemon's own resource usage. Rendering a full interface is left to
//! front-ends that consume the API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConsoleConfig;
use crate::launcher::{Service, ServiceError};
use crate::metrics::{ResourceLimits, ResourceSample, ResourceSampler};
use crate::state::{StateReader, StateSnapshot};

/// Condensed view of the shared state.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleSummary {
    pub algo_count: usize,
    /// Best algorithm as "algorithm/coin", if any
    pub top_algo: Option<String>,
    pub top_profitability: Option<f64>,
    pub rate_count: usize,
    /// Age of the algo stats in whole seconds
    pub algo_age_secs: Option<i64>,
    /// Age of the currency rates in whole seconds
    pub rates_age_secs: Option<i64>,
    pub running: bool,
}

impl ConsoleSummary {
    /// Builds a summary of `snapshot` as seen at `now`.
    ///
    /// The top algorithm is the one with the highest profitability.
    pub fn from_snapshot(snapshot: &StateSnapshot, now: DateTime<Utc>) -> Self {
        let top = snapshot
            .algo_stats
            .iter()
            .max_by(|a, b| a.profitability.total_cmp(&b.profitability));

        Self {
            algo_count: snapshot.algo_stats.len(),
            top_algo: top.map(|s| format!("{}/{}", s.algorithm, s.coin)),
            top_profitability: top.map(|s| s.profitability),
            rate_count: snapshot.currency_rates.len(),
            algo_age_secs: snapshot
                .algo_stats_updated_at
                .map(|at| (now - at).num_seconds()),
            rates_age_secs: snapshot
                .currency_rates_updated_at
                .map(|at| (now - at).num_seconds()),
            running: snapshot.running,
        }
    }
}

/// Log-based console service.
pub struct Console {
    state: StateReader,
    refresh: Duration,
}

impl Console {
    pub fn new(state: StateReader, refresh: Duration) -> Self {
        Self { state, refresh }
    }

    pub fn from_config(config: &ConsoleConfig, state: StateReader) -> Self {
        Self::new(state, config.refresh())
    }

    pub fn refresh(&self) -> Duration {
        self.refresh
    }

    fn report(&self, sampler: &mut ResourceSampler) {
        let summary = ConsoleSummary::from_snapshot(&self.state.snapshot(), Utc::now());
        let usage = sampler.sample();

        info!(
            algos = summary.algo_count,
            top_algo = summary.top_algo.as_deref().unwrap_or("-"),
            top_profitability = summary.top_profitability.unwrap_or_default(),
            rates = summary.rate_count,
            algo_age_secs = summary.algo_age_secs.unwrap_or(-1),
            rates_age_secs = summary.rates_age_secs.unwrap_or(-1),
            memory_mb = usage.rss_mb(),
            cpu_percent = format!("{:.1}", usage.cpu_percent),
            "Console"
        );
        warn_if_high(&usage, sampler.limits());
    }
}

fn warn_if_high(usage: &ResourceSample, limits: &ResourceLimits) {
    if usage.memory_over(limits) {
        warn!(
            memory_mb = usage.rss_mb(),
            threshold_mb = limits.memory_mb,
            "Daemon memory usage above threshold"
        );
    }
    if usage.cpu_over(limits) {
        warn!(
            cpu_percent = format!("{:.1}", usage.cpu_percent),
            threshold_percent = limits.cpu_percent,
            "Daemon CPU usage above threshold"
        );
    }
}

#[async_trait]
impl Service for Console {
    async fn listen(&self, shutdown: CancellationToken) -> Result<(), ServiceError> {
        let mut updates = self.state.clone();
        let mut sampler = ResourceSampler::default();
        let mut tick = interval(self.refresh);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut updates_open = true;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                _ = tick.tick() => self.report(&mut sampler),

                changed = updates.changed(), if updates_open => {
                    if changed {
                        debug!("Console observed state change");
                        self.report(&mut sampler);
                    } else {
                        updates_open = false;
                    }
                }
            }
        }

        info!("Console closed");
        Ok(())
    }
}
