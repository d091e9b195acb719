//! Top-level supervisor.
//!
//! Owns the service configuration, the shared state store and the
//! completion counter, and sequences a run:
//!
//! 1. count enabled services; the counter expects `enabled + 2` units
//!    (the two update producers always run)
//! 2. launch both producers and every enabled service on their own tasks
//! 3. run the event multiplexor until the shutdown token fires
//! 4. wait for every launched unit to record completion
//!
//! # Failure semantics
//!
//! Units never report failures back here. A service whose `listen()` fails
//! is logged by its launcher and simply finishes early; the run carries on
//! degraded. The only errors [`Supervisor::run`] returns are set-up errors
//! detected before anything is launched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rigpig_core::{AlgoStat, CurrencyRate};

use crate::completion::{CompletionCounter, CompletionGuard};
use crate::config::{ServiceConfig, DEFAULT_ALGO_STATS_INTERVAL, DEFAULT_CURRENCY_RATES_INTERVAL};
use crate::launcher::{launch_service, Service, ServiceKind};
use crate::multiplexor::EventMultiplexor;
use crate::producer::{spawn_producer, SnapshotSource, UpdateProducer, UPDATE_BUFFER};
use crate::signals::ShutdownSignals;
use crate::state::{StateReader, StateStore, StateWriter};

/// Units that run regardless of configuration: the two update producers.
pub const ALWAYS_ON_UNITS: usize = 2;

pub const ALGO_STATS_PRODUCER: &str = "algo-stats";
pub const CURRENCY_RATES_PRODUCER: &str = "currency-rates";

/// Errors detected while setting up a run.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Service {0} is enabled but no implementation was registered")]
    ServiceNotRegistered(ServiceKind),

    /// A slot of this run's counter was taken through [`Supervisor::completion`]
    /// before `run` issued its own guards.
    #[error("No completion slot left for unit {0}")]
    CounterExhausted(String),

    #[error("Failed to register signal handlers: {0}")]
    Signal(#[source] std::io::Error),
}

/// Refresh intervals for the two update producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerIntervals {
    pub algo_stats: Duration,
    pub currency_rates: Duration,
}

impl Default for ProducerIntervals {
    fn default() -> Self {
        Self {
            algo_stats: DEFAULT_ALGO_STATS_INTERVAL,
            currency_rates: DEFAULT_CURRENCY_RATES_INTERVAL,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub units_launched: usize,
    pub units_completed: usize,
    pub algo_updates: u64,
    pub currency_updates: u64,
}

/// The process supervisor.
pub struct Supervisor {
    services: ServiceConfig,
    intervals: ProducerIntervals,
    algo_source: Arc<dyn SnapshotSource<AlgoStat>>,
    currency_source: Arc<dyn SnapshotSource<CurrencyRate>>,
    registered: HashMap<ServiceKind, Arc<dyn Service>>,
    writer: StateWriter,
    reader: StateReader,
    completion: CompletionCounter,
}

impl Supervisor {
    /// Creates a supervisor. The service configuration is fixed from here on.
    pub fn new(
        services: ServiceConfig,
        algo_source: Arc<dyn SnapshotSource<AlgoStat>>,
        currency_source: Arc<dyn SnapshotSource<CurrencyRate>>,
    ) -> Self {
        let (writer, reader) = StateStore::new();
        let completion = CompletionCounter::new(services.count_enabled_services() + ALWAYS_ON_UNITS);

        Self {
            services,
            intervals: ProducerIntervals::default(),
            algo_source,
            currency_source,
            registered: HashMap::new(),
            writer,
            reader,
            completion,
        }
    }

    #[must_use]
    pub fn with_intervals(mut self, intervals: ProducerIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    /// Registers the implementation used when `kind` is enabled.
    ///
    /// Registering a disabled kind is allowed; it is simply never launched.
    #[must_use]
    pub fn with_service(mut self, kind: ServiceKind, service: Arc<dyn Service>) -> Self {
        self.registered.insert(kind, service);
        self
    }

    /// Read-only handle to the shared state.
    pub fn state(&self) -> StateReader {
        self.reader.clone()
    }

    pub fn service_config(&self) -> &ServiceConfig {
        &self.services
    }

    pub fn count_enabled_services(&self) -> usize {
        self.services.count_enabled_services()
    }

    /// Handle to the completion counter for this supervisor's run.
    pub fn completion(&self) -> CompletionCounter {
        self.completion.clone()
    }

    /// Registers for termination signals and runs until one arrives.
    pub async fn start(self) -> Result<RunSummary, SupervisorError> {
        let signals = ShutdownSignals::register().map_err(SupervisorError::Signal)?;
        let shutdown = CancellationToken::new();
        let listener = signals.spawn(shutdown.clone());

        let result = self.run(shutdown.clone()).await;

        // Release the signal task if we stopped for another reason
        shutdown.cancel();
        let _ = listener.await;
        result
    }

    /// Runs until `shutdown` is cancelled and every unit has finished.
    pub async fn run(self, shutdown: CancellationToken) -> Result<RunSummary, SupervisorError> {
        let Self {
            services,
            intervals,
            algo_source,
            currency_source,
            mut registered,
            writer,
            reader,
            completion,
        } = self;

        let enabled = services.count_enabled_services();
        info!(enabled, tracked = completion.expected(), "Loading {} services", enabled);

        let mut launches = Vec::with_capacity(enabled);
        for kind in services.enabled() {
            let service = registered
                .remove(&kind)
                .ok_or(SupervisorError::ServiceNotRegistered(kind))?;
            launches.push((kind, service));
        }

        let (algo_tx, algo_rx) = mpsc::channel(UPDATE_BUFFER);
        let (currency_tx, currency_rx) = mpsc::channel(UPDATE_BUFFER);

        let currency_guard = take_guard(&completion, CURRENCY_RATES_PRODUCER)?;
        let algo_guard = take_guard(&completion, ALGO_STATS_PRODUCER)?;
        let service_guards = launches
            .iter()
            .map(|(kind, _)| take_guard(&completion, kind.as_str()))
            .collect::<Result<Vec<_>, _>>()?;

        info!("Initializing currency updates");
        spawn_producer(
            UpdateProducer::new(
                CURRENCY_RATES_PRODUCER,
                currency_source,
                intervals.currency_rates,
                currency_tx,
            ),
            reader.clone(),
            currency_guard,
        );

        info!("Initializing algo stats updates");
        spawn_producer(
            UpdateProducer::new(ALGO_STATS_PRODUCER, algo_source, intervals.algo_stats, algo_tx),
            reader.clone(),
            algo_guard,
        );

        for ((kind, service), guard) in launches.into_iter().zip(service_guards) {
            launch_service(kind, service, reader.stop_token(), guard);
        }

        let stats = EventMultiplexor::new(algo_rx, currency_rx, shutdown, writer)
            .run()
            .await;

        info!(pending = completion.pending(), "Waiting for units to finish");
        completion.wait().await;
        info!(completed = completion.completed(), "All units finished");

        Ok(RunSummary {
            units_launched: completion.issued(),
            units_completed: completion.completed(),
            algo_updates: stats.algo_updates,
            currency_updates: stats.currency_updates,
        })
    }
}

fn take_guard(counter: &CompletionCounter, unit: &str) -> Result<CompletionGuard, SupervisorError> {
    counter
        .guard(unit)
        .ok_or_else(|| SupervisorError::CounterExhausted(unit.to_string()))
}
