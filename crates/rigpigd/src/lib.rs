//! rigpig daemon - service supervisor and shared state
//!
//! This crate provides the supervisor that runs the rigpig services:
//! - `supervisor` - launch orchestration, completion tracking, termination
//! - `multiplexor` - merges update streams and the shutdown signal into state
//! - `producer` - periodic snapshot producers (algo stats, currency rates)
//! - `launcher` - the `Service` contract and per-service launch tasks
//! - `state` - single-writer shared state with read-only handles
//! - `services` - the remote-agent, API, web-console and console services
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Supervisor                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────────┐  mpsc   ┌────────────────────────┐     │
//! │  │ algo-stats       │────────▶│                        │     │
//! │  │ producer         │         │    EventMultiplexor    │     │
//! │  └──────────────────┘         │   (sole StateWriter)   │     │
//! │  ┌──────────────────┐  mpsc   │                        │     │
//! │  │ currency-rates   │────────▶│                        │     │
//! │  │ producer         │         └───────────┬────────────┘     │
//! │  └──────────────────┘  OS signal ────────▶│                  │
//! │                                           ▼                  │
//! │  ┌──────────────────┐  StateReader  ┌────────────────┐       │
//! │  │ services         │◀──────────────│  StateStore    │       │
//! │  │ (api, console..) │               └────────────────┘       │
//! │  └──────────────────┘                                        │
//! │                                                              │
//! │  every unit holds a CompletionGuard; shutdown waits on them  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod completion;
pub mod config;
pub mod launcher;
pub mod metrics;
pub mod multiplexor;
pub mod producer;
pub mod services;
pub mod signals;
pub mod sources;
pub mod state;
pub mod supervisor;

pub use completion::{CompletionCounter, CompletionGuard};
pub use config::{DaemonConfig, ServiceConfig};
pub use launcher::{Service, ServiceError, ServiceKind};
pub use producer::{SnapshotSource, SourceError};
pub use state::{StateReader, StateSnapshot};
pub use supervisor::{ProducerIntervals, RunSummary, Supervisor, SupervisorError};
