//! Service launchers.
//!
//! A service is any long-running collaborator with a single blocking
//! entry point, [`Service::listen`]. A launcher runs one service on its
//! own task and records completion when it returns, fails or panics.
//!
//! # Failure policy
//!
//! A failing `listen()` is logged and ends only that unit. Nothing is
//! propagated to the supervisor and nothing is restarted; the process
//! keeps running with one service fewer.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::completion::CompletionGuard;

// ============================================================================
// Service kinds
// ============================================================================

/// The optional services the supervisor knows how to gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKind {
    RemoteAgents,
    WebConsole,
    Api,
    Console,
}

impl ServiceKind {
    /// All kinds, in launch order.
    pub const ALL: [ServiceKind; 4] = [
        ServiceKind::RemoteAgents,
        ServiceKind::WebConsole,
        ServiceKind::Api,
        ServiceKind::Console,
    ];

    /// Stable name used in logs and unit names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RemoteAgents => "remote-agents",
            Self::WebConsole => "web-console",
            Self::Api => "api",
            Self::Console => "console",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Service contract
// ============================================================================

/// Errors a service can end with.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// A long-running service.
///
/// `listen` runs until the service fails or `shutdown` is cancelled.
/// Implementations should return promptly once `shutdown` fires; the
/// supervisor waits for them without a timeout.
#[async_trait]
pub trait Service: Send + Sync {
    async fn listen(&self, shutdown: CancellationToken) -> Result<(), ServiceError>;
}

// ============================================================================
// Launcher
// ============================================================================

/// Spawns `service` on its own task.
///
/// The guard is held for the lifetime of the task and released exactly
/// once when `listen` returns, errors, or panics.
pub fn launch_service(
    kind: ServiceKind,
    service: Arc<dyn Service>,
    shutdown: CancellationToken,
    guard: CompletionGuard,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _guard = guard;
        info!(service = %kind, "Starting service");

        // Run on a nested task so a panic is observed and logged here
        // instead of silently ending the unit.
        let result = tokio::spawn(async move { service.listen(shutdown).await }).await;

        match result {
            Ok(Ok(())) => info!(service = %kind, "Service stopped"),
            Ok(Err(e)) => error!(service = %kind, error = %e, "Service failed"),
            Err(e) if e.is_panic() => error!(service = %kind, "Service panicked"),
            Err(e) => error!(service = %kind, error = %e, "Service task aborted"),
        }
    })
}
