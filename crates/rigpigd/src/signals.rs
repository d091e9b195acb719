//! OS signal handling.
//!
//! - SIGTERM/SIGINT/SIGQUIT: graceful shutdown
//! - Ctrl+C on non-unix platforms
//!
//! Handlers are installed synchronously by [`ShutdownSignals::register`],
//! so no signal delivered after registration is lost. The first signal
//! cancels the shutdown token; shutdown cannot be undone.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Installed termination signal handlers.
pub struct ShutdownSignals {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigquit: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    /// Installs the handlers. Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    /// Installs the handlers. Must be called from within a tokio runtime.
    #[cfg(not(unix))]
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Waits for the first termination signal.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> std::io::Result<()> {
        tokio::select! {
            _ = self.sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = self.sigint.recv() => {
                info!("Received SIGINT");
            }
            _ = self.sigquit.recv() => {
                info!("Received SIGQUIT");
            }
        }
        Ok(())
    }

    /// Waits for the first termination signal.
    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> std::io::Result<()> {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
        Ok(())
    }

    /// Spawns a task that cancels `shutdown` on the first signal.
    ///
    /// The task also ends, without cancelling anything further, if the
    /// token is cancelled elsewhere first.
    pub fn spawn(mut self, shutdown: CancellationToken) -> JoinHandle<()> {
        cancel_on(async move { self.recv().await }, shutdown)
    }
}

/// Cancels `shutdown` once `wait` resolves.
///
/// A failed wait also cancels: without a working signal source the
/// daemon could otherwise never be stopped.
fn cancel_on<F>(wait: F, shutdown: CancellationToken) -> JoinHandle<()>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            result = wait => {
                match result {
                    Ok(()) => info!("Shutdown signal received"),
                    Err(e) => error!(error = %e, "Error waiting for shutdown signal, shutting down"),
                }
                shutdown.cancel();
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_register_succeeds_inside_runtime() {
        assert!(ShutdownSignals::register().is_ok());
    }

    #[tokio::test]
    async fn test_listener_exits_when_token_cancelled_elsewhere() {
        let shutdown = CancellationToken::new();
        let handle = ShutdownSignals::register()
            .unwrap()
            .spawn(shutdown.clone());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("listener should exit")
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_wait_still_cancels() {
        let shutdown = CancellationToken::new();
        let wait = async { Err(std::io::Error::other("signal driver unavailable")) };

        tokio::time::timeout(Duration::from_secs(1), cancel_on(wait, shutdown.clone()))
            .await
            .expect("listener should exit")
            .unwrap();
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_received_signal_cancels() {
        let shutdown = CancellationToken::new();

        cancel_on(async { Ok(()) }, shutdown.clone()).await.unwrap();
        assert!(shutdown.is_cancelled());
    }
}
