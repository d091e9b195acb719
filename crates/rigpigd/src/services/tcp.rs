//! Shared TCP accept loop for the network-facing services.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::OnceLock;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::launcher::ServiceError;

/// Binds a listener, mapping failures to [`ServiceError::Bind`].
pub(crate) async fn bind(addr: &str, bound: &OnceLock<SocketAddr>) -> Result<TcpListener, ServiceError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServiceError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    if let Ok(local) = listener.local_addr() {
        let _ = bound.set(local);
    }
    Ok(listener)
}

/// Accepts connections until `shutdown` fires.
///
/// Each connection runs on its own task with a child token, so in-flight
/// connections are told to stop together with the listener. Accept errors
/// are logged and the loop keeps going.
pub(crate) async fn accept_loop<F, Fut>(
    service: &'static str,
    listener: TcpListener,
    shutdown: CancellationToken,
    handler: F,
) -> Result<(), ServiceError>
where
    F: Fn(TcpStream, SocketAddr, u64, CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let local = listener.local_addr()?;
    info!(service, addr = %local, "Listening");

    let mut connection_number = 0u64;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(service, "Listener shutdown requested");
                break;
            }

            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        connection_number += 1;
                        debug!(service, peer = %peer, connection = connection_number, "Accepted connection");
                        tokio::spawn(handler(stream, peer, connection_number, shutdown.child_token()));
                    }
                    Err(e) => {
                        error!(service, error = %e, "Failed to accept connection");
                    }
                }
            }
        }
    }

    Ok(())
}
