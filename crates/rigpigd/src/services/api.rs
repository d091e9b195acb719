//! State snapshot listener used for both the API and the web console.
//!
//! Each accepted connection receives the current [`StateSnapshot`] as a
//! single JSON line and is then closed. The two services are the same
//! type bound to different ports.
//!
//! [`StateSnapshot`]: crate::state::StateSnapshot

use std::net::SocketAddr;
use std::sync::OnceLock;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::NetworkConfig;
use crate::launcher::{Service, ServiceError, ServiceKind};
use crate::state::StateReader;

use super::tcp::{accept_loop, bind};

/// Snapshot listener.
pub struct ApiServer {
    kind: ServiceKind,
    addr: String,
    state: StateReader,
    bound: OnceLock<SocketAddr>,
}

impl ApiServer {
    /// Creates a listener for `addr` (e.g. `"0.0.0.0:3000"`).
    pub fn new(kind: ServiceKind, addr: impl Into<String>, state: StateReader) -> Self {
        Self {
            kind,
            addr: addr.into(),
            state,
            bound: OnceLock::new(),
        }
    }

    /// The API on its default port.
    pub fn api(network: &NetworkConfig, state: StateReader) -> Self {
        Self::new(ServiceKind::Api, network.addr(network.api_port), state)
    }

    /// The web console: same server, web-console port.
    pub fn web_console(network: &NetworkConfig, state: StateReader) -> Self {
        Self::new(
            ServiceKind::WebConsole,
            network.addr(network.web_console_port),
            state,
        )
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Address actually bound, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound.get().copied()
    }
}

#[async_trait]
impl Service for ApiServer {
    async fn listen(&self, shutdown: CancellationToken) -> Result<(), ServiceError> {
        let listener = bind(&self.addr, &self.bound).await?;
        let service = self.kind.as_str();

        accept_loop(service, listener, shutdown, |stream, peer, _, _| {
            let state = self.state.clone();
            async move {
                if let Err(e) = write_snapshot(stream, &state).await {
                    error!(service, peer = %peer, error = %e, "Failed to send snapshot");
                }
            }
        })
        .await
    }
}

async fn write_snapshot(mut stream: TcpStream, state: &StateReader) -> Result<(), ServiceError> {
    let json = serde_json::to_string(&state.snapshot())
        .map_err(|e| ServiceError::Other(format!("Failed to serialize snapshot: {e}")))?;

    stream.write_all(json.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;
    stream.shutdown().await?;

    debug!(bytes = json.len(), "Sent snapshot");
    Ok(())
}
