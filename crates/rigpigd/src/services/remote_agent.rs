//! Remote agent listener.
//!
//! Accepts connections from mining-rig agents and reads newline-delimited
//! messages. Interpreting those messages belongs to the agent protocol
//! layer; this listener only frames, counts and logs them.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::launcher::{Service, ServiceError, ServiceKind};

use super::tcp::{accept_loop, bind};

/// Maximum accepted message length (64KB).
pub const MAX_AGENT_LINE: usize = 64 * 1024;

/// Connection and message counters.
#[derive(Debug, Default)]
pub struct AgentCounters {
    pub connections: AtomicU64,
    pub messages: AtomicU64,
}

/// Listener for remote agents.
pub struct RemoteAgentServer {
    addr: String,
    counters: Arc<AgentCounters>,
    bound: OnceLock<SocketAddr>,
}

impl RemoteAgentServer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            counters: Arc::new(AgentCounters::default()),
            bound: OnceLock::new(),
        }
    }

    pub fn from_config(network: &NetworkConfig) -> Self {
        Self::new(network.addr(network.remote_agent_port))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Address actually bound, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound.get().copied()
    }

    pub fn counters(&self) -> &AgentCounters {
        &self.counters
    }
}

#[async_trait]
impl Service for RemoteAgentServer {
    async fn listen(&self, shutdown: CancellationToken) -> Result<(), ServiceError> {
        let listener = bind(&self.addr, &self.bound).await?;

        accept_loop(
            ServiceKind::RemoteAgents.as_str(),
            listener,
            shutdown,
            |stream, peer, conn, cancel| {
                handle_agent(stream, peer, conn, cancel, Arc::clone(&self.counters))
            },
        )
        .await
    }
}

async fn handle_agent(
    stream: TcpStream,
    peer: SocketAddr,
    connection: u64,
    cancel: CancellationToken,
    counters: Arc<AgentCounters>,
) {
    counters.connections.fetch_add(1, Ordering::Relaxed);
    info!(peer = %peer, connection, "Agent connected");

    let mut frames = FramedRead::new(stream, LinesCodec::new_with_max_length(MAX_AGENT_LINE));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(connection, "Agent connection closing for shutdown");
                break;
            }

            frame = frames.next() => match frame {
                Some(Ok(line)) => {
                    counters.messages.fetch_add(1, Ordering::Relaxed);
                    debug!(connection, bytes = line.len(), "Agent message");
                }
                Some(Err(e)) => {
                    warn!(connection, error = %e, "Dropping agent connection");
                    break;
                }
                None => break,
            },
        }
    }

    info!(peer = %peer, connection, "Agent disconnected");
}
