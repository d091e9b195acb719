//! Concrete services launched by the daemon.
//!
//! | Kind            | Type                   | Default address  |
//! |-----------------|------------------------|------------------|
//! | `remote-agents` | [`RemoteAgentServer`]  | `0.0.0.0:7000`   |
//! | `api`           | [`ApiServer`]          | `0.0.0.0:3000`   |
//! | `web-console`   | [`ApiServer`]          | `0.0.0.0:3001`   |
//! | `console`       | [`Console`]            | -                |
//!
//! All of them honour the shutdown token passed to `listen`.

mod api;
mod console;
mod remote_agent;
mod tcp;

pub use api::ApiServer;
pub use console::{Console, ConsoleSummary};
pub use remote_agent::{AgentCounters, RemoteAgentServer, MAX_AGENT_LINE};

use std::sync::Arc;

use crate::config::DaemonConfig;
use crate::launcher::{Service, ServiceKind};
use crate::state::StateReader;

/// Builds the default implementation of `kind` from configuration.
pub fn build_service(kind: ServiceKind, config: &DaemonConfig, state: StateReader) -> Arc<dyn Service> {
    match kind {
        ServiceKind::RemoteAgents => Arc::new(RemoteAgentServer::from_config(&config.network)),
        ServiceKind::Api => Arc::new(ApiServer::api(&config.network, state)),
        ServiceKind::WebConsole => Arc::new(ApiServer::web_console(&config.network, state)),
        ServiceKind::Console => Arc::new(Console::from_config(&config.console, state)),
    }
}
