//! Daemon configuration.
//!
//! Two layers live here:
//! - [`ServiceConfig`]: the four enablement flags the supervisor is built
//!   from. Immutable once handed to the supervisor.
//! - [`DaemonConfig`]: the outer TOML/env layer the binary loads, which
//!   carries the flags plus ports, producer intervals and source paths.
//!
//! # File format
//!
//! ```toml
//! [services]
//! remote_agents = true
//! api = true
//! console = true
//! web_console = false
//!
//! [network]
//! bind_host = "0.0.0.0"
//! api_port = 3000
//! web_console_port = 3001
//! remote_agent_port = 7000
//!
//! [producers]
//! algo_stats_interval_secs = 300
//! currency_rates_interval_secs = 3600
//! algo_stats_path = "/var/lib/rigpig/algos.json"
//! currency_rates_path = "/var/lib/rigpig/rates.json"
//!
//! [console]
//! refresh_secs = 30
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::launcher::ServiceKind;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_ENABLE_REMOTE_AGENTS: bool = true;
pub const DEFAULT_ENABLE_API: bool = true;
pub const DEFAULT_ENABLE_CONSOLE: bool = true;
pub const DEFAULT_ENABLE_WEB_CONSOLE: bool = false;

pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
pub const DEFAULT_API_PORT: u16 = 3000;
pub const DEFAULT_WEB_CONSOLE_PORT: u16 = 3001;
pub const DEFAULT_REMOTE_AGENT_PORT: u16 = 7000;

/// Algorithm stats refresh interval (5 minutes).
pub const DEFAULT_ALGO_STATS_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Currency rates refresh interval (60 minutes).
pub const DEFAULT_CURRENCY_RATES_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub const DEFAULT_CONSOLE_REFRESH: Duration = Duration::from_secs(30);

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "RIGPIG_CONFIG";

/// Environment variables overriding the enablement flags.
pub const ENABLE_API_ENV_VAR: &str = "RIGPIG_ENABLE_API";
pub const ENABLE_CONSOLE_ENV_VAR: &str = "RIGPIG_ENABLE_CONSOLE";
pub const ENABLE_REMOTE_AGENTS_ENV_VAR: &str = "RIGPIG_ENABLE_REMOTE_AGENTS";
pub const ENABLE_WEB_CONSOLE_ENV_VAR: &str = "RIGPIG_ENABLE_WEB_CONSOLE";

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to render config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid {var} value {value:?} (expected true/false)")]
    InvalidOverride { var: String, value: String },

    #[error("Invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

// ============================================================================
// Service enablement
// ============================================================================

/// Which optional services the supervisor launches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub remote_agents: bool,
    pub api: bool,
    pub console: bool,
    pub web_console: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            remote_agents: DEFAULT_ENABLE_REMOTE_AGENTS,
            api: DEFAULT_ENABLE_API,
            console: DEFAULT_ENABLE_CONSOLE,
            web_console: DEFAULT_ENABLE_WEB_CONSOLE,
        }
    }
}

impl ServiceConfig {
    /// A config with every optional service turned off.
    pub fn none() -> Self {
        Self {
            remote_agents: false,
            api: false,
            console: false,
            web_console: false,
        }
    }

    /// Returns whether the given service is enabled.
    pub fn is_enabled(&self, kind: ServiceKind) -> bool {
        match kind {
            ServiceKind::RemoteAgents => self.remote_agents,
            ServiceKind::Api => self.api,
            ServiceKind::Console => self.console,
            ServiceKind::WebConsole => self.web_console,
        }
    }

    /// Returns a copy with one flag changed.
    #[must_use]
    pub fn with(mut self, kind: ServiceKind, enabled: bool) -> Self {
        match kind {
            ServiceKind::RemoteAgents => self.remote_agents = enabled,
            ServiceKind::Api => self.api = enabled,
            ServiceKind::Console => self.console = enabled,
            ServiceKind::WebConsole => self.web_console = enabled,
        }
        self
    }

    /// Number of enabled optional services.
    pub fn count_enabled_services(&self) -> usize {
        ServiceKind::ALL
            .iter()
            .filter(|kind| self.is_enabled(**kind))
            .count()
    }

    /// Enabled services in launch order.
    pub fn enabled(&self) -> impl Iterator<Item = ServiceKind> + '_ {
        ServiceKind::ALL
            .into_iter()
            .filter(move |kind| self.is_enabled(*kind))
    }
}

// ============================================================================
// Daemon configuration
// ============================================================================

/// Listener addresses for the network-facing services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_host: String,
    pub api_port: u16,
    pub web_console_port: u16,
    pub remote_agent_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            api_port: DEFAULT_API_PORT,
            web_console_port: DEFAULT_WEB_CONSOLE_PORT,
            remote_agent_port: DEFAULT_REMOTE_AGENT_PORT,
        }
    }
}

impl NetworkConfig {
    /// Address string for a port on the configured host.
    pub fn addr(&self, port: u16) -> String {
        format!("{}:{}", self.bind_host, port)
    }
}

/// Update producer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub algo_stats_interval_secs: u64,
    pub currency_rates_interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algo_stats_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_rates_path: Option<PathBuf>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            algo_stats_interval_secs: DEFAULT_ALGO_STATS_INTERVAL.as_secs(),
            currency_rates_interval_secs: DEFAULT_CURRENCY_RATES_INTERVAL.as_secs(),
            algo_stats_path: None,
            currency_rates_path: None,
        }
    }
}

impl ProducerConfig {
    pub fn algo_stats_interval(&self) -> Duration {
        Duration::from_secs(self.algo_stats_interval_secs)
    }

    pub fn currency_rates_interval(&self) -> Duration {
        Duration::from_secs(self.currency_rates_interval_secs)
    }
}

/// Console service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub refresh_secs: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            refresh_secs: DEFAULT_CONSOLE_REFRESH.as_secs(),
        }
    }
}

impl ConsoleConfig {
    pub fn refresh(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
}

/// Full daemon configuration as loaded by the binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub services: ServiceConfig,
    pub network: NetworkConfig,
    pub producers: ProducerConfig,
    pub console: ConsoleConfig,
}

impl DaemonConfig {
    /// Default config file location (`<config_dir>/rigpig/rigpigd.toml`).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("rigpig")
            .join("rigpigd.toml")
    }

    /// Loads configuration from the process environment.
    ///
    /// Resolution order for the file: `explicit`, then `RIGPIG_CONFIG`,
    /// then [`default_path`](Self::default_path). An explicitly named file
    /// must exist; a missing default file yields built-in defaults. Flag
    /// overrides from the environment are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);

        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    debug!(path = %path.display(), "No config file, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Parses TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Renders the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Applies enablement overrides looked up by variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = [
            (ENABLE_API_ENV_VAR, ServiceKind::Api),
            (ENABLE_CONSOLE_ENV_VAR, ServiceKind::Console),
            (ENABLE_REMOTE_AGENTS_ENV_VAR, ServiceKind::RemoteAgents),
            (ENABLE_WEB_CONSOLE_ENV_VAR, ServiceKind::WebConsole),
        ];

        for (var, kind) in vars {
            let Some(value) = lookup(var) else {
                continue;
            };
            let enabled = parse_flag(&value).ok_or_else(|| ConfigError::InvalidOverride {
                var: var.to_string(),
                value: value.clone(),
            })?;
            debug!(service = %kind, enabled, "Applied enablement override");
            self.services = self.services.with(kind, enabled);
        }

        Ok(())
    }

    /// Rejects values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.producers.algo_stats_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "producers.algo_stats_interval_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.producers.currency_rates_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "producers.currency_rates_interval_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.console.refresh_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "console.refresh_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let network = &self.network;
        let mut ports: Vec<(&str, u16)> = Vec::new();
        if self.services.api {
            ports.push(("network.api_port", network.api_port));
        }
        if self.services.web_console {
            ports.push(("network.web_console_port", network.web_console_port));
        }
        if self.services.remote_agents {
            ports.push(("network.remote_agent_port", network.remote_agent_port));
        }
        for (i, (field, port)) in ports.iter().enumerate() {
            if ports.iter().skip(i + 1).any(|(_, other)| other == port) {
                return Err(ConfigError::Invalid {
                    field: (*field).to_string(),
                    reason: format!("port {port} is used by more than one enabled service"),
                });
            }
        }

        Ok(())
    }
}

/// Parses a boolean flag value (`1/true/on/yes`, `0/false/off/no`).
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_service_defaults() {
        let config = ServiceConfig::default();
        assert!(config.remote_agents);
        assert!(config.api);
        assert!(config.console);
        assert!(!config.web_console);
        assert_eq!(config.count_enabled_services(), 3);
    }

    #[test]
    fn test_count_enabled_services_all_combinations() {
        for bits in 0u8..16 {
            let config = ServiceConfig {
                remote_agents: bits & 0b0001 != 0,
                api: bits & 0b0010 != 0,
                console: bits & 0b0100 != 0,
                web_console: bits & 0b1000 != 0,
            };
            assert_eq!(
                config.count_enabled_services(),
                bits.count_ones() as usize,
                "flags {bits:04b}"
            );
            assert_eq!(config.enabled().count(), config.count_enabled_services());
        }
    }

    #[test]
    fn test_with_toggles_single_flag() {
        let config = ServiceConfig::none().with(ServiceKind::WebConsole, true);
        assert!(config.is_enabled(ServiceKind::WebConsole));
        assert!(!config.is_enabled(ServiceKind::Api));
        assert_eq!(config.count_enabled_services(), 1);
    }

    #[test]
    fn test_parse_empty_toml_gives_defaults() {
        let config = DaemonConfig::from_toml_str("").unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.producers.algo_stats_interval(), DEFAULT_ALGO_STATS_INTERVAL);
        assert_eq!(
            config.producers.currency_rates_interval(),
            DEFAULT_CURRENCY_RATES_INTERVAL
        );
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = DaemonConfig::from_toml_str(
            r#"
            [services]
            web_console = true
            console = false

            [network]
            api_port = 8080
            "#,
        )
        .unwrap();

        assert!(config.services.web_console);
        assert!(!config.services.console);
        assert!(config.services.api);
        assert_eq!(config.network.api_port, 8080);
        assert_eq!(config.network.web_console_port, DEFAULT_WEB_CONSOLE_PORT);
        assert_eq!(config.network.addr(8080), "0.0.0.0:8080");
    }

    #[test]
    fn test_from_file_missing_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DaemonConfig::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_from_file_bad_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[services\napi = ").unwrap();
        let err = DaemonConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_apply_overrides() {
        let env: HashMap<&str, &str> = [
            (ENABLE_API_ENV_VAR, "off"),
            (ENABLE_WEB_CONSOLE_ENV_VAR, "YES"),
        ]
        .into_iter()
        .collect();

        let mut config = DaemonConfig::default();
        config
            .apply_overrides(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();

        assert!(!config.services.api);
        assert!(config.services.web_console);
        assert!(config.services.console);
    }

    #[test]
    fn test_apply_overrides_rejects_garbage() {
        let mut config = DaemonConfig::default();
        let err = config
            .apply_overrides(|var| (var == ENABLE_CONSOLE_ENV_VAR).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = DaemonConfig::default();
        config.producers.currency_rates_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_port_clash_between_enabled_services() {
        let mut config = DaemonConfig::default();
        config.services.web_console = true;
        config.network.web_console_port = config.network.api_port;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than one enabled service"));

        // Same ports are fine when one of the two is disabled
        config.services.web_console = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_roundtrip_of_effective_config() {
        let mut config = DaemonConfig::default();
        config.producers.algo_stats_path = Some(PathBuf::from("/tmp/algos.json"));
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("[services]"));
        assert_eq!(DaemonConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" On "), Some(true));
        assert_eq!(parse_flag("false"), Some(false));
        assert_eq!(parse_flag("nope"), None);
    }
}
