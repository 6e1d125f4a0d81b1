//! Server configuration.
//!
//! Loaded with the `config` crate from an optional TOML file, then
//! overridden by `CTSD__`-prefixed environment variables using `__` as the
//! nesting separator (e.g. `CTSD__LIMITS__STALENESS_WINDOW=10s`).
//!
//! ```toml
//! log_dir = "outputs/logs"
//!
//! [[interfaces]]
//! name = "INST_INT"
//! targets = ["INST"]
//!
//! [[routers]]
//! name = "ROUTE"
//! interfaces = ["INST_INT"]
//!
//! [[packet_loggers]]
//! name = "DEFAULT"
//! interfaces = ["INST_INT"]
//!
//! [limits]
//! staleness_window = "30s"
//!
//! [tasks]
//! reconnect_delay = "5s"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::duration::serde_str;
use crate::error::Result;

/// Default depth of every hub channel.
pub const DEFAULT_QUEUE_DEPTH: usize = 1000;

/// Default staleness window for telemetry packets.
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(30);

/// Default persistence applied by `set_limits` when none is given.
pub const DEFAULT_PERSISTENCE: u32 = 1;

/// Limit set that is active when the server starts.
pub const DEFAULT_LIMITS_SET: &str = "DEFAULT";

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub interfaces: Vec<InterfaceConfig>,
    pub routers: Vec<RouterConfig>,
    /// When empty, a `DEFAULT` logger covering every interface is created.
    pub packet_loggers: Vec<PacketLoggerConfig>,
    pub log_dir: PathBuf,
    pub hub: HubConfig,
    pub limits: LimitsConfig,
    pub tasks: TaskConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            interfaces: Vec::new(),
            routers: Vec::new(),
            packet_loggers: Vec::new(),
            log_dir: PathBuf::from("logs"),
            hub: HubConfig::default(),
            limits: LimitsConfig::default(),
            tasks: TaskConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(Environment::with_prefix("CTSD").separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(content, config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    /// Targets mapped to this interface, in order.
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub name: String,
    /// Interfaces whose telemetry this router forwards.
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketLoggerConfig {
    pub name: String,
    #[serde(default)]
    pub interfaces: Vec<String>,
}

/// Queue depths of the three hub channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub limits_queue_depth: usize,
    pub packet_queue_depth: usize,
    pub message_queue_depth: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            limits_queue_depth: DEFAULT_QUEUE_DEPTH,
            packet_queue_depth: DEFAULT_QUEUE_DEPTH,
            message_queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    #[serde(with = "serde_str")]
    pub staleness_window: Duration,
    pub default_persistence: u32,
    pub active_set: String,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            staleness_window: DEFAULT_STALENESS_WINDOW,
            default_persistence: DEFAULT_PERSISTENCE,
            active_set: DEFAULT_LIMITS_SET.to_string(),
        }
    }
}

/// Settings for the supervisor and the built-in background tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Register the task that retries links stuck in `ATTEMPTING`.
    pub reconnect: bool,
    #[serde(with = "serde_str")]
    pub reconnect_delay: Duration,
    /// Register the task that marks unchecked packets stale.
    pub staleness_sweep: bool,
    #[serde(with = "serde_str")]
    pub staleness_check_interval: Duration,
    /// How long `stop` waits for task workers before aborting them.
    #[serde(with = "serde_str")]
    pub shutdown_grace: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_delay: Duration::from_secs(5),
            staleness_sweep: true,
            staleness_check_interval: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

fn default_true() -> bool {
    true
}
