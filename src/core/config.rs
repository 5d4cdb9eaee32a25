//! Client configuration parsing and validation.
//!
//! Configuration is loaded from TOML files with programmatic overrides, or
//! built directly in code. Every tuning knob has a serde default so a minimal
//! file only needs the meta server list.

use crate::base::Endpoint;
use crate::core::error::{ClientError, ClientResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Ordered meta cluster endpoints, `host:port`. Required.
    pub meta_servers: Vec<String>,

    /// Default per-operation deadline in milliseconds.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Worker threads for the optional dedicated I/O runtime.
    #[serde(default = "default_io_threads")]
    pub io_threads: usize,

    /// Enable the client-side counter registry and metrics push.
    #[serde(default)]
    pub enable_counter: bool,

    /// Tag string attached to every pushed counter.
    #[serde(default)]
    pub perf_counter_tags: String,

    /// Metrics push interval in seconds.
    #[serde(default = "default_push_interval_secs")]
    pub push_interval_secs: u64,

    /// Session tuning.
    #[serde(default)]
    pub session: SessionConfig,

    /// Meta session tuning.
    #[serde(default)]
    pub meta: MetaConfig,

    /// Routing cache tuning.
    #[serde(default)]
    pub routing: RoutingConfig,
}

/// Per-session tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// TCP connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Initial reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Reconnect delay ceiling in milliseconds. The delay doubles after each
    /// failed attempt up to this bound and resets on a successful connect.
    #[serde(default = "default_reconnect_delay_max_ms")]
    pub reconnect_delay_max_ms: u64,

    /// Capacity of the pending-send buffer used while a session is not
    /// connected. Requests beyond it fail immediately with `Overflow`.
    #[serde(default = "default_pending_send_capacity")]
    pub pending_send_capacity: usize,

    /// Upper bound on a single frame, bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reconnect_delay_max_ms: default_reconnect_delay_max_ms(),
            pending_send_capacity: default_pending_send_capacity(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl SessionConfig {
    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Initial reconnect delay as a duration.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Reconnect delay ceiling as a duration.
    pub fn reconnect_delay_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_max_ms)
    }
}

/// Meta session tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    /// Maximum query attempts across leader redirects and endpoint rotation.
    #[serde(default = "default_meta_max_retry")]
    pub max_retry: u32,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            max_retry: default_meta_max_retry(),
        }
    }
}

/// Routing cache tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Minimum interval between age-triggered routing refreshes, ms.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl RoutingConfig {
    /// Refresh interval as a duration.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

fn default_operation_timeout_ms() -> u64 {
    1000
}

fn default_io_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_push_interval_secs() -> u64 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    500
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_reconnect_delay_max_ms() -> u64 {
    10_000
}

fn default_pending_send_capacity() -> usize {
    100
}

fn default_max_frame_size() -> usize {
    64 << 20
}

fn default_meta_max_retry() -> u32 {
    10
}

fn default_refresh_interval_ms() -> u64 {
    5000
}

impl ClientConfig {
    /// Build a configuration with defaults for everything but the meta
    /// server list.
    pub fn new(meta_servers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            meta_servers: meta_servers.into_iter().map(Into::into).collect(),
            operation_timeout_ms: default_operation_timeout_ms(),
            io_threads: default_io_threads(),
            enable_counter: false,
            perf_counter_tags: String::new(),
            push_interval_secs: default_push_interval_secs(),
            session: SessionConfig::default(),
            meta: MetaConfig::default(),
            routing: RoutingConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> ClientResult<()> {
        if self.meta_servers.is_empty() {
            return Err(ClientError::InvalidArgument(
                "meta_servers must not be empty".into(),
            ));
        }
        if self.operation_timeout_ms == 0 {
            return Err(ClientError::InvalidArgument(
                "operation_timeout_ms must be positive".into(),
            ));
        }
        if self.session.pending_send_capacity == 0 {
            return Err(ClientError::InvalidArgument(
                "session.pending_send_capacity must be positive".into(),
            ));
        }
        if self.session.reconnect_delay_ms == 0
            || self.session.reconnect_delay_max_ms < self.session.reconnect_delay_ms
        {
            return Err(ClientError::InvalidArgument(
                "session reconnect delays must be positive and ordered".into(),
            ));
        }
        if self.enable_counter && self.push_interval_secs == 0 {
            return Err(ClientError::InvalidArgument(
                "push_interval_secs must be positive when counters are enabled".into(),
            ));
        }
        if self.meta.max_retry == 0 {
            return Err(ClientError::InvalidArgument(
                "meta.max_retry must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the configured meta servers into endpoints.
    ///
    /// Resolution happens once, at construction time.
    pub fn meta_endpoints(&self) -> ClientResult<Vec<Endpoint>> {
        self.meta_servers
            .iter()
            .map(|s| Endpoint::parse_host_port(s))
            .collect()
    }

    /// Default per-operation deadline as a duration.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}
