//! Configuration types for the Arkgate synchronizer
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main synchronizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Where hostname.if files are generated
    #[serde(default)]
    pub hostname: HostnameConfig,

    /// Control channel to the privileged peer (notifications disabled when absent)
    #[serde(default)]
    pub channel: Option<ChannelConfig>,

    /// Record store
    #[serde(default)]
    pub store: StoreConfig,

    /// Optional service settings
    #[serde(default)]
    pub service: ServiceConfig,
}

impl GatewayConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            hostname: HostnameConfig::default(),
            channel: None,
            store: StoreConfig::default(),
            service: ServiceConfig::default(),
        }
    }

    /// Set the hostname.if root directory
    pub fn with_hostname_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.hostname.dir = dir.into();
        self
    }

    /// Enable notifications over the given socket
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.hostname.validate()?;
        if let Some(channel) = &self.channel {
            channel.validate()?;
        }
        self.store.validate()?;

        if self.service.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }

        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// hostname.if generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostnameConfig {
    /// Directory holding the generated files
    #[serde(default = "default_hostname_dir")]
    pub dir: PathBuf,

    /// File name prefix, followed by the device name
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl HostnameConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.dir.as_os_str().is_empty() {
            return Err(crate::Error::config("hostname directory cannot be empty"));
        }
        if self.file_prefix.contains('/') {
            return Err(crate::Error::config(
                "hostname file prefix cannot contain '/'",
            ));
        }
        Ok(())
    }
}

impl Default for HostnameConfig {
    fn default() -> Self {
        Self {
            dir: default_hostname_dir(),
            file_prefix: default_file_prefix(),
        }
    }
}

fn default_hostname_dir() -> PathBuf {
    PathBuf::from("/etc")
}

fn default_file_prefix() -> String {
    crate::hostname::DEFAULT_FILE_PREFIX.to_string()
}

/// Control channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Unix socket the privileged peer listens on
    pub socket_path: PathBuf,

    /// Upper bound for establishing the connection (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Upper bound for the write and for the reply read (milliseconds)
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,

    /// Extra attempts when the peer is unreachable
    ///
    /// 0 keeps the historical single-attempt behavior.
    #[serde(default)]
    pub max_retries: usize,

    /// Delay between attempts (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl ChannelConfig {
    /// Channel config with default timeouts and no retry
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            connect_timeout_ms: default_connect_timeout_ms(),
            io_timeout_ms: default_io_timeout_ms(),
            max_retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }

    /// Set the retry policy
    pub fn with_retries(mut self, max_retries: usize, retry_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(crate::Error::config("control socket path cannot be empty"));
        }
        if self.connect_timeout_ms == 0 || self.io_timeout_ms == 0 {
            return Err(crate::Error::config("control channel timeouts must be > 0"));
        }
        if self.max_retries > 10 {
            return Err(crate::Error::config(format!(
                "control channel max_retries must be at most 10, got {}",
                self.max_retries
            )));
        }
        Ok(())
    }
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}

fn default_io_timeout_ms() -> u64 {
    5_000
}

fn default_retry_delay_ms() -> u64 {
    500
}

/// Record store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// JSON file store
    File {
        /// Path to the store file
        path: PathBuf,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.as_os_str().is_empty() => {
                Err(crate::Error::config("store file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Capacity of the sync event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Send `netstart <device>` after an interface file changes
    #[serde(default = "default_notify_on_change")]
    pub notify_on_change: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            notify_on_change: default_notify_on_change(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_notify_on_change() -> bool {
    true
}
