use crate::error::{Result, RioError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default RIO TCP port
pub const DEFAULT_PORT: u16 = 9621;

/// Client configuration
///
/// Every field except `host` has a default, so a configuration can be
/// deserialized from as little as `{"host": "192.168.1.50"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Milliseconds to wait for the TCP connection to open
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Milliseconds to wait for the response that completes a command
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Controllers probed by zone enumeration
    #[serde(default = "default_probe_bound")]
    pub max_controllers: u32,

    /// Zones per controller probed by zone enumeration
    #[serde(default = "default_probe_bound")]
    pub max_zones: u32,

    /// Sources probed by source enumeration
    #[serde(default = "default_probe_bound")]
    pub max_sources: u32,

    /// Buffer size of the state update broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_response_timeout_ms() -> u64 {
    10_000
}

fn default_probe_bound() -> u32 {
    16
}

fn default_event_capacity() -> usize {
    100
}

impl ClientConfig {
    /// Configuration for a controller at `host` on the default port
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
            max_controllers: default_probe_bound(),
            max_zones: default_probe_bound(),
            max_sources: default_probe_bound(),
            event_capacity: default_event_capacity(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the enumeration bounds (controllers, zones per controller, sources)
    pub fn with_probe_bounds(mut self, controllers: u32, zones: u32, sources: u32) -> Self {
        self.max_controllers = controllers;
        self.max_zones = zones;
        self.max_sources = sources;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// `host:port` string for the TCP connect
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check that the configuration can be used to connect
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(RioError::Config("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(RioError::Config("port must be non-zero".to_string()));
        }
        if self.connect_timeout_ms == 0 || self.response_timeout_ms == 0 {
            return Err(RioError::Config("timeouts must be non-zero".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(RioError::Config("event_capacity must be non-zero".to_string()));
        }
        Ok(())
    }
}
