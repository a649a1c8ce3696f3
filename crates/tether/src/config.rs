//! Server and client configuration.
//!
//! Plain structs with serde derives: construct them in code, override the
//! fields you care about, or load them from a JSON file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tether_tick::TickConfig;
use tether_transport::LinkConfig;
use tether_wire::DEFAULT_MAX_BODY_LEN;

use crate::TetherError;

fn default_io_timeout_ms() -> u64 {
    5_000
}

fn default_max_body_len() -> usize {
    DEFAULT_MAX_BODY_LEN
}

fn default_tick_rate_hz() -> u32 {
    30
}

/// Configuration for a [`Server`](crate::Server).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: String,
    /// Per-operation I/O deadline for every link, in milliseconds.
    /// Exceeding it tears the link down.
    pub io_timeout_ms: u64,
    /// Hard cap on packet body length.
    pub max_body_len: usize,
    /// Tick rate for the simulation loop and the connection drivers.
    pub tick_rate_hz: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4040".to_string(),
            io_timeout_ms: default_io_timeout_ms(),
            max_body_len: default_max_body_len(),
            tick_rate_hz: default_tick_rate_hz(),
        }
    }
}

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Address of the server to dial.
    pub server_addr: String,
    /// Per-operation I/O deadline, in milliseconds.
    pub io_timeout_ms: u64,
    /// Hard cap on packet body length. Must match the server.
    pub max_body_len: usize,
    /// Tick rate for the simulation loop and the connection driver.
    pub tick_rate_hz: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:4040".to_string(),
            io_timeout_ms: default_io_timeout_ms(),
            max_body_len: default_max_body_len(),
            tick_rate_hz: default_tick_rate_hz(),
        }
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, TetherError> {
    let text = std::fs::read_to_string(path).map_err(TetherError::ConfigRead)?;
    serde_json::from_str(&text).map_err(TetherError::ConfigParse)
}

impl ServerConfig {
    /// Loads a config from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TetherError> {
        read_json(path.as_ref())
    }

    pub(crate) fn link_config(&self) -> LinkConfig {
        LinkConfig {
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            max_body_len: self.max_body_len,
        }
    }

    pub(crate) fn tick_config(&self) -> TickConfig {
        TickConfig::with_rate(self.tick_rate_hz)
    }
}

impl ClientConfig {
    /// Loads a config from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TetherError> {
        read_json(path.as_ref())
    }

    pub(crate) fn link_config(&self) -> LinkConfig {
        LinkConfig {
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            max_body_len: self.max_body_len,
        }
    }

    pub(crate) fn tick_config(&self) -> TickConfig {
        TickConfig::with_rate(self.tick_rate_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.io_timeout_ms, 5_000);
        assert_eq!(cfg.max_body_len, DEFAULT_MAX_BODY_LEN);
        assert_eq!(cfg.tick_rate_hz, 30);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        // `#[serde(default)]` lets a config file name only what it
        // overrides.
        let cfg: ServerConfig =
            serde_json::from_str(r#"{ "bind_addr": "0.0.0.0:9000", "tick_rate_hz": 60 }"#)
                .unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:9000");
        assert_eq!(cfg.tick_rate_hz, 60);
        assert_eq!(cfg.io_timeout_ms, 5_000);
    }

    #[test]
    fn test_round_trip_through_json() {
        let cfg = ClientConfig {
            server_addr: "10.0.0.1:4040".into(),
            io_timeout_ms: 250,
            max_body_len: 1024,
            tick_rate_hz: 20,
        };
        let text = serde_json::to_string(&cfg).unwrap();
        let back: ClientConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.server_addr, cfg.server_addr);
        assert_eq!(back.io_timeout_ms, 250);
    }
}
