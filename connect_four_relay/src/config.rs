// Relay configuration: defaults, TOML loading, and validation.
//
// Every field has a default, so an empty file (or no file at all) gives a
// working server on port 5555. The binary layers CLI
// flags on top of whatever `from_file` returns.

use std::path::Path;

use serde::Deserialize;

use crate::error::{RelayError, Result};

/// Names claimed at startup and never released.
pub const DEFAULT_RESERVED_NAMES: [&str; 3] = ["Server", "Admin", "System"];

/// Configuration for starting a relay server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Interface to listen on.
    pub bind_address: String,
    /// Listen port. `0` lets the OS pick one (tests rely on this).
    pub port: u16,
    /// Names no player may take.
    pub reserved_names: Vec<String>,
    /// Capacity of the event channel. Events beyond it are dropped rather
    /// than blocking a connection thread.
    pub event_capacity: usize,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".into(),
            port: 5555,
            reserved_names: DEFAULT_RESERVED_NAMES.iter().map(|s| s.to_string()).collect(),
            event_capacity: 1024,
            log_level: "info".into(),
        }
    }
}

impl RelayConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RelayError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse a config from TOML text. Missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: RelayConfig = toml::from_str(text)?;
        // Blank entries would let an empty name slip into the registry.
        config.reserved_names.retain(|name| !name.is_empty());
        Ok(config)
    }

    /// `bind_address:port`, as passed to `TcpListener::bind`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
