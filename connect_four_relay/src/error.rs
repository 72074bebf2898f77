// Relay error types.
//
// Only process-level failures live here. Per-connection transport errors are
// handled inside the connection's own thread and never surface as a
// `RelayError`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The listener could not bind. Fatal for the whole server.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// I/O error outside any single connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid TOML for `RelayConfig`.
    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
