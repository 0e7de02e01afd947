//! Failures that can abort process startup, before the accept loop runs.
//!
//! Nothing in the connection handler (spec §7) needs a shared error type:
//! every fallible point there resolves immediately into its own response
//! and log line, so the handler just matches on `std::io::Error` inline.
//! This type exists for the one place an error really does need to
//! propagate upward and abort the process — bootstrap.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to open log file {path}: {source}")]
    LoggerInit {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
