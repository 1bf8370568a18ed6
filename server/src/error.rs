//! # Error Taxonomy
//!
//! Small `thiserror`-derived error enums for the fallible internal
//! operations in this crate. Handlers translate these into HTTP status
//! codes at the boundary; `main.rs` uses `anyhow` for startup-only
//! failures that never need to be matched on.

use thiserror::Error;

/// Failure enqueuing a request on an agent's channel.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no agent registered for this subdomain")]
    UnknownSubdomain,
    #[error("channel write failed: {0}")]
    ChannelWrite(String),
    #[error("tunnel response timed out")]
    Timeout,
    #[error("request body exceeds the configured limit")]
    BodyTooLarge,
}

/// Failure loading or evaluating the auth file.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to read auth file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse auth file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Failure reading from or writing to a log store backend.
#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
