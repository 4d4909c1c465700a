//! Error types shared across the Skyward crates.
//!
//! Every enum carries `user_message()`: text that can go into an HTTP error
//! body or a log line a client might see. The `Display` output keeps the
//! underlying detail for operators.

use thiserror::Error;

/// Failure while starting or running a Skyward process.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("network: {0}")]
    Network(#[from] NetworkError),

    #[error("offline store: {0}")]
    Storage(#[from] DatabaseError),

    #[error("cannot listen on {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Network(e) => e.user_message(),
            AppError::Storage(e) => e.user_message(),
            AppError::Bind { .. } => "The server address is already in use or not available.",
            AppError::Io(_) => "A file could not be read or written.",
            AppError::Other(_) => "Something went wrong. Check the server log for details.",
        }
    }
}

/// Talking to a remote HTTP service failed.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Connection refused, DNS failure, TLS failure.
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("timed out")]
    Timeout,

    /// The remote answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The body could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::Unreachable(_) => "Unable to reach the weather service.",
            NetworkError::Timeout => "The weather service took too long to respond.",
            NetworkError::Status { status, .. } if *status >= 500 => {
                "The weather service is having problems. Try again later."
            }
            NetworkError::Status { .. } => "The weather service rejected the request.",
            NetworkError::Malformed(_) => "The weather service sent an unreadable response.",
        }
    }

    /// True when the remote side was never reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, NetworkError::Unreachable(_) | NetworkError::Timeout)
    }
}

/// SQLite offline store failures.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("cannot open database: {0}")]
    Open(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("database corrupt: {0}")]
    Corrupt(String),
}

impl DatabaseError {
    pub fn user_message(&self) -> &'static str {
        match self {
            DatabaseError::Open(_) => "The offline cache could not be opened.",
            DatabaseError::Query(_) => "The offline cache could not be read or updated.",
            DatabaseError::Corrupt(_) => "The offline cache is damaged. Clear it to recover.",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting the current operation cannot do without.
    #[error("{0} is not set")]
    Missing(String),

    #[error("invalid value: {0}")]
    Invalid(String),

    #[error("cannot parse config file: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Missing(_) => "Server configuration error",
            ConfigError::Invalid(_) | ConfigError::Parse(_) => "Server configuration is invalid.",
        }
    }
}

/// Map `reqwest` failures onto [`NetworkError`].
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    /// The request URL is stripped first: upstream URLs carry the API key.
    fn into_network_error(self) -> NetworkError {
        let err = self.without_url();
        if err.is_timeout() {
            return NetworkError::Timeout;
        }
        if err.is_decode() || err.is_body() {
            return NetworkError::Malformed(err.to_string());
        }
        match err.status() {
            Some(status) => NetworkError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => NetworkError::Unreachable(err.to_string()),
        }
    }
}

/// Map `rusqlite` failures onto [`DatabaseError`].
pub trait RusqliteErrorExt {
    fn into_database_error(self) -> DatabaseError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_database_error(self) -> DatabaseError {
        let code = self.sqlite_error_code();
        match code {
            Some(rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase) => {
                DatabaseError::Corrupt(self.to_string())
            }
            Some(rusqlite::ErrorCode::CannotOpen) => DatabaseError::Open(self.to_string()),
            _ => DatabaseError::Query(self.to_string()),
        }
    }
}
