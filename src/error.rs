//! Error types for murmur

use thiserror::Error;

/// Result type alias for murmur operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in murmur
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credential, unreadable config file)
    #[error("configuration error: {0}")]
    Config(String),

    /// Message store could not be opened
    #[error("store connection error: {0}")]
    Connection(String),

    /// Non-2xx status from an LLM or tool backend
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Provider response body did not match any known envelope shape
    #[error("undecodable provider response: {reason}")]
    Decode {
        reason: String,
        /// Raw body, kept for diagnosis
        raw: String,
    },

    /// Model content was not the expected structured reply JSON
    #[error("malformed structured reply: {reason}")]
    Parse {
        reason: String,
        /// Offending content, kept for diagnosis
        raw: String,
    },

    /// Outbound send failed
    #[error("send failed: {0}")]
    Sink(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error
    #[error("http error: {0}")]
    Request(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
