//! Error types for the precache library.

use thiserror::Error;

use crate::lifecycle::WorkerState;

/// Errors that can occur while installing or serving.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A pre-cached asset answered with a status the cache refuses to store.
    #[error("Unexpected status {status} for {url}")]
    Status {
        /// URL that was fetched.
        url: String,
        /// Status code returned by the origin.
        status: u16,
    },

    /// The asset list resolves to the same request more than once.
    #[error("Duplicate asset in pre-cache list: {0}")]
    DuplicateAsset(String),

    /// A URL in the configuration or a request could not be parsed.
    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        /// The offending input.
        url: String,
        /// Parser error.
        #[source]
        source: url::ParseError,
    },

    /// Cache name contains characters that cannot name a cache directory.
    #[error("Invalid cache name: {0:?}")]
    InvalidCacheName(String),

    /// A stored entry could not be decoded.
    #[error("Corrupt cache entry {path}: {reason}")]
    CorruptEntry {
        /// Path of the entry metadata file.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// A lifecycle transition was requested from the wrong state.
    #[error("Worker is {actual}, expected {expected}")]
    Lifecycle {
        /// State the operation requires.
        expected: WorkerState,
        /// State the worker is actually in.
        actual: WorkerState,
    },

    /// A fetch event was dispatched to a worker that is not activated.
    #[error("Worker is not active ({0})")]
    NotActive(WorkerState),

    /// I/O error during cache storage operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration or entry metadata could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A specialized `Result` type for precache operations.
pub type Result<T> = std::result::Result<T, Error>;
