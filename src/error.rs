//! Error types for coderecall
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for coderecall operations
///
/// The variants mirror how failures propagate: per-record problems are
/// swallowed by batch operations and never reach callers, point lookups
/// surface `SourceNotFound`/`SessionNotFound` directly, and a backend that
/// cannot be opened at all is reported as unavailable. The opencode source
/// reports `BothBackendsFailed` only when neither its database nor its
/// legacy storage tree could service a request.
#[derive(Error, Debug)]
pub enum CoderecallError {
    /// Unknown source key (no adapter registered under that name)
    #[error("unknown source: {0}")]
    SourceNotFound(String),

    /// Session id absent in the queried source
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Store missing or unopenable
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Canonical store and legacy fallback both failed for one call
    #[error("canonical backend failed ({canonical}); legacy fallback failed ({legacy})")]
    BothBackendsFailed {
        /// Failure reported by the canonical structured store
        canonical: String,
        /// Failure reported by the legacy file-tree store
        legacy: String,
    },

    /// Reverse addressing requested from a source without exact counts
    #[error("from_end pagination is not supported by source: {0}")]
    ReverseUnsupported(String),

    /// Search index cache errors (schema, upsert, query)
    #[error("index error: {0}")]
    Index(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite errors from the canonical store or the index cache
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type alias for coderecall operations
///
/// Uses `anyhow::Error` as the error type, allowing rich error context and
/// easy propagation while keeping `CoderecallError` downcastable.
pub type Result<T> = anyhow::Result<T>;
