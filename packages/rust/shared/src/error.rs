//! Error types for Leadsmith.
//!
//! Library crates use [`LeadsmithError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Leadsmith operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadsmithError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching a page or calling an external API.
    #[error("network error: {0}")]
    Network(String),

    /// HTML, CSV or JSON parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Language model error (transport, API status, or unusable reply).
    #[error("openai error: {0}")]
    Llm(String),

    /// Bulk email-verification provider error.
    #[error("verification error: {0}")]
    Verification(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (missing field, bad argument, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A lead state change outside the allowed transition set.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadsmithError>;

impl LeadsmithError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Category label used when a page-level failure is recorded as a string.
    ///
    /// Model failures are reported as `openai`, everything else that can go
    /// wrong while summarizing a page is a `scrape` failure.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Llm(_) => "openai",
            _ => "scrape",
        }
    }

    /// `"<category>: <detail>"`, the form page-level failures are recorded in.
    pub fn categorized(&self) -> String {
        let detail = match self {
            Self::Llm(msg) | Self::Network(msg) => msg.clone(),
            other => other.to_string(),
        };
        format!("{}: {detail}", self.category())
    }
}
