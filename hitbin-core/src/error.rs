//! Error types for hitbin-core.

use thiserror::Error;

/// Result type alias for hitbin operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for hitbin operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or contradictory configuration, detected before processing.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unreadable or malformed input (event file, geometry file).
    #[error("input error: {0}")]
    Input(String),

    /// Bin edges that are not strictly increasing or too short.
    #[error("invalid bin edges: {0}")]
    InvalidEdges(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Shorthand for an input error.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Returns true for errors caused by configuration.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
