//! # Leela Common
//!
//! Shared error type and logging configuration for the Leela offline worker
//! and its tooling.
//!
//! ## Features
//!
//! - Unified top-level error with boxed sources
//! - Logging configuration and setup

use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for Leela binaries.
#[derive(Error, Debug)]
pub enum LeelaError {
    /// Network-related errors.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Worker errors (cache, lifecycle, routing).
    #[error("Worker error: {message}")]
    Worker {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Logging could not be installed.
    #[error("Logging error: {0}")]
    Logging(String),

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl LeelaError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a worker error with source.
    pub fn worker_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Worker {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            LeelaError::Network { .. } => "network",
            LeelaError::Worker { .. } => "worker",
            LeelaError::Config { .. } => "config",
            LeelaError::Logging(_) => "logging",
            LeelaError::Io(_) => "io",
            LeelaError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

/// Result type alias for Leela operations.
pub type Result<T> = std::result::Result<T, LeelaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_categories() {
        assert_eq!(LeelaError::network("down").category(), "network");
        assert_eq!(LeelaError::config("bad").category(), "config");
        assert_eq!(
            LeelaError::InvalidArgument("--nope".into()).category(),
            "invalid_argument"
        );
    }

    #[test]
    fn test_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = LeelaError::config_with_source("reading config", io);

        assert_eq!(err.to_string(), "Config error: reading config");
        assert_eq!(err.source().map(|s| s.to_string()), Some("missing".into()));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: LeelaError = io.into();
        assert_eq!(err.category(), "io");
    }
}
