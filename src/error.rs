// src/error.rs

//! Unified error handling for the harvester.

use std::fmt;

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or invalid configuration (credentials, proxy, limits)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single timeline page or thread-detail call failed
    #[error("Fetch error for {context}: {message}")]
    Fetch { context: String, message: String },

    /// The platform rejected the session that carried the call
    #[error("Session {session} rejected: {message}")]
    Authentication { session: String, message: String },

    /// Cursor or artifact write failed
    #[error("Persistence error for {context}: {message}")]
    Persistence { context: String, message: String },

    /// Proxy egress could not be verified
    #[error("Egress verification failed: {0}")]
    Egress(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a transient fetch error with context.
    pub fn fetch(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an authentication error for a session.
    pub fn authentication(session: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Authentication {
            session: session.into(),
            message: message.to_string(),
        }
    }

    /// Create a persistence error with context.
    pub fn persistence(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Persistence {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an egress verification error.
    pub fn egress(message: impl Into<String>) -> Self {
        Self::Egress(message.into())
    }

    /// Whether the failure is local to one call and the run may continue.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Http(_) | Self::Json(_))
    }

    /// Whether the failure condemns the session rather than the request.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}
