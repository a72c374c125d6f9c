//! Core error types

use thiserror::Error;

/// Errors arising from target property resolution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    /// The target does not expose the requested key path
    #[error("no property registered for key path `{0}`")]
    UnknownKeyPath(String),

    /// The resolved property has neither a read nor a write capability
    #[error("property `{0}` exposes no read or write capability")]
    NoCapabilities(String),
}

/// Result type for property resolution
pub type Result<T> = std::result::Result<T, PropertyError>;
