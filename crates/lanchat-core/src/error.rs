//! Core error types for LanChat

use std::path::PathBuf;
use thiserror::Error;

/// Reasons a name cannot be registered.
///
/// These are recoverable: the server answers with a re-prompt or a reject
/// instead of tearing the connection down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Name is empty or whitespace only
    #[error("Username must not be empty")]
    EmptyUsername,

    /// A live session already holds this name
    #[error("Username already in use: {0}")]
    UsernameTaken(String),

    /// The name or the peer address is on the ban list
    #[error("Banned: {0}")]
    Banned(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
