//! lanchat-core: Core types and configuration for LanChat
//!
//! This crate provides the configuration structures, validation rules and
//! error taxonomy shared by the server and client crates.

pub mod config;
pub mod error;
pub mod types;

pub use error::{ConfigError, ValidationError};
pub use types::Username;
