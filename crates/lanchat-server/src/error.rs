//! Server error types

use std::io;

use thiserror::Error;

/// Errors surfaced to whoever starts the server
#[derive(Error, Debug)]
pub enum ServerError {
    /// Listening socket could not be set up
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}
