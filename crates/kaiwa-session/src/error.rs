//! Error types for kaiwa-session

use thiserror::Error;

/// Result type alias using kaiwa-session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur at the session layer
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer
    #[error(transparent)]
    Wire(#[from] kaiwa_wire::Error),

    /// Send was called while a turn was still in flight
    #[error("a turn is already in flight")]
    Busy,
}
