//! Error types for kaiwa-wire

use thiserror::Error;

/// Result type alias using kaiwa-wire Error
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal, turn-level failures.
///
/// Any of these ends the turn; per-frame payload problems are
/// [`DecodeError`] instead and never surface here.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request or body read failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend rejected the request with a non-2xx status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Stream ended without an explicit Done or Error chunk
    #[error("stream closed early: {0}")]
    Sse(String),
}

impl Error {
    /// Create an API error from a status code and detail message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if this error came back as an authentication failure
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Api { status: 401 | 403, .. })
    }
}

/// Recoverable, per-frame decode failures.
///
/// The reader loop skips the offending frame and continues.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Payload was not a valid JSON object
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload carried a `type` discriminator we do not recognize
    #[error("unknown chunk type: {0}")]
    UnknownType(String),
}
