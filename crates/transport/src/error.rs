//! Transport error types.

use thiserror::Error;

/// Errors from HTTP calls to the entity or the chain source.
///
/// Transport errors carry the response body where one was received so
/// callers can surface the server's own message. The transport layer
/// never retries; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the connection failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status and no recognized
    /// protocol error code.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The response body could not be decoded as the expected JSON shape.
    #[error("invalid response body: {0}")]
    Decode(String),
}
