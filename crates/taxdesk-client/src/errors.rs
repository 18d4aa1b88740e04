//! Client error type.

/// Errors raised by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The base URL is not an `http(s)://` or `ws(s)://` origin.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// The manager task has exited.
    #[error("connection manager stopped")]
    Stopped,
}
