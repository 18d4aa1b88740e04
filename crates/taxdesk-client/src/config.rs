//! Client configuration and push-channel URL derivation.

use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::errors::ClientError;

/// Delay before reconnecting after a retryable closure.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Characters escaped in the token query parameter (RFC 3986 unreserved
/// characters pass through).
const TOKEN_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Where and how the client connects.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    ws_origin: String,
    /// Delay before reconnecting after a retryable closure.
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    /// Config for the portal served at `base_url` (the REST origin, e.g.
    /// `https://portal.example.com`).
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            ws_origin: ws_origin(base_url)?,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        })
    }

    /// Override the reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Push-channel URL carrying `token`.
    pub fn ws_url(&self, token: &str) -> String {
        format!("{}/ws?token={}", self.ws_origin, utf8_percent_encode(token, TOKEN_ESCAPE))
    }
}

/// `http→ws`, `https→wss`; `ws(s)` origins pass through. Trailing slashes are
/// dropped.
fn ws_origin(base_url: &str) -> Result<String, ClientError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let (scheme, rest) = trimmed
        .split_once("://")
        .ok_or_else(|| ClientError::InvalidBaseUrl(base_url.to_owned()))?;
    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(ClientError::InvalidBaseUrl(base_url.to_owned())),
    };
    if rest.is_empty() {
        return Err(ClientError::InvalidBaseUrl(base_url.to_owned()));
    }
    Ok(format!("{ws_scheme}://{rest}"))
}
