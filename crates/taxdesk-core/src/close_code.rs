//! Push-channel close codes.
//!
//! The 4000-4999 range is reserved by RFC 6455 for application use. Only
//! [`AUTH_REJECTED`] tells a client to stop reconnecting; every other code,
//! including the standard ones, is treated as transient.

/// Authentication rejected. The client must obtain a new token before
/// connecting again.
pub const AUTH_REJECTED: u16 = 4001;

/// The user already holds the maximum number of live connections.
pub const CONNECTION_LIMIT_EXCEEDED: u16 = 4002;

/// An inbound frame exceeded the configured size limit.
pub const MESSAGE_TOO_LARGE: u16 = 4003;

/// Standard "going away": idle timeout or server shutdown.
pub const GOING_AWAY: u16 = 1001;

/// Whether a client may reconnect after a closure with `code`.
///
/// A closure without a close frame (`None`) is a network failure and is
/// retryable.
pub fn is_retryable(code: Option<u16>) -> bool {
    code != Some(AUTH_REJECTED)
}

/// Short reason string sent in the close frame.
pub fn reason(code: u16) -> &'static str {
    match code {
        AUTH_REJECTED => "authentication rejected",
        CONNECTION_LIMIT_EXCEEDED => "connection limit exceeded",
        MESSAGE_TOO_LARGE => "message too large",
        GOING_AWAY => "going away",
        _ => "",
    }
}
