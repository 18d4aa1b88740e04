//! Auth error types.

/// Errors that can occur while issuing or verifying tokens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token was empty.
    #[error("missing token")]
    Missing,

    /// The token's expiry has passed.
    #[error("token expired")]
    Expired,

    /// Signature, issuer, or shape did not check out.
    #[error("invalid token: {0}")]
    Invalid(String),

    /// Signing failed.
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_maps_from_jwt_kind() {
        let err: AuthError = jsonwebtoken::errors::Error::from(
            jsonwebtoken::errors::ErrorKind::ExpiredSignature,
        )
        .into();
        assert!(matches!(err, AuthError::Expired));
    }

    #[test]
    fn other_kinds_are_invalid() {
        let err: AuthError =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidSignature).into();
        assert!(err.to_string().starts_with("invalid token"));
    }
}
