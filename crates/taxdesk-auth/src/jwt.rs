//! HS256 token issuing and verification.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use taxdesk_core::{Role, UserId};

use crate::errors::AuthError;

/// Who a verified token belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Authenticated user.
    pub user_id: UserId,
    /// Portal role at issue time.
    pub role: Role,
}

/// Resolves a bearer token to an identity.
pub trait TokenVerifier: Send + Sync {
    /// Verify `token`. Expired, malformed, or foreign tokens fail.
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// JWT claim set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Portal role.
    pub role: Role,
    /// Issuer.
    pub iss: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}

/// Issues and verifies HS256 tokens with a shared secret.
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: Duration,
}

impl JwtAuthenticator {
    /// Authenticator for `secret`, stamping tokens with `issuer` and a
    /// lifetime of `ttl`.
    pub fn new(secret: &str, issuer: impl Into<String>, ttl: Duration) -> Self {
        let issuer = issuer.into();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer,
            ttl,
        }
    }

    /// Issue a token for `user_id` valid from now.
    pub fn issue(&self, user_id: &UserId, role: Role) -> Result<String, AuthError> {
        self.issue_at(user_id, role, Utc::now())
    }

    /// Issue a token as if it had been minted at `issued_at`.
    pub fn issue_at(&self, user_id: &UserId, role: Role, issued_at: DateTime<Utc>) -> Result<String, AuthError> {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iss: self.issuer.clone(),
            iat: issued_at.timestamp(),
            exp: issued_at.timestamp().saturating_add(ttl),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Configured token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl TokenVerifier for JwtAuthenticator {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            AuthError::from(e)
        })?;
        if data.claims.sub.is_empty() {
            return Err(AuthError::Invalid("empty subject".into()));
        }
        Ok(Identity {
            user_id: UserId::from_raw(data.claims.sub),
            role: data.claims.role,
        })
    }
}
