//! Bearer-token extractor for REST handlers.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use taxdesk_auth::Identity;

use super::error::ApiError;
use crate::server::AppState;

/// The authenticated caller, taken from `Authorization: Bearer <token>`.
#[derive(Clone, Debug)]
pub struct AuthUser(pub Identity);

impl AuthUser {
    /// Fail with 403 unless the caller is staff.
    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.0.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::Forbidden {
                message: "staff role required".into(),
            })
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| ApiError::Unauthorized {
                message: "missing bearer token".into(),
            })?;

        state
            .verifier
            .verify(token)
            .map(AuthUser)
            .map_err(|e| ApiError::Unauthorized { message: e.to_string() })
    }
}

/// The token part of a `Bearer` authorization header value.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
