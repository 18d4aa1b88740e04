//! # taxdesk-auth
//!
//! The authentication collaborator: turns an opaque short-lived token into a
//! user identity, or refuses.
//!
//! Tokens are HS256 JWTs carrying the user id (`sub`), portal role, issuer,
//! and expiry. The server depends only on the [`TokenVerifier`] trait so a
//! different identity provider can be plugged in.

#![deny(unsafe_code)]

pub mod errors;
pub mod jwt;

pub use errors::AuthError;
pub use jwt::{Claims, Identity, JwtAuthenticator, TokenVerifier};
