//! API handlers and the bearer-token extractor they share.

pub mod accounts;
pub mod auth;
pub mod health;

use super::error::ApiError;
use crate::auth::{Authenticator, SessionClaims};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use std::sync::Arc;
use tracing::error;

/// Fallback for unmatched routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Extract the token from `Authorization: Bearer <token>`.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Claims of a verified session token.
///
/// Rejects with 401 when no bearer token is present and 403 when it does not
/// verify.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub SessionClaims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(authenticator) = parts.extensions.get::<Arc<Authenticator>>().cloned() else {
            error!("Authenticator extension missing from router");
            return Err(ApiError::internal(
                "Internal server error",
                "authenticator not configured",
            ));
        };

        let token = bearer_token(&parts.headers).ok_or(ApiError::MissingToken)?;

        authenticator
            .verify(token)
            .map(Self)
            .map_err(|e| ApiError::from_auth(e, "Error verifying token"))
    }
}
