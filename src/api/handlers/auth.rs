use super::AuthenticatedUser;
use crate::{
    api::error::{ApiError, ErrorBody},
    auth::{normalize_email, valid_email, Authenticator},
};
use axum::{extract::Extension, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize)]
pub struct Credentials {
    email: String,
    password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionUser {
    pub id: i32,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyResponse {
    pub message: String,
    pub user: SessionUser,
}

fn read_payload(payload: Option<Json<Credentials>>) -> Result<Credentials, ApiError> {
    payload
        .map(|Json(credentials)| credentials)
        .ok_or_else(|| ApiError::BadRequest("Missing or malformed payload".to_string()))
}

/// Registration input: normalized email plus a non-empty password.
fn new_credentials(credentials: Credentials) -> Result<(String, String), ApiError> {
    let email = normalize_email(&credentials.email);
    if !valid_email(&email) {
        return Err(ApiError::BadRequest("Invalid email".to_string()));
    }

    if credentials.password.is_empty() {
        return Err(ApiError::BadRequest("Invalid password".to_string()));
    }

    Ok((email, credentials.password))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = Credentials,
    responses (
        (status = 201, description = "Registration successful", body = TokenResponse),
        (status = 400, description = "User already exists or invalid input", body = ErrorBody),
        (status = 500, description = "Error registering user", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn register(
    auth: Extension<Arc<Authenticator>>,
    payload: Option<Json<Credentials>>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let (email, password) = new_credentials(read_payload(payload)?)?;

    let token = auth
        .register(&email, &password)
        .await
        .map_err(|e| ApiError::from_auth(e, "Error registering user"))?;

    debug!("user registered");

    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = Credentials,
    responses (
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 400, description = "Missing or malformed payload", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 500, description = "Error logging in", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    auth: Extension<Arc<Authenticator>>,
    payload: Option<Json<Credentials>>,
) -> Result<Json<TokenResponse>, ApiError> {
    // Beyond a readable body, every rejection is the same 401.
    let credentials = read_payload(payload)?;

    let token = auth
        .login(&credentials.email, &credentials.password)
        .await
        .map_err(|e| ApiError::from_auth(e, "Error logging in"))?;

    debug!("Login successful");

    Ok(Json(TokenResponse { token }))
}

/// Sessions are stateless; the client discards its token.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses (
        (status = 200, description = "Logged out", body = MessageResponse),
    ),
    tag = "auth"
)]
pub async fn logout() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Logged out successfully".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/api/auth/verify",
    responses (
        (status = 200, description = "Token is valid", body = VerifyResponse),
        (status = 401, description = "No token provided", body = ErrorBody),
        (status = 403, description = "Invalid token", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn verify(user: AuthenticatedUser) -> Json<VerifyResponse> {
    let claims = user.0;

    Json(VerifyResponse {
        message: "Token is valid".to_string(),
        user: SessionUser {
            id: claims.id,
            email: claims.email,
        },
    })
}
