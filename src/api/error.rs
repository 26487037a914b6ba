//! HTTP mapping for every error a handler can return.

use crate::{auth::AuthError, salesforce::SalesforceError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::{any::Any, fmt};
use thiserror::Error;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("User already exists")]
    DuplicateUser,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("No token provided")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Not found")]
    NotFound,
    #[error("Error fetching Salesforce accounts")]
    Upstream(#[source] SalesforceError),
    #[error("{message}")]
    Internal {
        message: &'static str,
        error: String,
    },
}

/// JSON body of every error response.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiError {
    pub fn internal(message: &'static str, error: impl fmt::Display) -> Self {
        Self::Internal {
            message,
            error: error.to_string(),
        }
    }

    /// Map an authenticator error; `context` becomes the 500 message.
    #[must_use]
    pub fn from_auth(err: AuthError, context: &'static str) -> Self {
        match err {
            AuthError::DuplicateUser => Self::DuplicateUser,
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::InvalidToken => Self::InvalidToken,
            other @ (AuthError::Store(_) | AuthError::Internal(_)) => Self::internal(context, other),
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::DuplicateUser => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::InvalidToken => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Upstream(_) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SalesforceError> for ApiError {
    fn from(err: SalesforceError) -> Self {
        Self::Upstream(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let detail = match &self {
            Self::Upstream(e) => Some(e.to_string()),
            Self::Internal { error, .. } => Some(error.clone()),
            _ => None,
        };

        if status.is_server_error() {
            error!("{}: {}", self, detail.as_deref().unwrap_or_default());
        } else {
            debug!("{} {}", status, self);
        }

        let body = ErrorBody {
            message: self.to_string(),
            error: detail,
        };

        (status, Json(body)).into_response()
    }
}

/// Turn a handler panic into the same JSON shape as any other 500.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };

    ApiError::internal("Internal server error", detail).into_response()
}
