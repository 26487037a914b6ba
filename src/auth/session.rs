//! Session token issuance and validation (HS256 JWT).

use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use utoipa::ToSchema;

/// Session lifetime: one hour from issuance.
pub const SESSION_TTL_SECONDS: i64 = 3600;

/// Claims carried by a session token.
#[derive(ToSchema, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub id: i32,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and validates session tokens with a server-held secret.
#[derive(Clone)]
pub struct SessionKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionKeys {
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expired means expired: no clock-skew grace.
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a token for the given user, valid for `SESSION_TTL_SECONDS`.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue(&self, id: i32, email: &str) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(id, email, now_secs())
    }

    pub(crate) fn issue_at(
        &self,
        id: i32,
        email: &str,
        issued_at: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = SessionClaims {
            id,
            email: email.to_string(),
            iat: issued_at,
            exp: issued_at.saturating_add(SESSION_TTL_SECONDS),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }

    /// Validate signature and expiry, returning the embedded claims.
    ///
    /// # Errors
    /// Returns an error for malformed, tampered or expired tokens.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
        self.validate_at(token, now_secs())
    }

    pub(crate) fn validate_at(
        &self,
        token: &str,
        now: i64,
    ) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &self.validation)?;

        // The library still accepts `exp == now`; the expiry instant itself is already expired.
        if data.claims.exp <= now {
            return Err(ErrorKind::ExpiredSignature.into());
        }

        Ok(data.claims)
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
