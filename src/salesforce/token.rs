//! OAuth client-credentials token cache.
//!
//! One bearer token is held in memory and handed out until 60 seconds before
//! it expires. The lock is only held to read or replace the cached value, never
//! across the exchange itself, so two callers that both see a stale token may
//! both refresh; the last writer wins and both get a usable token.

use super::SalesforceError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, info_span, Instrument};

/// Tokens are considered expired this long before the upstream says so.
pub const SAFETY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
    instance_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    /// Upstream expiry minus `SAFETY_MARGIN`.
    expires_at: Instant,
}

impl CachedToken {
    fn new(token: String, expires_in: Duration, fetched_at: Instant) -> Self {
        Self {
            token,
            expires_at: fetched_at + expires_in.saturating_sub(SAFETY_MARGIN),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
pub struct TokenCache {
    client: Client,
    credentials: ClientCredentials,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    #[must_use]
    pub fn new(client: Client, credentials: ClientCredentials) -> Self {
        Self {
            client,
            credentials,
            cached: RwLock::new(None),
        }
    }

    /// Return a usable bearer token, exchanging credentials if the cached one is stale.
    ///
    /// # Errors
    /// `SalesforceError::Auth` if the exchange fails; the cache is left untouched.
    pub async fn access_token(&self) -> Result<String, SalesforceError> {
        if let Some(token) = self.cached_token(Instant::now()).await {
            debug!("Using cached Salesforce access token");
            return Ok(token);
        }

        self.refresh().await
    }

    async fn cached_token(&self, now: Instant) -> Option<String> {
        self.cached
            .read()
            .await
            .as_ref()
            .filter(|cached| cached.is_fresh(now))
            .map(|cached| cached.token.clone())
    }

    async fn refresh(&self) -> Result<String, SalesforceError> {
        info!(
            "Requesting new Salesforce access token from: {}",
            self.credentials.token_url
        );

        let fetched_at = Instant::now();
        let response = self.exchange().await.map_err(|e| {
            error!("Failed to obtain Salesforce token: {e}");
            e
        })?;

        if let Some(instance_url) = &response.instance_url {
            debug!(instance_url = %instance_url, "token endpoint reported instance URL");
        }

        // A response without `expires_in` gives the token no reuse window.
        let expires_in = Duration::from_secs(response.expires_in.unwrap_or(0));
        let cached = CachedToken::new(response.access_token, expires_in, fetched_at);
        let token = cached.token.clone();

        *self.cached.write().await = Some(cached);

        info!("Salesforce access token obtained successfully");

        Ok(token)
    }

    async fn exchange(&self) -> Result<TokenResponse, SalesforceError> {
        let span = info_span!(
            "salesforce.token.exchange",
            http.method = "POST",
            url = %self.credentials.token_url
        );

        async {
            let params = [
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.expose_secret()),
            ];

            let response = self
                .client
                .post(&self.credentials.token_url)
                .form(&params)
                .send()
                .await
                .map_err(|e| SalesforceError::Auth(e.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| SalesforceError::Auth(e.to_string()))?;

            if !status.is_success() {
                let description = serde_json::from_str::<TokenErrorResponse>(&body)
                    .ok()
                    .and_then(|e| e.error_description.or(e.error));

                return Err(SalesforceError::Auth(description.unwrap_or_else(|| {
                    format!("token endpoint returned {status}")
                })));
            }

            serde_json::from_str::<TokenResponse>(&body)
                .map_err(|e| SalesforceError::Auth(format!("malformed token response: {e}")))
        }
        .instrument(span)
        .await
    }
}
