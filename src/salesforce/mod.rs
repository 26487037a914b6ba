//! Salesforce integration: a cached client-credentials token and the paginated
//! `Account` proxy built on top of it.

pub mod accounts;
pub mod token;

pub use self::accounts::{Account, AccountPage, AccountProxy, MAX_PAGE_SIZE};
pub use self::token::{ClientCredentials, TokenCache, SAFETY_MARGIN};

use reqwest::Client;
use secrecy::SecretString;
use std::{num::NonZeroU32, sync::Arc};
use thiserror::Error;

pub const DEFAULT_API_VERSION: &str = "v59.0";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SalesforceError {
    /// The client-credentials exchange failed.
    #[error("Error obtaining access token: {0}")]
    Auth(String),
    /// A SOQL query failed.
    #[error("Error querying Salesforce: {0}")]
    Query(String),
}

#[derive(Debug, Clone)]
pub struct SalesforceConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub instance_url: String,
    pub api_version: String,
}

impl SalesforceConfig {
    /// Build the token cache and account proxy sharing one HTTP client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn account_proxy(&self, page_size: NonZeroU32) -> Result<AccountProxy, reqwest::Error> {
        let client = Client::builder().user_agent(crate::APP_USER_AGENT).build()?;

        let tokens = Arc::new(TokenCache::new(
            client.clone(),
            ClientCredentials {
                token_url: self.token_url.clone(),
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
            },
        ));

        Ok(AccountProxy::new(
            client,
            &self.instance_url,
            &self.api_version,
            tokens,
            page_size,
        ))
    }
}
