//! Paginated access to the Salesforce `Account` object.

use super::{SalesforceError, TokenCache};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, de::IgnoredAny, Deserialize, Serialize};
use std::{num::NonZeroU32, sync::Arc};
use tracing::{info, info_span, instrument, Instrument};
use utoipa::ToSchema;

pub const COUNT_QUERY: &str = "SELECT COUNT() FROM Account";

/// Largest batch a single query returns; bigger pages would be truncated.
pub const MAX_PAGE_SIZE: u32 = 2000;

/// The fixed field projection returned to clients.
#[derive(ToSchema, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountPage {
    pub items: Vec<Account>,
    pub page: u32,
    pub total_pages: u64,
    pub total_size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse<T> {
    total_size: u64,
    #[serde(default = "Vec::new")]
    records: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryError {
    message: Option<String>,
    error_code: Option<String>,
}

#[must_use]
pub fn total_pages(total_size: u64, page_size: NonZeroU32) -> u64 {
    total_size.div_ceil(u64::from(page_size.get()))
}

#[must_use]
pub fn offset(page: NonZeroU32, page_size: NonZeroU32) -> u64 {
    u64::from(page.get() - 1) * u64::from(page_size.get())
}

#[must_use]
pub fn page_query(page_size: NonZeroU32, offset: u64) -> String {
    format!("SELECT Id, Name, Industry, Phone FROM Account LIMIT {page_size} OFFSET {offset}")
}

#[derive(Debug)]
pub struct AccountProxy {
    client: Client,
    query_url: String,
    tokens: Arc<TokenCache>,
    page_size: NonZeroU32,
}

impl AccountProxy {
    #[must_use]
    pub fn new(
        client: Client,
        instance_url: &str,
        api_version: &str,
        tokens: Arc<TokenCache>,
        page_size: NonZeroU32,
    ) -> Self {
        let query_url = format!(
            "{}/services/data/{}/query",
            instance_url.trim_end_matches('/'),
            api_version
        );

        Self {
            client,
            query_url,
            tokens,
            page_size,
        }
    }

    /// Configured number of accounts per page.
    #[must_use]
    pub const fn page_size(&self) -> NonZeroU32 {
        self.page_size
    }

    /// Fetch one page of accounts plus the totals needed to paginate.
    ///
    /// # Errors
    /// `SalesforceError::Auth` if no token can be obtained, `SalesforceError::Query`
    /// if either query fails.
    #[instrument(skip(self))]
    pub async fn list_accounts(
        &self,
        page: NonZeroU32,
        page_size: NonZeroU32,
    ) -> Result<AccountPage, SalesforceError> {
        info!("Fetching Salesforce accounts - Page: {page}, Page Size: {page_size}");

        let token = self.tokens.access_token().await?;

        let count: QueryResponse<IgnoredAny> = self.query(&token, COUNT_QUERY).await?;
        let total_size = count.total_size;
        let total_pages = total_pages(total_size, page_size);

        info!("Total accounts: {total_size}, Total pages: {total_pages}");

        let offset = offset(page, page_size);
        let records: QueryResponse<Account> =
            self.query(&token, &page_query(page_size, offset)).await?;

        info!("Fetched {} accounts from Salesforce", records.records.len());

        Ok(AccountPage {
            items: records.records,
            page: page.get(),
            total_pages,
            total_size,
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        token: &str,
        soql: &str,
    ) -> Result<QueryResponse<T>, SalesforceError> {
        let span = info_span!("salesforce.query", http.method = "GET", soql = %soql);

        async {
            let response = self
                .client
                .get(&self.query_url)
                .bearer_auth(token)
                .query(&[("q", soql)])
                .send()
                .await
                .map_err(|e| SalesforceError::Query(e.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| SalesforceError::Query(e.to_string()))?;

            if !status.is_success() {
                return Err(SalesforceError::Query(query_error_message(status, &body)));
            }

            serde_json::from_str(&body)
                .map_err(|e| SalesforceError::Query(format!("malformed query response: {e}")))
        }
        .instrument(span)
        .await
    }
}

/// Salesforce reports query failures as a JSON array of `{message, errorCode}`.
fn query_error_message(status: StatusCode, body: &str) -> String {
    let messages: Vec<String> = serde_json::from_str::<Vec<QueryError>>(body)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|e| match (e.error_code, e.message) {
            (Some(code), Some(message)) => Some(format!("{code}: {message}")),
            (None, Some(message)) => Some(message),
            (Some(code), None) => Some(code),
            (None, None) => None,
        })
        .collect();

    if messages.is_empty() {
        format!("query endpoint returned {status}")
    } else {
        messages.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::salesforce::ClientCredentials;
    use secrecy::SecretString;
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const QUERY_PATH: &str = "/services/data/v59.0/query";

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn nz(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
    }

    fn account(n: usize) -> serde_json::Value {
        json!({
            "attributes": {"type": "Account", "url": format!("/services/data/v59.0/sobjects/Account/{n}")},
            "Id": format!("001{n:015}"),
            "Name": format!("Account {n}"),
            "Industry": "Energy",
            "Phone": null
        })
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "token-1",
                "expires_in": 3600
            })))
            .mount(server)
            .await;
    }

    async fn mount_count(server: &MockServer, total: u64) {
        Mock::given(method("GET"))
            .and(path(QUERY_PATH))
            .and(query_param("q", COUNT_QUERY))
            .and(header("Authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalSize": total,
                "done": true,
                "records": []
            })))
            .mount(server)
            .await;
    }

    fn proxy_for(server: &MockServer) -> AccountProxy {
        let client = Client::new();
        let tokens = Arc::new(TokenCache::new(
            client.clone(),
            ClientCredentials {
                token_url: format!("{}/services/oauth2/token", server.uri()),
                client_id: "client-id".to_string(),
                client_secret: SecretString::from("client-secret".to_string()),
            },
        ));
        AccountProxy::new(client, &server.uri(), "v59.0", tokens, nz(10))
    }

    #[test]
    fn pagination_math() {
        assert_eq!(total_pages(25, nz(10)), 3);
        assert_eq!(total_pages(30, nz(10)), 3);
        assert_eq!(total_pages(0, nz(10)), 0);
        assert_eq!(offset(nz(1), nz(10)), 0);
        assert_eq!(offset(nz(3), nz(10)), 20);
        assert_eq!(
            page_query(nz(10), 20),
            "SELECT Id, Name, Industry, Phone FROM Account LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn count_response_without_records_parses() -> anyhow::Result<()> {
        let response: QueryResponse<Account> =
            serde_json::from_str(r#"{"totalSize": 25, "done": true}"#)?;
        assert_eq!(response.total_size, 25);
        assert!(response.records.is_empty());
        Ok(())
    }

    #[test]
    fn query_error_message_joins_upstream_errors() {
        let body = r#"[{"message":"Session expired or invalid","errorCode":"INVALID_SESSION_ID"}]"#;
        assert_eq!(
            query_error_message(StatusCode::UNAUTHORIZED, body),
            "INVALID_SESSION_ID: Session expired or invalid"
        );
        assert_eq!(
            query_error_message(StatusCode::BAD_GATEWAY, "nope"),
            "query endpoint returned 502 Bad Gateway"
        );
    }

    #[tokio::test]
    async fn last_partial_page() -> anyhow::Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        mount_token(&server).await;
        mount_count(&server, 25).await;

        Mock::given(method("GET"))
            .and(path(QUERY_PATH))
            .and(query_param("q", page_query(nz(10), 20)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalSize": 5,
                "done": true,
                "records": (20..25).map(account).collect::<Vec<_>>()
            })))
            .expect(1)
            .mount(&server)
            .await;

        let proxy = proxy_for(&server);
        let page = proxy.list_accounts(nz(3), nz(10)).await?;

        assert_eq!(page.items.len(), 5);
        assert_eq!(page.page, 3);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_size, 25);
        assert_eq!(page.items[0].name, "Account 20");
        assert_eq!(page.items[0].industry.as_deref(), Some("Energy"));
        assert_eq!(page.items[0].phone, None);
        Ok(())
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty() -> anyhow::Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        mount_token(&server).await;
        mount_count(&server, 25).await;

        Mock::given(method("GET"))
            .and(path(QUERY_PATH))
            .and(query_param("q", page_query(nz(10), 30)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalSize": 0,
                "done": true,
                "records": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let proxy = proxy_for(&server);
        let page = proxy.list_accounts(nz(4), nz(10)).await?;

        assert!(page.items.is_empty());
        assert_eq!(page.page, 4);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_size, 25);
        Ok(())
    }

    #[tokio::test]
    async fn count_failure_is_query_error() -> anyhow::Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!([{
                "message": "Session expired or invalid",
                "errorCode": "INVALID_SESSION_ID"
            }])))
            .mount(&server)
            .await;

        let proxy = proxy_for(&server);
        let result = proxy.list_accounts(nz(1), nz(10)).await;

        assert_eq!(
            result,
            Err(SalesforceError::Query(
                "INVALID_SESSION_ID: Session expired or invalid".to_string()
            ))
        );
        Ok(())
    }

    #[tokio::test]
    async fn token_failure_is_auth_error() -> anyhow::Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "no client credentials user enabled"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let proxy = proxy_for(&server);
        let result = proxy.list_accounts(nz(1), nz(10)).await;

        assert_eq!(
            result,
            Err(SalesforceError::Auth(
                "no client credentials user enabled".to_string()
            ))
        );
        Ok(())
    }
}
