use super::AuthenticatedUser;
use crate::{
    api::error::{ApiError, ErrorBody},
    salesforce::{Account, AccountProxy},
};
use axum::{
    extract::{Extension, Query},
    Json,
};
use serde::{Deserialize, Serialize};
use std::{num::NonZeroU32, sync::Arc};
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AccountsQuery {
    /// 1-based page number, defaults to 1.
    page: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AccountsResponse {
    pub accounts: Vec<Account>,
    pub total_pages: u64,
    pub current_page: u32,
    pub total_size: u64,
}

/// Absent means page 1; anything that is not a positive integer is rejected.
pub fn parse_page(raw: Option<&str>) -> Result<NonZeroU32, ApiError> {
    match raw {
        None => Ok(NonZeroU32::MIN),
        Some(raw) => raw
            .trim()
            .parse::<NonZeroU32>()
            .map_err(|_| ApiError::BadRequest(format!("Invalid page: {raw}"))),
    }
}

#[utoipa::path(
    get,
    path = "/api/salesforce/accounts",
    params(AccountsQuery),
    responses (
        (status = 200, description = "One page of Salesforce accounts", body = AccountsResponse),
        (status = 400, description = "Invalid page", body = ErrorBody),
        (status = 401, description = "No token provided", body = ErrorBody),
        (status = 403, description = "Invalid token", body = ErrorBody),
        (status = 500, description = "Error fetching Salesforce accounts", body = ErrorBody),
    ),
    tag = "salesforce"
)]
#[instrument(skip_all, fields(user_id = user.0.id))]
pub async fn accounts(
    user: AuthenticatedUser,
    proxy: Extension<Arc<AccountProxy>>,
    Query(query): Query<AccountsQuery>,
) -> Result<Json<AccountsResponse>, ApiError> {
    let page = parse_page(query.page.as_deref())?;

    let result = proxy.list_accounts(page, proxy.page_size()).await?;

    Ok(Json(AccountsResponse {
        accounts: result.items,
        total_pages: result.total_pages,
        current_page: result.page,
        total_size: result.total_size,
    }))
}
