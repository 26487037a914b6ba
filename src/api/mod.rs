use crate::{
    auth::{Authenticator, SessionKeys},
    salesforce::{AccountProxy, SalesforceConfig},
    users::PgUserStore,
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::get,
    Extension, Json, Router,
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;

pub mod error;
pub(crate) mod handlers;
mod openapi;

pub use openapi::openapi;

pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// Server settings gathered by the CLI.
#[derive(Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub dsn: SecretString,
    pub jwt_secret: SecretString,
    pub salesforce: SalesforceConfig,
    pub page_size: NonZeroU32,
    pub cors_origin: Option<String>,
}

/// Build the full application router.
///
/// Handlers find their dependencies as request extensions; the store is
/// reached through the authenticator.
pub fn app(authenticator: Arc<Authenticator>, accounts: Arc<AccountProxy>, cors: CorsLayer) -> Router {
    let (router, doc) = openapi::api_router().split_for_parts();

    router
        .route(OPENAPI_PATH, get(move || async move { Json(doc) }))
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CatchPanicLayer::custom(error::panic_response))
                .layer(cors)
                .layer(Extension(authenticator))
                .layer(Extension(accounts)),
        )
}

/// Start the server
/// # Errors
/// Return error if the database, the Salesforce client or the listener cannot be set up
pub async fn new(config: ServerConfig) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(config.dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    let store = PgUserStore::new(pool);
    store
        .bootstrap()
        .await
        .context("Failed to create users table")?;

    let authenticator = Arc::new(Authenticator::new(
        Arc::new(store),
        SessionKeys::new(config.jwt_secret.expose_secret().as_bytes()),
    ));

    let accounts = Arc::new(
        config
            .salesforce
            .account_proxy(config.page_size)
            .context("Failed to build Salesforce client")?,
    );

    let cors = cors_layer(config.cors_origin.as_deref())?;

    let app = app(authenticator, accounts, cors);

    let listener = TcpListener::bind(format!("::0:{}", config.port)).await?;

    info!("Listening on [::]:{}", config.port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

/// CORS for the browser frontend; any origin when none is configured.
///
/// # Errors
/// Returns an error if `origin` is not a valid URL with a host.
pub fn cors_layer(origin: Option<&str>) -> Result<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    Ok(match origin {
        Some(origin) => cors.allow_origin(AllowOrigin::exact(frontend_origin(origin)?)),
        None => cors.allow_origin(Any),
    })
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_url: &str) -> Result<HeaderValue> {
    let parsed =
        Url::parse(frontend_url).with_context(|| format!("Invalid CORS origin: {frontend_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("CORS origin must include a valid host: {frontend_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build CORS origin header")
}
