use crate::{
    api::{self, ServerConfig},
    cli::telemetry,
    salesforce::SalesforceConfig,
};
use anyhow::Result;
use secrecy::SecretString;
use std::num::NonZeroU32;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub jwt_secret: SecretString,
    pub salesforce: SalesforceConfig,
    pub page_size: NonZeroU32,
    pub cors_origin: Option<String>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start or stops with an error.
pub async fn execute(args: Args) -> Result<()> {
    debug!(
        port = args.port,
        page_size = args.page_size.get(),
        instance_url = %args.salesforce.instance_url,
        "starting server"
    );

    let result = api::new(ServerConfig {
        port: args.port,
        dsn: args.dsn,
        jwt_secret: args.jwt_secret,
        salesforce: args.salesforce,
        page_size: args.page_size,
        cors_origin: args.cors_origin,
    })
    .await;

    telemetry::shutdown_tracer();

    result
}
