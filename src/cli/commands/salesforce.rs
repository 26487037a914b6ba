use crate::salesforce::{SalesforceConfig, DEFAULT_API_VERSION, MAX_PAGE_SIZE};
use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::num::NonZeroU32;

pub const ARG_TOKEN_URL: &str = "salesforce-token-url";
pub const ARG_CLIENT_ID: &str = "salesforce-client-id";
pub const ARG_CLIENT_SECRET: &str = "salesforce-client-secret";
pub const ARG_INSTANCE_URL: &str = "salesforce-instance-url";
pub const ARG_API_VERSION: &str = "salesforce-api-version";
pub const ARG_PAGE_SIZE: &str = "page-size";

#[derive(Debug, Clone)]
pub struct Options {
    pub config: SalesforceConfig,
    pub page_size: NonZeroU32,
}

impl Options {
    /// Parse Salesforce arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_required = |id: &str| -> anyhow::Result<String> {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let page_size = matches
            .get_one::<u32>(ARG_PAGE_SIZE)
            .copied()
            .filter(|size| *size <= MAX_PAGE_SIZE)
            .and_then(NonZeroU32::new)
            .with_context(|| format!("--{ARG_PAGE_SIZE} must be between 1 and {MAX_PAGE_SIZE}"))?;

        Ok(Self {
            config: SalesforceConfig {
                token_url: read_required(ARG_TOKEN_URL)?,
                client_id: read_required(ARG_CLIENT_ID)?,
                client_secret: SecretString::from(read_required(ARG_CLIENT_SECRET)?),
                instance_url: read_required(ARG_INSTANCE_URL)?,
                api_version: read_required(ARG_API_VERSION)?,
            },
            page_size,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_URL)
                .long(ARG_TOKEN_URL)
                .help("OAuth token endpoint, e.g. https://login.salesforce.com/services/oauth2/token")
                .env("PORTAL_SALESFORCE_TOKEN_URL"),
        )
        .arg(
            Arg::new(ARG_CLIENT_ID)
                .long(ARG_CLIENT_ID)
                .help("Connected app client id")
                .env("PORTAL_SALESFORCE_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_CLIENT_SECRET)
                .long(ARG_CLIENT_SECRET)
                .help("Connected app client secret")
                .env("PORTAL_SALESFORCE_CLIENT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_INSTANCE_URL)
                .long(ARG_INSTANCE_URL)
                .help("Salesforce instance base URL used for queries")
                .env("PORTAL_SALESFORCE_INSTANCE_URL"),
        )
        .arg(
            Arg::new(ARG_API_VERSION)
                .long(ARG_API_VERSION)
                .help("REST API version segment")
                .env("PORTAL_SALESFORCE_API_VERSION")
                .default_value(DEFAULT_API_VERSION),
        )
        .arg(
            Arg::new(ARG_PAGE_SIZE)
                .long(ARG_PAGE_SIZE)
                .help("Accounts returned per page")
                .env("PORTAL_PAGE_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(u32).range(1..=i64::from(MAX_PAGE_SIZE))),
        )
}
