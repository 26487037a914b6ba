//! Database connection settings.
//!
//! Production deployments pass a full `--dsn` and always get TLS
//! (`sslmode=require`). Elsewhere `--dsn` wins when given; otherwise the URL is
//! assembled from the individual `--db-*` parts.

use anyhow::{anyhow, Context, Result};
use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_DSN: &str = "dsn";
pub const ARG_DB_HOST: &str = "db-host";
pub const ARG_DB_PORT: &str = "db-port";
pub const ARG_DB_USER: &str = "db-user";
pub const ARG_DB_PASSWORD: &str = "db-password";
pub const ARG_DB_NAME: &str = "db-name";
pub const ARG_PRODUCTION: &str = "production";

#[derive(Debug, Clone)]
pub struct Options {
    pub dsn: SecretString,
}

impl Options {
    /// Resolve the connection string from matches.
    ///
    /// # Errors
    /// Returns an error if the arguments needed for the selected mode are missing
    /// or the resulting URL is invalid.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read = |id: &str| -> Option<String> {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let read_required = |id: &str| -> Result<String> {
            read(id).ok_or_else(|| anyhow!("missing required argument: --{id}"))
        };

        let dsn = if matches.get_flag(ARG_PRODUCTION) {
            let dsn = read(ARG_DSN)
                .ok_or_else(|| anyhow!("missing required argument: --{ARG_DSN} (production)"))?;
            require_tls(&dsn)?
        } else if let Some(dsn) = read(ARG_DSN) {
            dsn
        } else {
            let port = matches.get_one::<u16>(ARG_DB_PORT).copied().unwrap_or(5432);
            assemble(
                &read(ARG_DB_HOST).unwrap_or_else(|| "localhost".to_string()),
                port,
                &read_required(ARG_DB_USER)?,
                read(ARG_DB_PASSWORD).as_deref(),
                &read_required(ARG_DB_NAME)?,
            )?
        };

        Ok(Self {
            dsn: SecretString::from(dsn),
        })
    }
}

/// Append `sslmode=require` unless the DSN already sets a mode.
fn require_tls(dsn: &str) -> Result<String> {
    let mut url = Url::parse(dsn).context("Invalid database DSN")?;

    if !url.query_pairs().any(|(key, _)| key == "sslmode") {
        url.query_pairs_mut().append_pair("sslmode", "require");
    }

    Ok(url.to_string())
}

fn assemble(host: &str, port: u16, user: &str, password: Option<&str>, name: &str) -> Result<String> {
    let mut url = Url::parse(&format!("postgres://{host}:{port}"))
        .with_context(|| format!("Invalid database host: {host}"))?;

    url.set_username(user)
        .map_err(|()| anyhow!("Error setting username"))?;

    url.set_password(password)
        .map_err(|()| anyhow!("Error setting password"))?;

    url.set_path(&format!("/{name}"));

    Ok(url.to_string())
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .long_help(
                    "Database connection string. Required in production; elsewhere it overrides the --db-* parts.",
                )
                .env("PORTAL_DSN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_DB_HOST)
                .long(ARG_DB_HOST)
                .help("Database host")
                .env("PORTAL_DB_HOST")
                .default_value("localhost"),
        )
        .arg(
            Arg::new(ARG_DB_PORT)
                .long(ARG_DB_PORT)
                .help("Database port")
                .env("PORTAL_DB_PORT")
                .default_value("5432")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DB_USER)
                .long(ARG_DB_USER)
                .help("Database user")
                .env("PORTAL_DB_USER"),
        )
        .arg(
            Arg::new(ARG_DB_PASSWORD)
                .long(ARG_DB_PASSWORD)
                .help("Database password")
                .env("PORTAL_DB_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_DB_NAME)
                .long(ARG_DB_NAME)
                .help("Database name")
                .env("PORTAL_DB_NAME"),
        )
        .arg(
            Arg::new(ARG_PRODUCTION)
                .long(ARG_PRODUCTION)
                .help("Production mode: require --dsn and TLS to the database")
                .env("PORTAL_PRODUCTION")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}
