use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";

#[derive(Debug, Clone)]
pub struct Options {
    pub jwt_secret: SecretString,
}

impl Options {
    /// Parse session signing arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the secret is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_JWT_SECRET}"))?;

        Ok(Self {
            jwt_secret: SecretString::from(secret.clone()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_JWT_SECRET)
            .long(ARG_JWT_SECRET)
            .help("Secret used to sign and verify session tokens (HS256)")
            .env("PORTAL_JWT_SECRET")
            .hide_env_values(true),
    )
}
