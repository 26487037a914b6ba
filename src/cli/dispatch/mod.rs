//! Map parsed CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{self, auth, database, salesforce};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(5000);
    let cors_origin = matches
        .get_one::<String>(commands::ARG_CORS_ORIGIN)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let database_opts = database::Options::parse(matches)?;
    let auth_opts = auth::Options::parse(matches)?;
    let salesforce_opts = salesforce::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn: database_opts.dsn,
        jwt_secret: auth_opts.jwt_secret,
        salesforce: salesforce_opts.config,
        page_size: salesforce_opts.page_size,
        cors_origin,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [(&str, Option<&str>); 8] = [
        ("PORTAL_DSN", Some("postgres://app@localhost:5432/portal")),
        ("PORTAL_PRODUCTION", None),
        ("PORTAL_JWT_SECRET", Some("secret")),
        (
            "PORTAL_SALESFORCE_TOKEN_URL",
            Some("https://login.salesforce.com/services/oauth2/token"),
        ),
        ("PORTAL_SALESFORCE_CLIENT_ID", Some("client-id")),
        ("PORTAL_SALESFORCE_CLIENT_SECRET", Some("client-secret")),
        (
            "PORTAL_SALESFORCE_INSTANCE_URL",
            Some("https://example.my.salesforce.com"),
        ),
        ("PORTAL_CORS_ORIGIN", None),
    ];

    #[test]
    fn server_action_from_env() {
        temp_env::with_vars(VARS, || {
            let matches = commands::new().get_matches_from(vec!["account-portal", "-p", "7000"]);
            let result = handler(&matches);
            assert!(result.is_ok());
            if let Ok(Action::Server(args)) = result {
                assert_eq!(args.port, 7000);
                assert_eq!(args.page_size.get(), 10);
                assert_eq!(args.salesforce.instance_url, "https://example.my.salesforce.com");
                assert!(args.cors_origin.is_none());
            }
        });
    }

    #[test]
    fn jwt_secret_required() {
        let mut vars = VARS;
        vars[2] = ("PORTAL_JWT_SECRET", None);

        temp_env::with_vars(vars, || {
            let matches = commands::new().get_matches_from(vec!["account-portal"]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err
                    .to_string()
                    .contains("missing required argument: --jwt-secret"));
            }
        });
    }
}
