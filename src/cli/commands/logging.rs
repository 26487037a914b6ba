//! Log verbosity: repeated `-v` flags or a named level from `--log-level` /
//! `PORTAL_LOG_LEVEL`. The louder of the two wins.

use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_LEVEL: &str = "log-level";

/// Accept a level name or its index (0 = error .. 4 = trace).
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(|level: &str| -> Result<u8, String> {
        match level.trim().to_lowercase().as_str() {
            "error" | "0" => Ok(0),
            "warn" | "1" => Ok(1),
            "info" | "2" => Ok(2),
            "debug" | "3" => Ok(3),
            "trace" | "4" | "5" => Ok(4),
            other => Err(format!(
                "invalid log level '{other}': use error, warn, info, debug, trace or 0-5"
            )),
        }
    })
}

/// Effective verbosity: 0 is ERROR, each step adds one level up to TRACE.
#[must_use]
pub fn verbosity(matches: &ArgMatches) -> u8 {
    let count = matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or(0);
    let level = matches.get_one::<u8>(ARG_LOG_LEVEL).copied().unwrap_or(0);
    count.max(level)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Increase verbosity, repeat for more (-v WARN .. -vvvv TRACE)")
                .global(true)
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new(ARG_LOG_LEVEL)
                .long(ARG_LOG_LEVEL)
                .help("Log level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("PORTAL_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Set)
                .value_parser(validator_log_level()),
        )
}
