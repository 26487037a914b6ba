//! # Account Portal
//!
//! `account-portal` is the API behind the portal's login, register and dashboard
//! views. It keeps user credentials in PostgreSQL, issues stateless session
//! tokens, and lets authenticated users browse Salesforce `Account` records page
//! by page.
//!
//! ## Sessions
//!
//! Passwords are hashed with Argon2id. A successful register or login returns a
//! HS256 JWT valid for one hour; there is no server-side session state, so
//! logout only tells the client to discard its token.
//!
//! ## Salesforce
//!
//! Account data is fetched with an OAuth client-credentials token that is cached
//! in memory and refreshed 60 seconds before it expires. Every page request runs
//! a `COUNT()` query followed by a `LIMIT`/`OFFSET` query; results are never
//! cached locally.

pub mod api;
pub mod auth;
pub mod cli;
pub mod salesforce;
pub mod users;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
