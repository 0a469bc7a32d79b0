use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use secrecy::SecretString;

use crate::session::config::{MAX_ACCESS_TTL_SECONDS, MAX_REFRESH_TTL_SECONDS};

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_ACCESS_TTL_SECONDS: &str = "access-ttl-seconds";
pub const ARG_REFRESH_TTL_SECONDS: &str = "refresh-ttl-seconds";
pub const ARG_STORE_TIMEOUT_SECONDS: &str = "store-timeout-seconds";
pub const ARG_REFRESH_COOKIE_PATH: &str = "refresh-cookie-path";
pub const ARG_CROSS_SITE_COOKIES: &str = "cross-site-cookies";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub store_timeout_seconds: u64,
    pub refresh_cookie_path: String,
    pub cross_site_cookies: bool,
    pub cookie_secure: bool,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .cloned()
            .context("missing required argument: --jwt-secret")?;

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret),
            access_ttl_seconds: matches
                .get_one::<i64>(ARG_ACCESS_TTL_SECONDS)
                .copied()
                .unwrap_or(900),
            refresh_ttl_seconds: matches
                .get_one::<i64>(ARG_REFRESH_TTL_SECONDS)
                .copied()
                .unwrap_or(2_592_000),
            store_timeout_seconds: matches
                .get_one::<u64>(ARG_STORE_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(5),
            refresh_cookie_path: matches
                .get_one::<String>(ARG_REFRESH_COOKIE_PATH)
                .cloned()
                .unwrap_or_else(|| "/api/v1/auth".to_string()),
            cross_site_cookies: matches.get_flag(ARG_CROSS_SITE_COOKIES),
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_cookie_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Secret used to sign and verify access tokens")
                .env("UNIAUTH_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TTL_SECONDS)
                .long(ARG_ACCESS_TTL_SECONDS)
                .help("Access token TTL in seconds")
                .env("UNIAUTH_ACCESS_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_ACCESS_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL_SECONDS)
                .long(ARG_REFRESH_TTL_SECONDS)
                .help("Refresh token TTL in seconds")
                .env("UNIAUTH_REFRESH_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_REFRESH_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_SECONDS)
                .long(ARG_STORE_TIMEOUT_SECONDS)
                .help("Deadline for each refresh token store operation")
                .env("UNIAUTH_STORE_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

fn with_cookie_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REFRESH_COOKIE_PATH)
                .long(ARG_REFRESH_COOKIE_PATH)
                .help("Path attribute of the refresh token cookie")
                .env("UNIAUTH_REFRESH_COOKIE_PATH")
                .default_value("/api/v1/auth"),
        )
        .arg(
            Arg::new(ARG_CROSS_SITE_COOKIES)
                .long(ARG_CROSS_SITE_COOKIES)
                .help("Send cookies with SameSite=None; Secure")
                .env("UNIAUTH_CROSS_SITE_COOKIES")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark cookies Secure")
                .env("UNIAUTH_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
}
