//! Session configuration, built once at startup and shared by reference.

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::error::AuthError;

pub const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
pub const DEFAULT_REFRESH_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
pub const DEFAULT_STORE_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_REFRESH_COOKIE_PATH: &str = "/api/v1/auth";

pub const MAX_ACCESS_TTL_SECONDS: i64 = 24 * 60 * 60;
pub const MAX_REFRESH_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;

pub const ACCESS_COOKIE_NAME: &str = "access_token";
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(Clone)]
pub struct SessionConfig {
    signing_secret: SecretString,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    store_timeout: std::time::Duration,
    refresh_cookie_path: String,
    cookie_secure: bool,
    cross_site_cookies: bool,
}

impl SessionConfig {
    /// Build a configuration around the access token signing secret.
    ///
    /// # Errors
    /// Returns `ConfigurationMissing` when the secret is empty.
    pub fn new(signing_secret: SecretString) -> Result<Self, AuthError> {
        if signing_secret.expose_secret().trim().is_empty() {
            return Err(AuthError::ConfigurationMissing("jwt signing secret"));
        }
        Ok(Self {
            signing_secret,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            store_timeout: std::time::Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECONDS),
            refresh_cookie_path: DEFAULT_REFRESH_COOKIE_PATH.to_string(),
            cookie_secure: false,
            cross_site_cookies: false,
        })
    }

    /// # Errors
    /// Returns `InvalidConfiguration` unless `1 <= seconds <= MAX_ACCESS_TTL_SECONDS`.
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Result<Self, AuthError> {
        if !(1..=MAX_ACCESS_TTL_SECONDS).contains(&seconds) {
            return Err(AuthError::InvalidConfiguration("access token ttl"));
        }
        self.access_ttl_seconds = seconds;
        Ok(self)
    }

    /// # Errors
    /// Returns `InvalidConfiguration` unless `1 <= seconds <= MAX_REFRESH_TTL_SECONDS`.
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Result<Self, AuthError> {
        if !(1..=MAX_REFRESH_TTL_SECONDS).contains(&seconds) {
            return Err(AuthError::InvalidConfiguration("refresh token ttl"));
        }
        self.refresh_ttl_seconds = seconds;
        Ok(self)
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// The path ends up verbatim in a `Set-Cookie` header, so it must be an
    /// absolute path of visible ASCII without `;`.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` for any other value.
    pub fn with_refresh_cookie_path(mut self, path: String) -> Result<Self, AuthError> {
        if !valid_cookie_path(&path) {
            return Err(AuthError::InvalidConfiguration("refresh cookie path"));
        }
        self.refresh_cookie_path = path;
        Ok(self)
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// Cross-site deployments need `SameSite=None`, which browsers only
    /// accept together with `Secure`.
    #[must_use]
    pub fn with_cross_site_cookies(mut self, cross_site: bool) -> Self {
        self.cross_site_cookies = cross_site;
        self
    }

    pub(crate) fn signing_secret(&self) -> &SecretString {
        &self.signing_secret
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        Duration::seconds(self.access_ttl_seconds)
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_ttl_seconds)
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn store_timeout(&self) -> std::time::Duration {
        self.store_timeout
    }

    #[must_use]
    pub fn refresh_cookie_path(&self) -> &str {
        &self.refresh_cookie_path
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure || self.cross_site_cookies
    }

    #[must_use]
    pub fn cookie_same_site(&self) -> &'static str {
        if self.cross_site_cookies {
            "None"
        } else {
            "Lax"
        }
    }
}

fn valid_cookie_path(path: &str) -> bool {
    path.starts_with('/') && path.bytes().all(|b| b.is_ascii_graphic() && b != b';')
}

// Hand-written so the secret never lands in logs.
impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("signing_secret", &"[REDACTED]")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .field("store_timeout", &self.store_timeout)
            .field("refresh_cookie_path", &self.refresh_cookie_path)
            .field("cookie_secure", &self.cookie_secure)
            .field("cross_site_cookies", &self.cross_site_cookies)
            .finish()
    }
}
