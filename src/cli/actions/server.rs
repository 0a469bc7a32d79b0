use crate::{api, session::SessionConfig};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub store_timeout_seconds: u64,
    pub refresh_cookie_path: String,
    pub cross_site_cookies: bool,
    pub cookie_secure: bool,
}

impl Args {
    /// Build the session configuration from the parsed arguments.
    ///
    /// # Errors
    /// Returns an error if the signing secret is empty, a TTL is out of
    /// range, or the refresh cookie path cannot go into a header.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let config = SessionConfig::new(self.jwt_secret.clone())
            .context("Refusing to start without a JWT signing secret")?
            .with_access_ttl_seconds(self.access_ttl_seconds)
            .context("Invalid --access-ttl-seconds")?
            .with_refresh_ttl_seconds(self.refresh_ttl_seconds)
            .context("Invalid --refresh-ttl-seconds")?
            .with_refresh_cookie_path(self.refresh_cookie_path.clone())
            .context("Invalid --refresh-cookie-path")?
            .with_store_timeout(Duration::from_secs(self.store_timeout_seconds))
            .with_cross_site_cookies(self.cross_site_cookies)
            .with_cookie_secure(self.cookie_secure);
        Ok(config)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let session_config = args.session_config()?;
    debug!("session config: {session_config:?}");

    api::new(args.port, args.dsn, session_config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(secret: &str) -> Args {
        Args {
            port: 8080,
            dsn: "postgres://localhost/uniauth".to_string(),
            jwt_secret: SecretString::from(secret.to_string()),
            access_ttl_seconds: 60,
            refresh_ttl_seconds: 120,
            store_timeout_seconds: 2,
            refresh_cookie_path: "/auth".to_string(),
            cross_site_cookies: true,
            cookie_secure: false,
        }
    }

    #[test]
    fn session_config_from_args() {
        let config = args("secret").session_config();
        assert!(config.is_ok());
        if let Ok(config) = config {
            assert_eq!(config.access_ttl_seconds(), 60);
            assert_eq!(config.refresh_ttl_seconds(), 120);
            assert_eq!(config.store_timeout(), Duration::from_secs(2));
            assert_eq!(config.refresh_cookie_path(), "/auth");
            assert_eq!(config.cookie_same_site(), "None");
            assert!(config.cookie_secure());
        }
    }

    #[test]
    fn empty_secret_is_fatal() {
        assert!(args("   ").session_config().is_err());
    }

    #[test]
    fn oversize_ttls_are_fatal() {
        let mut access = args("secret");
        access.access_ttl_seconds = i64::MAX;
        assert!(access.session_config().is_err());

        let mut refresh = args("secret");
        refresh.refresh_ttl_seconds = 9_000_000_000_000;
        assert!(refresh.session_config().is_err());
    }

    #[test]
    fn unsafe_cookie_path_is_fatal() {
        let mut args = args("secret");
        args.refresh_cookie_path = "/auth; Domain=evil.test".to_string();
        assert!(args.session_config().is_err());
    }
}
