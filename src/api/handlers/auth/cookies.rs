//! `Set-Cookie` values for the access and refresh tokens.

use axum::http::header::{HeaderValue, InvalidHeaderValue};

use crate::session::config::{SessionConfig, ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME};

fn build_cookie(
    config: &SessionConfig,
    name: &str,
    value: &str,
    path: &str,
    max_age: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let same_site = config.cookie_same_site();
    let mut cookie =
        format!("{name}={value}; Path={path}; HttpOnly; SameSite={same_site}; Max-Age={max_age}");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Access cookie, sent on every path.
pub(super) fn access_cookie(
    config: &SessionConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(
        config,
        ACCESS_COOKIE_NAME,
        token,
        "/",
        config.access_ttl_seconds(),
    )
}

/// Refresh cookie, scoped to the auth endpoints only.
pub(super) fn refresh_cookie(
    config: &SessionConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(
        config,
        REFRESH_COOKIE_NAME,
        token,
        config.refresh_cookie_path(),
        config.refresh_ttl_seconds(),
    )
}

pub(super) fn clear_access_cookie(config: &SessionConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(config, ACCESS_COOKIE_NAME, "", "/", 0)
}

pub(super) fn clear_refresh_cookie(
    config: &SessionConfig,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(
        config,
        REFRESH_COOKIE_NAME,
        "",
        config.refresh_cookie_path(),
        0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config() -> SessionConfig {
        match SessionConfig::new(SecretString::from("cookie-secret".to_string())) {
            Ok(config) => config,
            Err(err) => panic!("config: {err}"),
        }
    }

    fn render(value: Result<HeaderValue, InvalidHeaderValue>) -> String {
        value
            .ok()
            .and_then(|v| v.to_str().ok().map(ToString::to_string))
            .unwrap_or_default()
    }

    #[test]
    fn access_cookie_attributes() {
        let cookie = render(access_cookie(&config(), "abc"));
        assert_eq!(
            cookie,
            "access_token=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=900"
        );
    }

    #[test]
    fn refresh_cookie_is_path_scoped() {
        let cookie = render(refresh_cookie(&config(), "xyz"));
        assert_eq!(
            cookie,
            "refresh_token=xyz; Path=/api/v1/auth; HttpOnly; SameSite=Lax; Max-Age=2592000"
        );
    }

    #[test]
    fn cross_site_cookies_are_secure() {
        let config = config().with_cross_site_cookies(true);
        let cookie = render(access_cookie(&config, "abc"));
        assert!(cookie.contains("SameSite=None"));
        assert!(cookie.ends_with("; Secure"));
    }

    #[test]
    fn accepted_cookie_paths_always_render() -> Result<(), crate::session::AuthError> {
        for path in ["/", "/auth", "/api/v1/auth/", "/a-b_c.d~e%20"] {
            let config = config().with_refresh_cookie_path(path.to_string())?;
            assert!(refresh_cookie(&config, "xyz").is_ok(), "{path}");
            assert!(clear_refresh_cookie(&config).is_ok(), "{path}");
        }
        Ok(())
    }

    #[test]
    fn clearing_expires_immediately() {
        let cookie = render(clear_refresh_cookie(&config()));
        assert!(cookie.starts_with("refresh_token=;"));
        assert!(cookie.contains("Max-Age=0"));
        let cookie = render(clear_access_cookie(&config()));
        assert!(cookie.starts_with("access_token=;"));
    }
}
