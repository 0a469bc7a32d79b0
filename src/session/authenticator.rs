//! Access credential verification for protected routes.
//!
//! Flow: take the bearer token from `Authorization` (scheme matched
//! case-insensitively) or fall back to the access cookie, verify it with the
//! shared secret, and bind the subject to the request as a [`Principal`].
//! No storage is consulted.

use axum::{
    extract::{Extension, Request},
    http::{
        header::{AUTHORIZATION, COOKIE},
        HeaderMap,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use super::access;
use super::config::{SessionConfig, ACCESS_COOKIE_NAME};
use super::error::AuthError;

/// Identity bound to a request after successful verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
}

#[derive(Clone, Debug)]
pub struct Authenticator {
    config: Arc<SessionConfig>,
}

impl Authenticator {
    #[must_use]
    pub fn new(config: Arc<SessionConfig>) -> Self {
        Self { config }
    }

    /// Resolve request headers to a principal.
    ///
    /// # Errors
    /// `MissingCredential` when neither header nor cookie is present, or the
    /// access token decode error otherwise.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        self.authenticate_at(headers, Utc::now())
    }

    pub(crate) fn authenticate_at(
        &self,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<Principal, AuthError> {
        let token = extract_credential(headers).ok_or(AuthError::MissingCredential)?;
        let claims = access::decode_at(&token, self.config.signing_secret(), now)?;
        Ok(Principal {
            user_id: claims.subject,
        })
    }
}

/// Middleware for protected routes. Expects `Extension<Arc<Authenticator>>`
/// on the router; inserts [`Principal`] into request extensions.
pub async fn require_auth(
    Extension(authenticator): Extension<Arc<Authenticator>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticator.authenticate(request.headers()) {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => {
            debug!("rejected request credential: {err}");
            err.into_response()
        }
    }
}

pub(crate) fn extract_credential(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| extract_cookie(headers, ACCESS_COOKIE_NAME))
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.to_string())
}

/// Read a cookie value by name across all `Cookie` headers.
pub(crate) fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| val.trim().to_string())
        })
        .find(|val| !val.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Duration;
    use secrecy::SecretString;

    const SECRET: &str = "authenticator-secret";

    fn authenticator() -> Authenticator {
        match SessionConfig::new(SecretString::from(SECRET.to_string())) {
            Ok(config) => Authenticator::new(Arc::new(config)),
            Err(err) => panic!("config: {err}"),
        }
    }

    fn token_for(subject: &str) -> String {
        let secret = SecretString::from(SECRET.to_string());
        access::encode(subject, Duration::minutes(15), &secret).unwrap_or_default()
    }

    fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(*name, value);
            }
        }
        headers
    }

    #[test]
    fn bearer_header_authenticates() {
        let token = token_for("u1");
        for scheme in ["Bearer", "bearer", "BEARER"] {
            let h = headers(&[("authorization", format!("{scheme} {token}"))]);
            assert_eq!(
                authenticator().authenticate(&h).ok(),
                Some(Principal {
                    user_id: "u1".to_string()
                })
            );
        }
    }

    #[test]
    fn cookie_fallback_authenticates() {
        let token = token_for("u2");
        let h = headers(&[("cookie", format!("theme=dark; access_token={token}"))]);
        assert_eq!(
            authenticator().authenticate(&h).map(|p| p.user_id).ok(),
            Some("u2".to_string())
        );
    }

    #[test]
    fn header_wins_over_cookie() {
        let h = headers(&[
            ("authorization", format!("Bearer {}", token_for("header"))),
            ("cookie", format!("access_token={}", token_for("cookie"))),
        ]);
        assert_eq!(
            authenticator().authenticate(&h).map(|p| p.user_id).ok(),
            Some("header".to_string())
        );
    }

    #[test]
    fn non_bearer_header_falls_back_to_cookie() {
        let h = headers(&[
            ("authorization", "Basic dXNlcjpwYXNz".to_string()),
            ("cookie", format!("access_token={}", token_for("u3"))),
        ]);
        assert_eq!(
            authenticator().authenticate(&h).map(|p| p.user_id).ok(),
            Some("u3".to_string())
        );
    }

    #[test]
    fn missing_credential() {
        for h in [
            HeaderMap::new(),
            headers(&[("authorization", "Bearer".to_string())]),
            headers(&[("authorization", "Bearer a b".to_string())]),
            headers(&[("cookie", "access_token=".to_string())]),
        ] {
            assert!(matches!(
                authenticator().authenticate(&h),
                Err(AuthError::MissingCredential)
            ));
        }
    }

    #[test]
    fn tampered_token_is_rejected() {
        let mut token = token_for("u1");
        // Flip the last signature character.
        let last = token.pop().unwrap_or('A');
        token.push(if last == 'A' { 'B' } else { 'A' });
        let h = headers(&[("authorization", format!("Bearer {token}"))]);
        let result = authenticator().authenticate(&h);
        assert!(matches!(
            result,
            Err(AuthError::InvalidSignature | AuthError::Malformed)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = token_for("u1");
        let h = headers(&[("authorization", format!("Bearer {token}"))]);
        let later = Utc::now() + Duration::minutes(16);
        assert!(matches!(
            authenticator().authenticate_at(&h, later),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn garbage_token_is_malformed() {
        let h = headers(&[("authorization", "Bearer not-a-jwt".to_string())]);
        assert!(matches!(
            authenticator().authenticate(&h),
            Err(AuthError::Malformed)
        ));
    }

    #[test]
    fn extract_cookie_handles_multiple_headers() {
        let h = headers(&[
            ("cookie", "a=1".to_string()),
            ("cookie", "b=2; refresh_token=xyz".to_string()),
        ]);
        assert_eq!(extract_cookie(&h, "refresh_token"), Some("xyz".to_string()));
        assert_eq!(extract_cookie(&h, "a"), Some("1".to_string()));
        assert_eq!(extract_cookie(&h, "missing"), None);
    }
}
