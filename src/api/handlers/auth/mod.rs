//! Auth endpoints under `/api/v1/auth`.
//!
//! Signup and login turn a verified user into a session; refresh, logout and
//! `me` operate on an existing one. Tokens travel both as JSON body fields
//! and as `HttpOnly` cookies.

use axum::{
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use std::sync::Arc;
use tracing::error;

use crate::session::{authenticator::extract_cookie, config::REFRESH_COOKIE_NAME};
use crate::session::{SessionConfig, SessionIssuer, TokenPair};

mod cookies;
pub(crate) mod login;
pub(crate) mod session;
pub(crate) mod signup;
pub mod types;
pub mod users;

pub use login::login;
pub use session::{logout, me, refresh};
pub use signup::signup;
pub use users::{CreateUserOutcome, MemoryUserStore, PgUserStore, UserRecord, UserStore};

use types::{AuthResponse, ErrorResponse, RefreshRequest, UserResponse};

/// Shared state for the auth handlers.
pub struct AuthState {
    issuer: SessionIssuer,
    users: Arc<dyn UserStore>,
}

impl AuthState {
    #[must_use]
    pub fn new(issuer: SessionIssuer, users: Arc<dyn UserStore>) -> Self {
        Self { issuer, users }
    }

    #[must_use]
    pub fn issuer(&self) -> &SessionIssuer {
        &self.issuer
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        self.issuer.config()
    }
}

/// Emails are compared trimmed and lowercased.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

pub(crate) fn api_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Refresh token from the cookie, else from the JSON body.
pub(crate) fn presented_refresh_token(
    headers: &HeaderMap,
    payload: Option<Json<RefreshRequest>>,
) -> Option<String> {
    extract_cookie(headers, REFRESH_COOKIE_NAME).or_else(|| {
        payload
            .and_then(|Json(request)| request.refresh_token)
            .filter(|token| !token.trim().is_empty())
    })
}

/// Body plus `Set-Cookie` headers for a freshly issued or rotated pair.
pub(crate) fn session_response(
    status: StatusCode,
    config: &SessionConfig,
    pair: TokenPair,
    user: Option<UserResponse>,
) -> Response {
    let access = cookies::access_cookie(config, &pair.access_token);
    let refresh = cookies::refresh_cookie(config, &pair.refresh_token);
    let (Ok(access), Ok(refresh)) = (access, refresh) else {
        error!("Failed to build session cookies");
        return api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to generate authentication tokens",
        );
    };

    let mut headers = HeaderMap::new();
    headers.append(SET_COOKIE, access);
    headers.append(SET_COOKIE, refresh);

    let body = AuthResponse {
        token: pair.access_token,
        refresh_token: pair.refresh_token,
        user,
    };

    (status, headers, Json(body)).into_response()
}

/// `Set-Cookie` headers expiring both session cookies.
pub(crate) fn cleared_cookies(config: &SessionConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for cookie in [
        cookies::clear_access_cookie(config),
        cookies::clear_refresh_cookie(config),
    ] {
        match cookie {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(err) => error!("Failed to build cookie: {err}"),
        }
    }
    headers
}
