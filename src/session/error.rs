//! Error taxonomy for the session core.
//!
//! Every variant maps to either a client-caused rejection (401) or an
//! internal failure (500). Messages never include token material.

use axum::{
    http::{
        header::{HeaderValue, WWW_AUTHENTICATE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use super::access::TokenError;
use super::store::StoreError;

pub(crate) const BEARER_CHALLENGE: &str = r#"Bearer realm="api""#;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("unsupported signing algorithm")]
    UnsupportedAlgorithm,
    #[error("malformed subject")]
    MalformedSubject,
    /// Refresh token not found, revoked, or expired. Deliberately a single
    /// signal so callers cannot tell which one applied.
    #[error("invalid or expired refresh token")]
    InvalidOrExpiredToken,
    #[error("token store unavailable")]
    StoreUnavailable,
    #[error("token generation failed")]
    TokenGenerationFailed,
    #[error("configuration missing: {0}")]
    ConfigurationMissing(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),
}

impl AuthError {
    /// HTTP status for this error: 401 when the client supplied a bad
    /// credential, 500 for internal failures.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredential
            | Self::Malformed
            | Self::InvalidSignature
            | Self::Expired
            | Self::UnsupportedAlgorithm
            | Self::MalformedSubject
            | Self::InvalidOrExpiredToken => StatusCode::UNAUTHORIZED,
            Self::StoreUnavailable
            | Self::TokenGenerationFailed
            | Self::ConfigurationMissing(_)
            | Self::InvalidConfiguration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for rejections produced while verifying an access credential.
    #[must_use]
    pub fn is_credential_rejection(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential
                | Self::Malformed
                | Self::InvalidSignature
                | Self::Expired
                | Self::UnsupportedAlgorithm
                | Self::MalformedSubject
        )
    }

    fn public_message(&self) -> &'static str {
        if self.is_credential_rejection() {
            return "Unauthorized";
        }
        match self {
            Self::InvalidOrExpiredToken => "Invalid or expired refresh token",
            _ => "Internal server error",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed | TokenError::Json(_) => Self::Malformed,
            TokenError::InvalidSignature => Self::InvalidSignature,
            TokenError::Expired => Self::Expired,
            TokenError::UnsupportedAlgorithm(_) => Self::UnsupportedAlgorithm,
            TokenError::MalformedSubject => Self::MalformedSubject,
            TokenError::Signing | TokenError::Lifetime => Self::TokenGenerationFailed,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(_err: StoreError) -> Self {
        Self::StoreUnavailable
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.public_message() }));
        if status == StatusCode::UNAUTHORIZED {
            let mut response = (status, body).into_response();
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static(BEARER_CHALLENGE),
            );
            response
        } else {
            (status, body).into_response()
        }
    }
}
