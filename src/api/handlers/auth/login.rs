use axum::{extract::Extension, http::StatusCode, response::Response, Json};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, instrument};

use super::{
    api_error, normalize_email, session_response,
    types::{AuthResponse, ErrorResponse, LoginRequest, UserResponse},
    AuthState,
};
use crate::session::secret::{hash_secret, verify_secret};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

// Unknown users are verified against this so both failures cost one Argon2 run.
static DUMMY_PASSWORD_HASH: OnceLock<Option<String>> = OnceLock::new();

fn dummy_password_hash() -> Option<&'static str> {
    DUMMY_PASSWORD_HASH
        .get_or_init(|| hash_secret("uniauth-unknown-user").ok())
        .as_deref()
}

/// Run Argon2 against `password_hash`, or the dummy hash when the user is
/// unknown. Unknown users never verify.
fn verify_password(password: &str, password_hash: Option<&str>) -> bool {
    match password_hash {
        Some(hash) => verify_secret(password, hash),
        None => {
            if let Some(hash) = dummy_password_hash() {
                let _ = verify_secret(password, hash);
            }
            false
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = AuthResponse),
        (status = 400, description = "Missing identifier or password", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return api_error(StatusCode::BAD_REQUEST, "Missing payload");
    };

    let identifier = normalize_email(&request.identifier);
    if identifier.is_empty() || request.password.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "Missing identifier or password");
    }

    let user = match auth_state.users().find_by_email(&identifier).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to lookup user: {err:#}");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let password = request.password;
    let password_hash = user.as_ref().map(|user| user.password_hash.clone());
    let verified = tokio::task::spawn_blocking(move || {
        verify_password(&password, password_hash.as_deref())
    })
    .await
    .unwrap_or_else(|err| {
        error!("Password verification task failed: {err}");
        false
    });
    let Some(user) = user.filter(|_| verified) else {
        debug!("Login with unknown user or wrong password");
        return api_error(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS);
    };

    match auth_state.issuer().issue(&user.id.to_string()).await {
        Ok(pair) => session_response(
            StatusCode::OK,
            auth_state.config(),
            pair,
            Some(UserResponse::from(user)),
        ),
        Err(err) => {
            error!("Failed to issue session: {err}");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate authentication tokens",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_hash_is_argon2id() {
        assert!(dummy_password_hash().is_some_and(|hash| hash.starts_with("$argon2id$")));
    }

    #[test]
    fn unknown_user_never_verifies() {
        assert!(!verify_password("uniauth-unknown-user", None));
        assert!(!verify_password("anything", None));
    }

    #[test]
    fn known_user_verifies_against_own_hash() -> Result<(), crate::session::secret::SecretError> {
        let hash = hash_secret("correct horse")?;
        assert!(verify_password("correct horse", Some(&hash)));
        assert!(!verify_password("wrong", Some(&hash)));
        Ok(())
    }
}
