use axum::{extract::Extension, http::StatusCode, response::Response, Json};
use std::sync::Arc;
use tracing::{debug, error, instrument};

use super::{
    api_error, normalize_email, session_response,
    types::{AuthResponse, ErrorResponse, SignupRequest, UserResponse},
    valid_email, AuthState, CreateUserOutcome,
};
use crate::session::secret::hash_secret;

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created and session issued", body = AuthResponse),
        (status = 400, description = "Invalid email or password", body = ErrorResponse),
        (status = 409, description = "User already exists", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn signup(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SignupRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return api_error(StatusCode::BAD_REQUEST, "Missing payload");
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        debug!("Rejected signup with invalid email");
        return api_error(StatusCode::BAD_REQUEST, "Invalid email");
    }
    if request.password.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "Missing password");
    }

    // Argon2 is CPU bound.
    let password = request.password;
    let password_hash = match tokio::task::spawn_blocking(move || hash_secret(&password)).await {
        Ok(Ok(hash)) => hash,
        Ok(Err(err)) => {
            error!("Failed to hash password: {err}");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "Could not create user");
        }
        Err(err) => {
            error!("Password hashing task failed: {err}");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "Could not create user");
        }
    };

    let user = match auth_state.users().create_user(&email, &password_hash).await {
        Ok(CreateUserOutcome::Created(user)) => user,
        Ok(CreateUserOutcome::Conflict) => {
            debug!("Signup for existing email");
            return api_error(StatusCode::CONFLICT, "User already exists");
        }
        Err(err) => {
            error!("Failed to create user: {err:#}");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "Could not create user");
        }
    };

    match auth_state.issuer().issue(&user.id.to_string()).await {
        Ok(pair) => session_response(
            StatusCode::CREATED,
            auth_state.config(),
            pair,
            Some(UserResponse::from(user)),
        ),
        Err(err) => {
            error!("Failed to issue session after signup: {err}");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate authentication tokens",
            )
        }
    }
}
