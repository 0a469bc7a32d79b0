use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{
    api_error, cleared_cookies, presented_refresh_token, session_response,
    types::{AuthResponse, ErrorResponse, MeResponse, MessageResponse, RefreshRequest},
    AuthState,
};
use crate::session::Principal;

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body(content = RefreshRequest, description = "Used when no refresh cookie is sent"),
    responses(
        (status = 200, description = "Session rotated", body = AuthResponse),
        (status = 400, description = "Missing refresh token", body = ErrorResponse),
        (status = 401, description = "Invalid or expired refresh token", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn refresh(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    let Some(token) = presented_refresh_token(&headers, payload) else {
        return api_error(StatusCode::BAD_REQUEST, "Missing refresh token");
    };

    match auth_state.issuer().rotate(&token).await {
        Ok(pair) => session_response(StatusCode::OK, auth_state.config(), pair, None),
        Err(err) => {
            debug!("Refresh rejected: {err}");
            err.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    request_body(content = RefreshRequest, description = "Used when no refresh cookie is sent"),
    responses(
        (status = 200, description = "Session revoked and cookies cleared", body = MessageResponse),
        (status = 400, description = "Missing refresh token", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    let Some(token) = presented_refresh_token(&headers, payload) else {
        return api_error(StatusCode::BAD_REQUEST, "Missing refresh token");
    };

    auth_state.issuer().revoke_session(&token).await;

    (
        StatusCode::OK,
        cleared_cookies(auth_state.config()),
        Json(MessageResponse {
            message: "logged out".to_string(),
        }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Authenticated principal", body = MeResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(Extension(principal): Extension<Principal>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: principal.user_id,
    })
}
