//! HTTP surface: router construction and the server loop.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::session::{
    require_auth, Authenticator, PgRefreshTokenRepo, RefreshTokenStore, SessionConfig,
    SessionIssuer,
};

pub mod handlers;
mod openapi;


pub use openapi::ApiDoc;

use handlers::{
    auth::{self, AuthState, PgUserStore},
    health,
};

/// Build the application router.
///
/// `/api/v1/auth/me` sits behind [`require_auth`]; everything else is public.
#[must_use]
pub fn router(auth_state: Arc<AuthState>, authenticator: Arc<Authenticator>) -> Router {
    let protected = Router::new()
        .route("/api/v1/auth/me", get(auth::me))
        .route_layer(middleware::from_fn(require_auth));

    Router::new()
        .route("/health", get(health::health))
        .route("/api/v1/auth/signup", post(auth::signup))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route("/api/v1/auth/logout", post(auth::logout))
        .merge(protected)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(Extension(authenticator))
        .layer(Extension(auth_state))
}

/// Start the server
/// # Errors
/// Return error if failed to connect to the database or bind the port
pub async fn new(port: u16, dsn: String, session_config: SessionConfig) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let session_config = Arc::new(session_config);
    let store = RefreshTokenStore::new(
        Arc::new(PgRefreshTokenRepo::new(pool.clone())),
        session_config.store_timeout(),
    );
    let issuer = SessionIssuer::new(session_config.clone(), store);
    let authenticator = Arc::new(Authenticator::new(session_config));
    let auth_state = Arc::new(AuthState::new(
        issuer,
        Arc::new(PgUserStore::new(pool.clone())),
    ));

    let app = router(auth_state, authenticator).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(pool)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
                std::future::pending::<()>().await;
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
