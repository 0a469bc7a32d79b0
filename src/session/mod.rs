//! Credential and session lifecycle.
//!
//! A verified user identity becomes a short-lived signed access token plus a
//! long-lived opaque refresh token. Refresh tokens rotate on every use: the
//! presented record is revoked and linked to its successor in one atomic
//! step, so a replayed token is rejected. Access tokens are verified purely
//! cryptographically on each protected request.
//!
//! ## Token lifetimes
//!
//! - **Access:** 15 minutes by default. Not revocable before expiry.
//! - **Refresh:** 30 days by default. Stored only as a SHA-256 fingerprint.

pub mod access;
pub mod authenticator;
pub mod config;
pub mod error;
pub mod issuer;
pub mod secret;
pub mod store;

pub use authenticator::{require_auth, Authenticator, Principal};
pub use config::SessionConfig;
pub use error::AuthError;
pub use issuer::{SessionIssuer, TokenPair};
pub use store::{
    MemoryRefreshTokenRepo, PgRefreshTokenRepo, RefreshTokenRecord, RefreshTokenRepo,
    RefreshTokenStore,
};
