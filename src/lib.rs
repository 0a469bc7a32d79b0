//! # uniauth
//!
//! Credential and session lifecycle service.
//!
//! - [`session`]: password hashing, signed access tokens, rotating refresh
//!   tokens, and request authentication.
//! - [`api`]: axum router exposing signup, login, refresh, logout and `me`.
//! - [`cli`]: command line parsing, telemetry and the server action.

pub mod api;
pub mod cli;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash() {
        assert!(!GIT_COMMIT_HASH.is_empty());
    }

    #[test]
    fn test_pkg_version() {
        assert_eq!(built_info::PKG_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
