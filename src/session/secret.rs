//! Password hashing, opaque token generation, and token fingerprints.
//!
//! Raw refresh tokens are only ever handed to the client; the store keeps
//! their SHA-256 fingerprint.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length in bytes of generated refresh secrets.
pub const REFRESH_TOKEN_BYTES: usize = 32;

// 19 MiB, 2 passes, 1 lane.
const ARGON2_MEMORY_KIB: u32 = 19 * 1024;
const ARGON2_ITERATIONS: u32 = 2;
const ARGON2_PARALLELISM: u32 = 1;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("entropy source failure")]
    Entropy(#[from] rand::Error),
    #[error("password hash error: {0}")]
    Hash(String),
}

fn argon2() -> Result<Argon2<'static>, SecretError> {
    let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, ARGON2_PARALLELISM, None)
        .map_err(|e| SecretError::Hash(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash an account password with a fresh random salt (Argon2id, PHC string).
///
/// # Errors
/// Returns an error if the hasher cannot be configured or hashing fails.
pub fn hash_secret(plaintext: &str) -> Result<String, SecretError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2()?
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SecretError::Hash(e.to_string()))
}

/// Check a password against a stored hash.
///
/// Returns `false` on mismatch and on unparsable hashes.
#[must_use]
pub fn verify_secret(plaintext: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    // Parameters are read from the PHC string, not from our defaults.
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

/// Generate `byte_length` random bytes from the OS and encode them as
/// unpadded URL-safe base64.
///
/// # Errors
/// Returns an error only when the OS entropy source fails.
pub fn generate_opaque_token(byte_length: usize) -> Result<String, SecretError> {
    let mut bytes = vec![0u8; byte_length];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Deterministic lookup key for an opaque token: hex-encoded SHA-256.
#[must_use]
pub fn fingerprint_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() -> Result<(), SecretError> {
        let hash = hash_secret("correct horse battery staple")?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret("correct horse battery staple", &hash));
        assert!(!verify_secret("wrong password", &hash));
        Ok(())
    }

    #[test]
    fn hashes_are_salted() -> Result<(), SecretError> {
        let first = hash_secret("password")?;
        let second = hash_secret("password")?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify_secret("password", "not-a-phc-string"));
        assert!(!verify_secret("password", ""));
    }

    #[test]
    fn opaque_token_is_url_safe_without_padding() -> Result<(), SecretError> {
        let token = generate_opaque_token(REFRESH_TOKEN_BYTES)?;
        assert!(!token.contains('='));
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        let decoded = Base64UrlUnpadded::decode_vec(&token).map(|bytes| bytes.len());
        assert_eq!(decoded.ok(), Some(REFRESH_TOKEN_BYTES));
        Ok(())
    }

    #[test]
    fn opaque_tokens_differ() -> Result<(), SecretError> {
        let first = generate_opaque_token(REFRESH_TOKEN_BYTES)?;
        let second = generate_opaque_token(REFRESH_TOKEN_BYTES)?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn fingerprint_is_stable_hex_sha256() {
        let first = fingerprint_token("token");
        assert_eq!(first, fingerprint_token("token"));
        assert_ne!(first, fingerprint_token("other"));
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(
            fingerprint_token(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
