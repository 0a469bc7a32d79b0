//! Stateless access tokens: compact JWTs signed with an HMAC-SHA2 key.
//!
//! Tokens carry `sub`, `iat` and `exp` only. Verification needs nothing but
//! the shared secret, so revoking a refresh token does not cut short an
//! access token that was already handed out.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Sha256, Sha384, Sha512};
use thiserror::Error;

const TOKEN_TYPE: &str = "JWT";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed subject")]
    MalformedSubject,
    #[error("failed to sign token")]
    Signing,
    #[error("token lifetime out of range")]
    Lifetime,
}

/// Signing algorithms accepted on decode. Encoding always uses `HS256`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacAlgorithm {
    Hs256,
    Hs384,
    Hs512,
}

impl MacAlgorithm {
    fn from_header(alg: &str) -> Option<Self> {
        match alg {
            "HS256" => Some(Self::Hs256),
            "HS384" => Some(Self::Hs384),
            "HS512" => Some(Self::Hs512),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hs256 => "HS256",
            Self::Hs384 => "HS384",
            Self::Hs512 => "HS512",
        }
    }

    fn sign(self, key: &[u8], input: &[u8]) -> Result<Vec<u8>, TokenError> {
        let tag = match self {
            Self::Hs256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|_| TokenError::Signing)?;
                mac.update(input);
                mac.finalize().into_bytes().to_vec()
            }
            Self::Hs384 => {
                let mut mac = Hmac::<Sha384>::new_from_slice(key).map_err(|_| TokenError::Signing)?;
                mac.update(input);
                mac.finalize().into_bytes().to_vec()
            }
            Self::Hs512 => {
                let mut mac = Hmac::<Sha512>::new_from_slice(key).map_err(|_| TokenError::Signing)?;
                mac.update(input);
                mac.finalize().into_bytes().to_vec()
            }
        };
        Ok(tag)
    }

    // `verify_slice` compares in constant time.
    fn verify(self, key: &[u8], input: &[u8], tag: &[u8]) -> Result<(), TokenError> {
        let result = match self {
            Self::Hs256 => Hmac::<Sha256>::new_from_slice(key).map(|mut mac| {
                mac.update(input);
                mac.verify_slice(tag)
            }),
            Self::Hs384 => Hmac::<Sha384>::new_from_slice(key).map(|mut mac| {
                mac.update(input);
                mac.verify_slice(tag)
            }),
            Self::Hs512 => Hmac::<Sha512>::new_from_slice(key).map(|mut mac| {
                mac.update(input);
                mac.verify_slice(tag)
            }),
        };
        match result {
            Ok(Ok(())) => Ok(()),
            _ => Err(TokenError::InvalidSignature),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

#[derive(Serialize)]
struct OutgoingClaims<'a> {
    sub: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct IncomingClaims {
    #[serde(default)]
    sub: Option<Value>,
    iat: Option<i64>,
    exp: Option<i64>,
}

/// Verified contents of an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    pub subject: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Malformed)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Accept a non-empty string, or an integral number in its decimal form.
fn subject_from_claim(value: Option<Value>) -> Result<String, TokenError> {
    let subject = match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                match n.as_f64() {
                    #[allow(clippy::cast_possible_truncation)]
                    Some(f)
                        if f.is_finite()
                            && f.fract() == 0.0
                            && f >= i64::MIN as f64
                            && f <= i64::MAX as f64 =>
                    {
                        (f as i64).to_string()
                    }
                    _ => return Err(TokenError::MalformedSubject),
                }
            }
        }
        _ => return Err(TokenError::MalformedSubject),
    };
    if subject.is_empty() {
        return Err(TokenError::MalformedSubject);
    }
    Ok(subject)
}

/// Sign an access token for `subject` valid for `ttl` from now.
///
/// # Errors
/// Returns an error if the subject is empty or signing fails.
pub fn encode(subject: &str, ttl: Duration, secret: &SecretString) -> Result<String, TokenError> {
    encode_at(subject, Utc::now(), ttl, secret)
}

/// Sign an access token with an explicit issue time.
///
/// # Errors
/// Returns an error if the subject is empty or signing fails.
pub fn encode_at(
    subject: &str,
    issued_at: DateTime<Utc>,
    ttl: Duration,
    secret: &SecretString,
) -> Result<String, TokenError> {
    if subject.is_empty() {
        return Err(TokenError::MalformedSubject);
    }
    let algorithm = MacAlgorithm::Hs256;
    let header = TokenHeader {
        alg: algorithm.as_str().to_string(),
        typ: Some(TOKEN_TYPE.to_string()),
    };
    let iat = issued_at.timestamp();
    let exp = issued_at
        .checked_add_signed(ttl)
        .map(|expires_at| expires_at.timestamp())
        .ok_or(TokenError::Lifetime)?;
    let claims = OutgoingClaims {
        sub: subject,
        iat,
        exp,
    };

    let signing_input = format!("{}.{}", b64e_json(&header)?, b64e_json(&claims)?);
    let tag = algorithm.sign(secret.expose_secret().as_bytes(), signing_input.as_bytes())?;
    let signature_b64 = Base64UrlUnpadded::encode_string(&tag);

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Verify an access token against the current time.
///
/// # Errors
/// See [`decode_at`].
pub fn decode(token: &str, secret: &SecretString) -> Result<AccessClaims, TokenError> {
    decode_at(token, secret, Utc::now())
}

/// Verify an access token and return its claims.
///
/// # Errors
///
/// Returns an error if:
/// - the token is not three base64url segments of valid JSON (`Malformed`),
/// - the header names anything but an HMAC-SHA2 algorithm (`UnsupportedAlgorithm`),
/// - the MAC does not match (`InvalidSignature`),
/// - `now >= exp` (`Expired`),
/// - `sub` is missing, empty, or not a string/integer (`MalformedSubject`).
pub fn decode_at(
    token: &str,
    secret: &SecretString,
    now: DateTime<Utc>,
) -> Result<AccessClaims, TokenError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(TokenError::Malformed)?;
    let claims_b64 = parts.next().ok_or(TokenError::Malformed)?;
    let sig_b64 = parts.next().ok_or(TokenError::Malformed)?;
    if parts.next().is_some() || header_b64.is_empty() || claims_b64.is_empty() {
        return Err(TokenError::Malformed);
    }

    let header: TokenHeader = b64d_json(header_b64)?;
    let algorithm = MacAlgorithm::from_header(&header.alg)
        .ok_or_else(|| TokenError::UnsupportedAlgorithm(header.alg.clone()))?;

    let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Malformed)?;
    let signing_input = format!("{header_b64}.{claims_b64}");
    algorithm.verify(
        secret.expose_secret().as_bytes(),
        signing_input.as_bytes(),
        &signature,
    )?;

    let claims: IncomingClaims = b64d_json(claims_b64)?;
    let exp = claims.exp.ok_or(TokenError::Malformed)?;
    let iat = claims.iat.ok_or(TokenError::Malformed)?;
    if now.timestamp() >= exp {
        return Err(TokenError::Expired);
    }

    Ok(AccessClaims {
        subject: subject_from_claim(claims.sub)?,
        issued_at: iat,
        expires_at: exp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(NOW, 0).single().unwrap_or_else(Utc::now)
    }

    fn at(offset: i64) -> DateTime<Utc> {
        now() + Duration::seconds(offset)
    }

    // Assemble a token from arbitrary header/claims JSON, signed with HS-family `alg`.
    fn forge(header: &Value, claims: &Value, alg: MacAlgorithm, key: &str) -> String {
        let input = format!(
            "{}.{}",
            Base64UrlUnpadded::encode_string(header.to_string().as_bytes()),
            Base64UrlUnpadded::encode_string(claims.to_string().as_bytes())
        );
        let tag = alg.sign(key.as_bytes(), input.as_bytes()).unwrap_or_default();
        format!("{input}.{}", Base64UrlUnpadded::encode_string(&tag))
    }

    #[test]
    fn round_trip_until_expiry() -> Result<(), TokenError> {
        let key = secret("s1");
        let token = encode_at("u1", now(), Duration::seconds(900), &key)?;

        let claims = decode_at(&token, &key, now())?;
        assert_eq!(claims.subject, "u1");
        assert_eq!(claims.issued_at, NOW);
        assert_eq!(claims.expires_at, NOW + 900);

        assert_eq!(decode_at(&token, &key, at(899))?.subject, "u1");
        assert!(matches!(
            decode_at(&token, &key, at(900)),
            Err(TokenError::Expired)
        ));
        Ok(())
    }

    #[test]
    fn other_secret_is_invalid_signature() -> Result<(), TokenError> {
        let token = encode_at("u1", now(), Duration::seconds(60), &secret("s1"))?;
        assert!(matches!(
            decode_at(&token, &secret("s2"), now()),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn tampered_claims_are_rejected() -> Result<(), TokenError> {
        let key = secret("s1");
        let token = encode_at("u1", now(), Duration::seconds(60), &key)?;
        let parts: Vec<&str> = token.split('.').collect();
        let forged_claims = Base64UrlUnpadded::encode_string(
            json!({"sub": "admin", "iat": NOW, "exp": NOW + 60})
                .to_string()
                .as_bytes(),
        );
        let tampered = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert!(matches!(
            decode_at(&tampered, &key, now()),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn malformed_structures() {
        let key = secret("s1");
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.!!.!!", ".."] {
            assert!(
                matches!(
                    decode_at(token, &key, now()),
                    Err(TokenError::Malformed | TokenError::Json(_))
                ),
                "{token:?}"
            );
        }
    }

    #[test]
    fn rejects_non_hmac_algorithms() {
        let key = secret("s1");
        for alg in ["none", "RS256", "ES256", "hs256"] {
            let header = Base64UrlUnpadded::encode_string(
                json!({"alg": alg, "typ": "JWT"}).to_string().as_bytes(),
            );
            let claims = Base64UrlUnpadded::encode_string(
                json!({"sub": "u1", "iat": NOW, "exp": NOW + 60})
                    .to_string()
                    .as_bytes(),
            );
            let token = format!("{header}.{claims}.");
            assert!(
                matches!(
                    decode_at(&token, &key, now()),
                    Err(TokenError::UnsupportedAlgorithm(ref got)) if got == alg
                ),
                "{alg}"
            );
        }
    }

    #[test]
    fn accepts_other_hmac_family_members() -> Result<(), TokenError> {
        let claims = json!({"sub": "u1", "iat": NOW, "exp": NOW + 60});
        for alg in [MacAlgorithm::Hs384, MacAlgorithm::Hs512] {
            let token = forge(&json!({"alg": alg.as_str()}), &claims, alg, "s1");
            assert_eq!(decode_at(&token, &secret("s1"), now())?.subject, "u1");
        }
        Ok(())
    }

    #[test]
    fn numeric_subject_is_canonicalised() -> Result<(), TokenError> {
        let header = json!({"alg": "HS256", "typ": "JWT"});
        let cases = [
            (json!(42), "42"),
            (json!(42.0), "42"),
            (json!(-7), "-7"),
        ];
        for (sub, expected) in cases {
            let claims = json!({"sub": sub, "iat": NOW, "exp": NOW + 60});
            let token = forge(&header, &claims, MacAlgorithm::Hs256, "s1");
            assert_eq!(decode_at(&token, &secret("s1"), now())?.subject, expected);
        }
        Ok(())
    }

    #[test]
    fn bad_subjects_are_rejected() {
        let header = json!({"alg": "HS256"});
        for sub in [json!(""), json!(1.5), json!(true), json!(null), json!({"id": 1})] {
            let claims = json!({"sub": sub, "iat": NOW, "exp": NOW + 60});
            let token = forge(&header, &claims, MacAlgorithm::Hs256, "s1");
            assert!(
                matches!(
                    decode_at(&token, &secret("s1"), now()),
                    Err(TokenError::MalformedSubject)
                ),
                "{sub}"
            );
        }

        let claims = json!({"iat": NOW, "exp": NOW + 60});
        let token = forge(&header, &claims, MacAlgorithm::Hs256, "s1");
        assert!(matches!(
            decode_at(&token, &secret("s1"), now()),
            Err(TokenError::MalformedSubject)
        ));
    }

    #[test]
    fn missing_expiry_is_malformed() {
        let header = json!({"alg": "HS256"});
        let claims = json!({"sub": "u1", "iat": NOW});
        let token = forge(&header, &claims, MacAlgorithm::Hs256, "s1");
        assert!(matches!(
            decode_at(&token, &secret("s1"), now()),
            Err(TokenError::Malformed)
        ));
    }

    #[test]
    fn empty_subject_cannot_be_encoded() {
        assert!(matches!(
            encode("", Duration::seconds(60), &secret("s1")),
            Err(TokenError::MalformedSubject)
        ));
    }

    #[test]
    fn lifetime_past_calendar_range_is_rejected() {
        assert!(matches!(
            encode_at("u1", now(), Duration::MAX, &secret("s1")),
            Err(TokenError::Lifetime)
        ));
    }

    #[test]
    fn header_is_hs256_jwt() -> Result<(), TokenError> {
        let token = encode_at("u1", now(), Duration::seconds(60), &secret("s1"))?;
        let header_b64 = token.split('.').next().unwrap_or_default();
        let header: TokenHeader = b64d_json(header_b64)?;
        assert_eq!(header.alg, "HS256");
        assert_eq!(header.typ.as_deref(), Some("JWT"));
        Ok(())
    }
}
