//! Identity token parsing and signature verification.
//!
//! Tokens are handled in two passes. The unverified pass
//! ([`decode_jwt_header`], [`decode_unverified_claims`]) only establishes
//! structure so the right tenant and key can be chosen. Nothing read in that
//! pass is trusted. The verified pass ([`verify_signature`]) checks the
//! RS256 signature and the time claims, and only its output reaches
//! [`check_issuer_and_token_use`] and the identity context.
//!
//! ```no_run
//! use tenantgate_authn::jwt::{decode_jwt_header, strip_bearer};
//!
//! # fn example(authorization: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let token = strip_bearer(authorization);
//! let header = decode_jwt_header(token)?;
//! println!("signed with kid {:?}", header.kid);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::AuthError;

/// Prefix of a bearer credential in the identity header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// `token_use` value of an identity token.
pub const ID_TOKEN_USE: &str = "id";

/// Maximum accepted token length in bytes.
pub const MAX_TOKEN_LEN: usize = 16 * 1024;

/// Removes a leading `"Bearer "` from a credential.
///
/// Anything else is returned unchanged, so a bare token passes through.
///
/// ```
/// use tenantgate_authn::jwt::strip_bearer;
///
/// assert_eq!(strip_bearer("Bearer abc"), "abc");
/// assert_eq!(strip_bearer("abc"), "abc");
/// ```
#[must_use]
pub fn strip_bearer(raw: &str) -> &str {
    raw.strip_prefix(BEARER_PREFIX).unwrap_or(raw)
}

/// The JOSE header fields the verifier reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm.
    pub alg: String,
    /// Key id selecting the verification key from the issuer's JWKS.
    #[serde(default)]
    pub kid: Option<String>,
    /// Media type, usually `JWT`.
    #[serde(default)]
    pub typ: Option<String>,
}

impl TokenHeader {
    /// Returns the `kid`, which every verifiable token must carry.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedToken`] when the header has no `kid`.
    pub fn require_kid(&self) -> Result<&str, AuthError> {
        self.kid.as_deref().ok_or_else(|| AuthError::malformed_token("JWT header is missing kid"))
    }
}

/// Claims of an identity token.
///
/// Wraps the raw JSON object. Named accessors treat a claim as present only
/// when it holds a non-empty string, so `null`, `""` and non-string values
/// all read as missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdTokenClaims(Map<String, Value>);

impl IdTokenClaims {
    /// Returns a claim's string value, if it is a non-empty string.
    #[must_use]
    pub fn string_claim(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(Value::String(value)) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    /// Returns a claim's string value.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ClaimMissing`] when the claim is absent, null,
    /// empty or not a string.
    pub fn require(&self, name: &str) -> Result<&str, AuthError> {
        self.string_claim(name).ok_or_else(|| AuthError::claim_missing(name))
    }

    /// Returns the raw JSON value of a claim.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns the `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.string_claim("iss")
    }

    /// Returns the `sub` claim.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.string_claim("sub")
    }

    /// Returns the `token_use` claim.
    #[must_use]
    pub fn token_use(&self) -> Option<&Value> {
        self.0.get("token_use")
    }

    /// Returns the `exp` claim as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.0.get("exp").and_then(Value::as_i64).and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    /// Returns the underlying JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for IdTokenClaims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Splits a compact JWS into its three segments.
fn split_token(token: &str) -> Result<(&str, &str, &str), AuthError> {
    if token.len() > MAX_TOKEN_LEN {
        return Err(AuthError::malformed_token(format!(
            "JWT is longer than {MAX_TOKEN_LEN} bytes"
        )));
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None)
            if !header.is_empty() && !payload.is_empty() =>
        {
            Ok((header, payload, signature))
        },
        _ => Err(AuthError::malformed_token("JWT must have 3 parts separated by dots")),
    }
}

fn decode_segment(segment: &str, what: &str) -> Result<Vec<u8>, AuthError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::malformed_token(format!("Failed to decode JWT {what}: {e}")))
}

/// Decode JWT header without verification.
///
/// Reads the algorithm as a plain string so that `none` and other names
/// unknown to the signing library still reach
/// [`validate_algorithm`](crate::validation::validate_algorithm).
///
/// # Errors
///
/// Returns [`AuthError::MalformedToken`] if the token does not have three
/// segments or the header is not base64url-encoded JSON.
pub fn decode_jwt_header(token: &str) -> Result<TokenHeader, AuthError> {
    let (header, _, _) = split_token(token)?;
    let bytes = decode_segment(header, "header")?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::malformed_token(format!("Failed to parse JWT header: {e}")))
}

/// Decode JWT claims without verification.
///
/// Used to pick the tenant before the signature can be checked. The result
/// must never be trusted on its own.
///
/// # Errors
///
/// Returns [`AuthError::MalformedToken`] if the token does not have three
/// segments or the payload is not a base64url-encoded JSON object.
pub fn decode_unverified_claims(token: &str) -> Result<IdTokenClaims, AuthError> {
    let (_, payload, _) = split_token(token)?;
    let bytes = decode_segment(payload, "payload")?;
    let claims: Map<String, Value> = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::malformed_token(format!("Failed to parse JWT claims: {e}")))?;
    Ok(IdTokenClaims(claims))
}

/// Verify an RS256 signature and the token's time claims.
///
/// `exp` is required. `exp` and `nbf` are compared with `leeway` of clock
/// skew allowed.
///
/// # Errors
///
/// Returns [`AuthError::SignatureVerification`] if the signature does not
/// match `key`, [`AuthError::TokenExpired`] if `exp` has passed, and
/// [`AuthError::ClaimMissing`] if there is no `exp`.
pub fn verify_signature(
    token: &str,
    key: &DecodingKey,
    leeway: Duration,
) -> Result<IdTokenClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.leeway = leeway.as_secs();
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.validate_aud = false;

    let token_data = decode::<Map<String, Value>>(token, key, &validation)?;
    Ok(IdTokenClaims(token_data.claims))
}

/// Checks that verified claims come from `expected_issuer` and describe an
/// identity token.
///
/// The issuer must match exactly. `token_use`, when present, must be
/// [`ID_TOKEN_USE`]; providers that omit it are accepted.
///
/// # Errors
///
/// Returns [`AuthError::IssuerMismatch`] or [`AuthError::TokenType`].
pub fn check_issuer_and_token_use(
    claims: &IdTokenClaims,
    expected_issuer: &str,
) -> Result<(), AuthError> {
    match claims.get("iss") {
        Some(Value::String(iss)) if iss == expected_issuer => {},
        Some(Value::String(iss)) => {
            return Err(AuthError::issuer_mismatch(expected_issuer, iss.as_str()));
        },
        Some(other) => return Err(AuthError::issuer_mismatch(expected_issuer, other.to_string())),
        None => return Err(AuthError::issuer_mismatch(expected_issuer, "<absent>")),
    }

    match claims.token_use() {
        None => Ok(()),
        Some(Value::String(token_use)) if token_use == ID_TOKEN_USE => Ok(()),
        Some(Value::String(token_use)) => Err(AuthError::token_type(token_use.as_str())),
        Some(other) => Err(AuthError::token_type(other.to_string())),
    }
}
