//! Authentication error types.
//!
//! Every failure in tenant resolution, key retrieval or token verification
//! is an [`AuthError`]. Variants are precise so logs can tell a missing
//! tenant from a forged token; the response a caller sends back is always
//! the same [`Rejection`].

use http::{HeaderValue, StatusCode};
use tenantgate_directory::{DirectoryError, TenantId};
use thiserror::Error;

use crate::jwks::KeyFetchError;

/// Authentication errors.
///
/// # Non-exhaustive
///
/// New variants may be added in minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No tenant could be derived from the request.
    #[error("Unresolved tenant: {0}")]
    UnresolvedTenant(String),

    /// The resolved tenant has no directory record.
    #[error("Tenant not found: {tenant_id}")]
    TenantNotFound {
        /// The tenant that was looked up.
        tenant_id: TenantId,
    },

    /// The tenant's directory record is unusable.
    #[error("Tenant {tenant_id} is misconfigured: {reason}")]
    TenantMisconfigured {
        /// The tenant whose record is unusable.
        tenant_id: TenantId,
        /// What is wrong with the record.
        reason: String,
    },

    /// The directory lookup itself failed.
    #[error("Directory error: {0}")]
    Directory(
        /// The underlying directory error.
        #[source]
        DirectoryError,
    ),

    /// The issuer's key set could not be retrieved.
    #[error("Key fetch failed for issuer {issuer}: {source}")]
    KeyFetch {
        /// Issuer whose key set was requested.
        issuer: String,
        /// Why the fetch failed.
        #[source]
        source: KeyFetchError,
    },

    /// The token is not a structurally valid JWT.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The signature did not verify, the algorithm is not accepted, or no
    /// key matches the token's `kid`.
    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    /// The token's `exp` is in the past.
    #[error("Token expired")]
    TokenExpired,

    /// The token was issued by a different identity provider than the
    /// tenant's.
    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch {
        /// The tenant's issuer.
        expected: String,
        /// The token's `iss` claim.
        actual: String,
    },

    /// The token is not an identity token.
    #[error("Unexpected token type: {0}")]
    TokenType(String),

    /// The token's tenant claim names a different tenant than the one the
    /// request was resolved to.
    #[error("Tenant mismatch: resolved {resolved}, token claims {claimed}")]
    TenantMismatch {
        /// The tenant the request was resolved to.
        resolved: TenantId,
        /// The tenant named by the token.
        claimed: String,
    },

    /// A required claim is absent, null, non-string or empty.
    #[error("Missing claim: {0}")]
    ClaimMissing(String),
}

impl AuthError {
    /// Creates an `UnresolvedTenant` error.
    #[must_use]
    pub fn unresolved_tenant(reason: impl Into<String>) -> Self {
        Self::UnresolvedTenant(reason.into())
    }

    /// Creates a `TenantNotFound` error.
    #[must_use]
    pub fn tenant_not_found(tenant_id: TenantId) -> Self {
        Self::TenantNotFound { tenant_id }
    }

    /// Creates a `TenantMisconfigured` error.
    #[must_use]
    pub fn tenant_misconfigured(tenant_id: TenantId, reason: impl Into<String>) -> Self {
        Self::TenantMisconfigured { tenant_id, reason: reason.into() }
    }

    /// Creates a `KeyFetch` error.
    #[must_use]
    pub fn key_fetch(issuer: impl Into<String>, source: KeyFetchError) -> Self {
        Self::KeyFetch { issuer: issuer.into(), source }
    }

    /// Creates a `MalformedToken` error.
    #[must_use]
    pub fn malformed_token(message: impl Into<String>) -> Self {
        Self::MalformedToken(message.into())
    }

    /// Creates a `SignatureVerification` error.
    #[must_use]
    pub fn signature_verification(message: impl Into<String>) -> Self {
        Self::SignatureVerification(message.into())
    }

    /// Creates a `TokenExpired` error.
    #[must_use]
    pub fn token_expired() -> Self {
        Self::TokenExpired
    }

    /// Creates an `IssuerMismatch` error.
    #[must_use]
    pub fn issuer_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::IssuerMismatch { expected: expected.into(), actual: actual.into() }
    }

    /// Creates a `TokenType` error.
    #[must_use]
    pub fn token_type(actual: impl Into<String>) -> Self {
        Self::TokenType(actual.into())
    }

    /// Creates a `TenantMismatch` error.
    #[must_use]
    pub fn tenant_mismatch(resolved: TenantId, claimed: impl Into<String>) -> Self {
        Self::TenantMismatch { resolved, claimed: claimed.into() }
    }

    /// Creates a `ClaimMissing` error.
    #[must_use]
    pub fn claim_missing(claim: impl Into<String>) -> Self {
        Self::ClaimMissing(claim.into())
    }

    /// Returns a stable snake_case label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnresolvedTenant(_) => "unresolved_tenant",
            Self::TenantNotFound { .. } => "tenant_not_found",
            Self::TenantMisconfigured { .. } => "tenant_misconfigured",
            Self::Directory(_) => "directory",
            Self::KeyFetch { .. } => "key_fetch",
            Self::MalformedToken(_) => "malformed_token",
            Self::SignatureVerification(_) => "signature_verification",
            Self::TokenExpired => "token_expired",
            Self::IssuerMismatch { .. } => "issuer_mismatch",
            Self::TokenType(_) => "token_type",
            Self::TenantMismatch { .. } => "tenant_mismatch",
            Self::ClaimMissing(_) => "claim_missing",
        }
    }

    /// Returns the response sent to the caller.
    ///
    /// Identical for every variant.
    #[must_use]
    pub fn rejection(&self) -> Rejection {
        Rejection::UNAUTHENTICATED
    }
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        AuthError::Directory(err)
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::ImmatureSignature => {
                AuthError::SignatureVerification("token not yet valid".into())
            },
            ErrorKind::InvalidSignature => {
                AuthError::SignatureVerification("signature does not match".into())
            },
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                AuthError::SignatureVerification("algorithm not accepted".into())
            },
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                AuthError::SignatureVerification("verification key unusable".into())
            },
            ErrorKind::MissingRequiredClaim(claim) => AuthError::ClaimMissing(claim.clone()),
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => AuthError::MalformedToken(format!("JWT error: {err}")),
            _ => AuthError::SignatureVerification(format!("JWT error: {err}")),
        }
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// The uniform response for every authentication failure.
///
/// Carries nothing about the cause, so callers cannot probe which tenants
/// exist or which keys an issuer publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    status: StatusCode,
    message: &'static str,
}

impl Rejection {
    /// `401 Unauthorized` with body `unauthenticated`.
    pub const UNAUTHENTICATED: Rejection =
        Rejection { status: StatusCode::UNAUTHORIZED, message: "unauthenticated" };

    /// Returns the HTTP status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response body.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// Returns the `WWW-Authenticate` challenge.
    #[must_use]
    pub fn www_authenticate(&self) -> HeaderValue {
        HeaderValue::from_static("Bearer")
    }
}

impl From<&AuthError> for Rejection {
    fn from(err: &AuthError) -> Self {
        err.rejection()
    }
}

/// Invalid [`AuthnConfig`](crate::AuthnConfig) value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A field holds an unusable value.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value is unusable.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn tenant() -> TenantId {
        TenantId::parse("acmecorp").expect("valid")
    }

    #[test]
    fn test_error_display() {
        assert_eq!(AuthError::malformed_token("bad").to_string(), "Malformed token: bad");
        assert_eq!(AuthError::token_expired().to_string(), "Token expired");
        assert_eq!(
            AuthError::claim_missing("custom:tenant-id").to_string(),
            "Missing claim: custom:tenant-id"
        );
        assert_eq!(
            AuthError::issuer_mismatch("https://a", "https://b").to_string(),
            "Issuer mismatch: expected https://a, got https://b"
        );
        assert_eq!(
            AuthError::tenant_not_found(tenant()).to_string(),
            "Tenant not found: acmecorp"
        );
    }

    #[rstest]
    #[case::unresolved(AuthError::unresolved_tenant("no origin"), "unresolved_tenant")]
    #[case::not_found(AuthError::tenant_not_found(tenant()), "tenant_not_found")]
    #[case::misconfigured(AuthError::tenant_misconfigured(tenant(), "x"), "tenant_misconfigured")]
    #[case::directory(AuthError::from(DirectoryError::timeout()), "directory")]
    #[case::key_fetch(AuthError::key_fetch("https://idp", KeyFetchError::Timeout), "key_fetch")]
    #[case::malformed(AuthError::malformed_token("x"), "malformed_token")]
    #[case::signature(AuthError::signature_verification("x"), "signature_verification")]
    #[case::expired(AuthError::token_expired(), "token_expired")]
    #[case::issuer(AuthError::issuer_mismatch("a", "b"), "issuer_mismatch")]
    #[case::token_type(AuthError::token_type("access"), "token_type")]
    #[case::tenant(AuthError::tenant_mismatch(tenant(), "globex"), "tenant_mismatch")]
    #[case::claim(AuthError::claim_missing("sub"), "claim_missing")]
    fn test_every_variant_rejects_uniformly(#[case] err: AuthError, #[case] kind: &str) {
        assert_eq!(err.kind(), kind);
        let rejection = err.rejection();
        assert_eq!(rejection, Rejection::UNAUTHENTICATED);
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(rejection.message(), "unauthenticated");
        assert!(!rejection.message().contains("acmecorp"));
    }

    #[test]
    fn test_error_from_jsonwebtoken() {
        use jsonwebtoken::errors::{Error, ErrorKind};

        assert!(matches!(
            AuthError::from(Error::from(ErrorKind::ExpiredSignature)),
            AuthError::TokenExpired
        ));
        assert!(matches!(
            AuthError::from(Error::from(ErrorKind::InvalidSignature)),
            AuthError::SignatureVerification(_)
        ));
        assert!(matches!(
            AuthError::from(Error::from(ErrorKind::InvalidToken)),
            AuthError::MalformedToken(_)
        ));
        assert!(matches!(
            AuthError::from(Error::from(ErrorKind::MissingRequiredClaim("exp".into()))),
            AuthError::ClaimMissing(ref c) if c == "exp"
        ));
    }

    #[test]
    fn test_key_fetch_keeps_source() {
        use std::error::Error as _;

        let err = AuthError::key_fetch("https://idp", KeyFetchError::Status(503));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_www_authenticate_is_bearer() {
        assert_eq!(Rejection::UNAUTHENTICATED.www_authenticate(), "Bearer");
    }
}
