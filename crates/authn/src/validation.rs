//! JWT header validation.
//!
//! Security checks applied to the unverified header before any key is
//! looked up: the algorithm must be RS256 and the `kid` must be a plausible
//! key identifier.
//!
//! # Security
//!
//! - Symmetric algorithms and `none` are always rejected, so a public key
//!   can never be reused as an HMAC secret
//! - Only RS256 is accepted; anything else fails before a fetch is made

use crate::error::AuthError;

/// Forbidden JWT algorithms that are never accepted.
///
/// - `none`: no signature at all
/// - `HS256`, `HS384`, `HS512`: symmetric, keyed with material the identity
///   provider publishes
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted JWT algorithms.
///
/// Identity providers sign identity tokens with RS256 and publish the
/// public half in their JWKS, so it is the only algorithm verified.
pub const ACCEPTED_ALGORITHMS: &[&str] = &["RS256"];

/// Maximum length of a `kid` header value.
pub const MAX_KID_LEN: usize = 256;

/// Validate JWT algorithm against security policies.
///
/// # Errors
///
/// Returns [`AuthError::SignatureVerification`] if the algorithm is in
/// [`FORBIDDEN_ALGORITHMS`] or not in [`ACCEPTED_ALGORITHMS`].
///
/// # Examples
///
/// ```
/// use tenantgate_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("RS256").is_ok());
/// assert!(validate_algorithm("HS256").is_err());
/// assert!(validate_algorithm("none").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.iter().any(|forbidden| forbidden.eq_ignore_ascii_case(alg)) {
        return Err(AuthError::signature_verification(format!(
            "Algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::signature_verification(format!(
            "Algorithm '{alg}' is not in accepted list (only RS256 is supported)"
        )));
    }

    Ok(())
}

/// Validate a `kid` header value.
///
/// # Errors
///
/// Returns [`AuthError::MalformedToken`] if the kid is empty, longer than
/// [`MAX_KID_LEN`], or contains control characters.
pub fn validate_kid(kid: &str) -> Result<(), AuthError> {
    if kid.is_empty() {
        return Err(AuthError::malformed_token("kid must not be empty"));
    }
    if kid.len() > MAX_KID_LEN {
        return Err(AuthError::malformed_token(format!(
            "kid is longer than {MAX_KID_LEN} bytes"
        )));
    }
    if kid.chars().any(char::is_control) {
        return Err(AuthError::malformed_token("kid contains control characters"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_validate_algorithm_rs256_accepted() {
        assert!(validate_algorithm("RS256").is_ok());
    }

    #[test]
    fn test_forbidden_algorithms_each_rejected_with_security_message() {
        for alg in FORBIDDEN_ALGORITHMS {
            let result = validate_algorithm(alg);
            assert!(
                matches!(result, Err(AuthError::SignatureVerification(ref msg)) if msg.contains("not allowed for security reasons")),
                "Expected security rejection for forbidden algorithm '{alg}'"
            );
        }
    }

    #[rstest]
    #[case("NONE")]
    #[case("None")]
    #[case("hs256")]
    fn test_forbidden_algorithms_case_insensitive(#[case] alg: &str) {
        assert!(
            matches!(validate_algorithm(alg), Err(AuthError::SignatureVerification(ref msg)) if msg.contains("security reasons"))
        );
    }

    #[rstest]
    #[case("ES256")]
    #[case("EdDSA")]
    #[case("RS512")]
    #[case("PS256")]
    #[case("")]
    fn test_validate_algorithm_not_in_list(#[case] alg: &str) {
        assert!(
            matches!(validate_algorithm(alg), Err(AuthError::SignatureVerification(ref msg)) if msg.contains("not in accepted list"))
        );
    }

    #[test]
    fn test_accepted_algorithms_constant() {
        assert_eq!(ACCEPTED_ALGORITHMS, &["RS256"]);
    }

    #[rstest]
    #[case("abc123")]
    #[case("kKm8jV28h5N0d+0nNQK0Ko6lS3g=")]
    #[case("2024-01-rotation")]
    fn test_validate_kid_accepts_provider_kids(#[case] kid: &str) {
        assert!(validate_kid(kid).is_ok());
    }

    #[rstest]
    #[case::empty("")]
    #[case::null_byte("key\0id")]
    #[case::newline("key\nid")]
    fn test_validate_kid_rejects(#[case] kid: &str) {
        assert!(matches!(validate_kid(kid), Err(AuthError::MalformedToken(_))));
    }

    #[test]
    fn test_validate_kid_rejects_oversized() {
        let kid = "k".repeat(MAX_KID_LEN + 1);
        assert!(matches!(validate_kid(&kid), Err(AuthError::MalformedToken(_))));
        assert!(validate_kid(&"k".repeat(MAX_KID_LEN)).is_ok());
    }
}
