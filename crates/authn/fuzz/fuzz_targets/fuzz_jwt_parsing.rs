//! Fuzz target for credential parsing.
//!
//! Feeds arbitrary byte strings as `Authorization` values to the unverified
//! parsing path: bearer stripping, header and claim decoding, algorithm and
//! `kid` checks, and the issuer/token-type check. Every result must be either
//! `Ok(...)` or `Err(AuthError)`.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tenantgate_authn::{
    jwt::{check_issuer_and_token_use, decode_jwt_header, decode_unverified_claims},
    strip_bearer,
    validation::{validate_algorithm, validate_kid},
};

fuzz_target!(|data: &[u8]| {
    // Header values reaching the verifier are always visible ASCII strings.
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let token = strip_bearer(raw);

    if let Ok(header) = decode_jwt_header(token) {
        let _ = validate_algorithm(&header.alg);
        if let Ok(kid) = header.require_kid() {
            let _ = validate_kid(kid);
        }
    }

    if let Ok(claims) = decode_unverified_claims(token) {
        let _ = check_issuer_and_token_use(&claims, "https://idp.test/pools/us-east-1_acmecorp");
        if let Some(iss) = claims.issuer() {
            let _ = check_issuer_and_token_use(&claims, iss);
        }
        let _ = claims.require("custom:tenant-id");
        let _ = claims.expires_at();
    }
});
