//! Structured fuzz target for identity token claims.
//!
//! Uses the `arbitrary` crate to generate structured JWT-like inputs,
//! assembles base64-encoded tokens from them, and feeds them through the
//! unverified parsing path and tenant resolution. This reaches deeper code
//! paths than raw byte fuzzing because the inputs are plausible tokens.

#![no_main]

use arbitrary::Arbitrary;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, Value, json};
use tenantgate_authn::{
    AuthnConfig, TenantResolver,
    jwt::{check_issuer_and_token_use, decode_jwt_header, decode_unverified_claims},
    validation::validate_algorithm,
};

/// Structured input representing a fuzzed identity token.
#[derive(Debug, Arbitrary)]
struct FuzzedToken {
    alg: FuzzedAlg,
    kid: Option<String>,
    iss: Option<String>,
    tenant: FuzzedClaim,
    username: FuzzedClaim,
    token_use: FuzzedClaim,
    exp: Option<i64>,
    signature_bytes: Vec<u8>,
    bearer_prefix: bool,
}

/// Algorithm values covering known attack vectors.
#[derive(Debug, Arbitrary)]
enum FuzzedAlg {
    RS256,
    None,
    HS256,
    ES256,
    Other(String),
}

impl FuzzedAlg {
    fn as_str(&self) -> &str {
        match self {
            Self::RS256 => "RS256",
            Self::None => "none",
            Self::HS256 => "HS256",
            Self::ES256 => "ES256",
            Self::Other(s) => s,
        }
    }
}

/// Shapes a claim can take: absent, null, a string, or another JSON type.
#[derive(Debug, Arbitrary)]
enum FuzzedClaim {
    Absent,
    Null,
    Text(String),
    Number(i64),
    List(Vec<String>),
}

impl FuzzedClaim {
    fn insert_into(&self, payload: &mut Map<String, Value>, name: &str) {
        let value = match self {
            Self::Absent => return,
            Self::Null => Value::Null,
            Self::Text(s) => json!(s),
            Self::Number(n) => json!(n),
            Self::List(items) => json!(items),
        };
        payload.insert(name.to_owned(), value);
    }
}

fn build_token(input: &FuzzedToken) -> String {
    let mut header = Map::new();
    header.insert("alg".to_owned(), json!(input.alg.as_str()));
    if let Some(kid) = &input.kid {
        header.insert("kid".to_owned(), json!(kid));
    }

    let mut payload = Map::new();
    if let Some(iss) = &input.iss {
        payload.insert("iss".to_owned(), json!(iss));
    }
    if let Some(exp) = input.exp {
        payload.insert("exp".to_owned(), json!(exp));
    }
    input.tenant.insert_into(&mut payload, "custom:tenant-id");
    input.username.insert_into(&mut payload, "cognito:username");
    input.token_use.insert_into(&mut payload, "token_use");

    let header_b64 = URL_SAFE_NO_PAD.encode(Value::Object(header).to_string());
    let payload_b64 = URL_SAFE_NO_PAD.encode(Value::Object(payload).to_string());
    let sig_b64 = URL_SAFE_NO_PAD.encode(&input.signature_bytes);
    let prefix = if input.bearer_prefix { "Bearer " } else { "" };

    format!("{prefix}{header_b64}.{payload_b64}.{sig_b64}")
}

fuzz_target!(|input: FuzzedToken| {
    let authorization = build_token(&input);
    let token = tenantgate_authn::strip_bearer(&authorization);

    if let Ok(header) = decode_jwt_header(token) {
        let _ = validate_algorithm(&header.alg);
    }

    if let Ok(claims) = decode_unverified_claims(token) {
        let _ = check_issuer_and_token_use(&claims, "https://idp.test/pools/us-east-1_acmecorp");
        let _ = claims.require("custom:tenant-id");
        let _ = claims.require("cognito:username");
    }

    // Tenant resolution from the claim must never panic either.
    let resolver = TenantResolver::new(&AuthnConfig::default());
    if let Ok(tenant) = resolver.resolve_claim(&authorization) {
        assert!(!tenant.as_str().is_empty());
    }
});
