//! Shared test utilities for authentication testing.
//!
//! This module provides two fixed RSA key pairs, token signers, raw token
//! crafting (for attack testing), an in-memory [`KeySetFetcher`] and a
//! ready-wired [`Harness`]. It is feature-gated behind `testutil` to
//! prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! tenantgate-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use tenantgate_authn::testutil::{Harness, TestKey, id_token_claims, issuer_for, sign_token};
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, jwk::JwkSet};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tenantgate_directory::{
    MemoryTenantDirectory, TenantRecord,
    testutil::{TEST_ISSUER_BASE, make_record},
};

use crate::{
    config::AuthnConfig,
    jwks::{KeyFetchError, KeySetFetcher},
    key_cache::JwksKeyCache,
    verifier::TokenVerifier,
};

const TENANT_A_PEM: &str = include_str!("../testdata/rsa_tenant_a.pem");
const TENANT_A_MODULUS: &str = "xHNQIpeIYoKojhOs_E5cravaHAwLXDoUK484GvaFRf1tB9TmRNkIvkMstq-685GtLUVfKDWqMkpj7WSwZGQ6iOqUIdujqv3l3Hcx94wPwSJjkoFFPCcJlX_RKv-GjK6ooXHT7612pSR77p4h58yynuwdHm7p4TpL_gv2wZiVECGCxDFXUAMU4NZnIAcWwcV7nXI2dp7kedGZYahWoddW63LQ44IudWa-h0wBYnNS3WKnAbs-lt95DG2aryYtJfelZZdQJOMGhvKlqmhSKXDANA-N6GMg1iAFsA5bI6ixwIvUAX2IOL2pFk3F1-Z8V9nS_Z9cLG-_rxNnDFu_4eyhKQ";

const TENANT_B_PEM: &str = include_str!("../testdata/rsa_tenant_b.pem");
const TENANT_B_MODULUS: &str = "yNpteVLOOntErnFejIIMrZ1NmRwvBcbfdMazEWos9Lhgb71N49Dh42el5yDvOETshdau34TeMFOBlslcbuXLtNFz-TvdfyFEWTPmIPKr6SaduTVd7vBwspnzNx5PdhL5xLd222cM7BtUSES-fN0scEgzcJzDukYz8Odv-luS5jLzw24XRdYIXp14e5UbzMHcmoGbB5N64ohJ604USkdvphLWO8K0oXuGBiqgtHbDYqI_vrLzdnZUQMq-ARVqKlJ9SG_VNPA67l_QnTOCzufH0UeOTGxZlChg_rG0ssB3S8St9eVeXpOB--jAwmcqhxM4V7j-6A5kCSGs_XE3gPXd_Q";

const EXPONENT: &str = "AQAB";

/// Username carried by [`id_token_claims`].
pub const TEST_USERNAME: &str = "alice";

/// A fixed 2048-bit RSA key pair with a `kid`.
///
/// Two distinct pairs exist so tests can sign as one tenant and verify as
/// another. [`with_kid`](Self::with_kid) relabels a pair, which is how kid
/// collisions across issuers are staged.
#[derive(Debug, Clone)]
pub struct TestKey {
    kid: String,
    pem: &'static str,
    modulus: &'static str,
}

impl TestKey {
    /// The first key pair, `kid` `"tenant-a-2026"`.
    #[must_use]
    pub fn tenant_a() -> Self {
        Self { kid: "tenant-a-2026".into(), pem: TENANT_A_PEM, modulus: TENANT_A_MODULUS }
    }

    /// The second key pair, `kid` `"tenant-b-2026"`.
    #[must_use]
    pub fn tenant_b() -> Self {
        Self { kid: "tenant-b-2026".into(), pem: TENANT_B_PEM, modulus: TENANT_B_MODULUS }
    }

    /// The same key pair published under another `kid`.
    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = kid.into();
        self
    }

    /// The key id.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The public half as a JWK JSON object.
    #[must_use]
    pub fn jwk_json(&self) -> Value {
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "use": "sig",
            "alg": "RS256",
            "n": self.modulus,
            "e": EXPONENT,
        })
    }

    /// The public half as a verification key.
    ///
    /// # Panics
    ///
    /// Panics if the built-in key components are invalid.
    #[must_use]
    pub fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_rsa_components(self.modulus, EXPONENT).expect("valid test RSA components")
    }

    /// The private half as a signing key.
    ///
    /// # Panics
    ///
    /// Panics if the built-in PEM is invalid.
    #[must_use]
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_rsa_pem(self.pem.as_bytes()).expect("valid test RSA PEM")
    }

    /// A JWKS document publishing `keys`.
    ///
    /// # Panics
    ///
    /// Panics if the JWK JSON does not deserialize.
    #[must_use]
    pub fn jwks(keys: &[&Self]) -> JwkSet {
        serde_json::from_value(Self::jwks_json(keys)).expect("valid test JWKS")
    }

    /// A JWKS document publishing `keys`, as JSON.
    #[must_use]
    pub fn jwks_json(keys: &[&Self]) -> Value {
        json!({ "keys": keys.iter().map(|k| k.jwk_json()).collect::<Vec<_>>() })
    }
}

/// The issuer of [`make_record`] for `tenant_id`.
#[must_use]
pub fn issuer_for(tenant_id: &str) -> String {
    format!("{TEST_ISSUER_BASE}/us-east-1_{tenant_id}")
}

/// Claims of a valid identity token of `tenant_id`, issued by `issuer`.
///
/// Contains `iss`, `sub`, `aud`, `exp` (one hour from now), `iat`,
/// `token_use: "id"`, `custom:tenant-id` and `cognito:username`.
#[must_use]
pub fn id_token_claims(issuer: &str, tenant_id: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": issuer,
        "sub": "8d2f0e4c-user",
        "aud": "client-123",
        "exp": now + 3600,
        "iat": now,
        "token_use": "id",
        "custom:tenant-id": tenant_id,
        "cognito:username": TEST_USERNAME,
    })
}

/// Signs `claims` with `key` as an RS256 token carrying `key`'s `kid`.
///
/// # Panics
///
/// Panics if encoding fails (should not happen with valid inputs).
pub fn sign_token(key: &TestKey, claims: &Value) -> String {
    sign_token_with_kid(key, key.kid(), claims)
}

/// Signs `claims` with `key` under an arbitrary `kid`.
///
/// # Panics
///
/// Panics if encoding fails (should not happen with valid inputs).
pub fn sign_token_with_kid(key: &TestKey, kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_owned());
    jsonwebtoken::encode(&header, claims, &key.encoding_key()).expect("Failed to encode test JWT")
}

/// Creates a raw JWT string from arbitrary header and payload JSON.
///
/// The resulting JWT has the structure `{header_b64}.{payload_b64}.`
/// with an empty signature. This is useful for testing rejection of
/// malformed or attack JWTs (e.g., `alg: "none"`, algorithm confusion).
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &Value, payload_json: &Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// An in-memory [`KeySetFetcher`] that counts fetches.
///
/// Unknown issuers answer with [`KeyFetchError::Status`] `404`.
#[derive(Debug, Default)]
pub struct MockKeySetFetcher {
    key_sets: Mutex<HashMap<String, JwkSet>>,
    failure: Mutex<Option<KeyFetchError>>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl MockKeySetFetcher {
    /// Creates a fetcher that knows no issuer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `keys` for `issuer`.
    #[must_use]
    pub fn with_key_set(self, issuer: &str, keys: &[&TestKey]) -> Self {
        self.set_keys(issuer, keys);
        self
    }

    /// Delays every fetch by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replaces the keys published for `issuer`.
    pub fn set_keys(&self, issuer: &str, keys: &[&TestKey]) {
        self.key_sets.lock().insert(issuer.to_owned(), TestKey::jwks(keys));
    }

    /// Fails every fetch with `error` until [`heal`](Self::heal).
    pub fn fail_with(&self, error: KeyFetchError) {
        *self.failure.lock() = Some(error);
    }

    /// Stops failing fetches.
    pub fn heal(&self) {
        *self.failure.lock() = None;
    }

    /// Number of fetches started so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetFetcher for MockKeySetFetcher {
    async fn fetch(&self, issuer: &str) -> Result<JwkSet, KeyFetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        self.key_sets.lock().get(issuer).cloned().ok_or(KeyFetchError::Status(404))
    }
}

/// A [`TokenVerifier`] over an in-memory directory and a
/// [`MockKeySetFetcher`].
#[derive(Debug)]
pub struct Harness {
    /// The verifier under test.
    pub verifier: TokenVerifier,
    /// The directory the verifier reads.
    pub directory: MemoryTenantDirectory,
    /// The fetcher behind the verifier's key cache.
    pub fetcher: Arc<MockKeySetFetcher>,
}

impl Harness {
    /// One tenant per `(tenant_id, key)`, each issued by
    /// [`issuer_for`]`(tenant_id)` and publishing `key`.
    #[must_use]
    pub fn new(tenants: &[(&str, &TestKey)]) -> Self {
        Self::with_config(tenants, AuthnConfig::default())
    }

    /// Like [`new`](Self::new) with a custom configuration.
    #[must_use]
    pub fn with_config(tenants: &[(&str, &TestKey)], config: AuthnConfig) -> Self {
        let records = tenants.iter().map(|(tenant_id, key)| (make_record(tenant_id), *key)).collect();
        Self::with_records(records, config)
    }

    /// One tenant per record; each record's `auth_server_url` publishes its
    /// key.
    #[must_use]
    pub fn with_records(records: Vec<(TenantRecord, &TestKey)>, config: AuthnConfig) -> Self {
        let directory = MemoryTenantDirectory::new();
        let mut fetcher = MockKeySetFetcher::new();
        for (record, key) in records {
            fetcher = fetcher.with_key_set(&record.auth_server_url, &[key]);
            directory.insert(record);
        }
        let fetcher = Arc::new(fetcher);
        let key_cache =
            Arc::new(JwksKeyCache::new(Arc::clone(&fetcher) as Arc<dyn KeySetFetcher>, &config));
        let verifier = TokenVerifier::new(Arc::new(directory.clone()), key_cache, &config);
        Self { verifier, directory, fetcher }
    }
}

/// Asserts that a [`Result<T, AuthError>`] is an `Err` matching the given
/// variant.
///
/// The result expression is evaluated once, so `.await` expressions may be
/// passed directly.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use tenantgate_authn::assert_auth_error;
/// use tenantgate_authn::error::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::token_expired());
/// assert_auth_error!(result, TokenExpired);
/// ```
///
/// [`Result<T, AuthError>`]: crate::error::AuthError
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {{
        let result = $result;
        assert!(
            matches!(result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            result,
        );
    }};
    ($result:expr, $variant:ident, $msg:expr) => {{
        let result = $result;
        assert!(
            matches!(result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            result,
        );
    }};
}
