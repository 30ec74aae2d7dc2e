//! Tenant-scoped identity token verification.
//!
//! [`TokenVerifier`] ties the pieces together: it resolves the tenant,
//! loads the tenant's record, verifies the token against that tenant's
//! issuer and keys, and produces a [`TenantIdentityContext`].
//!
//! # Verification order
//!
//! 1. Strip `"Bearer "` and parse the token structure
//! 2. Reject algorithms other than RS256, then require a well-formed `kid`
//! 3. Verify the signature with the key named by `kid`, fetched from the
//!    tenant's own issuer
//! 4. Check `iss` against the tenant's issuer and `token_use`
//! 5. Require the tenant claim (and the username claim, if configured)
//!
//! Each failure maps to one [`AuthError`] variant. Callers answer all of
//! them with [`AuthError::rejection`].

use std::sync::Arc;

use http::{HeaderMap, header::ORIGIN};
use tenantgate_directory::{TenantDirectory, TenantId, TenantRecord};

use crate::{
    auth_config::AuthConfig,
    config::AuthnConfig,
    context::TenantIdentityContext,
    error::AuthError,
    jwks::KeyFetchError,
    jwt::{
        check_issuer_and_token_use, decode_jwt_header, decode_unverified_claims, strip_bearer,
        verify_signature,
    },
    key_cache::JwksKeyCache,
    resolver::TenantResolver,
    validation::{validate_algorithm, validate_kid},
};

/// Verifies identity tokens against the issuer of the tenant they are
/// presented for.
///
/// Cheap to share behind an [`Arc`]; every collaborator is already shared.
pub struct TokenVerifier {
    directory: Arc<dyn TenantDirectory>,
    key_cache: Arc<JwksKeyCache>,
    resolver: TenantResolver,
    config: AuthnConfig,
}

impl TokenVerifier {
    /// Creates a verifier.
    #[must_use]
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        key_cache: Arc<JwksKeyCache>,
        config: &AuthnConfig,
    ) -> Self {
        Self { directory, key_cache, resolver: TenantResolver::new(config), config: config.clone() }
    }

    /// Creates a verifier whose key cache fetches over HTTPS.
    ///
    /// # Errors
    ///
    /// Returns [`KeyFetchError::Client`] if the HTTP client cannot be built.
    pub fn from_config(
        directory: Arc<dyn TenantDirectory>,
        config: &AuthnConfig,
    ) -> Result<Self, KeyFetchError> {
        let key_cache = Arc::new(JwksKeyCache::from_config(config)?);
        Ok(Self::new(directory, key_cache, config))
    }

    /// The key cache.
    #[must_use]
    pub fn key_cache(&self) -> &Arc<JwksKeyCache> {
        &self.key_cache
    }

    /// The tenant resolver.
    #[must_use]
    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    /// Verifies `authorization` as an identity token of `record`'s tenant.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] of the first failed check; see the
    /// [module docs](self) for the order.
    #[tracing::instrument(skip(self, authorization, record), fields(tenant_id = %record.tenant_id))]
    pub async fn verify_for_tenant(
        &self,
        authorization: &str,
        record: &TenantRecord,
    ) -> Result<TenantIdentityContext, AuthError> {
        let token = strip_bearer(authorization);

        let header = decode_jwt_header(token)?;
        decode_unverified_claims(token)?;
        validate_algorithm(&header.alg)?;
        let kid = header.require_kid()?;
        validate_kid(kid)?;

        let issuer = record.expected_issuer().map_err(|e| {
            AuthError::tenant_misconfigured(record.tenant_id.clone(), e.to_string())
        })?;

        let key = self.key_cache.get_key(issuer, kid).await?;
        let claims = verify_signature(token, &key, self.config.leeway())?;
        check_issuer_and_token_use(&claims, issuer)?;

        let claimed = claims.require(self.config.tenant_claim())?;
        if claimed != record.tenant_id.as_str() {
            return Err(AuthError::tenant_mismatch(record.tenant_id.clone(), claimed));
        }

        let username_claim = self.config.username_claim();
        let username = if self.config.require_username() {
            Some(claims.require(username_claim)?.to_owned())
        } else {
            claims.string_claim(username_claim).map(str::to_owned)
        };

        tracing::debug!(kid, "token verified");
        Ok(TenantIdentityContext::new(record, username, claims))
    }

    /// Authenticates a browser request: the tenant comes from `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnresolvedTenant`] if the origin names no tenant,
    /// [`AuthError::TenantNotFound`] if the tenant is unknown, or any error
    /// of [`verify_for_tenant`](Self::verify_for_tenant).
    #[tracing::instrument(skip(self, authorization))]
    pub async fn authenticate_with_origin(
        &self,
        origin: Option<&str>,
        authorization: &str,
    ) -> Result<TenantIdentityContext, AuthError> {
        let result = async {
            let tenant_id = self.resolver.resolve_origin(origin).into_result()?;
            let record = self.lookup(&tenant_id).await?;
            self.verify_for_tenant(authorization, &record).await
        }
        .await;
        result.inspect_err(log_rejection)
    }

    /// Authenticates a request without an origin: the tenant comes from the
    /// token's tenant claim, and the token must then verify against that
    /// tenant's issuer.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ClaimMissing`] if the token names no tenant,
    /// [`AuthError::TenantNotFound`] if the tenant is unknown, or any error
    /// of [`verify_for_tenant`](Self::verify_for_tenant).
    #[tracing::instrument(skip(self, authorization))]
    pub async fn authenticate_with_claim(
        &self,
        authorization: &str,
    ) -> Result<TenantIdentityContext, AuthError> {
        let result = async {
            let tenant_id = self.resolver.resolve_claim(authorization)?;
            let record = self.lookup(&tenant_id).await?;
            self.verify_for_tenant(authorization, &record).await
        }
        .await;
        result.inspect_err(log_rejection)
    }

    /// Authenticates a request from its headers.
    ///
    /// The credential is read from the configured identity header. Requests
    /// with an `Origin` header resolve the tenant from it; others from the
    /// token's tenant claim.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedToken`] if the identity header is
    /// missing or not visible ASCII, or any error of the selected flow.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<TenantIdentityContext, AuthError> {
        let authorization = match headers.get(self.config.identity_header()) {
            Some(value) => value
                .to_str()
                .map_err(|_| AuthError::malformed_token("credential is not visible ASCII")),
            None => Err(AuthError::malformed_token("missing credential")),
        }
        .inspect_err(log_rejection)?;

        match headers.get(ORIGIN) {
            Some(origin) => {
                let origin = origin
                    .to_str()
                    .map_err(|_| AuthError::unresolved_tenant("origin is not visible ASCII"))
                    .inspect_err(log_rejection)?;
                self.authenticate_with_origin(Some(origin), authorization).await
            },
            None => self.authenticate_with_claim(authorization).await,
        }
    }

    /// Returns the browser sign-in settings of the tenant addressed by
    /// `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnresolvedTenant`], [`AuthError::TenantNotFound`]
    /// or [`AuthError::TenantMisconfigured`].
    #[tracing::instrument(skip(self))]
    pub async fn auth_config(&self, origin: Option<&str>) -> Result<AuthConfig, AuthError> {
        let result = async {
            let tenant_id = self.resolver.resolve_origin(origin).into_result()?;
            let record = self.lookup(&tenant_id).await?;
            AuthConfig::for_tenant(&record)
        }
        .await;
        result.inspect_err(log_rejection)
    }

    async fn lookup(&self, tenant_id: &TenantId) -> Result<TenantRecord, AuthError> {
        self.directory
            .lookup(tenant_id)
            .await?
            .ok_or_else(|| AuthError::tenant_not_found(tenant_id.clone()))
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("key_cache", &self.key_cache)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

fn log_rejection(err: &AuthError) {
    match err {
        AuthError::Directory(_) | AuthError::KeyFetch { .. } => {
            tracing::error!(reason = err.kind(), error = %err, "Authentication unavailable");
        },
        _ => tracing::warn!(reason = err.kind(), error = %err, "Authentication rejected"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use http::HeaderValue;
    use serde_json::json;
    use tenantgate_directory::{DirectoryError, testutil::FailingDirectory};

    use super::*;
    use crate::{
        assert_auth_error,
        context::ROLE_ADMIN,
        testutil::{
            Harness, MockKeySetFetcher, TestKey, id_token_claims, issuer_for, sign_token,
            sign_token_with_kid,
        },
    };

    fn record(tenant: &str) -> TenantRecord {
        tenantgate_directory::testutil::make_record(tenant)
    }

    // ===== End to end =====

    #[tokio::test]
    async fn test_verify_grants_role_admin() {
        let key = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &key)]);
        let token = sign_token(&key, &id_token_claims(&issuer_for("acmecorp"), "acmecorp"));

        let ctx = harness
            .verifier
            .authenticate_with_claim(&format!("Bearer {token}"))
            .await
            .expect("verified");

        assert_eq!(ctx.tenant_id().as_str(), "acmecorp");
        assert_eq!(ctx.username(), Some("alice"));
        assert_eq!(ctx.issuer(), Some(issuer_for("acmecorp").as_str()));
        assert_eq!(ctx.authorities().iter().collect::<Vec<_>>(), vec![ROLE_ADMIN]);
    }

    #[tokio::test]
    async fn test_verify_with_pool_issuer() {
        let key = TestKey::tenant_a();
        let record = TenantRecord::builder()
            .tenant_id(TenantId::parse("acmecorp").expect("valid"))
            .auth_server_url("https://idp/pools/us-east-1_ABC")
            .build()
            .expect("derivable");
        let harness = Harness::with_records(vec![(record, &key)], AuthnConfig::default());
        let token = sign_token(&key, &id_token_claims("https://idp/pools/us-east-1_ABC", "acmecorp"));

        let ctx = harness.verifier.authenticate_with_claim(&token).await.expect("verified");
        assert_eq!(ctx.tenant_id().as_str(), "acmecorp");
        assert_eq!(ctx.provider_pool_id(), "us-east-1_ABC");
        assert!(ctx.has_authority(ROLE_ADMIN));
    }

    #[tokio::test]
    async fn test_authenticate_with_origin() {
        let key = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &key)]);
        let token = sign_token(&key, &id_token_claims(&issuer_for("acmecorp"), "acmecorp"));

        let ctx = harness
            .verifier
            .authenticate_with_origin(Some("https://acmecorp.example.com"), &token)
            .await
            .expect("verified");
        assert_eq!(ctx.tenant_id().as_str(), "acmecorp");
    }

    // ===== Issuer isolation =====

    #[tokio::test]
    async fn test_token_of_other_tenant_is_rejected() {
        let a = TestKey::tenant_a();
        let b = TestKey::tenant_b();
        let harness = Harness::new(&[("acmecorp", &a), ("globex", &b)]);
        let token = sign_token(&b, &id_token_claims(&issuer_for("globex"), "globex"));

        let result = harness.verifier.verify_for_tenant(&token, &record("acmecorp")).await;
        assert_auth_error!(result, SignatureVerification);
    }

    #[tokio::test]
    async fn test_kid_collision_across_issuers_is_rejected() {
        let a = TestKey::tenant_a();
        let b = TestKey::tenant_b().with_kid(a.kid());
        let harness = Harness::new(&[("acmecorp", &a), ("globex", &b)]);
        // Signed by globex's key under acmecorp's kid and claims.
        let token = sign_token(&b, &id_token_claims(&issuer_for("acmecorp"), "acmecorp"));

        let result = harness.verifier.verify_for_tenant(&token, &record("acmecorp")).await;
        assert_auth_error!(result, SignatureVerification);
    }

    #[tokio::test]
    async fn test_issuer_mismatch() {
        let a = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &a)]);
        let token = sign_token(&a, &id_token_claims(&issuer_for("globex"), "acmecorp"));

        let result = harness.verifier.verify_for_tenant(&token, &record("acmecorp")).await;
        assert_auth_error!(result, IssuerMismatch);
    }

    #[tokio::test]
    async fn test_tenant_claim_must_match_record() {
        let a = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &a)]);
        let token = sign_token(&a, &id_token_claims(&issuer_for("acmecorp"), "globex"));

        let result = harness.verifier.verify_for_tenant(&token, &record("acmecorp")).await;
        assert_auth_error!(result, TenantMismatch);
    }

    #[tokio::test]
    async fn test_origin_and_claim_must_agree() {
        let a = TestKey::tenant_a();
        let b = TestKey::tenant_b();
        let harness = Harness::new(&[("acmecorp", &a), ("globex", &b)]);
        let token = sign_token(&b, &id_token_claims(&issuer_for("globex"), "globex"));

        let result = harness
            .verifier
            .authenticate_with_origin(Some("https://acmecorp.example.com"), &token)
            .await;
        assert_auth_error!(result, SignatureVerification);
    }

    // ===== Claims =====

    #[tokio::test]
    async fn test_missing_tenant_claim() {
        let a = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &a)]);
        let mut claims = id_token_claims(&issuer_for("acmecorp"), "acmecorp");
        claims.as_object_mut().expect("object").remove("custom:tenant-id");
        let token = sign_token(&a, &claims);

        let result = harness.verifier.verify_for_tenant(&token, &record("acmecorp")).await;
        assert!(matches!(result, Err(AuthError::ClaimMissing(ref c)) if c == "custom:tenant-id"));
    }

    #[tokio::test]
    async fn test_null_tenant_claim() {
        let a = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &a)]);
        let mut claims = id_token_claims(&issuer_for("acmecorp"), "acmecorp");
        claims["custom:tenant-id"] = json!(null);
        let token = sign_token(&a, &claims);

        let result = harness.verifier.verify_for_tenant(&token, &record("acmecorp")).await;
        assert_auth_error!(result, ClaimMissing);
    }

    #[tokio::test]
    async fn test_missing_username_when_required() {
        let a = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &a)]);
        let mut claims = id_token_claims(&issuer_for("acmecorp"), "acmecorp");
        claims.as_object_mut().expect("object").remove("cognito:username");
        let token = sign_token(&a, &claims);

        let result = harness.verifier.verify_for_tenant(&token, &record("acmecorp")).await;
        assert!(matches!(result, Err(AuthError::ClaimMissing(ref c)) if c == "cognito:username"));
    }

    #[tokio::test]
    async fn test_username_optional() {
        let a = TestKey::tenant_a();
        let config = AuthnConfig::builder().require_username(false).build().expect("valid");
        let harness = Harness::with_config(&[("acmecorp", &a)], config);
        let mut claims = id_token_claims(&issuer_for("acmecorp"), "acmecorp");
        claims.as_object_mut().expect("object").remove("cognito:username");
        let token = sign_token(&a, &claims);

        let ctx = harness
            .verifier
            .verify_for_tenant(&token, &record("acmecorp"))
            .await
            .expect("verified");
        assert_eq!(ctx.username(), None);
    }

    #[tokio::test]
    async fn test_access_token_rejected() {
        let a = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &a)]);
        let mut claims = id_token_claims(&issuer_for("acmecorp"), "acmecorp");
        claims["token_use"] = json!("access");
        let token = sign_token(&a, &claims);

        let result = harness.verifier.verify_for_tenant(&token, &record("acmecorp")).await;
        assert_auth_error!(result, TokenType);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let a = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &a)]);
        let mut claims = id_token_claims(&issuer_for("acmecorp"), "acmecorp");
        claims["exp"] = json!(chrono::Utc::now().timestamp() - 3600);
        let token = sign_token(&a, &claims);

        let result = harness.verifier.verify_for_tenant(&token, &record("acmecorp")).await;
        assert_auth_error!(result, TokenExpired);
    }

    // ===== Structure =====

    #[tokio::test]
    async fn test_malformed_token_does_not_fetch() {
        let a = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &a)]);

        let result = harness.verifier.verify_for_tenant("Bearer not-a-jwt", &record("acmecorp")).await;
        assert_auth_error!(result, MalformedToken);
        assert_eq!(harness.fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_kid_is_signature_failure() {
        let a = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &a)]);
        let token =
            sign_token_with_kid(&a, "unknown-kid", &id_token_claims(&issuer_for("acmecorp"), "acmecorp"));

        let result = harness.verifier.verify_for_tenant(&token, &record("acmecorp")).await;
        assert_auth_error!(result, SignatureVerification);
        assert_eq!(harness.fetcher.fetch_count(), 2);
    }

    // ===== Resolution and directory =====

    #[tokio::test]
    async fn test_unknown_tenant() {
        let a = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &a)]);
        let token = sign_token(&a, &id_token_claims(&issuer_for("initech"), "initech"));

        let result = harness.verifier.authenticate_with_claim(&token).await;
        assert_auth_error!(result, TenantNotFound);
        assert_eq!(harness.fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_unresolved_origin() {
        let a = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &a)]);
        let token = sign_token(&a, &id_token_claims(&issuer_for("acmecorp"), "acmecorp"));

        let result =
            harness.verifier.authenticate_with_origin(Some("http://localhost:4200"), &token).await;
        assert_auth_error!(result, UnresolvedTenant);
    }

    #[tokio::test]
    async fn test_dev_fallback_host() {
        let a = TestKey::tenant_a();
        let config = AuthnConfig::builder()
            .dev_fallback_tenant_host("acmecorp.example.com")
            .build()
            .expect("valid");
        let harness = Harness::with_config(&[("acmecorp", &a)], config);
        let token = sign_token(&a, &id_token_claims(&issuer_for("acmecorp"), "acmecorp"));

        let ctx = harness
            .verifier
            .authenticate_with_origin(Some("http://localhost:4200"), &token)
            .await
            .expect("verified through fallback host");
        assert_eq!(ctx.tenant_id().as_str(), "acmecorp");
    }

    #[tokio::test]
    async fn test_directory_failure() {
        let directory = Arc::new(FailingDirectory::new(DirectoryError::timeout()));
        let fetcher = Arc::new(MockKeySetFetcher::new());
        let config = AuthnConfig::default();
        let verifier = TokenVerifier::new(
            directory,
            Arc::new(JwksKeyCache::new(fetcher, &config)),
            &config,
        );
        let a = TestKey::tenant_a();
        let token = sign_token(&a, &id_token_claims(&issuer_for("acmecorp"), "acmecorp"));

        let result = verifier.authenticate_with_claim(&token).await;
        assert_auth_error!(result, Directory);
    }

    #[tokio::test]
    async fn test_misconfigured_record() {
        let a = TestKey::tenant_a();
        let mut broken = record("acmecorp");
        broken.region = "eu-west-1".into();
        let harness = Harness::with_records(vec![(broken.clone(), &a)], AuthnConfig::default());
        let token = sign_token(&a, &id_token_claims(&issuer_for("acmecorp"), "acmecorp"));

        let result = harness.verifier.verify_for_tenant(&token, &broken).await;
        assert_auth_error!(result, TenantMisconfigured);
    }

    // ===== Header entry point =====

    #[tokio::test]
    async fn test_authenticate_headers_with_origin() {
        let a = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &a)]);
        let token = sign_token(&a, &id_token_claims(&issuer_for("acmecorp"), "acmecorp"));

        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("ascii"),
        );
        headers.insert(ORIGIN, HeaderValue::from_static("https://acmecorp.example.com"));

        let ctx = harness.verifier.authenticate(&headers).await.expect("verified");
        assert_eq!(ctx.tenant_id().as_str(), "acmecorp");
    }

    #[tokio::test]
    async fn test_authenticate_headers_without_origin_uses_claim() {
        let a = TestKey::tenant_a();
        let harness = Harness::new(&[("acmecorp", &a)]);
        let token = sign_token(&a, &id_token_claims(&issuer_for("acmecorp"), "acmecorp"));

        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("ascii"),
        );

        assert!(harness.verifier.authenticate(&headers).await.is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_custom_identity_header() {
        let a = TestKey::tenant_a();
        let config = AuthnConfig::builder().identity_header("X-Identity").build().expect("valid");
        let harness = Harness::with_config(&[("acmecorp", &a)], config);
        let token = sign_token(&a, &id_token_claims(&issuer_for("acmecorp"), "acmecorp"));

        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_str(&token).expect("ascii"),
        );
        assert_auth_error!(harness.verifier.authenticate(&headers).await, MalformedToken);

        headers.insert("x-identity", HeaderValue::from_str(&token).expect("ascii"));
        assert!(harness.verifier.authenticate(&headers).await.is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_missing_credential() {
        let harness = Harness::new(&[("acmecorp", &TestKey::tenant_a())]);
        let result = harness.verifier.authenticate(&HeaderMap::new()).await;
        assert_auth_error!(result, MalformedToken);
    }

    // ===== Sign-in settings =====

    #[tokio::test]
    async fn test_auth_config_for_origin() {
        let a = TestKey::tenant_a();
        let mut with_client = record("acmecorp");
        with_client.auth_client = Some(
            tenantgate_directory::AuthClientSettings::builder()
                .client_id("client-123")
                .redirect_uri("https://acmecorp.example.com")
                .build(),
        );
        let harness = Harness::with_records(vec![(with_client, &a)], AuthnConfig::default());

        let config = harness
            .verifier
            .auth_config(Some("https://acmecorp.example.com"))
            .await
            .expect("configured");
        assert_eq!(config.issuer, issuer_for("acmecorp"));
        assert_eq!(config.client_id, "client-123");
        assert_eq!(config.silent_refresh_redirect_uri, "https://acmecorp.example.com/silentrefresh.html");
    }

    #[tokio::test]
    async fn test_auth_config_unknown_tenant() {
        let harness = Harness::new(&[("acmecorp", &TestKey::tenant_a())]);
        let result = harness.verifier.auth_config(Some("https://initech.example.com")).await;
        assert_auth_error!(result, TenantNotFound);
    }

    #[test]
    fn test_every_failure_rejects_uniformly() {
        let rejection = AuthError::token_expired().rejection();
        assert_eq!(rejection, AuthError::claim_missing("sub").rejection());
        assert_eq!(rejection.status(), http::StatusCode::UNAUTHORIZED);
    }
}
