//! # Tenantgate Authentication
//!
//! Tenant resolution and tenant-scoped identity token verification.
//!
//! Every tenant signs in through its own identity provider pool. A token is
//! only accepted when it verifies against the keys published by the issuer
//! of the tenant it is presented for.
//!
//! ```text
//! request ─┬─ Origin ──────────┐
//!          └─ token claim ─────┴─► TenantResolver ─► TenantId
//!                                                      │
//!                         TenantDirectory::lookup ◄────┘
//!                                  │ TenantRecord (issuer)
//!                                  ▼
//!            JwksKeyCache::get_key(issuer, kid) ─► TokenVerifier
//!                                                      │
//!                                      TenantIdentityContext (ROLE_ADMIN)
//! ```
//!
//! This crate provides:
//! - **Tenant resolution**: from the request origin's first host label, or from the token's tenant
//!   claim
//! - **Key cache**: per-issuer JWKS cache with TTL, single-flight fetches, forced refresh on an
//!   unknown `kid` and a fallback during issuer outages
//! - **Token verification**: RS256 only, issuer and `token_use` checks, uniform missing-claim
//!   handling
//! - **Sign-in settings**: the browser client's OIDC configuration per tenant
//!
//! Every failure is an [`AuthError`]; all of them answer the caller with
//! the same [`Rejection`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tenantgate_authn::{AuthnConfig, TokenVerifier};
//! use tenantgate_directory::MemoryTenantDirectory;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthnConfig::default().apply_env()?;
//! let directory = Arc::new(MemoryTenantDirectory::new());
//! let verifier = TokenVerifier::from_config(directory, &config)?;
//!
//! let ctx = verifier
//!     .authenticate_with_origin(Some("https://acmecorp.example.com"), "Bearer eyJ...")
//!     .await?;
//! println!("{} as {:?}", ctx.tenant_id(), ctx.username());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module (fixed RSA keys, token signers, mock key set
//!   fetcher, verifier harness) and the `assert_auth_error!` macro.
//! - **`failpoints`**: Enables fail-point injection before key set fetches.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Browser sign-in settings.
pub mod auth_config;
/// Verification configuration.
pub mod config;
/// The verified principal.
pub mod context;
/// Authentication error types.
pub mod error;
/// JWKS fetching.
pub mod jwks;
/// JWT parsing and claims.
pub mod jwt;
/// Per-issuer signing key cache.
pub mod key_cache;
/// Tenant resolution.
pub mod resolver;
/// Shared test helpers.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
/// Algorithm validation.
pub mod validation;
/// Token verification.
pub mod verifier;

// Re-export key types for convenience
pub use auth_config::AuthConfig;
pub use config::{AuthnConfig, DEV_FALLBACK_HOST_ENV};
pub use context::{ROLE_ADMIN, TenantIdentityContext};
pub use error::{AuthError, ConfigError, Rejection, Result};
pub use jwks::{HttpKeySetFetcher, KeyFetchError, KeySetFetcher};
pub use jwt::{IdTokenClaims, strip_bearer};
pub use key_cache::{CachedKeySet, JwksKeyCache};
pub use resolver::{Resolution, TenantResolver, UnresolvedReason, derive_tenant_id};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm};
pub use verifier::TokenVerifier;
