//! Tenant directory boundary for the tenantgate services.
//!
//! The directory maps a [`TenantId`] to the tenant's identity-provider
//! binding ([`TenantRecord`]). It is populated by tenant onboarding and read
//! on every authenticated request; this crate only defines the read side.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            tenantgate-authn                  │
//! │   TenantResolver → TokenVerifier             │
//! ├──────────────────────────────────────────────┤
//! │          TenantDirectory trait               │
//! │            lookup(tenant_id)                 │
//! ├───────────────────────┬──────────────────────┤
//! │ MemoryTenantDirectory │ CachedTenantDirectory│
//! │   (tests, dev)        │  (wraps any backend) │
//! └───────────────────────┴──────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use tenantgate_directory::{MemoryTenantDirectory, TenantDirectory, TenantId, TenantRecord};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let directory = MemoryTenantDirectory::new();
//!     let tenant_id = TenantId::derive_from_company_name("Acme Corp!").ok_or("empty name")?;
//!
//!     directory.insert(
//!         TenantRecord::builder()
//!             .tenant_id(tenant_id.clone())
//!             .auth_server_url("https://idp/pools/us-east-1_ABC")
//!             .plan("premium")
//!             .build()?,
//!     );
//!
//!     let record = directory.lookup(&tenant_id).await?.ok_or("not onboarded")?;
//!     assert_eq!(record.expected_issuer()?, "https://idp/pools/us-east-1_ABC");
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module (record factories, counting and failing
//!   directories, assertion macros) and the `conformance` suite.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Read-through cache wrapper.
pub mod cached;
/// Conformance suite for directory implementations.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
/// Lookup trait and in-memory implementation.
pub mod directory;
/// Error types.
pub mod error;
/// Tenant identity-provider records.
pub mod record;
/// Shared test helpers.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
/// Tenant identifier type.
pub mod types;

pub use cached::{CacheConfig, CachedTenantDirectory};
pub use directory::{MemoryTenantDirectory, TenantDirectory};
pub use error::{BoxError, ConfigError, DirectoryError, DirectoryResult};
pub use record::{AuthClientSettings, RecordError, TenantRecord};
pub use types::{InvalidTenantId, MAX_DERIVED_LEN, TenantId};
