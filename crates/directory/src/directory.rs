//! Tenant directory lookup trait and in-memory implementation.
//!
//! The directory is populated by tenant onboarding and read on every
//! authenticated request. The authentication core only ever performs point
//! lookups, so [`TenantDirectory`] exposes nothing else.
//!
//! # Usage
//!
//! ```no_run
//! use tenantgate_directory::{DirectoryResult, TenantDirectory, TenantId, TenantRecord};
//!
//! async fn issuer_of<D: TenantDirectory>(
//!     directory: &D,
//!     tenant_id: &TenantId,
//! ) -> DirectoryResult<Option<String>> {
//!     Ok(directory.lookup(tenant_id).await?.map(|r| r.auth_server_url))
//! }
//! ```

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{error::DirectoryResult, record::TenantRecord, types::TenantId};

/// Read access to tenant identity-provider records.
///
/// Implementations must be safe to call from any number of tasks at once.
///
/// # Errors
///
/// A tenant that does not exist is reported as `Ok(None)`. Errors are
/// reserved for backend failures.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Looks up the record of a single tenant.
    async fn lookup(&self, tenant_id: &TenantId) -> DirectoryResult<Option<TenantRecord>>;
}

#[async_trait]
impl<T: TenantDirectory + ?Sized> TenantDirectory for Arc<T> {
    async fn lookup(&self, tenant_id: &TenantId) -> DirectoryResult<Option<TenantRecord>> {
        (**self).lookup(tenant_id).await
    }
}

/// In-memory [`TenantDirectory`] for tests and development.
///
/// Uses [`parking_lot::RwLock`] for concurrent reads. Clones share the same
/// underlying map.
///
/// # Examples
///
/// ```
/// use tenantgate_directory::{MemoryTenantDirectory, TenantDirectory, TenantId, TenantRecord};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let directory = MemoryTenantDirectory::new();
///     let id = TenantId::parse("acmecorp")?;
///     directory.insert(
///         TenantRecord::builder()
///             .tenant_id(id.clone())
///             .auth_server_url("https://idp/pools/us-east-1_ABC")
///             .build()?,
///     );
///
///     assert!(directory.lookup(&id).await?.is_some());
///     Ok(())
/// }
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryTenantDirectory {
    records: Arc<RwLock<HashMap<TenantId, TenantRecord>>>,
}

impl MemoryTenantDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record, returning the previous one.
    pub fn insert(&self, record: TenantRecord) -> Option<TenantRecord> {
        self.records.write().insert(record.tenant_id.clone(), record)
    }

    /// Removes a tenant's record.
    pub fn remove(&self, tenant_id: &TenantId) -> Option<TenantRecord> {
        self.records.write().remove(tenant_id)
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns `true` if no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl FromIterator<TenantRecord> for MemoryTenantDirectory {
    fn from_iter<I: IntoIterator<Item = TenantRecord>>(iter: I) -> Self {
        let directory = Self::new();
        for record in iter {
            directory.insert(record);
        }
        directory
    }
}

#[async_trait]
impl TenantDirectory for MemoryTenantDirectory {
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn lookup(&self, tenant_id: &TenantId) -> DirectoryResult<Option<TenantRecord>> {
        Ok(self.records.read().get(tenant_id).cloned())
    }
}
