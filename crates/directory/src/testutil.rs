//! Shared test utilities for tenant directory testing.
//!
//! Feature-gated behind `testutil` so the helpers never reach production
//! builds.
//!
//! ```toml
//! [dev-dependencies]
//! tenantgate-directory = { path = "../directory", features = ["testutil"] }
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    TenantDirectory,
    directory::MemoryTenantDirectory,
    error::{DirectoryError, DirectoryResult},
    record::TenantRecord,
    types::TenantId,
};

/// Issuer host used by [`make_record`].
pub const TEST_ISSUER_BASE: &str = "https://idp.test/pools";

/// Builds a consistent record for `tenant_id`, issued by
/// `{TEST_ISSUER_BASE}/us-east-1_{tenant_id}`.
///
/// # Panics
///
/// Panics if `tenant_id` is not a valid [`TenantId`].
#[must_use]
pub fn make_record(tenant_id: &str) -> TenantRecord {
    TenantRecord::builder()
        .tenant_id(TenantId::parse(tenant_id).expect("valid test tenant id"))
        .auth_server_url(format!("{TEST_ISSUER_BASE}/us-east-1_{tenant_id}"))
        .plan("standard")
        .build()
        .expect("test record is derivable")
}

/// A [`MemoryTenantDirectory`] that counts lookups and can delay them.
#[derive(Debug, Default)]
pub struct CountingDirectory {
    inner: MemoryTenantDirectory,
    lookups: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingDirectory {
    /// Creates a counting directory holding `records`.
    pub fn with_records(records: impl IntoIterator<Item = TenantRecord>) -> Self {
        Self { inner: records.into_iter().collect(), lookups: AtomicUsize::new(0), delay: None }
    }

    /// Delays every lookup by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Returns the wrapped directory for inserting or removing records.
    pub fn directory(&self) -> &MemoryTenantDirectory {
        &self.inner
    }
}

#[async_trait]
impl TenantDirectory for CountingDirectory {
    async fn lookup(&self, tenant_id: &TenantId) -> DirectoryResult<Option<TenantRecord>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.lookup(tenant_id).await
    }
}

/// A directory that fails every lookup until healed.
#[derive(Debug)]
pub struct FailingDirectory {
    inner: MemoryTenantDirectory,
    failure: Mutex<Option<DirectoryError>>,
}

impl FailingDirectory {
    /// Creates a directory failing with `error`.
    pub fn new(error: DirectoryError) -> Self {
        Self { inner: MemoryTenantDirectory::new(), failure: Mutex::new(Some(error)) }
    }

    /// Stops failing and stores `record`.
    pub fn heal_with(&self, record: TenantRecord) {
        self.inner.insert(record);
        *self.failure.lock() = None;
    }

    /// Starts failing again with `error`.
    pub fn fail_with(&self, error: DirectoryError) {
        *self.failure.lock() = Some(error);
    }
}

#[async_trait]
impl TenantDirectory for FailingDirectory {
    async fn lookup(&self, tenant_id: &TenantId) -> DirectoryResult<Option<TenantRecord>> {
        let failure = self.failure.lock().clone();
        if let Some(error) = failure {
            return Err(error);
        }
        self.inner.lookup(tenant_id).await
    }
}

/// Wraps a directory in an [`Arc<dyn TenantDirectory>`].
pub fn shared<D: TenantDirectory + 'static>(directory: D) -> Arc<dyn TenantDirectory> {
    Arc::new(directory)
}

/// Asserts that a [`DirectoryResult`] is an `Err` of the given variant.
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use tenantgate_directory::{DirectoryError, DirectoryResult, assert_directory_error};
///
/// let result: DirectoryResult<()> = Err(DirectoryError::timeout());
/// assert_directory_error!(result, Timeout);
/// ```
#[macro_export]
macro_rules! assert_directory_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::DirectoryError::$variant { .. })),
            "expected DirectoryError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
}
