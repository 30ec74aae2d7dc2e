//! Conformance test suite for [`TenantDirectory`] implementations.
//!
//! Each function checks one aspect of the lookup contract. Directories are
//! read-only through the trait, so every check receives a directory already
//! seeded by the caller together with the records it was seeded with.
//!
//! ```no_run
//! use tenantgate_directory::{MemoryTenantDirectory, conformance, testutil::make_record};
//!
//! #[tokio::test]
//! async fn lookup_returns_seeded_record() {
//!     let record = make_record("acmecorp");
//!     let directory: MemoryTenantDirectory = [record.clone()].into_iter().collect();
//!     conformance::lookup_returns_seeded_record(&directory, &record).await;
//! }
//! ```
//!
//! | Check | Contract aspect |
//! |-------|-----------------|
//! | `lookup_missing_returns_none` | absence is `Ok(None)`, not an error |
//! | `lookup_returns_seeded_record` | records come back unchanged |
//! | `lookup_is_repeatable` | reads have no side effects |
//! | `lookup_isolates_tenants` | one tenant's id never yields another's record |
//! | `concurrent_lookups_agree` | thread-safety under parallel reads |

use std::sync::Arc;

use crate::{TenantDirectory, record::TenantRecord, types::TenantId};

/// A lookup of an unknown tenant returns `Ok(None)`.
pub async fn lookup_missing_returns_none<D: TenantDirectory>(directory: &D) {
    let ghost = TenantId::parse("conformance-ghost").expect("valid id");
    let result = directory.lookup(&ghost).await;
    assert!(matches!(result, Ok(None)), "missing tenant should be Ok(None), got {result:?}");
}

/// A lookup of a seeded tenant returns the seeded record unchanged.
pub async fn lookup_returns_seeded_record<D: TenantDirectory>(directory: &D, seeded: &TenantRecord) {
    let found = directory
        .lookup(&seeded.tenant_id)
        .await
        .expect("lookup should succeed")
        .expect("seeded tenant should be present");
    assert_eq!(&found, seeded);
}

/// Repeated lookups return the same record.
pub async fn lookup_is_repeatable<D: TenantDirectory>(directory: &D, seeded: &TenantRecord) {
    let first = directory.lookup(&seeded.tenant_id).await.expect("first lookup");
    let second = directory.lookup(&seeded.tenant_id).await.expect("second lookup");
    assert_eq!(first, second);
    assert!(first.is_some());
}

/// Two seeded tenants each get their own record back.
pub async fn lookup_isolates_tenants<D: TenantDirectory>(
    directory: &D,
    a: &TenantRecord,
    b: &TenantRecord,
) {
    assert_ne!(a.tenant_id, b.tenant_id, "isolation check needs two distinct tenants");
    let found_a = directory.lookup(&a.tenant_id).await.expect("lookup a").expect("a present");
    let found_b = directory.lookup(&b.tenant_id).await.expect("lookup b").expect("b present");
    assert_eq!(found_a.auth_server_url, a.auth_server_url);
    assert_eq!(found_b.auth_server_url, b.auth_server_url);
    assert_ne!(found_a.auth_server_url, found_b.auth_server_url);
}

/// Parallel lookups of one tenant all observe the seeded record.
pub async fn concurrent_lookups_agree<D: TenantDirectory + 'static>(
    directory: Arc<D>,
    seeded: &TenantRecord,
) {
    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let directory = Arc::clone(&directory);
            let id = seeded.tenant_id.clone();
            tokio::spawn(async move { directory.lookup(&id).await })
        })
        .collect();

    for task in tasks {
        let found = task.await.expect("task should not panic").expect("lookup should succeed");
        assert_eq!(found.as_ref(), Some(seeded));
    }
}
