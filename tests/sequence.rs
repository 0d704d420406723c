//! Short references stay unique under concurrent creation, with or without
//! the counter

mod common;

use async_trait::async_trait;
use common::Harness;
use doctrack::auth::Role;
use doctrack::store::{CounterStore, MemoryCounterStore, Stores};
use doctrack::{DoctrackError, Result};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_admin_creates_sequential_references() {
    let h = Harness::new();
    let admin = h.user("ada", Role::Admin).await;

    let first = h.create(&admin, "One").await;
    let second = h.create(&admin, "Two").await;
    assert_eq!(first.doc_ref_short, "DOC-000001");
    assert_eq!(second.doc_ref_short, "DOC-000002");
    assert!(first.doc_ref.starts_with("DOC-"));
    assert_ne!(first.doc_ref, second.doc_ref);
    assert_eq!(first.history.len(), 1);
    assert_eq!(first.history[0].details, "Document created");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_get_distinct_references() {
    let h = Harness::new();
    let owner = h.user("emma", Role::Employee).await;

    let tasks = (0..40).map(|i| {
        let documents = h.documents.clone();
        let owner = owner.clone();
        tokio::spawn(async move { documents.create(&owner, common::draft(&format!("doc {i}"))).await })
    });
    let views: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let refs: HashSet<_> = views.iter().map(|v| v.doc_ref_short.clone()).collect();
    assert_eq!(refs.len(), 40);
    let expected: HashSet<_> = (1..=40).map(|n| format!("DOC-{n:06}")).collect();
    assert_eq!(refs, expected);
}

/// Fails every other increment
struct FlakyCounter {
    inner: MemoryCounterStore,
    calls: AtomicU64,
}

#[async_trait]
impl CounterStore for FlakyCounter {
    async fn increment(&self, series: &str) -> Result<i64> {
        if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
            return Err(DoctrackError::Database("counter unavailable".into()));
        }
        self.inner.increment(series).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fallback_references_stay_unique() {
    let memory = Stores::memory();
    let stores = Stores {
        counters: Arc::new(FlakyCounter {
            inner: MemoryCounterStore::new(),
            calls: AtomicU64::new(0),
        }),
        ..memory
    };
    let h = Harness::with_stores(stores);
    let owner = h.user("emma", Role::Employee).await;

    let tasks = (0..30).map(|i| {
        let documents = h.documents.clone();
        let owner = owner.clone();
        tokio::spawn(async move { documents.create(&owner, common::draft(&format!("doc {i}"))).await })
    });
    let views: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let refs: HashSet<_> = views.iter().map(|v| v.doc_ref_short.clone()).collect();
    assert_eq!(refs.len(), 30);
    assert!(refs.iter().all(|r| r.starts_with("DOC-")));
    // Both paths were exercised
    assert!(refs.iter().any(|r| r.len() == "DOC-000001".len() && r[4..].chars().all(|c| c.is_ascii_digit())));
    assert!(refs.iter().any(|r| r[4..].starts_with(|c: char| c.is_ascii_alphabetic())));
}

#[tokio::test]
async fn test_counter_is_atomic_in_memory() {
    let counter = Arc::new(MemoryCounterStore::new());
    let tasks = (0..64).map(|_| {
        let counter = Arc::clone(&counter);
        tokio::spawn(async move { counter.increment("series").await })
    });
    let values: HashSet<i64> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    assert_eq!(values, (1..=64).collect());
}
