//! Repository → synchronizer → store, end to end, on a paused clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keymirror_core::{Repository, ResourceData, ResourceIdentity};
use keymirror_sync::{
    content_hash, ApplyError, ExternalStore, FileStore, MemoryStore, ResourceApplier, StoreError,
    SyncOptions, Synchronizer,
};
use parking_lot::Mutex;
use tempfile::TempDir;

fn data(pairs: &[(&str, &str)]) -> ResourceData {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Default)]
struct RecordingApplier {
    applied: Mutex<Vec<(ResourceIdentity, ResourceData)>>,
}

#[async_trait]
impl ResourceApplier for RecordingApplier {
    async fn apply(
        &self,
        identity: &ResourceIdentity,
        data: &ResourceData,
    ) -> Result<(), ApplyError> {
        self.applied.lock().push((identity.clone(), data.clone()));
        Ok(())
    }
}

struct Harness {
    repo: Repository,
    sync: Arc<Synchronizer>,
    store: Arc<MemoryStore>,
    applier: Arc<RecordingApplier>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let applier = Arc::new(RecordingApplier::default());
    let sync = Arc::new(Synchronizer::new(
        store.clone(),
        applier.clone(),
        SyncOptions::default(),
    ));
    let repo = Repository::new();
    repo.add_listener(sync.clone());
    Harness {
        repo,
        sync,
        store,
        applier,
    }
}

#[tokio::test(start_paused = true)]
async fn create_update_delete_scenario() {
    let h = harness();
    let id = ResourceIdentity::new("a", "b");

    h.repo.set(id.clone(), data(&[("x", "1")])).await;
    assert_eq!(h.sync.job_count(), 1);
    assert_eq!(h.store.fields("a/b"), Some(data(&[("x", "1")])));

    let deletes_before = h.store.calls().delete;
    h.repo.set(id.clone(), data(&[("x", "1"), ("y", "2")])).await;
    assert_eq!(h.store.fields("a/b"), Some(data(&[("x", "1"), ("y", "2")])));
    assert_eq!(h.store.calls().delete, deletes_before, "no stale field to remove");

    let job = h.sync.job(&id).expect("job");
    h.repo.remove(&id).await.expect("remove");
    assert_eq!(h.sync.job_count(), 0);
    assert!(!job.is_running().await);

    let after_delete = h.store.calls();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.store.calls(), after_delete, "stopped job makes no store calls");
    assert_eq!(
        h.store.fields("a/b"),
        Some(data(&[("x", "1"), ("y", "2")])),
        "store key is not cleaned up on deletion"
    );
    assert!(h.applier.applied.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn external_drift_flows_back_through_applier() {
    let h = harness();
    let id = ResourceIdentity::new("a", "b");
    h.repo.set(id.clone(), data(&[("x", "1")])).await;

    h.store.put_field_raw("a/b", "edited", "yes");
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let applied = h.applier.applied.lock().clone();
    assert_eq!(applied.len(), 1, "exactly one apply for one drift");
    assert_eq!(applied[0].0, id);
    assert_eq!(applied[0].1, data(&[("x", "1"), ("edited", "yes")]));

    let job = h.sync.job(&id).expect("job");
    assert_eq!(
        job.hash().await,
        Some(content_hash(&data(&[("x", "1"), ("edited", "yes")])))
    );

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.applier.applied.lock().len(), 1, "no repeat apply without drift");
    h.sync.stop().await;
}

#[tokio::test(start_paused = true)]
async fn update_removes_fields_dropped_from_resource() {
    let h = harness();
    let id = ResourceIdentity::new("a", "b");
    h.repo.set(id.clone(), data(&[("a", "1"), ("b", "2"), ("c", "3")])).await;
    h.repo.set(id.clone(), data(&[("a", "1"), ("b", "2")])).await;

    assert_eq!(h.store.fields("a/b"), Some(data(&[("a", "1"), ("b", "2")])));
    h.sync.stop().await;
}

#[tokio::test(start_paused = true)]
async fn empty_resource_is_materialized_with_sentinel() {
    let h = harness();
    let id = ResourceIdentity::new("ns", "empty");
    h.repo.set(id.clone(), ResourceData::new()).await;

    assert_eq!(
        h.store.fields("ns/empty"),
        Some(data(&[(keymirror_sync::SENTINEL_FIELD, "")]))
    );

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(h.applier.applied.lock().is_empty());
    assert!(h.sync.job(&id).expect("job").data().await.is_empty());
    h.sync.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unrelated_resources_get_independent_jobs() {
    let h = harness();
    for name in ["one", "two", "three"] {
        h.repo
            .set(ResourceIdentity::new("ns", name), data(&[("name", name)]))
            .await;
    }

    assert_eq!(h.sync.job_count(), 3);
    let keys: Vec<String> = h.sync.identities().iter().map(|id| id.to_string()).collect();
    assert_eq!(keys, vec!["ns/one", "ns/three", "ns/two"]);

    h.repo
        .remove(&ResourceIdentity::new("ns", "two"))
        .await
        .expect("remove");
    assert_eq!(h.sync.job_count(), 2);
    assert!(h.sync.job(&ResourceIdentity::new("ns", "one")).is_some());
    h.sync.stop().await;
}

#[tokio::test]
async fn file_store_backs_a_full_sync_cycle() {
    let tmp = TempDir::new().expect("tempdir");
    let store = Arc::new(FileStore::new(tmp.path()));
    let applier = Arc::new(RecordingApplier::default());
    let sync = Arc::new(Synchronizer::new(
        store.clone(),
        applier.clone(),
        SyncOptions {
            poll_interval: Duration::from_millis(20),
        },
    ));
    let repo = Repository::new();
    repo.add_listener(sync.clone());

    let id = ResourceIdentity::new("a", "b");
    repo.set(id.clone(), data(&[("x", "1"), ("y", "2")])).await;
    repo.set(id.clone(), data(&[("x", "1")])).await;

    let doc = std::fs::read_to_string(tmp.path().join("a").join("b.json")).expect("doc");
    let parsed: std::collections::HashMap<String, String> =
        serde_json::from_str(&doc).expect("json");
    assert_eq!(parsed, data(&[("x", "1")]));

    sync.stop().await;
    if let Some(job) = sync.job(&id) {
        job.join().await;
    }
}

/// Serves the first read of each key, then leaves later reads pending.
#[derive(Default)]
struct StalledStore {
    seen: Mutex<std::collections::HashSet<String>>,
    reads: AtomicUsize,
}

#[async_trait]
impl ExternalStore for StalledStore {
    async fn get_all_fields(&self, key: &str) -> Result<ResourceData, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let first = self.seen.lock().insert(key.to_owned());
        if !first {
            std::future::pending::<()>().await;
        }
        Err(StoreError::KeyNotFound { key: key.to_owned() })
    }

    async fn set_fields(&self, _: &str, _: &ResourceData) -> Result<(), StoreError> {
        Ok(())
    }

    async fn delete_fields(&self, _: &str, _: &[String]) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_store_read_does_not_block_delete_or_shutdown() {
    let store = Arc::new(StalledStore::default());
    let sync = Arc::new(Synchronizer::new(
        store.clone(),
        Arc::new(RecordingApplier::default()),
        SyncOptions::default(),
    ));
    let repo = Repository::new();
    repo.add_listener(sync.clone());

    let stalled = ResourceIdentity::new("a", "stalled");
    let other = ResourceIdentity::new("a", "other");
    repo.set(stalled.clone(), ResourceData::new()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.reads.load(Ordering::SeqCst), 2, "poll read is pending");

    tokio::time::timeout(Duration::from_secs(3), repo.remove(&stalled))
        .await
        .expect("remove returns while the read is pending")
        .expect("remove");
    assert_eq!(sync.job_count(), 0);

    // Its poll read stalls as well; shutdown must still return.
    repo.set(other.clone(), ResourceData::new()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    tokio::time::timeout(Duration::from_secs(3), sync.stop())
        .await
        .expect("shutdown returns while reads are pending");
    assert!(!sync.job(&other).expect("job").is_running().await);
}
