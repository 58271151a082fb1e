//! Runs against a live Redis when `KEYMIRROR_TEST_REDIS_URL` is set;
//! otherwise every test returns early.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use keymirror_core::{ResourceData, ResourceIdentity};
use keymirror_sync::{
    ExternalStore, RedisStore, StoreError, SyncJob, SyncOptions, SENTINEL_FIELD,
};

fn data(pairs: &[(&str, &str)]) -> ResourceData {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn live_store() -> Option<RedisStore> {
    let url = std::env::var("KEYMIRROR_TEST_REDIS_URL").ok()?;
    Some(RedisStore::connect(&url).await.expect("connect to test redis"))
}

fn unique_identity(name: &str) -> ResourceIdentity {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    ResourceIdentity::new(format!("keymirror-test-{}-{nanos}", std::process::id()), name)
}

#[tokio::test]
async fn hash_commands_follow_store_semantics() {
    let Some(store) = live_store().await else {
        return;
    };
    let key = unique_identity("fields").store_key();

    let err = store.get_all_fields(&key).await.unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound { .. }), "got: {err}");

    store.set_fields(&key, &data(&[("a", "1"), ("b", "2")])).await.unwrap();
    store.set_fields(&key, &data(&[("b", "3")])).await.unwrap();
    assert_eq!(
        store.get_all_fields(&key).await.unwrap(),
        data(&[("a", "1"), ("b", "3")])
    );

    store
        .delete_fields(&key, &["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert!(matches!(
        store.get_all_fields(&key).await,
        Err(StoreError::KeyNotFound { .. })
    ));
}

#[tokio::test]
async fn job_push_materializes_sentinel_in_redis() {
    let Some(store) = live_store().await else {
        return;
    };
    let store = Arc::new(store);
    let identity = unique_identity("empty");
    let key = identity.store_key();

    let job = SyncJob::new(
        identity,
        ResourceData::new(),
        store.clone(),
        Arc::new(NoApply),
        SyncOptions::default(),
    );
    job.push().await.unwrap();
    assert_eq!(
        store.get_all_fields(&key).await.unwrap(),
        data(&[(SENTINEL_FIELD, "")])
    );

    job.replace_data_and_push(data(&[("x", "1")])).await.unwrap();
    assert_eq!(store.get_all_fields(&key).await.unwrap(), data(&[("x", "1")]));

    store.delete_fields(&key, &["x".to_string()]).await.unwrap();
}

struct NoApply;

#[async_trait::async_trait]
impl keymirror_sync::ResourceApplier for NoApply {
    async fn apply(
        &self,
        _: &ResourceIdentity,
        _: &ResourceData,
    ) -> Result<(), keymirror_sync::ApplyError> {
        Ok(())
    }
}
