//! Exercises `LogBackedStore::init`'s bootstrap/replay path: a second store attached to the same
//! log after writes have already happened must rebuild indexes identical to the ones the writer
//! built incrementally.

mod support;

use std::sync::Arc;
use std::time::Duration;

use registry_core::{
    CompatibilityLevel, Forwarder, Identity, IdAllocator, LogBackedStore, MasterObserver,
    NoopApplyListener, Registry,
};

use support::{InMemoryCoordinator, InMemoryLog, JsonDialect};

#[tokio::test]
async fn a_store_bootstrapped_after_writes_matches_one_built_incrementally() {
    let log = InMemoryLog::new();
    let coordinator = InMemoryCoordinator::new();

    let writer_store = Arc::new(
        LogBackedStore::init(
            log.clone(),
            Arc::new(NoopApplyListener),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .await
        .unwrap(),
    );
    let allocator = Arc::new(IdAllocator::new(coordinator, "/schema_id_counter"));
    let writer = Registry::new(
        writer_store.clone(),
        allocator,
        Arc::new(JsonDialect),
        Forwarder::new(),
        Identity::new("node-a", 8081, true),
        CompatibilityLevel::Backward,
    );
    writer.set_master(Some(Identity::new("node-a", 8081, true))).await;

    writer.register("orders-value", r#"{"type":"string"}"#).await.unwrap();
    writer.register("shipments-value", r#"{"type":"string"}"#).await.unwrap();
    writer
        .update_compatibility(Some("orders-value"), CompatibilityLevel::None)
        .await
        .unwrap();
    writer.register("orders-value", r#"{"type":"int"}"#).await.unwrap();

    // A fresh node bootstrapping from the same log from offset 0, as a restart would.
    let restarted_store = LogBackedStore::init(
        log,
        Arc::new(NoopApplyListener),
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    assert_eq!(writer_store.max_id().await, restarted_store.max_id().await);

    for subject in ["orders-value", "shipments-value"] {
        let (lo, hi) = registry_core::SchemaKey::subject_range(subject);
        let from_writer = writer_store
            .get_all(lo.clone().into(), hi.clone().into())
            .await;
        let from_restarted = restarted_store.get_all(lo.into(), hi.into()).await;
        assert_eq!(from_writer, from_restarted, "subject {subject} diverged after bootstrap");
    }

    let string_digest = registry_core::model::digest(r#"{"type":"string"}"#);
    assert_eq!(
        writer_store.lookup_by_digest(&string_digest).await,
        restarted_store.lookup_by_digest(&string_digest).await
    );
}
