//! In-memory fakes for the three ports `registry-core` is built against.
//!
//! These stand in for a real log broker and a real coordination service in the integration tests
//! under this directory. None of it ships in the library; it exists purely so the replicated-
//! state-machine logic can be driven end to end without any external infrastructure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::stream::BoxStream;
use tokio::sync::watch;

use registry_core::{CasVersion, Coordinator, LogClient, NodeVersion, Offset};

#[derive(Debug, thiserror::Error)]
#[error("in-memory fake error: {0}")]
pub struct FakeError(pub String);

/// A shared, append-only log. Clone the `Arc` to give several `LogBackedStore`s the same topic.
pub struct InMemoryLog {
    records: Arc<StdMutex<Vec<Vec<u8>>>>,
}

impl InMemoryLog {
    pub fn new() -> Arc<Self> {
        Arc::new(InMemoryLog {
            records: Arc::new(StdMutex::new(Vec::new())),
        })
    }
}

#[async_trait::async_trait]
impl LogClient for InMemoryLog {
    type Error = FakeError;

    async fn append(&self, record: Vec<u8>) -> Result<Offset, Self::Error> {
        let mut guard = self.records.lock().unwrap();
        guard.push(record);
        Ok((guard.len() - 1) as u64)
    }

    fn subscribe(&self, from: Offset) -> BoxStream<'static, Result<(Offset, Vec<u8>), Self::Error>> {
        let records = self.records.clone();
        Box::pin(futures::stream::unfold((records, from), |(records, mut next)| async move {
            loop {
                let found = { records.lock().unwrap().get(next as usize).cloned() };
                if let Some(record) = found {
                    let item = Ok((next, record));
                    next += 1;
                    return Some((item, (records, next)));
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }))
    }
}

struct MembershipTopic {
    members: Vec<(u64, Vec<u8>)>,
    tx: watch::Sender<Vec<Vec<u8>>>,
}

/// A coordinator fake: persistent nodes with version-guarded CAS, plus ephemeral membership topics.
pub struct InMemoryCoordinator {
    nodes: StdMutex<HashMap<String, NodeVersion<Vec<u8>>>>,
    topics: StdMutex<HashMap<String, MembershipTopic>>,
    next_member_id: AtomicU64,
}

impl InMemoryCoordinator {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(InMemoryCoordinator {
            nodes: StdMutex::new(HashMap::new()),
            topics: StdMutex::new(HashMap::new()),
            next_member_id: AtomicU64::new(0),
        })
    }

    /// Simulates a node dropping its coordinator session: removes `identity` from `path`'s
    /// membership and notifies every watcher of the new, smaller set.
    pub fn drop_member(&self, path: &str, identity: &[u8]) {
        let mut guard = self.topics.lock().unwrap();
        if let Some(topic) = guard.get_mut(path) {
            topic.members.retain(|(_, bytes)| bytes != identity);
            let snapshot: Vec<Vec<u8>> = topic.members.iter().map(|(_, bytes)| bytes.clone()).collect();
            let _ = topic.tx.send(snapshot);
        }
    }
}

#[async_trait::async_trait]
impl Coordinator for InMemoryCoordinator {
    type Error = FakeError;

    async fn read_node(&self, path: &str) -> Result<Option<NodeVersion<Vec<u8>>>, Self::Error> {
        Ok(self.nodes.lock().unwrap().get(path).cloned())
    }

    async fn create_node(&self, path: &str, value: Vec<u8>) -> Result<(), Self::Error> {
        let mut guard = self.nodes.lock().unwrap();
        if guard.contains_key(path) {
            return Err(FakeError(format!("node {path} already exists")));
        }
        guard.insert(path.to_string(), NodeVersion { value, version: 0 });
        Ok(())
    }

    async fn compare_and_set(
        &self,
        path: &str,
        value: Vec<u8>,
        expected_version: CasVersion,
    ) -> Result<bool, Self::Error> {
        let mut guard = self.nodes.lock().unwrap();
        let Some(node) = guard.get_mut(path) else {
            return Err(FakeError(format!("node {path} does not exist")));
        };
        if node.version != expected_version {
            return Ok(false);
        }
        node.value = value;
        node.version += 1;
        Ok(true)
    }

    async fn watch_membership(
        &self,
        path: &str,
        identity: Vec<u8>,
    ) -> Result<BoxStream<'static, Result<Vec<Vec<u8>>, Self::Error>>, Self::Error> {
        let mut guard = self.topics.lock().unwrap();
        let member_id = self.next_member_id.fetch_add(1, Ordering::SeqCst);
        let topic = guard.entry(path.to_string()).or_insert_with(|| {
            let (tx, _rx) = watch::channel(Vec::new());
            MembershipTopic {
                members: Vec::new(),
                tx,
            }
        });
        topic.members.push((member_id, identity));
        let snapshot: Vec<Vec<u8>> = topic.members.iter().map(|(_, bytes)| bytes.clone()).collect();
        let _ = topic.tx.send(snapshot);
        let rx = topic.tx.subscribe();
        Ok(Box::pin(watch_stream(rx)))
    }
}

enum WatchState {
    Initial(watch::Receiver<Vec<Vec<u8>>>),
    Waiting(watch::Receiver<Vec<Vec<u8>>>),
}

fn watch_stream(
    rx: watch::Receiver<Vec<Vec<u8>>>,
) -> impl futures::Stream<Item = Result<Vec<Vec<u8>>, FakeError>> {
    futures::stream::unfold(WatchState::Initial(rx), |state| async move {
        match state {
            WatchState::Initial(rx) => {
                let value = rx.borrow().clone();
                Some((Ok(value), WatchState::Waiting(rx)))
            }
            WatchState::Waiting(mut rx) => match rx.changed().await {
                Ok(()) => {
                    let value = rx.borrow().clone();
                    Some((Ok(value), WatchState::Waiting(rx)))
                }
                Err(_) => None,
            },
        }
    })
}

/// A trivial "dialect" treating schema text as JSON: canonicalization reparses and re-serializes
/// it, and two record schemas are compatible unless an existing field's `type` changed.
#[derive(Debug, Default)]
pub struct JsonDialect;

impl registry_core::SchemaDialect for JsonDialect {
    fn canonicalize(&self, schema: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(schema).ok()?;
        serde_json::to_string(&value).ok()
    }

    fn is_compatible(
        &self,
        level: registry_core::CompatibilityLevel,
        candidate: &str,
        existing: &str,
    ) -> bool {
        if level == registry_core::CompatibilityLevel::None {
            return true;
        }
        let Ok(candidate) = serde_json::from_str::<serde_json::Value>(candidate) else {
            return false;
        };
        let Ok(existing) = serde_json::from_str::<serde_json::Value>(existing) else {
            return false;
        };
        fields_compatible(&candidate, &existing)
    }
}

fn fields_compatible(candidate: &serde_json::Value, existing: &serde_json::Value) -> bool {
    let (Some(candidate_fields), Some(existing_fields)) = (
        candidate.get("fields").and_then(|f| f.as_array()),
        existing.get("fields").and_then(|f| f.as_array()),
    ) else {
        return candidate == existing;
    };

    for existing_field in existing_fields {
        let Some(name) = existing_field.get("name").and_then(|n| n.as_str()) else {
            continue;
        };
        let Some(candidate_field) = candidate_fields
            .iter()
            .find(|f| f.get("name").and_then(|n| n.as_str()) == Some(name))
        else {
            continue;
        };
        if candidate_field.get("type") != existing_field.get("type") {
            return false;
        }
    }
    true
}
