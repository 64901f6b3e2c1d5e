//! A bundled, in-process `LogClient`/`Coordinator` pair for running a single standalone node.
//!
//! `registry-core` treats the log and the coordinator as external collaborators: a real
//! deployment wires `LogBackedStore`/`IdAllocator`/`MasterElector` against a Kafka- or
//! Gazette-style broker and a ZooKeeper- or etcd-style coordination service. Neither ships here.
//! This module exists so `registry-service` can boot and serve traffic on its own for local
//! development and single-node use; a multi-node production deployment should replace both types
//! with adapters over real infrastructure, implementing the same [`registry_core::LogClient`] and
//! [`registry_core::Coordinator`] traits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::BoxStream;
use registry_core::{CasVersion, Coordinator, LogClient, NodeVersion, Offset};
use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("node {0:?} already exists")]
    NodeExists(String),

    #[error("node {0:?} does not exist")]
    NodeMissing(String),
}

/// A single-partition, in-process log. Durable only for the lifetime of the process; there is no
/// persistence across restarts, which is the main reason this is a standalone/demo backend rather
/// than one suitable for production use.
pub struct StandaloneLog {
    records: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl StandaloneLog {
    pub fn new() -> Arc<Self> {
        Arc::new(StandaloneLog {
            records: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

#[async_trait::async_trait]
impl LogClient for StandaloneLog {
    type Error = BackendError;

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
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }))
    }
}

struct MembershipTopic {
    members: Vec<Vec<u8>>,
    tx: watch::Sender<Vec<Vec<u8>>>,
}

/// An in-process coordinator: persistent nodes with version-guarded CAS, plus ephemeral
/// membership topics. A single process is trivially its own majority, so election here always
/// converges on whichever identities have called `watch_membership`.
pub struct StandaloneCoordinator {
    nodes: Mutex<HashMap<String, NodeVersion<Vec<u8>>>>,
    topics: Mutex<HashMap<String, MembershipTopic>>,
}

impl StandaloneCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(StandaloneCoordinator {
            nodes: Mutex::new(HashMap::new()),
            topics: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait::async_trait]
impl Coordinator for StandaloneCoordinator {
    type Error = BackendError;

    async fn read_node(&self, path: &str) -> Result<Option<NodeVersion<Vec<u8>>>, Self::Error> {
        Ok(self.nodes.lock().unwrap().get(path).cloned())
    }

    async fn create_node(&self, path: &str, value: Vec<u8>) -> Result<(), Self::Error> {
        let mut guard = self.nodes.lock().unwrap();
        if guard.contains_key(path) {
            return Err(BackendError::NodeExists(path.to_string()));
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
        let node = guard
            .get_mut(path)
            .ok_or_else(|| BackendError::NodeMissing(path.to_string()))?;
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
        let topic = guard.entry(path.to_string()).or_insert_with(|| {
            let (tx, _rx) = watch::channel(Vec::new());
            MembershipTopic {
                members: Vec::new(),
                tx,
            }
        });
        topic.members.push(identity);
        let _ = topic.tx.send(topic.members.clone());
        Ok(Box::pin(watch_stream(topic.tx.subscribe())))
    }
}

enum WatchState {
    Initial(watch::Receiver<Vec<Vec<u8>>>),
    Waiting(watch::Receiver<Vec<Vec<u8>>>),
}

fn watch_stream(
    rx: watch::Receiver<Vec<Vec<u8>>>,
) -> impl futures::Stream<Item = Result<Vec<Vec<u8>>, BackendError>> {
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
