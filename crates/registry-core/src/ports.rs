//! The three external collaborators this crate is built against, expressed as capability traits.
//!
//! `LogClient`, `Coordinator`, and `SchemaDialect` are never implemented in this crate: production
//! wiring supplies adapters over a real log (e.g. a Kafka- or Gazette-style broker), a real
//! coordination service (e.g. ZooKeeper or etcd), and a real schema parser. `registry-core`'s
//! `tests/support` module supplies in-memory fakes of all three so the replicated-state-machine
//! logic can be exercised without any of that infrastructure.

use crate::model::CompatibilityLevel;
use futures::stream::BoxStream;
use std::fmt::Debug;

/// A position in the log's single partition. Offsets are dense and strictly increasing per
/// record, but a client must not assume they are contiguous.
pub type Offset = u64;

/// Appends records to, and tails, the registry's single-partition topic.
///
/// Implementations must deliver every appended record to every subscriber at least once, in the
/// order `append` observed them. Redelivery of a record already seen by a subscriber is allowed;
/// `LogBackedStore`'s apply path is idempotent with respect to replays of the same offset.
#[async_trait::async_trait]
pub trait LogClient: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Appends `record` and returns the offset it was assigned.
    async fn append(&self, record: Vec<u8>) -> Result<Offset, Self::Error>;

    /// Subscribes to the topic starting at `from`, returning a stream of `(offset, record)`
    /// pairs in log order. The stream never terminates on its own; transient errors are retried
    /// internally by the implementation and only permanent failures surface as stream errors.
    fn subscribe(&self, from: Offset) -> BoxStream<'static, Result<(Offset, Vec<u8>), Self::Error>>;
}

/// A version token guarding a conditional write against a persistent coordinator node.
///
/// Mirrors ZooKeeper's `Stat.version` / etcd's `mod_revision`: it changes on every write to the
/// node and a write whose `expected_version` no longer matches is rejected rather than applied.
pub type CasVersion = i64;

/// The current value of a persistent coordinator node, paired with its CAS version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeVersion<T> {
    pub value: T,
    pub version: CasVersion,
}

/// An ephemeral-membership registry with session semantics, plus persistent nodes supporting
/// version-guarded conditional writes.
///
/// This is the seam behind which a real ZooKeeper- or etcd-backed coordinator lives. `IdAllocator`
/// uses the persistent-node half; `MasterElector` uses the membership half.
#[async_trait::async_trait]
pub trait Coordinator: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reads the current value and CAS version of a persistent node, or `None` if it does not exist.
    async fn read_node(&self, path: &str) -> Result<Option<NodeVersion<Vec<u8>>>, Self::Error>;

    /// Creates a persistent node with an initial value. Implementations should fail (returning
    /// `Err`) if the node already exists; callers only invoke this after observing `read_node`
    /// return `None`.
    async fn create_node(&self, path: &str, value: Vec<u8>) -> Result<(), Self::Error>;

    /// Overwrites a persistent node's value if and only if its current CAS version equals
    /// `expected_version`. Returns `true` on success, `false` on a version mismatch (the caller
    /// is expected to re-read and retry, never treat this as a hard error).
    async fn compare_and_set(
        &self,
        path: &str,
        value: Vec<u8>,
        expected_version: CasVersion,
    ) -> Result<bool, Self::Error>;

    /// Registers `identity` as an ephemeral member under `path`, bound to this coordinator
    /// session, and returns a stream that yields the full current membership set every time it
    /// changes (a peer joins or leaves, or this session's connection to the coordinator resets).
    async fn watch_membership(
        &self,
        path: &str,
        identity: Vec<u8>,
    ) -> Result<BoxStream<'static, Result<Vec<Vec<u8>>, Self::Error>>, Self::Error>;
}

/// The format-specific schema parser and compatibility checker (e.g. Avro, JSON Schema, Protobuf).
///
/// Purely computational: no I/O, so no associated error type or async is needed. An invalid
/// schema is reported by returning `None` from `canonicalize` rather than via `Result`, since
/// `Registry` only ever needs to know "parsed" vs. "did not parse" to map to `InvalidSchema`.
pub trait SchemaDialect: Send + Sync + Debug + 'static {
    /// Parses `schema` and returns its canonical textual form, or `None` if it does not parse.
    /// Equal schemas (up to irrelevant textual differences) must produce equal canonical forms.
    fn canonicalize(&self, schema: &str) -> Option<String>;

    /// Decides whether `candidate` is compatible with `existing` under `level`. Both arguments
    /// are already-canonicalized schema text.
    fn is_compatible(&self, level: CompatibilityLevel, candidate: &str, existing: &str) -> bool;
}
