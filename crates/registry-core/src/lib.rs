//! The replicated state machine behind a schema registry: a log-backed key-value store, leader
//! election with write forwarding, and a batch-reserving id allocator, wired together by
//! [`registry::Registry`].
//!
//! `LogClient`, `Coordinator`, and `SchemaDialect` (see [`ports`]) are capabilities this crate
//! consumes but never implements: production wiring supplies real adapters over a log system, a
//! coordination service, and a schema dialect, while `tests/support` supplies in-memory fakes for
//! this crate's own test suite.

pub mod elector;
pub mod error;
pub mod forwarder;
pub mod id_allocator;
pub mod model;
pub mod ports;
pub mod registry;
pub mod store;
pub mod wire;

pub use elector::{Identity, MasterElector, MasterObserver};
pub use error::{ForwardingError, RegistryError, TimeoutKind};
pub use forwarder::Forwarder;
pub use id_allocator::IdAllocator;
pub use model::{
    CompatibilityLevel, ConfigKey, ConfigValue, RegistryKey, RegistryValue, SchemaId, SchemaKey,
    SchemaValue, Version, LATEST_VERSION,
};
pub use ports::{CasVersion, Coordinator, LogClient, NodeVersion, Offset, SchemaDialect};
pub use registry::Registry;
pub use store::{ApplyListener, LogBackedStore, NoopApplyListener};
