//! The error taxonomy every `Registry` operation reports through.
//!
//! Each variant is distinct rather than stringly-typed so that callers (and, eventually, an HTTP
//! layer mapping these to status codes) can match on `RegistryError` instead of parsing messages.
//! Infrastructure failures from the injected `LogClient`/`Coordinator` ports are erased behind
//! `anyhow::Error` at the point they cross into this enum, since their concrete error types are
//! generic associated types this crate has no reason to name.

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The schema did not parse under the configured [`crate::ports::SchemaDialect`].
    #[error("invalid schema")]
    InvalidSchema,

    /// The new schema violates the effective compatibility policy for its subject.
    #[error("schema being registered is incompatible with an earlier schema")]
    IncompatibleSchema,

    /// A durable-store failure: the log, the coordinator, or (de)serialization.
    #[error("store error: {0}")]
    StoreError(#[source] anyhow::Error),

    /// Bootstrap or a write did not complete within its configured deadline.
    #[error("{0}")]
    Timeout(#[from] TimeoutKind),

    /// A mutation was attempted while no master is currently known.
    #[error("no master is currently known")]
    UnknownMaster,

    /// Forwarding a mutation to the master over HTTP failed.
    #[error("forwarding to master failed: {0}")]
    ForwardingError(#[from] ForwardingError),

    /// `LogBackedStore::init` failed unrecoverably.
    #[error("initialization failed: {0}")]
    Initialization(#[source] anyhow::Error),
}

impl RegistryError {
    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        RegistryError::StoreError(err.into())
    }

    pub fn initialization(err: impl Into<anyhow::Error>) -> Self {
        RegistryError::Initialization(err.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeoutKind {
    #[error("bootstrap did not complete within {0:?}")]
    Bootstrap(std::time::Duration),

    #[error("write was not observed by the local tailer within {0:?}")]
    Write(std::time::Duration),

    #[error("coordinator did not respond within {0:?}")]
    Coordinator(std::time::Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum ForwardingError {
    #[error("network error contacting master: {0}")]
    Network(#[source] anyhow::Error),

    #[error("master responded with unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}
