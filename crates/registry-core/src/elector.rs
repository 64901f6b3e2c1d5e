//! Leader election over the coordinator's ephemeral membership.
//!
//! `MasterElector` owns no application state: it registers this node's [`Identity`], watches the
//! resulting membership set, picks a deterministic winner among eligible members, and reports the
//! outcome to whoever implements [`MasterObserver`] (in practice, `Registry`). It never decides
//! what happens on a transition; that serialization lives behind `Registry`'s `masterLock`.

use std::sync::Arc;

use tokio_stream::StreamExt;

use crate::error::RegistryError;
use crate::ports::Coordinator;

/// This node's address and eligibility, as published to the coordinator's ephemeral membership.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Identity {
    pub host: String,
    pub port: u16,
    /// Nodes with `eligible = false` are registered (so followers can still discover the
    /// cluster's full membership) but are never selected as master.
    pub eligible: bool,
}

impl Identity {
    pub fn new(host: impl Into<String>, port: u16, eligible: bool) -> Self {
        Identity {
            host: host.into(),
            port,
            eligible,
        }
    }

    fn order_key(&self) -> (&str, u16) {
        (&self.host, self.port)
    }
}

/// Notified whenever the elected master changes.
#[async_trait::async_trait]
pub trait MasterObserver: Send + Sync + 'static {
    /// `None` means no eligible node is currently known to the coordinator.
    async fn set_master(&self, identity: Option<Identity>);
}

pub struct MasterElector<C: Coordinator> {
    coordinator: Arc<C>,
    election_path: String,
    identity: Identity,
}

impl<C: Coordinator> MasterElector<C> {
    pub fn new(coordinator: Arc<C>, election_path: impl Into<String>, identity: Identity) -> Self {
        MasterElector {
            coordinator,
            election_path: election_path.into(),
            identity,
        }
    }

    /// Registers this node as an ephemeral member and drives `observer.set_master` for as long as
    /// the membership watch keeps running. Intended to be spawned as a long-lived background task.
    #[tracing::instrument(skip_all, fields(host = %self.identity.host, port = self.identity.port))]
    pub async fn run(self, observer: Arc<dyn MasterObserver>) -> Result<(), RegistryError> {
        let identity_bytes = serde_json::to_vec(&self.identity).map_err(RegistryError::store)?;
        let mut memberships = self
            .coordinator
            .watch_membership(&self.election_path, identity_bytes)
            .await
            .map_err(RegistryError::store)?;

        while let Some(update) = memberships.next().await {
            match update {
                Ok(members) => {
                    let winner = elect(&members);
                    if let Some(ref w) = winner {
                        tracing::info!(host = %w.host, port = w.port, "observed new master");
                    } else {
                        tracing::warn!("no eligible master found among current membership");
                    }
                    observer.set_master(winner).await;
                }
                Err(err) => {
                    tracing::warn!(%err, "coordinator membership watch failed; treating as no master");
                    observer.set_master(None).await;
                }
            }
        }

        Ok(())
    }
}

/// Picks the eligible candidate that sorts first under `(host, port)`. Any total order over the
/// eligible set works as long as every node computes the same one from the same membership; this
/// is the simplest order that needs no extra coordination state.
fn elect(raw_members: &[Vec<u8>]) -> Option<Identity> {
    let mut candidates: Vec<Identity> = raw_members
        .iter()
        .filter_map(|bytes| match serde_json::from_slice::<Identity>(bytes) {
            Ok(identity) => Some(identity),
            Err(err) => {
                tracing::warn!(%err, "skipping unparseable membership entry");
                None
            }
        })
        .filter(|identity| identity.eligible)
        .collect();

    candidates.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    candidates.into_iter().next()
}
