//! The public operations: registration, lookup, listing, and compatibility configuration.
//!
//! `Registry` is the one stateful object with an `init → serve → close` lifecycle; everything
//! else in this crate is either a pure port (`LogClient`, `Coordinator`, `SchemaDialect`) or owned
//! exclusively by `Registry` (`LogBackedStore`, `IdAllocator`, `Forwarder`).

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::elector::{Identity, MasterObserver};
use crate::error::RegistryError;
use crate::forwarder::Forwarder;
use crate::id_allocator::IdAllocator;
use crate::model::{
    self, CompatibilityLevel, ConfigKey, ConfigValue, RegistryKey, RegistryValue, SchemaId,
    SchemaKey, SchemaValue, Version, LATEST_VERSION,
};
use crate::ports::{Coordinator, LogClient, SchemaDialect};
use crate::store::LogBackedStore;

pub struct Registry<L: LogClient, C: Coordinator, D: SchemaDialect> {
    store: Arc<LogBackedStore<L>>,
    id_allocator: Arc<IdAllocator<C>>,
    dialect: Arc<D>,
    forwarder: Forwarder,
    self_identity: Identity,
    /// Guards the read of `current master` for routing decisions, and the whole of a
    /// master-transition in [`MasterObserver::set_master`]. Never held across forwarded I/O.
    master: Mutex<Option<Identity>>,
    default_compatibility: CompatibilityLevel,
}

impl<L: LogClient, C: Coordinator, D: SchemaDialect> Registry<L, C, D> {
    pub fn new(
        store: Arc<LogBackedStore<L>>,
        id_allocator: Arc<IdAllocator<C>>,
        dialect: Arc<D>,
        forwarder: Forwarder,
        self_identity: Identity,
        default_compatibility: CompatibilityLevel,
    ) -> Arc<Self> {
        Arc::new(Registry {
            store,
            id_allocator,
            dialect,
            forwarder,
            self_identity,
            master: Mutex::new(None),
            default_compatibility,
        })
    }

    async fn is_master(&self) -> bool {
        self.master.lock().await.as_ref() == Some(&self.self_identity)
    }

    async fn current_master(&self) -> Option<Identity> {
        self.master.lock().await.clone()
    }

    /// Registers `schema_text` under `subject`, returning its id. Idempotent for identical
    /// content already registered under the same subject; reuses an existing id for content
    /// already registered under a different subject.
    #[tracing::instrument(skip(self, schema_text))]
    pub async fn register(&self, subject: &str, schema_text: &str) -> Result<SchemaId, RegistryError> {
        if subject.is_empty() || schema_text.is_empty() {
            return Err(RegistryError::InvalidSchema);
        }

        if !self.is_master().await {
            let master = self.current_master().await.ok_or(RegistryError::UnknownMaster)?;
            return self
                .forwarder
                .forward_register(&master, subject, schema_text, &[])
                .await;
        }

        let canonical = self
            .dialect
            .canonicalize(schema_text)
            .ok_or(RegistryError::InvalidSchema)?;
        let digest = model::digest(&canonical);

        if let Some(existing) = self.store.lookup_by_digest(&digest).await {
            if existing.version_by_subject.contains_key(subject) {
                return Ok(existing.id);
            }
            return self.append_new_version(subject, &canonical, Some(existing.id)).await;
        }

        self.append_new_version(subject, &canonical, None).await
    }

    async fn append_new_version(
        &self,
        subject: &str,
        canonical_schema: &str,
        carried_id: Option<SchemaId>,
    ) -> Result<SchemaId, RegistryError> {
        let versions = self.get_all_versions(subject).await?;
        let latest = versions.last();
        let new_version: Version = latest.map(|s| s.version + 1).unwrap_or(1);

        if let Some(latest) = latest {
            let level = self.effective_level(Some(subject)).await?;
            if !self
                .dialect
                .is_compatible(level, canonical_schema, &latest.schema)
            {
                return Err(RegistryError::IncompatibleSchema);
            }
        }

        let id = match carried_id {
            Some(id) => id,
            None => {
                let max_id = self.store.max_id().await;
                self.id_allocator.next(max_id).await?
            }
        };

        let value = SchemaValue {
            subject: subject.to_string(),
            version: new_version,
            id,
            schema: canonical_schema.to_string(),
            deleted: false,
        };
        self.store
            .append(SchemaKey::new(subject, new_version).into(), value.into())
            .await?;
        Ok(id)
    }

    /// Looks up a previously registered schema by its exact content. Not a mutation: never
    /// forwarded, never requires master.
    #[tracing::instrument(skip(self, schema_text))]
    pub async fn lookup(
        &self,
        subject: &str,
        schema_text: &str,
    ) -> Result<Option<SchemaValue>, RegistryError> {
        let canonical = self
            .dialect
            .canonicalize(schema_text)
            .ok_or(RegistryError::InvalidSchema)?;
        let digest = model::digest(&canonical);

        let Some(existing) = self.store.lookup_by_digest(&digest).await else {
            return Ok(None);
        };
        let Some(&version) = existing.version_by_subject.get(subject) else {
            return Ok(None);
        };
        self.fetch_schema(&SchemaKey::new(subject, version)).await
    }

    /// `version == LATEST_VERSION` is the `latest` sentinel.
    pub async fn get(&self, subject: &str, version: Version) -> Result<Option<SchemaValue>, RegistryError> {
        if version == LATEST_VERSION {
            return self.get_latest_version(subject).await;
        }
        self.fetch_schema(&SchemaKey::new(subject, version)).await
    }

    pub async fn get_by_id(&self, id: SchemaId) -> Result<Option<String>, RegistryError> {
        let Some(key) = self.store.lookup_by_id(id).await else {
            return Ok(None);
        };
        Ok(self.fetch_schema(&key).await?.map(|v| v.schema))
    }

    async fn fetch_schema(&self, key: &SchemaKey) -> Result<Option<SchemaValue>, RegistryError> {
        match self.store.get(&RegistryKey::Schema(key.clone())).await {
            Some(RegistryValue::Schema(value)) => Ok(Some(value)),
            Some(RegistryValue::Config(_)) | None => Ok(None),
        }
    }

    pub async fn list_subjects(&self) -> Result<BTreeSet<String>, RegistryError> {
        let keys = self.store.get_all_keys().await;
        Ok(keys
            .into_iter()
            .filter_map(|key| match key {
                RegistryKey::Schema(schema_key) => Some(schema_key.subject),
                _ => None,
            })
            .collect())
    }

    pub async fn get_all_versions(&self, subject: &str) -> Result<Vec<SchemaValue>, RegistryError> {
        let (lo, hi) = SchemaKey::subject_range(subject);
        let entries = self
            .store
            .get_all(RegistryKey::Schema(lo), RegistryKey::Schema(hi))
            .await;

        let mut values: Vec<SchemaValue> = entries
            .into_iter()
            .filter_map(|(_, value)| match value {
                RegistryValue::Schema(v) => Some(v),
                RegistryValue::Config(_) => None,
            })
            .collect();
        values.sort_by_key(|v| v.version);
        Ok(values)
    }

    pub async fn get_latest_version(&self, subject: &str) -> Result<Option<SchemaValue>, RegistryError> {
        Ok(self.get_all_versions(subject).await?.pop())
    }

    /// Follower nodes report `UnknownMaster` rather than forwarding: forwarding a *configuration*
    /// change is intentionally left unimplemented, unlike `register`'s write-forwarding path.
    #[tracing::instrument(skip(self))]
    pub async fn update_compatibility(
        &self,
        subject: Option<&str>,
        level: CompatibilityLevel,
    ) -> Result<(), RegistryError> {
        if !self.is_master().await {
            return Err(RegistryError::UnknownMaster);
        }

        let key = match subject {
            Some(s) => ConfigKey::for_subject(s),
            None => ConfigKey::cluster_default(),
        };
        self.store.append(key.into(), ConfigValue { level }.into()).await
    }

    pub async fn get_compatibility(&self, subject: Option<&str>) -> Result<CompatibilityLevel, RegistryError> {
        self.effective_level(subject).await
    }

    /// Resolution order: subject-level config, then cluster-wide config, then the startup default.
    async fn effective_level(&self, subject: Option<&str>) -> Result<CompatibilityLevel, RegistryError> {
        if let Some(subject) = subject {
            if let Some(RegistryValue::Config(config)) =
                self.store.get(&RegistryKey::Config(ConfigKey::for_subject(subject))).await
            {
                return Ok(config.level);
            }
        }
        if let Some(RegistryValue::Config(config)) = self
            .store
            .get(&RegistryKey::Config(ConfigKey::cluster_default()))
            .await
        {
            return Ok(config.level);
        }
        Ok(self.default_compatibility)
    }
}

#[async_trait::async_trait]
impl<L: LogClient, C: Coordinator, D: SchemaDialect> MasterObserver for Registry<L, C, D> {
    /// Serialized end-to-end by `master`: a demotion is fully applied (allocator reset, metric
    /// flipped) before any subsequent promotion in the same call can proceed.
    #[tracing::instrument(skip(self))]
    async fn set_master(&self, identity: Option<Identity>) {
        let mut guard = self.master.lock().await;
        let was_master = guard.as_ref() == Some(&self.self_identity);
        let becoming_master = identity.as_ref() == Some(&self.self_identity);
        *guard = identity;

        if becoming_master && !was_master {
            if let Err(err) = self.store.wait_until_bootstrap_completes().await {
                tracing::error!(%err, "bootstrap did not complete while becoming master");
                return;
            }
            let max_id = self.store.max_id().await;
            if let Err(err) = self.id_allocator.prime(max_id).await {
                tracing::error!(%err, "failed to prime id allocator while becoming master");
                return;
            }
            metrics::gauge!("master_slave_role").set(1.0);
            tracing::info!("this node is now master");
        } else if was_master && !becoming_master {
            self.id_allocator.reset().await;
            metrics::gauge!("master_slave_role").set(0.0);
            tracing::info!("this node is no longer master");
        }
    }
}
