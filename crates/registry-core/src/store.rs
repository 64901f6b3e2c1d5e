//! The log-backed key-value store: the append-only topic projected into an in-memory view.
//!
//! `LogBackedStore` owns the single tailer task for its topic, the materialized `BTreeMap`, and
//! the derived `guid_to_schema_key` /
//! `schema_hash_to_guid` / `max_id_in_store` indexes, all of it mutated only by that tailer, in
//! log order. Callers never see a half-applied record: `append` suspends until the tailer has
//! caught up to the offset it produced.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio_stream::StreamExt;

use crate::error::{RegistryError, TimeoutKind};
use crate::model::{
    ConfigKey, ConfigValue, RegistryKey, RegistryValue, SchemaDigest, SchemaId,
    SchemaIdAndSubjects, SchemaKey, SchemaValue,
};
use crate::ports::{LogClient, Offset};
use crate::wire::{self, Record};

/// Observes records as the tailer applies them, without `LogBackedStore` holding a reference back
/// to whatever owns the observer. Keeps the dependency unidirectional: tailer → listener, never
/// listener → tailer.
pub trait ApplyListener: Send + Sync + 'static {
    fn on_schema(&self, _value: &SchemaValue) {}
    fn on_config(&self, _key: &ConfigKey, _value: &ConfigValue) {}
}

/// A listener that does nothing; the default for callers with no use for apply notifications.
#[derive(Debug, Default)]
pub struct NoopApplyListener;

impl ApplyListener for NoopApplyListener {}

#[derive(Default)]
struct Indexes {
    map: BTreeMap<RegistryKey, RegistryValue>,
    guid_to_schema_key: HashMap<SchemaId, SchemaKey>,
    schema_hash_to_guid: HashMap<SchemaDigest, SchemaIdAndSubjects>,
    /// -1 when no schema has ever been observed.
    max_id_in_store: i32,
}

impl Indexes {
    fn new() -> Self {
        Indexes {
            map: BTreeMap::new(),
            guid_to_schema_key: HashMap::new(),
            schema_hash_to_guid: HashMap::new(),
            max_id_in_store: -1,
        }
    }

    fn apply(&mut self, record: Record, listener: &dyn ApplyListener) {
        let Record { key, value } = record;
        match (&key, value) {
            (RegistryKey::Schema(schema_key), Some(RegistryValue::Schema(schema_value))) => {
                let digest = crate::model::digest(&schema_value.schema);
                self.guid_to_schema_key
                    .insert(schema_value.id, schema_key.clone());
                let entry = self
                    .schema_hash_to_guid
                    .entry(digest)
                    .or_insert_with(|| SchemaIdAndSubjects::new(schema_value.id));
                entry
                    .version_by_subject
                    .insert(schema_key.subject.clone(), schema_key.version);
                if schema_value.id > self.max_id_in_store {
                    self.max_id_in_store = schema_value.id;
                }
                listener.on_schema(&schema_value);
                self.map.insert(key, RegistryValue::Schema(schema_value));
            }
            (RegistryKey::Config(config_key), Some(RegistryValue::Config(config_value))) => {
                listener.on_config(config_key, &config_value);
                self.map.insert(key, RegistryValue::Config(config_value));
            }
            (RegistryKey::Noop, _) => {
                // Liveness probe only; never enters the materialized view.
            }
            (key, value) => {
                tracing::warn!(?key, ?value, "skipping log record with mismatched key/value variant");
            }
        }
    }
}

/// A typed view over the registry's single-partition log.
pub struct LogBackedStore<L: LogClient> {
    log: Arc<L>,
    indexes: Arc<RwLock<Indexes>>,
    applied: watch::Receiver<Offset>,
    write_timeout: Duration,
}

impl<L: LogClient> LogBackedStore<L> {
    /// Subscribes to the topic from offset 0, starts the tailer, and blocks until bootstrap
    /// completes (the synthetic `Noop` probe this call appends has been applied).
    #[tracing::instrument(skip_all)]
    pub async fn init(
        log: Arc<L>,
        listener: Arc<dyn ApplyListener>,
        bootstrap_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let indexes = Arc::new(RwLock::new(Indexes::new()));
        let (applied_tx, applied_rx) = watch::channel(0u64);

        let mut records = log.subscribe(0);
        let tailer_indexes = indexes.clone();
        tokio::spawn(async move {
            while let Some(item) = records.next().await {
                match item {
                    Ok((offset, bytes)) => {
                        match wire::decode(&bytes) {
                            Ok(record) => {
                                let mut guard = tailer_indexes.write().await;
                                guard.apply(record, listener.as_ref());
                            }
                            Err(err) => {
                                tracing::warn!(%err, offset, "skipping corrupt log record");
                            }
                        }
                        // Only advance the published watermark after the index mutation above is
                        // visible, so a waiter woken by this send always observes its effects.
                        let _ = applied_tx.send(offset);
                    }
                    Err(err) => {
                        tracing::error!(%err, "log subscription reported an error; continuing to tail");
                    }
                }
            }
        });

        let store = LogBackedStore {
            log,
            indexes,
            applied: applied_rx,
            write_timeout,
        };

        let probe_offset = store
            .log
            .append(wire::encode(RegistryKey::Noop, None).map_err(RegistryError::store)?)
            .await
            .map_err(RegistryError::store)?;

        store
            .wait_for_offset(probe_offset, bootstrap_timeout)
            .await
            .map_err(|_| RegistryError::Timeout(TimeoutKind::Bootstrap(bootstrap_timeout)))?;

        Ok(store)
    }

    /// Already guaranteed by the time `init` returns; kept as an explicit, idempotent call for
    /// callers (the master-election callback) that want to assert it rather than assume it.
    pub async fn wait_until_bootstrap_completes(&self) -> Result<(), RegistryError> {
        Ok(())
    }

    /// Serializes `key`/`value`, appends to the log, and suspends until the local tailer has
    /// applied the resulting offset (producer-with-readback).
    pub async fn append(
        &self,
        key: RegistryKey,
        value: RegistryValue,
    ) -> Result<(), RegistryError> {
        let bytes = wire::encode(key, Some(value)).map_err(RegistryError::store)?;
        let offset = self
            .log
            .append(bytes)
            .await
            .map_err(RegistryError::store)?;

        self.wait_for_offset(offset, self.write_timeout)
            .await
            .map_err(|_| RegistryError::Timeout(TimeoutKind::Write(self.write_timeout)))
    }

    async fn wait_for_offset(&self, offset: Offset, deadline: Duration) -> Result<(), ()> {
        let mut rx = self.applied.clone();
        tokio::time::timeout(deadline, rx.wait_for(|applied| *applied >= offset))
            .await
            .map(|_| ())
            .map_err(|_| ())
    }

    pub async fn get(&self, key: &RegistryKey) -> Option<RegistryValue> {
        self.indexes.read().await.map.get(key).cloned()
    }

    /// Every value whose key falls in `[lo, hi]` under [`RegistryKey`]'s ordering, in key order.
    pub async fn get_all(&self, lo: RegistryKey, hi: RegistryKey) -> Vec<(RegistryKey, RegistryValue)> {
        self.indexes
            .read()
            .await
            .map
            .range((Bound::Included(lo), Bound::Included(hi)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub async fn get_all_keys(&self) -> Vec<RegistryKey> {
        self.indexes.read().await.map.keys().cloned().collect()
    }

    pub async fn max_id(&self) -> i32 {
        self.indexes.read().await.max_id_in_store
    }

    pub async fn lookup_by_id(&self, id: SchemaId) -> Option<SchemaKey> {
        self.indexes.read().await.guid_to_schema_key.get(&id).cloned()
    }

    pub async fn lookup_by_digest(&self, digest: &SchemaDigest) -> Option<SchemaIdAndSubjects> {
        self.indexes
            .read()
            .await
            .schema_hash_to_guid
            .get(digest)
            .cloned()
    }
}
