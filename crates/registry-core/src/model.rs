//! The keys and values that flow through the registry's log, and the indexes derived from them.
//!
//! Everything here is pure data: no I/O, no locking. [`crate::store::LogBackedStore`] is the only
//! thing that mutates the derived indexes, and it does so strictly in log order.

use std::collections::HashMap;
use std::fmt;

/// A globally unique schema id, as assigned by [`crate::id_allocator::IdAllocator`].
pub type SchemaId = i32;

/// A per-subject version number. Versions for a subject are `1..=k` with no gaps.
pub type Version = i32;

/// Sentinel accepted by [`crate::registry::Registry::get`] meaning "the highest version".
pub const LATEST_VERSION: Version = -1;

/// The 128-bit MD5 digest of a canonical schema string, used to key `schema_hash_to_guid`.
pub type SchemaDigest = [u8; 16];

pub fn digest(canonical_schema: &str) -> SchemaDigest {
    md5::compute(canonical_schema.as_bytes()).0
}

/// `(subject, version)`, uniquely identifying one registered schema value.
///
/// Field order matters: the derived [`Ord`] implementation is exactly the `(subject asc, version
/// asc)` ordering a subject's version range scan needs, since Rust derives struct `Ord` by comparing
/// fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct SchemaKey {
    pub subject: String,
    pub version: Version,
}

impl SchemaKey {
    pub fn new(subject: impl Into<String>, version: Version) -> Self {
        SchemaKey {
            subject: subject.into(),
            version,
        }
    }

    /// The half-open range of keys covering every version of `subject`.
    pub fn subject_range(subject: &str) -> (SchemaKey, SchemaKey) {
        (
            SchemaKey::new(subject, 1),
            SchemaKey::new(subject, Version::MAX),
        )
    }
}

/// `ConfigKey{subject: None}` is the cluster-wide default; `Some(subject)` overrides it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ConfigKey {
    pub subject: Option<String>,
}

impl ConfigKey {
    pub fn cluster_default() -> Self {
        ConfigKey { subject: None }
    }

    pub fn for_subject(subject: impl Into<String>) -> Self {
        ConfigKey {
            subject: Some(subject.into()),
        }
    }
}

/// A tagged, totally ordered union of every key variant that can appear on the log.
///
/// Variant declaration order (`Schema`, `Config`, `Noop`) together with the derived `Ord`
/// determines how differently-tagged keys compare; only same-variant comparisons are ever
/// meaningful to callers (range scans are always issued within a single `Schema` subject).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(tag = "keyType")]
pub enum RegistryKey {
    Schema(SchemaKey),
    Config(ConfigKey),
    /// Reserved for the liveness probe record appended during bootstrap (see `LogBackedStore::init`).
    /// Never durably associated with a value that callers observe.
    Noop,
}

impl From<SchemaKey> for RegistryKey {
    fn from(k: SchemaKey) -> Self {
        RegistryKey::Schema(k)
    }
}

impl From<ConfigKey> for RegistryKey {
    fn from(k: ConfigKey) -> Self {
        RegistryKey::Config(k)
    }
}

/// The compatibility policy enforced between a new schema and the latest version of a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatibilityLevel {
    None,
    Backward,
    Forward,
    Full,
}

impl fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompatibilityLevel::None => "NONE",
            CompatibilityLevel::Backward => "BACKWARD",
            CompatibilityLevel::Forward => "FORWARD",
            CompatibilityLevel::Full => "FULL",
        };
        f.write_str(s)
    }
}

/// A registered schema: the durable payload behind a [`SchemaKey`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchemaValue {
    pub subject: String,
    pub version: Version,
    pub id: SchemaId,
    pub schema: String,
    #[serde(default)]
    pub deleted: bool,
}

/// The durable payload behind a [`ConfigKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConfigValue {
    pub level: CompatibilityLevel,
}

/// A tagged union of every value variant that can appear on the log.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "valueType")]
pub enum RegistryValue {
    Schema(SchemaValue),
    Config(ConfigValue),
}

impl From<SchemaValue> for RegistryValue {
    fn from(v: SchemaValue) -> Self {
        RegistryValue::Schema(v)
    }
}

impl From<ConfigValue> for RegistryValue {
    fn from(v: ConfigValue) -> Self {
        RegistryValue::Config(v)
    }
}

/// `schema_hash_to_guid[digest]`: the id bound to a canonical schema, and every subject under
/// which that exact content has been registered (mapped to the version it holds there).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaIdAndSubjects {
    pub id: SchemaId,
    pub version_by_subject: HashMap<String, Version>,
}

impl SchemaIdAndSubjects {
    pub fn new(id: SchemaId) -> Self {
        SchemaIdAndSubjects {
            id,
            version_by_subject: HashMap::new(),
        }
    }
}
