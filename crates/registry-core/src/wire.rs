//! The on-log wire format.
//!
//! Keys and values are modeled as tagged Rust enums (see [`crate::model`]) and encoded as JSON.
//! JSON was chosen over a compact binary form for a human-inspectable log record, valuable when
//! debugging a replicated store. `serde_json`'s struct encoder always writes fields in declaration
//! order, so two calls with equal logical input produce byte-identical output, satisfying the
//! stability the log's serializer contract requires.

use crate::model::{RegistryKey, RegistryValue};
use serde::{Deserialize, Serialize};

/// One logical record as it appears on the log: a key, and a value for every variant except
/// [`RegistryKey::Noop`], which carries none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub key: RegistryKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RegistryValue>,
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode record: {0}")]
    Decode(#[source] serde_json::Error),
}

pub fn encode(key: RegistryKey, value: Option<RegistryValue>) -> Result<Vec<u8>, WireError> {
    serde_json::to_vec(&Record { key, value }).map_err(WireError::Encode)
}

pub fn decode(bytes: &[u8]) -> Result<Record, WireError> {
    serde_json::from_slice(bytes).map_err(WireError::Decode)
}
