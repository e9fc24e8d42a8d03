//! Versioned JSON envelope for persisted records.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

pub const FORMAT_VERSION: u32 = 1;

/// One persisted record: payload plus format version and write time.
#[derive(Debug, Serialize, Deserialize)]
pub struct Record<T> {
    pub version: u32,
    /// Unix seconds at write time.
    #[serde(default)]
    pub timestamp: u64,
    pub data: T,
}

pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>> {
    let record = Record {
        version: FORMAT_VERSION,
        timestamp: now_unix_secs(),
        data,
    };
    Ok(serde_json::to_vec_pretty(&record)?)
}

/// Decode a record, rejecting versions newer than this build understands.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<Record<T>> {
    let record: Record<T> = serde_json::from_slice(bytes)?;
    if record.version == 0 || record.version > FORMAT_VERSION {
        return Err(StoreError::InvalidData(format!(
            "unsupported record version {} (expected <= {FORMAT_VERSION})",
            record.version
        )));
    }
    Ok(record)
}
