//! Snapshot persistence for deferred references
//!
//! Serializes the observable tri-state of a reference — still pending,
//! resolved to a value, or resolved absent — in a versioned envelope.
//! Supports JSON (human-readable, easier debugging), binary (compact) and
//! gzip-compressed JSON forms.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::error::{LocalizeError, LocalizeResult};

/// Observable resolution state of one reference
///
/// `Resolved { value: None, exists: true }` is "no value for this locale";
/// `Resolved { exists: false, .. }` is "record does not exist". The
/// distinction must survive every round trip.
// Externally tagged on purpose: the binary form goes through bincode, which
// cannot deserialize internally tagged enums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferredSnapshot<T> {
    Pending,
    Resolved { value: Option<T>, exists: bool },
}

/// Serialized reference envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedReference<T> {
    /// Schema version for forward compatibility
    pub version: u32,
    /// Identifier the reference tracks
    pub id: i64,
    /// The tri-state payload
    pub snapshot: DeferredSnapshot<T>,
    /// ISO8601 timestamp when the snapshot was taken
    pub saved_at: String,
}

impl<T: Serialize + DeserializeOwned> SerializedReference<T> {
    pub fn new(id: i64, snapshot: DeferredSnapshot<T>) -> Self {
        Self {
            version: 1,
            id,
            snapshot,
            saved_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Serialize to a JSON value
    pub fn to_json(&self) -> LocalizeResult<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| LocalizeError::SerializationError {
            message: format!("Failed to serialize reference to JSON: {e}"),
        })
    }

    /// Deserialize from a JSON value
    pub fn from_json(json: serde_json::Value) -> LocalizeResult<Self> {
        serde_json::from_value(json).map_err(|e| LocalizeError::SerializationError {
            message: format!("Failed to deserialize reference from JSON: {e}"),
        })
    }

    /// Serialize to binary format (compact, faster for large payloads)
    pub fn to_binary(&self) -> LocalizeResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| LocalizeError::SerializationError {
            message: format!("Failed to serialize reference to binary: {e}"),
        })
    }

    /// Deserialize from binary format
    pub fn from_binary(data: &[u8]) -> LocalizeResult<Self> {
        bincode::deserialize(data).map_err(|e| LocalizeError::SerializationError {
            message: format!("Failed to deserialize binary reference: {e}"),
        })
    }

    /// Serialize to compressed JSON (balance of readability and size)
    pub fn to_compressed_json(&self) -> LocalizeResult<Vec<u8>> {
        let json = serde_json::to_vec(self).map_err(|e| LocalizeError::SerializationError {
            message: format!("Failed to serialize reference to JSON: {e}"),
        })?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&json)
            .map_err(|e| LocalizeError::SerializationError {
                message: format!("Failed to compress reference: {e}"),
            })?;

        encoder.finish().map_err(|e| LocalizeError::SerializationError {
            message: format!("Failed to finish compression: {e}"),
        })
    }

    /// Deserialize from compressed JSON
    pub fn from_compressed_json(data: &[u8]) -> LocalizeResult<Self> {
        let mut decoder = GzDecoder::new(data);
        let mut json_bytes = Vec::new();
        decoder
            .read_to_end(&mut json_bytes)
            .map_err(|e| LocalizeError::SerializationError {
                message: format!("Decompression failed: {e}"),
            })?;

        serde_json::from_slice(&json_bytes).map_err(|e| LocalizeError::SerializationError {
            message: format!("Failed to deserialize JSON: {e}"),
        })
    }
}
