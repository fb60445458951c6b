use serde::{Deserialize, Serialize};

use crate::error::{LocalizeError, LocalizeResult};

/// One translated value owned by a localizable record
///
/// Example: LocalizedEntry { tag: "en-CA".to_string(), level: 2, value: "colour".to_string() }
/// is the Canadian-English entry, more specific than its "en" (level 1) sibling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedEntry {
    /// Canonical BCP 47 language tag ("und" for the root entry)
    pub tag: String,

    /// Specificity rank; higher = more specific (root < language < language-region)
    pub level: i32,

    /// Raw payload as stored by the backend
    pub value: String,
}

impl LocalizedEntry {
    pub fn new(tag: impl Into<String>, level: i32, value: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            level,
            value: value.into(),
        }
    }
}

/// A materialized localizable record: identifier plus its localized entries
///
/// The engine only reads these; ownership stays with the backend. Entry order
/// is whatever the backend produced and is deterministic per run only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedRecord {
    pub id: i64,
    pub entries: Vec<LocalizedEntry>,
}

impl LocalizedRecord {
    pub fn new(id: i64, entries: Vec<LocalizedEntry>) -> Self {
        Self { id, entries }
    }
}

/// Conversion seam between raw backend payloads and caller value types
///
/// The default loaders work with `String`; callers with richer value types
/// implement this once or install a per-factory constructor override.
pub trait FromRawValue: Sized {
    fn from_raw(raw: &str) -> LocalizeResult<Self>;
}

impl FromRawValue for String {
    fn from_raw(raw: &str) -> LocalizeResult<Self> {
        Ok(raw.to_string())
    }
}

impl FromRawValue for serde_json::Value {
    fn from_raw(raw: &str) -> LocalizeResult<Self> {
        serde_json::from_str(raw).map_err(|e| LocalizeError::ValueConstruction {
            tag: String::new(),
            reason: format!("invalid JSON payload: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_construction() {
        let entry = LocalizedEntry::new("en-CA", 2, "colour");
        assert_eq!(entry.tag, "en-CA");
        assert_eq!(entry.level, 2);
        assert_eq!(entry.value, "colour");
    }

    #[test]
    fn test_record_serde_round_trip() {
        let record = LocalizedRecord::new(
            42,
            vec![
                LocalizedEntry::new("und", 0, "color"),
                LocalizedEntry::new("fr", 1, "couleur"),
            ],
        );

        let json = serde_json::to_string(&record).unwrap();
        let restored: LocalizedRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn test_string_from_raw_is_identity() {
        assert_eq!(String::from_raw("bonjour").unwrap(), "bonjour");
    }

    #[test]
    fn test_json_from_raw_rejects_garbage() {
        let result = serde_json::Value::from_raw("{not json");
        assert!(result.is_err());
    }
}
