//! Abstract backend interface
//!
//! The engine never talks to PostgreSQL directly; everything goes through
//! `LocaleBackend`. The production implementation lives in `spi.rs`; tests
//! use the explicit recording fake in `loader::testing`. Backend failures
//! propagate uninterpreted — no retry or backoff exists at this layer.

use crate::error::LocalizeResult;
use crate::record::LocalizedRecord;

/// One positional query parameter, bound in template textual order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Id(i64),
    Tag(String),
}

/// One row returned by a localized-entry query
///
/// The first column is always the record identifier; tag/level/value carry
/// whatever the template selected. NULLs are preserved here and handled
/// defensively during distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRow {
    pub id: i64,
    pub tag: Option<String>,
    pub level: Option<i32>,
    pub value: Option<String>,
}

/// Schema binding for one entity's translation table
///
/// Identifiers are validated at configuration time; a binding in hand is
/// safe to splice into query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBinding {
    pub table: String,
    pub id_column: String,
    pub tag_column: String,
    pub level_column: String,
    pub value_column: String,
}

/// Data-access collaborator consumed by the engine
///
/// The session behind an implementation is borrowed per call and never
/// retained by the engine across calls.
pub trait LocaleBackend {
    /// Execute built query text with positional parameters
    fn execute(&mut self, sql: &str, params: &[Param]) -> LocalizeResult<Vec<EntryRow>>;

    /// Fetch one record with all its entries; used by the direct path only
    ///
    /// A record with zero entry rows is reported as absent, matching the
    /// batch path where absence of rows means "not found".
    fn materialize(
        &mut self,
        binding: &TableBinding,
        id: i64,
    ) -> LocalizeResult<Option<LocalizedRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_equality() {
        assert_eq!(Param::Id(1), Param::Id(1));
        assert_ne!(Param::Id(1), Param::Tag("1".to_string()));
    }

    #[test]
    fn test_entry_row_preserves_nulls() {
        let row = EntryRow {
            id: 5,
            tag: None,
            level: None,
            value: None,
        };
        assert_eq!(row.tag, None);
        assert_eq!(row.level, None);
    }
}
