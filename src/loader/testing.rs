//! Explicit fake backend for engine tests
//!
//! A plain recording stub instead of any call-interception machinery: it
//! serves canned entries, applies the same id/tag filtering a real query
//! would, and counts every round trip so tests can assert batch behavior.

use std::collections::HashMap;

use crate::backend::{EntryRow, LocaleBackend, Param, TableBinding};
use crate::error::LocalizeResult;
use crate::record::{LocalizedEntry, LocalizedRecord};

/// In-memory backend that records every call
#[derive(Default)]
pub struct RecordingBackend {
    data: HashMap<i64, Vec<LocalizedEntry>>,
    executed: Vec<(String, Vec<Param>)>,
    materialize_calls: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed canned entries for one identifier
    pub fn insert(&mut self, id: i64, entries: Vec<LocalizedEntry>) {
        self.data.insert(id, entries);
    }

    /// Number of `execute` round trips so far
    pub fn execute_calls(&self) -> usize {
        self.executed.len()
    }

    /// Number of `materialize` calls so far
    pub fn materialize_calls(&self) -> usize {
        self.materialize_calls
    }

    /// Identifier count of each executed batch, in execution order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.executed
            .iter()
            .map(|(_, params)| Self::ids_of(params).len())
            .collect()
    }

    /// Identifiers of each executed batch, in execution order
    pub fn batched_ids(&self) -> Vec<Vec<i64>> {
        self.executed
            .iter()
            .map(|(_, params)| Self::ids_of(params))
            .collect()
    }

    /// Most recent query text and parameters
    pub fn last_query(&self) -> Option<(String, Vec<Param>)> {
        self.executed.last().cloned()
    }

    fn ids_of(params: &[Param]) -> Vec<i64> {
        params
            .iter()
            .filter_map(|p| match p {
                Param::Id(id) => Some(*id),
                Param::Tag(_) => None,
            })
            .collect()
    }

    fn tags_of(params: &[Param]) -> Vec<&str> {
        params
            .iter()
            .filter_map(|p| match p {
                Param::Tag(tag) => Some(tag.as_str()),
                Param::Id(_) => None,
            })
            .collect()
    }
}

impl LocaleBackend for RecordingBackend {
    fn execute(&mut self, sql: &str, params: &[Param]) -> LocalizeResult<Vec<EntryRow>> {
        self.executed.push((sql.to_string(), params.to_vec()));

        let ids = Self::ids_of(params);
        let tags = Self::tags_of(params);

        let mut rows = Vec::new();
        for id in ids {
            let Some(entries) = self.data.get(&id) else {
                continue;
            };
            for entry in entries {
                if !tags.is_empty() && !tags.contains(&entry.tag.as_str()) {
                    continue;
                }
                rows.push(EntryRow {
                    id,
                    tag: Some(entry.tag.clone()),
                    level: Some(entry.level),
                    value: Some(entry.value.clone()),
                });
            }
        }
        Ok(rows)
    }

    fn materialize(
        &mut self,
        _binding: &TableBinding,
        id: i64,
    ) -> LocalizeResult<Option<LocalizedRecord>> {
        self.materialize_calls += 1;
        Ok(self
            .data
            .get(&id)
            .map(|entries| LocalizedRecord::new(id, entries.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_filters_by_id_and_tag() {
        let mut backend = RecordingBackend::new();
        backend.insert(
            1,
            vec![
                LocalizedEntry::new("en", 1, "hello"),
                LocalizedEntry::new("fr", 1, "bonjour"),
            ],
        );

        let rows = backend
            .execute(
                "q",
                &[Param::Id(1), Param::Id(2), Param::Tag("fr".to_string())],
            )
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tag.as_deref(), Some("fr"));
        assert_eq!(backend.execute_calls(), 1);
        assert_eq!(backend.batch_sizes(), vec![2]);
    }

    #[test]
    fn test_fake_without_tags_returns_everything() {
        let mut backend = RecordingBackend::new();
        backend.insert(
            1,
            vec![
                LocalizedEntry::new("en", 1, "hello"),
                LocalizedEntry::new("fr", 1, "bonjour"),
            ],
        );

        let rows = backend.execute("q", &[Param::Id(1)]).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_fake_materialize_distinguishes_absent() {
        let mut backend = RecordingBackend::new();
        backend.insert(1, vec![LocalizedEntry::new("en", 1, "hello")]);
        let binding = TableBinding {
            table: "tb_t".to_string(),
            id_column: "pk".to_string(),
            tag_column: "tag".to_string(),
            level_column: "lvl".to_string(),
            value_column: "val".to_string(),
        };

        assert!(backend.materialize(&binding, 1).unwrap().is_some());
        assert!(backend.materialize(&binding, 2).unwrap().is_none());
        assert_eq!(backend.materialize_calls(), 2);
    }
}
