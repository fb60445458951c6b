//! Batch accumulation and row distribution
//!
//! Shared mechanics for both loader flavors: the pending table (one
//! reference per identifier, first-request order preserved), partitioning of
//! unresolved identifiers into bounded batches, and the defensive grouping
//! of returned rows by identifier.

use std::collections::HashMap;

use crate::backend::EntryRow;
use crate::deferred::DeferredValue;
use crate::metrics::metrics_api;
use crate::record::LocalizedEntry;

/// Identifier → reference table with recorded insertion order
///
/// Within one loader at most one reference exists per identifier; every
/// identifier requested at least once stays tracked for the loader's life so
/// repeat access is free and idempotent.
pub(crate) struct PendingTable<T> {
    refs: HashMap<i64, DeferredValue<T>>,
    order: Vec<i64>,
}

impl<T: Clone> PendingTable<T> {
    pub fn new() -> Self {
        Self {
            refs: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Existing reference for `id`, if any
    pub fn get(&self, id: i64) -> Option<DeferredValue<T>> {
        self.refs.get(&id).cloned()
    }

    /// Register a reference created by `make` unless `id` is already tracked
    pub fn get_or_insert_with(
        &mut self,
        id: i64,
        make: impl FnOnce() -> DeferredValue<T>,
    ) -> DeferredValue<T> {
        if let Some(existing) = self.refs.get(&id) {
            return existing.clone();
        }
        let created = make();
        self.refs.insert(id, created.clone());
        self.order.push(id);
        created
    }

    /// Identifiers still awaiting the batch phase, in first-request order
    pub fn unresolved_ids(&self) -> Vec<i64> {
        self.order
            .iter()
            .copied()
            .filter(|id| {
                self.refs
                    .get(id)
                    .is_some_and(DeferredValue::needs_batch)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Group returned rows by identifier, converting them to entries
///
/// Defensive by design of the identifier space: rows for identifiers outside
/// the current batch are ignored (the record may have appeared through a
/// different path or no longer exist), as are rows with NULL tag or value.
/// A NULL level is treated as root specificity. Discards are counted in the
/// load metrics; this path stays free of backend logging so it runs anywhere.
pub(crate) fn group_rows(rows: Vec<EntryRow>, batch: &[i64]) -> HashMap<i64, Vec<LocalizedEntry>> {
    let mut grouped: HashMap<i64, Vec<LocalizedEntry>> = HashMap::new();

    for row in rows {
        if !batch.contains(&row.id) {
            metrics_api::record_row_discarded();
            continue;
        }
        let (Some(tag), Some(value)) = (row.tag, row.value) else {
            metrics_api::record_row_discarded();
            continue;
        };

        grouped.entry(row.id).or_default().push(LocalizedEntry {
            tag,
            level: row.level.unwrap_or(0),
            value,
        });
    }

    grouped
}
