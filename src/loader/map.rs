//! Map loader
//!
//! Same two-phase contract as single-value loading, but each record resolves
//! to the full mapping of locale tag → value rather than one chosen entry.
//! Maps are immutable snapshots, not live views.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::{LocaleBackend, Param};
use crate::deferred::DeferredValue;
use crate::error::{LocalizeError, LocalizeResult};
use crate::internal_error;
use crate::metrics::metrics_api;
use crate::record::{FromRawValue, LocalizedEntry, LocalizedRecord};
use crate::template::RepeatToken;

use super::batch::{group_rows, PendingTable};
use super::factory::{LoaderTemplates, ValueBuilder};

/// Snapshot of every localized value of one record, keyed by canonical tag
pub type LocaleMap<V> = BTreeMap<String, V>;

/// Loader resolving whole locale→value mappings
///
/// Obtain instances from [`LoaderFactory::map_loader`]. A record that exists
/// with zero entries resolves to an empty map, which is distinct from
/// "record does not exist".
///
/// [`LoaderFactory::map_loader`]: super::LoaderFactory::map_loader
pub struct MapLoader<V> {
    templates: Option<Arc<LoaderTemplates>>,
    max_batch_size: usize,
    values: ValueBuilder<V>,
    direct_path: bool,
    table: PendingTable<LocaleMap<V>>,
}

impl<V: FromRawValue + Clone + 'static> MapLoader<V> {
    pub(crate) fn new(
        templates: Option<Arc<LoaderTemplates>>,
        max_batch_size: usize,
        values: ValueBuilder<V>,
        direct_path: bool,
    ) -> Self {
        Self {
            templates,
            max_batch_size,
            values,
            direct_path,
            table: PendingTable::new(),
        }
    }

    /// Number of identifiers tracked by this loader
    pub fn tracked(&self) -> usize {
        self.table.len()
    }

    /// Map reference for a materialized record
    pub fn get_map(&mut self, record: &LocalizedRecord) -> LocalizeResult<DeferredValue<LocaleMap<V>>> {
        if !self.direct_path {
            return Err(LocalizeError::UnsupportedOperation {
                operation: "direct record resolution".to_string(),
            });
        }

        let values = self.values.clone();
        let entries = record.entries.clone();
        let reference = self.table.get_or_insert_with(record.id, || {
            DeferredValue::direct(
                record.id,
                Box::new(move || {
                    metrics_api::record_direct_resolution();
                    build_map(&entries, &values).map(Some)
                }),
            )
        });
        Ok(reference)
    }

    /// Map reference for an identifier alone; resolvable only after `load`
    pub fn get_map_by_id(&mut self, id: i64) -> LocalizeResult<DeferredValue<LocaleMap<V>>> {
        if self.templates.is_none() {
            return Err(LocalizeError::UnsupportedOperation {
                operation: "query-based loading".to_string(),
            });
        }
        Ok(self
            .table
            .get_or_insert_with(id, || DeferredValue::awaiting_batch(id)))
    }

    /// Run the batch phase for all pending map references
    ///
    /// Same protocol as the value loader: bounded batches in first-request
    /// order, missing identifiers resolved to "not found", idempotent.
    pub fn load(&mut self, backend: &mut dyn LocaleBackend) -> LocalizeResult<usize> {
        let templates = match &self.templates {
            Some(templates) => Arc::clone(templates),
            None => {
                return Err(LocalizeError::UnsupportedOperation {
                    operation: "query-based loading".to_string(),
                })
            }
        };

        let pending = self.table.unresolved_ids();
        let mut resolved = 0;
        for batch in pending.chunks(self.max_batch_size) {
            resolved += self.flush_batch(backend, &templates, batch)?;
        }
        Ok(resolved)
    }

    fn flush_batch(
        &self,
        backend: &mut dyn LocaleBackend,
        templates: &LoaderTemplates,
        batch: &[i64],
    ) -> LocalizeResult<usize> {
        let mut template = templates.map.copy();
        template.set_repeat(RepeatToken::Ids, batch.len())?;
        let sql = template.build()?;

        let params: Vec<Param> = batch.iter().map(|id| Param::Id(*id)).collect();
        let rows = backend.execute(&sql, &params)?;
        metrics_api::record_batch_executed(rows.len());

        let mut grouped = group_rows(rows, batch);
        let mut resolved = 0;
        let mut missing = 0;

        for &id in batch {
            let reference = self
                .table
                .get(id)
                .ok_or_else(|| internal_error!("batched id {} missing from pending table", id))?;

            match grouped.remove(&id) {
                Some(entries) => {
                    reference.set(Some(build_map(&entries, &self.values)?))?;
                }
                None => {
                    reference.set_not_exists()?;
                    missing += 1;
                }
            }
            resolved += 1;
        }

        metrics_api::record_batch_resolutions(resolved);
        if missing > 0 {
            metrics_api::record_not_found(missing);
        }
        Ok(resolved)
    }
}

/// Build the tag→value snapshot for one record's entries
///
/// Duplicate tags keep the first-seen entry, matching the tie rule of
/// single-value selection.
fn build_map<V: FromRawValue>(
    entries: &[LocalizedEntry],
    values: &ValueBuilder<V>,
) -> LocalizeResult<LocaleMap<V>> {
    let mut map = LocaleMap::new();
    for entry in entries {
        if let std::collections::btree_map::Entry::Vacant(slot) = map.entry(entry.tag.clone()) {
            slot.insert(values.construct(&entry.tag, &entry.value)?);
        }
    }
    Ok(map)
}
