//! Single-value loader
//!
//! Resolves, per record, the one value that best matches the loader's
//! locale. References are cheap to request and memoized; identifiers
//! requested without a materialized record stay pending until `load` runs
//! the batch phase.
//!
//! Single-threaded per instance by contract: the pending table is plain
//! interior-mutable state with no locking.

use std::rc::Rc;
use std::sync::Arc;

use crate::backend::{LocaleBackend, Param};
use crate::deferred::DeferredValue;
use crate::error::{LocalizeError, LocalizeResult};
use crate::internal_error;
use crate::locale::{select_entry, LocaleChain};
use crate::metrics::metrics_api;
use crate::record::{FromRawValue, LocalizedRecord};
use crate::template::RepeatToken;

use super::batch::{group_rows, PendingTable};
use super::factory::{LoaderTemplates, ValueBuilder};

/// Loader for one requested locale
///
/// State machine per identifier: requested → (optionally) batched →
/// resolved. Obtain instances from [`LoaderFactory::value_loader`].
///
/// [`LoaderFactory::value_loader`]: super::LoaderFactory::value_loader
pub struct ValueLoader<V> {
    chain: Rc<LocaleChain>,
    templates: Option<Arc<LoaderTemplates>>,
    max_batch_size: usize,
    values: ValueBuilder<V>,
    direct_path: bool,
    table: PendingTable<V>,
}

impl<V: FromRawValue + Clone + 'static> ValueLoader<V> {
    pub(crate) fn new(
        chain: LocaleChain,
        templates: Option<Arc<LoaderTemplates>>,
        max_batch_size: usize,
        values: ValueBuilder<V>,
        direct_path: bool,
    ) -> Self {
        Self {
            chain: Rc::new(chain),
            templates,
            max_batch_size,
            values,
            direct_path,
            table: PendingTable::new(),
        }
    }

    /// Canonical locale this loader resolves for
    pub fn locale(&self) -> &str {
        self.chain.requested()
    }

    /// Number of identifiers tracked by this loader
    pub fn tracked(&self) -> usize {
        self.table.len()
    }

    /// Reference for a materialized record, resolvable without the backend
    ///
    /// Registration is idempotent: the first reference created for an
    /// identifier wins, so a record requested after its id stays pending
    /// until `load`.
    pub fn get_ref(&mut self, record: &LocalizedRecord) -> LocalizeResult<DeferredValue<V>> {
        if !self.direct_path {
            return Err(LocalizeError::UnsupportedOperation {
                operation: "direct record resolution".to_string(),
            });
        }

        let chain = Rc::clone(&self.chain);
        let values = self.values.clone();
        let entries = record.entries.clone();
        let reference = self.table.get_or_insert_with(record.id, || {
            DeferredValue::direct(
                record.id,
                Box::new(move || {
                    metrics_api::record_direct_resolution();
                    match select_entry(&entries, &chain) {
                        Some(entry) => values.construct(&entry.tag, &entry.value).map(Some),
                        None => Ok(None),
                    }
                }),
            )
        });
        Ok(reference)
    }

    /// Reference for an identifier alone; resolvable only after `load`
    pub fn get_ref_by_id(&mut self, id: i64) -> LocalizeResult<DeferredValue<V>> {
        if self.templates.is_none() {
            return Err(LocalizeError::UnsupportedOperation {
                operation: "query-based loading".to_string(),
            });
        }
        Ok(self
            .table
            .get_or_insert_with(id, || DeferredValue::awaiting_batch(id)))
    }

    /// Immediate value for a materialized record
    ///
    /// Routes through the reference table, so the result is memoized
    /// exactly like `get_ref(record).get()`.
    pub fn get_value(&mut self, record: &LocalizedRecord) -> LocalizeResult<Option<V>> {
        self.get_ref(record)?.get()
    }

    /// Run the batch phase: resolve every pending reference
    ///
    /// Pending identifiers are flushed in first-request order, bounded by
    /// the configured batch size; identifiers the backend returns no rows
    /// for are resolved to "not found". Idempotent: a second call finds
    /// nothing pending and issues no queries. Returns the number of
    /// references resolved by this call.
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
        let tags = self.chain.tags();

        let mut template = templates.value.copy();
        template.set_repeat(RepeatToken::Ids, batch.len())?;
        template.set_repeat(RepeatToken::Tags, tags.len())?;
        let sql = template.build()?;

        let mut params: Vec<Param> = batch.iter().map(|id| Param::Id(*id)).collect();
        params.extend(tags.iter().map(|tag| Param::Tag(tag.clone())));

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
                    let value = match select_entry(&entries, &self.chain) {
                        Some(entry) => Some(self.values.construct(&entry.tag, &entry.value)?),
                        None => None,
                    };
                    reference.set(value)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::assert_error_sqlstate;
    use crate::loader::testing::RecordingBackend;
    use crate::loader::LoaderFactory;
    use crate::record::LocalizedEntry;

    fn factory() -> LoaderFactory<String> {
        LoaderFactory::builder()
            .with_direct_records()
            .unwrap()
            .with_queries()
            .unwrap()
            .translation_table("tb_product_i18n")
            .unwrap()
            .id_column("pk_product")
            .unwrap()
            .tag_column("lang_tag")
            .unwrap()
            .level_column("lang_level")
            .unwrap()
            .value_column("val")
            .unwrap()
            .max_batch_size(2)
            .unwrap()
            .build()
            .unwrap()
    }

    fn record(id: i64) -> LocalizedRecord {
        LocalizedRecord::new(
            id,
            vec![
                LocalizedEntry::new("und", 0, "color"),
                LocalizedEntry::new("en", 1, "colour?"),
                LocalizedEntry::new("en-CA", 2, "colour"),
            ],
        )
    }

    #[test]
    fn test_direct_resolution_follows_fallback() {
        let mut loader = factory().value_loader("en-CA").unwrap();
        assert_eq!(loader.get_value(&record(1)).unwrap(), Some("colour".to_string()));

        let mut loader = factory().value_loader("en").unwrap();
        assert_eq!(loader.get_value(&record(1)).unwrap(), Some("colour?".to_string()));

        let mut loader = factory().value_loader("fr").unwrap();
        assert_eq!(loader.get_value(&record(1)).unwrap(), Some("color".to_string()));
    }

    #[test]
    fn test_no_fallback_match_is_empty_but_existing() {
        let mut loader = factory().value_loader("fr").unwrap();
        let entries = vec![LocalizedEntry::new("en", 1, "hello")];
        let reference = loader
            .get_ref(&LocalizedRecord::new(5, entries))
            .unwrap();

        assert_eq!(reference.get().unwrap(), None);
        assert!(reference.exists().unwrap());
    }

    #[test]
    fn test_get_ref_is_idempotent_per_id() {
        let mut loader = factory().value_loader("en").unwrap();
        let first = loader.get_ref(&record(1)).unwrap();
        let second = loader.get_ref(&record(1)).unwrap();

        assert_eq!(loader.tracked(), 1);
        first.get().unwrap();
        assert!(second.is_loaded());
    }

    #[test]
    fn test_by_id_requires_load_before_get() {
        let mut loader = factory().value_loader("en").unwrap();
        let reference = loader.get_ref_by_id(10).unwrap();
        assert_error_sqlstate(reference.get(), "55000");
    }

    #[test]
    fn test_batch_boundary_two_plus_two_plus_one() {
        let mut backend = RecordingBackend::new();
        for id in 1..=5 {
            backend.insert(id, vec![LocalizedEntry::new("en", 1, format!("v{id}"))]);
        }

        let mut loader = factory().value_loader("en").unwrap();
        let refs: Vec<_> = (1..=5)
            .map(|id| loader.get_ref_by_id(id).unwrap())
            .collect();

        let resolved = loader.load(&mut backend).unwrap();
        assert_eq!(resolved, 5);
        // max batch size 2 and 5 pending ids: exactly 3 round trips (2+2+1)
        assert_eq!(backend.execute_calls(), 3);
        assert_eq!(backend.batch_sizes(), vec![2, 2, 1]);

        for (i, reference) in refs.iter().enumerate() {
            assert_eq!(
                reference.get().unwrap(),
                Some(format!("v{}", i + 1)),
                "batched content must match individual lookups"
            );
        }
    }

    #[test]
    fn test_batches_flush_in_first_request_order() {
        let mut backend = RecordingBackend::new();
        for id in [9, 3, 7] {
            backend.insert(id, vec![LocalizedEntry::new("en", 1, "x")]);
        }

        let mut loader = factory().value_loader("en").unwrap();
        for id in [9, 3, 7] {
            loader.get_ref_by_id(id).unwrap();
        }
        loader.load(&mut backend).unwrap();

        assert_eq!(backend.batched_ids(), vec![vec![9, 3], vec![7]]);
    }

    #[test]
    fn test_missing_identifier_resolves_not_found() {
        let mut backend = RecordingBackend::new();
        backend.insert(1, vec![LocalizedEntry::new("en", 1, "here")]);

        let mut loader = factory().value_loader("en").unwrap();
        let found = loader.get_ref_by_id(1).unwrap();
        let missing = loader.get_ref_by_id(2).unwrap();

        loader.load(&mut backend).unwrap();

        assert!(found.exists().unwrap());
        assert!(!missing.exists().unwrap());
        assert_eq!(missing.get().unwrap(), None);
    }

    #[test]
    fn test_second_load_issues_no_queries() {
        let mut backend = RecordingBackend::new();
        let mut loader = factory().value_loader("en").unwrap();
        loader.get_ref_by_id(1).unwrap();

        loader.load(&mut backend).unwrap();
        let calls_after_first = backend.execute_calls();
        let resolved = loader.load(&mut backend).unwrap();

        assert_eq!(resolved, 0);
        assert_eq!(backend.execute_calls(), calls_after_first);
    }

    #[test]
    fn test_memoized_get_never_reaches_backend_again() {
        let mut backend = RecordingBackend::new();
        backend.insert(1, vec![LocalizedEntry::new("en", 1, "once")]);

        let mut loader = factory().value_loader("en").unwrap();
        let reference = loader.get_ref_by_id(1).unwrap();
        loader.load(&mut backend).unwrap();

        for _ in 0..10 {
            assert_eq!(reference.get().unwrap(), Some("once".to_string()));
        }
        assert_eq!(backend.execute_calls(), 1);
    }

    #[test]
    fn test_query_filters_by_acceptable_tags() {
        let mut backend = RecordingBackend::new();
        backend.insert(
            1,
            vec![
                LocalizedEntry::new("fr", 1, "bonjour"),
                LocalizedEntry::new("en", 1, "hello"),
            ],
        );

        let mut loader = factory().value_loader("fr-CA").unwrap();
        let reference = loader.get_ref_by_id(1).unwrap();
        loader.load(&mut backend).unwrap();

        // The English entry is filtered out by the tag IN-list
        assert_eq!(reference.get().unwrap(), Some("bonjour".to_string()));
        let (_, params) = backend.last_query().unwrap();
        assert!(params.contains(&Param::Tag("fr-CA".to_string())));
        assert!(params.contains(&Param::Tag("und".to_string())));
        assert!(!params.contains(&Param::Tag("en".to_string())));
    }

    #[test]
    fn test_direct_only_loader_rejects_by_id() {
        let factory: LoaderFactory<String> = LoaderFactory::builder()
            .with_direct_records()
            .unwrap()
            .build()
            .unwrap();
        let mut loader = factory.value_loader("en").unwrap();

        assert_error_sqlstate(loader.get_ref_by_id(1).map(|_| ()), "0A000");
        let mut backend = RecordingBackend::new();
        assert_error_sqlstate(loader.load(&mut backend).map(|_| ()), "0A000");
    }

    #[test]
    fn test_query_only_loader_rejects_direct() {
        let factory: LoaderFactory<String> = LoaderFactory::builder()
            .with_queries()
            .unwrap()
            .translation_table("tb_product_i18n")
            .unwrap()
            .id_column("pk_product")
            .unwrap()
            .tag_column("lang_tag")
            .unwrap()
            .level_column("lang_level")
            .unwrap()
            .value_column("val")
            .unwrap()
            .build()
            .unwrap();
        let mut loader = factory.value_loader("en").unwrap();

        assert_error_sqlstate(loader.get_ref(&record(1)).map(|_| ()), "0A000");
    }
}
