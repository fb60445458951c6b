//! pg_localize: locale-aware batched resolution of translated entity values
//!
//! Entities keep their translations in per-entity tables (one row per
//! language tag, ranked by specificity level). This extension resolves the
//! best value for a requested locale while coalescing lookups for many
//! records into bounded IN-list queries, so N records cost ceil(N / batch)
//! round trips instead of N.
//!
//! The engine itself (loaders, deferred references, query templates, locale
//! fallback) is plain Rust over an abstract backend and is reusable as a
//! library; this crate wires it to PostgreSQL through SPI and exposes a
//! small SQL surface on top of the `pg_localize_meta` registry.

use pgrx::prelude::*;
use pgrx::JsonB;

use crate::backend::LocaleBackend;

pub mod backend;
pub mod cache;
pub mod config;
pub mod deferred;
pub mod error;
pub mod loader;
pub mod locale;
pub mod metadata;
pub mod metrics;
pub mod record;
pub mod spi;
pub mod template;
pub mod validation;

pub use deferred::DeferredValue;
pub use error::{LocalizeError, LocalizeResult};
pub use loader::{LoaderFactory, LoaderFactoryBuilder, LocaleMap, MapLoader, ValueLoader};
pub use record::{FromRawValue, LocalizedEntry, LocalizedRecord};

pg_module_magic!();

/// Get the version of the pg_localize extension
#[pg_extern]
fn pg_localize_version() -> &'static str {
    "0.1.0-beta.1"
}

/// Register an entity for localized resolution
///
/// NULL arguments fall back to the naming convention: entity `product` uses
/// table `tb_product_i18n` with columns `pk_product`, `lang_tag`,
/// `lang_level`, `val`.
#[pg_extern]
fn pg_localize_register(
    entity: &str,
    translation_table: Option<String>,
    id_column: Option<String>,
    tag_column: Option<String>,
    level_column: Option<String>,
    value_column: Option<String>,
    max_batch_size: Option<i32>,
) {
    let mut meta = match metadata::LocalizeMeta::defaults_for(entity) {
        Ok(meta) => meta,
        Err(e) => error!("Invalid entity registration: {}", e),
    };
    if let Some(table) = translation_table {
        meta.translation_table = table;
    }
    if let Some(column) = id_column {
        meta.id_column = column;
    }
    if let Some(column) = tag_column {
        meta.tag_column = column;
    }
    if let Some(column) = level_column {
        meta.level_column = column;
    }
    if let Some(column) = value_column {
        meta.value_column = column;
    }
    if let Some(size) = max_batch_size {
        meta.max_batch_size = size;
    }

    if let Err(e) = meta.register() {
        error!("Failed to register entity '{}': {}", entity, e);
    }
    cache::invalidate();
}

/// Remove an entity registration; returns whether one existed
#[pg_extern]
fn pg_localize_unregister(entity: &str) -> bool {
    let existed = match metadata::LocalizeMeta::unregister(entity) {
        Ok(existed) => existed,
        Err(e) => error!("Failed to unregister entity '{}': {}", entity, e),
    };
    cache::invalidate();
    existed
}

/// Resolve the best value of one record for a locale
///
/// Returns NULL both when the record does not exist and when no entry
/// matches the locale's fallback chain; use `pg_localized_values` when the
/// distinction matters.
#[pg_extern]
fn pg_localized_value(entity: &str, id: i64, locale: &str) -> Option<String> {
    let factory = match cache::factory_for_entity(entity) {
        Ok(factory) => factory,
        Err(e) => error!("pg_localized_value failed: {}", e),
    };
    let mut backend = spi::SpiBackend::new();

    let result = factory
        .binding()
        .ok_or_else(|| LocalizeError::UnsupportedOperation {
            operation: "query-based loading".to_string(),
        })
        .and_then(|binding| backend.materialize(binding, id))
        .and_then(|record| match record {
            Some(record) => {
                let mut loader = factory.value_loader(locale)?;
                loader.get_value(&record)
            }
            None => Ok(None),
        });

    match result {
        Ok(value) => value,
        Err(e) => error!("pg_localized_value failed: {}", e),
    }
}

/// Resolve many records in one batched pass
///
/// Issues ceil(N / max_batch_size) queries regardless of N. `found` is
/// false for identifiers without any backing record, distinguishing them
/// from records that merely lack a value for this locale.
#[pg_extern]
fn pg_localized_values(
    entity: &str,
    ids: Vec<i64>,
    locale: &str,
) -> TableIterator<
    'static,
    (
        name!(id, i64),
        name!(value, Option<String>),
        name!(found, bool),
    ),
> {
    let rows = match batched_values(entity, &ids, locale) {
        Ok(rows) => rows,
        Err(e) => error!("pg_localized_values failed: {}", e),
    };
    TableIterator::new(rows.into_iter())
}

fn batched_values(
    entity: &str,
    ids: &[i64],
    locale: &str,
) -> LocalizeResult<Vec<(i64, Option<String>, bool)>> {
    let factory = cache::factory_for_entity(entity)?;
    let mut loader = factory.value_loader(locale)?;
    let mut backend = spi::SpiBackend::new();

    let references: Vec<DeferredValue<String>> = ids
        .iter()
        .map(|&id| loader.get_ref_by_id(id))
        .collect::<LocalizeResult<_>>()?;
    loader.load(&mut backend)?;

    references
        .into_iter()
        .map(|reference| Ok((reference.id(), reference.get()?, reference.exists()?)))
        .collect()
}

/// All localized entries of one record as a JSONB object keyed by tag
///
/// Returns NULL when the record does not exist.
#[pg_extern]
fn pg_localized_map(entity: &str, id: i64) -> Option<JsonB> {
    let result = (|| -> LocalizeResult<Option<JsonB>> {
        let factory = cache::factory_for_entity(entity)?;
        let mut loader = factory.map_loader()?;
        let mut backend = spi::SpiBackend::new();

        let reference = loader.get_map_by_id(id)?;
        loader.load(&mut backend)?;

        if !reference.exists()? {
            return Ok(None);
        }
        let map = reference.get()?.unwrap_or_default();
        Ok(Some(JsonB(serde_json::to_value(map)?)))
    })();

    match result {
        Ok(map) => map,
        Err(e) => error!("pg_localized_map failed: {}", e),
    }
}

/// Clear the factory registry cache
#[pg_extern]
fn pg_localize_cache_clear() {
    cache::invalidate();
    info!("pg_localize: factory cache cleared");
}

/// Current load metrics as JSONB
#[pg_extern]
fn pg_localize_metrics() -> JsonB {
    match serde_json::to_value(metrics::metrics_api::get_load_stats()) {
        Ok(json) => JsonB(json),
        Err(e) => error!("Failed to serialize metrics: {}", e),
    }
}

/// Reset load metrics to zero
#[pg_extern]
fn pg_localize_metrics_reset() {
    metrics::metrics_api::reset_metrics();
}

#[cfg(feature = "pg_test")]
#[pg_schema]
mod tests {
    use pgrx::prelude::*;
    use pgrx::JsonB;

    #[pg_test]
    fn test_version_callable_from_sql() {
        let version = Spi::get_one::<String>("SELECT pg_localize_version()")
            .expect("spi")
            .expect("version");
        assert!(version.starts_with("0.1.0"));
    }

    fn seed_demo_entity() {
        Spi::run(
            "CREATE TABLE IF NOT EXISTS tb_demo_i18n (
                 pk_demo BIGINT NOT NULL,
                 lang_tag TEXT NOT NULL,
                 lang_level INT NOT NULL,
                 val TEXT NOT NULL
             )",
        )
        .expect("create table");
        Spi::run("DELETE FROM tb_demo_i18n").expect("reset table");
        Spi::run(
            "INSERT INTO tb_demo_i18n VALUES
                 (1, 'und', 0, 'color'),
                 (1, 'en', 1, 'colour?'),
                 (1, 'en-CA', 2, 'colour'),
                 (2, 'fr', 1, 'couleur')",
        )
        .expect("seed rows");

        Spi::run("DELETE FROM pg_localize_meta WHERE entity = 'demo'").expect("reset meta");
        crate::cache::invalidate();
        Spi::run("SELECT pg_localize_register('demo', NULL, NULL, NULL, NULL, NULL, NULL)")
            .expect("register");
    }

    #[pg_test]
    fn test_localized_value_follows_fallback_chain() {
        seed_demo_entity();

        let value = Spi::get_one::<String>("SELECT pg_localized_value('demo', 1, 'en-CA')")
            .expect("spi");
        assert_eq!(value, Some("colour".to_string()));

        let value =
            Spi::get_one::<String>("SELECT pg_localized_value('demo', 1, 'en')").expect("spi");
        assert_eq!(value, Some("colour?".to_string()));

        // fr has no chain match beyond the root entry
        let value =
            Spi::get_one::<String>("SELECT pg_localized_value('demo', 1, 'fr')").expect("spi");
        assert_eq!(value, Some("color".to_string()));
    }

    #[pg_test]
    fn test_localized_values_reports_missing_records() {
        seed_demo_entity();

        let found = Spi::get_one::<bool>(
            "SELECT found FROM pg_localized_values('demo', ARRAY[1,99]::bigint[], 'en') \
             WHERE id = 99",
        )
        .expect("spi")
        .expect("row");
        assert!(!found);

        let value = Spi::get_one::<String>(
            "SELECT value FROM pg_localized_values('demo', ARRAY[1,99]::bigint[], 'en') \
             WHERE id = 1",
        )
        .expect("spi");
        assert_eq!(value, Some("colour?".to_string()));
    }

    #[pg_test]
    fn test_localized_map_returns_all_tags() {
        seed_demo_entity();

        let tag_count = Spi::get_one::<i64>(
            "SELECT count(*) FROM jsonb_object_keys(pg_localized_map('demo', 1))",
        )
        .expect("spi")
        .expect("count");
        assert_eq!(tag_count, 3);

        let absent = Spi::get_one::<JsonB>("SELECT pg_localized_map('demo', 99)").expect("spi");
        assert!(absent.is_none());
    }

    #[pg_test]
    #[should_panic(expected = "not registered")]
    fn test_unregistered_entity_raises() {
        crate::cache::invalidate();
        Spi::run("DELETE FROM pg_localize_meta WHERE entity = 'ghost'").expect("reset meta");

        let _ = Spi::get_one::<String>("SELECT pg_localized_value('ghost', 1, 'en')");
    }

    #[pg_test]
    fn test_metrics_surface_is_json() {
        let batches = Spi::get_one::<i64>(
            "SELECT (pg_localize_metrics() ->> 'batches_executed')::bigint",
        )
        .expect("spi");
        assert!(batches.is_some());
    }
}

/// This module is required by `cargo pgrx test` invocations
#[cfg(test)]
pub mod pg_test {
    pub fn setup(_options: Vec<&str>) {
        // noop
    }

    #[must_use]
    pub fn postgresql_conf_options() -> Vec<&'static str> {
        vec![]
    }
}
