//! Factory registry cache
//!
//! Building a `LoaderFactory` from a `pg_localize_meta` row costs a catalog
//! query, so built factories are cached per entity for the life of the
//! backend process. Registration changes must invalidate explicitly.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use crate::error::{LocalizeError, LocalizeResult};
use crate::loader::LoaderFactory;
use crate::metadata::LocalizeMeta;
use crate::metrics::metrics_api;

type FactoryMap = HashMap<String, Arc<LoaderFactory<String>>>;

/// Global cache of built factories, keyed by entity name
static FACTORY_CACHE: LazyLock<Mutex<FactoryMap>> = LazyLock::new(|| Mutex::new(HashMap::new()));

fn lock_cache() -> LocalizeResult<std::sync::MutexGuard<'static, FactoryMap>> {
    FACTORY_CACHE.lock().map_err(|_| LocalizeError::CacheError {
        cache_name: "factory_registry".to_string(),
        reason: "poisoned mutex".to_string(),
    })
}

/// Get the cached factory for an entity, building it from the registry on miss
pub fn factory_for_entity(entity: &str) -> LocalizeResult<Arc<LoaderFactory<String>>> {
    // Fast path: check cache
    {
        let cache = lock_cache()?;
        if let Some(factory) = cache.get(entity) {
            metrics_api::record_registry_cache_hit();
            return Ok(Arc::clone(factory));
        }
    }

    // Slow path: load registration and build
    metrics_api::record_registry_cache_miss();
    let meta = LocalizeMeta::load_by_entity(entity)?.ok_or_else(|| {
        LocalizeError::EntityNotRegistered {
            entity: entity.to_string(),
        }
    })?;
    let factory = Arc::new(build_factory(&meta)?);

    let mut cache = lock_cache()?;
    let shared = cache
        .entry(entity.to_string())
        .or_insert_with(|| Arc::clone(&factory));
    Ok(Arc::clone(shared))
}

/// Build a factory with both resolution paths from one registration row
fn build_factory(meta: &LocalizeMeta) -> LocalizeResult<LoaderFactory<String>> {
    LoaderFactory::builder()
        .with_direct_records()?
        .with_queries()?
        .translation_table(&meta.translation_table)?
        .id_column(&meta.id_column)?
        .tag_column(&meta.tag_column)?
        .level_column(&meta.level_column)?
        .value_column(&meta.value_column)?
        .max_batch_size(meta.max_batch_size.max(0) as usize)?
        .build()
}

/// Invalidate the factory cache
/// Must be called when registrations change
pub fn invalidate() {
    let mut cache = FACTORY_CACHE.lock().unwrap();
    cache.clear();
}

/// Current cache size and cached entities (for introspection)
pub fn cache_stats() -> (usize, Vec<String>) {
    let cache = FACTORY_CACHE.lock().unwrap();
    let size = cache.len();
    let entities: Vec<String> = cache.keys().cloned().collect();
    (size, entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_BATCH_SIZE;

    #[test]
    fn test_build_factory_from_meta() {
        let meta = LocalizeMeta::defaults_for("product").unwrap();
        let factory = build_factory(&meta).unwrap();

        assert!(factory.supports_direct());
        assert!(factory.supports_queries());
        assert_eq!(factory.max_batch_size(), DEFAULT_MAX_BATCH_SIZE);
        assert_eq!(
            factory.binding().unwrap().table,
            "tb_product_i18n"
        );
    }

    #[test]
    fn test_invalidation_clears_cache() {
        {
            let meta = LocalizeMeta::defaults_for("cached").unwrap();
            let factory = Arc::new(build_factory(&meta).unwrap());
            let mut cache = FACTORY_CACHE.lock().unwrap();
            cache.insert("cached".to_string(), factory);
        }

        let (size, entities) = cache_stats();
        assert!(size >= 1);
        assert!(entities.contains(&"cached".to_string()));

        invalidate();

        let (size, _) = cache_stats();
        assert_eq!(size, 0);
    }
}
