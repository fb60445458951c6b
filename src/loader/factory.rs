//! Loader factory and its builder
//!
//! Configuration is accumulated once, validated, then shared: the builder
//! enforces "each setting applied at most once" through an enum-keyed
//! setting table, supports independent copies and a read-only freeze, and
//! `build()` refuses a factory with no resolution path. The built factory is
//! immutable; wrapped in an `Arc` it can mint independent loaders from many
//! threads. Its two query templates are materialized lazily on first use —
//! the cheap-check-then-initialize discipline of `OnceLock` is the only
//! synchronization in the crate.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use crate::backend::TableBinding;
use crate::config::{BATCH_SIZE_LIMIT, DEFAULT_MAX_BATCH_SIZE};
use crate::error::{LocalizeError, LocalizeResult};
use crate::locale::LocaleChain;
use crate::record::FromRawValue;
use crate::template::{QueryTemplate, SchemaToken};
use crate::validation::validate_sql_identifier;

use super::map::MapLoader;
use super::value::ValueLoader;

/// Value-construction strategy override installed at configuration time
pub type ValueConstructor<V> = Arc<dyn Fn(&str) -> LocalizeResult<V> + Send + Sync>;

/// Pattern for single-value resolution: entries restricted to acceptable tags
const VALUE_PATTERN: &str = "SELECT {id}, {tag}, {level}, {value} FROM {entity} \
                             WHERE {id} IN ({ids*}) AND {tag} IN ({tags*})";

/// Pattern for map resolution: every entry of the batched records
const MAP_PATTERN: &str = "SELECT {id}, {tag}, {level}, {value} FROM {entity} \
                           WHERE {id} IN ({ids*})";

/// Enum-keyed configuration settings, each applied at most once
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ConfigSetting {
    TranslationTable,
    IdColumn,
    TagColumn,
    LevelColumn,
    ValueColumn,
    MaxBatchSize,
    ValueConstructor,
    DirectPath,
    QueryPath,
}

impl ConfigSetting {
    fn name(self) -> &'static str {
        match self {
            Self::TranslationTable => "translation_table",
            Self::IdColumn => "id_column",
            Self::TagColumn => "tag_column",
            Self::LevelColumn => "level_column",
            Self::ValueColumn => "value_column",
            Self::MaxBatchSize => "max_batch_size",
            Self::ValueConstructor => "value_constructor",
            Self::DirectPath => "direct_path",
            Self::QueryPath => "query_path",
        }
    }
}

/// Accumulates factory configuration; every setter is at-most-once
pub struct LoaderFactoryBuilder<V> {
    applied: BTreeSet<ConfigSetting>,
    frozen: bool,
    table: Option<String>,
    id_column: Option<String>,
    tag_column: Option<String>,
    level_column: Option<String>,
    value_column: Option<String>,
    max_batch_size: usize,
    constructor: Option<ValueConstructor<V>>,
    direct_path: bool,
    query_path: bool,
}

impl<V> Clone for LoaderFactoryBuilder<V> {
    fn clone(&self) -> Self {
        Self {
            applied: self.applied.clone(),
            frozen: self.frozen,
            table: self.table.clone(),
            id_column: self.id_column.clone(),
            tag_column: self.tag_column.clone(),
            level_column: self.level_column.clone(),
            value_column: self.value_column.clone(),
            max_batch_size: self.max_batch_size,
            constructor: self.constructor.clone(),
            direct_path: self.direct_path,
            query_path: self.query_path,
        }
    }
}

impl<V> Default for LoaderFactoryBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> LoaderFactoryBuilder<V> {
    pub fn new() -> Self {
        Self {
            applied: BTreeSet::new(),
            frozen: false,
            table: None,
            id_column: None,
            tag_column: None,
            level_column: None,
            value_column: None,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            constructor: None,
            direct_path: false,
            query_path: false,
        }
    }

    fn apply(&mut self, setting: ConfigSetting) -> LocalizeResult<()> {
        if self.frozen {
            return Err(LocalizeError::FrozenConfiguration {
                target: "loader factory builder".to_string(),
            });
        }
        if !self.applied.insert(setting) {
            return Err(LocalizeError::SettingAlreadyApplied {
                setting: setting.name().to_string(),
            });
        }
        Ok(())
    }

    /// Name of the translation table holding localized entries
    pub fn translation_table(mut self, table: &str) -> LocalizeResult<Self> {
        self.apply(ConfigSetting::TranslationTable)?;
        validate_sql_identifier(table, ConfigSetting::TranslationTable.name())?;
        self.table = Some(table.to_string());
        Ok(self)
    }

    /// Column carrying the record identifier
    pub fn id_column(mut self, column: &str) -> LocalizeResult<Self> {
        self.apply(ConfigSetting::IdColumn)?;
        validate_sql_identifier(column, ConfigSetting::IdColumn.name())?;
        self.id_column = Some(column.to_string());
        Ok(self)
    }

    /// Column carrying the BCP 47 language tag
    pub fn tag_column(mut self, column: &str) -> LocalizeResult<Self> {
        self.apply(ConfigSetting::TagColumn)?;
        validate_sql_identifier(column, ConfigSetting::TagColumn.name())?;
        self.tag_column = Some(column.to_string());
        Ok(self)
    }

    /// Column carrying the language specificity level
    pub fn level_column(mut self, column: &str) -> LocalizeResult<Self> {
        self.apply(ConfigSetting::LevelColumn)?;
        validate_sql_identifier(column, ConfigSetting::LevelColumn.name())?;
        self.level_column = Some(column.to_string());
        Ok(self)
    }

    /// Column carrying the raw localized payload
    pub fn value_column(mut self, column: &str) -> LocalizeResult<Self> {
        self.apply(ConfigSetting::ValueColumn)?;
        validate_sql_identifier(column, ConfigSetting::ValueColumn.name())?;
        self.value_column = Some(column.to_string());
        Ok(self)
    }

    /// Upper bound on identifiers per backend round trip
    pub fn max_batch_size(mut self, size: usize) -> LocalizeResult<Self> {
        self.apply(ConfigSetting::MaxBatchSize)?;
        if size == 0 || size > BATCH_SIZE_LIMIT {
            return Err(LocalizeError::BatchTooLarge {
                size,
                max_size: BATCH_SIZE_LIMIT,
            });
        }
        self.max_batch_size = size;
        Ok(self)
    }

    /// Install a value-construction strategy replacing [`FromRawValue`]
    pub fn value_constructor(mut self, constructor: ValueConstructor<V>) -> LocalizeResult<Self> {
        self.apply(ConfigSetting::ValueConstructor)?;
        self.constructor = Some(constructor);
        Ok(self)
    }

    /// Enable resolution from already-materialized records
    pub fn with_direct_records(mut self) -> LocalizeResult<Self> {
        self.apply(ConfigSetting::DirectPath)?;
        self.direct_path = true;
        Ok(self)
    }

    /// Enable identifier-based loading through the backend
    pub fn with_queries(mut self) -> LocalizeResult<Self> {
        self.apply(ConfigSetting::QueryPath)?;
        self.query_path = true;
        Ok(self)
    }

    /// Independent copy; mutating it never affects the original
    pub fn copy(&self) -> Self {
        let mut copied = self.clone();
        copied.frozen = false;
        copied
    }

    /// Freeze this builder; subsequent setters fail
    pub fn as_read_only(&mut self) -> &mut Self {
        self.frozen = true;
        self
    }

    /// Frozen copy for safe sharing across call sites
    pub fn copy_as_read_only(&self) -> Self {
        let mut copied = self.clone();
        copied.frozen = true;
        copied
    }

    pub fn is_read_only(&self) -> bool {
        self.frozen
    }

    /// Validate the accumulated configuration and produce the factory
    ///
    /// At least one resolution path must be configured; the query path
    /// additionally requires the full schema binding.
    pub fn build(self) -> LocalizeResult<LoaderFactory<V>> {
        if !self.direct_path && !self.query_path {
            return Err(LocalizeError::MissingResolutionPath);
        }

        let binding = if self.query_path {
            let mut missing = Vec::new();
            if self.table.is_none() {
                missing.push(ConfigSetting::TranslationTable.name().to_string());
            }
            if self.id_column.is_none() {
                missing.push(ConfigSetting::IdColumn.name().to_string());
            }
            if self.tag_column.is_none() {
                missing.push(ConfigSetting::TagColumn.name().to_string());
            }
            if self.level_column.is_none() {
                missing.push(ConfigSetting::LevelColumn.name().to_string());
            }
            if self.value_column.is_none() {
                missing.push(ConfigSetting::ValueColumn.name().to_string());
            }
            if !missing.is_empty() {
                return Err(LocalizeError::TokensUnset { tokens: missing });
            }

            Some(TableBinding {
                table: self.table.unwrap_or_default(),
                id_column: self.id_column.unwrap_or_default(),
                tag_column: self.tag_column.unwrap_or_default(),
                level_column: self.level_column.unwrap_or_default(),
                value_column: self.value_column.unwrap_or_default(),
            })
        } else {
            None
        };

        Ok(LoaderFactory {
            binding,
            max_batch_size: self.max_batch_size,
            constructor: self.constructor,
            direct_path: self.direct_path,
            query_path: self.query_path,
            templates: OnceLock::new(),
        })
    }
}

/// Frozen query templates shared by every loader a factory mints
pub(crate) struct LoaderTemplates {
    pub(crate) value: QueryTemplate,
    pub(crate) map: QueryTemplate,
}

/// Immutable, reusable loader configuration
///
/// Binds the schema and value-construction strategy once, then stamps out
/// independent loader instances per locale or usage scope. Safe for
/// concurrent reuse behind an `Arc`; each minted loader is single-threaded.
pub struct LoaderFactory<V> {
    binding: Option<TableBinding>,
    max_batch_size: usize,
    constructor: Option<ValueConstructor<V>>,
    direct_path: bool,
    query_path: bool,
    templates: OnceLock<Arc<LoaderTemplates>>,
}

impl<V> Clone for LoaderFactory<V> {
    fn clone(&self) -> Self {
        Self {
            binding: self.binding.clone(),
            max_batch_size: self.max_batch_size,
            constructor: self.constructor.clone(),
            direct_path: self.direct_path,
            query_path: self.query_path,
            templates: self.templates.clone(),
        }
    }
}

impl<V> LoaderFactory<V> {
    pub fn builder() -> LoaderFactoryBuilder<V> {
        LoaderFactoryBuilder::new()
    }

    pub fn supports_direct(&self) -> bool {
        self.direct_path
    }

    pub fn supports_queries(&self) -> bool {
        self.query_path
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Schema binding, present when the query path is configured
    pub fn binding(&self) -> Option<&TableBinding> {
        self.binding.as_ref()
    }

    fn build_templates(&self) -> LocalizeResult<LoaderTemplates> {
        let binding = self
            .binding
            .as_ref()
            .ok_or_else(|| LocalizeError::UnsupportedOperation {
                operation: "query-based loading".to_string(),
            })?;

        let mut value = QueryTemplate::new(VALUE_PATTERN)?;
        let mut map = QueryTemplate::new(MAP_PATTERN)?;
        for template in [&mut value, &mut map] {
            template.set(SchemaToken::Entity, &binding.table)?;
            template.set(SchemaToken::IdColumn, &binding.id_column)?;
            template.set(SchemaToken::TagColumn, &binding.tag_column)?;
            template.set(SchemaToken::LevelColumn, &binding.level_column)?;
            template.set(SchemaToken::ValueColumn, &binding.value_column)?;
            template.freeze();
        }

        Ok(LoaderTemplates { value, map })
    }

    /// Templates, materialized on first use
    ///
    /// The `get()` probe is lock-free for every call after initialization;
    /// under a first-use race one built result wins and the others are
    /// dropped, which is harmless because building is deterministic.
    pub(crate) fn templates(&self) -> LocalizeResult<Arc<LoaderTemplates>> {
        if let Some(existing) = self.templates.get() {
            return Ok(Arc::clone(existing));
        }
        let built = Arc::new(self.build_templates()?);
        Ok(Arc::clone(self.templates.get_or_init(|| built)))
    }
}

impl<V: FromRawValue + Clone + 'static> LoaderFactory<V> {
    /// Mint a single-value loader for one requested locale
    ///
    /// The locale's fallback chain is computed here, once, and cached for
    /// the life of the loader.
    pub fn value_loader(&self, locale: &str) -> LocalizeResult<ValueLoader<V>> {
        let chain = LocaleChain::candidates(locale)?;
        let templates = if self.query_path {
            Some(self.templates()?)
        } else {
            None
        };
        Ok(ValueLoader::new(
            chain,
            templates,
            self.max_batch_size,
            ValueBuilder {
                constructor: self.constructor.clone(),
            },
            self.direct_path,
        ))
    }

    /// Mint a map loader returning every locale's value per record
    pub fn map_loader(&self) -> LocalizeResult<MapLoader<V>> {
        let templates = if self.query_path {
            Some(self.templates()?)
        } else {
            None
        };
        Ok(MapLoader::new(
            templates,
            self.max_batch_size,
            ValueBuilder {
                constructor: self.constructor.clone(),
            },
            self.direct_path,
        ))
    }
}

/// Converts raw backend payloads using the configured strategy
pub(crate) struct ValueBuilder<V> {
    constructor: Option<ValueConstructor<V>>,
}

impl<V> Clone for ValueBuilder<V> {
    fn clone(&self) -> Self {
        Self {
            constructor: self.constructor.clone(),
        }
    }
}

impl<V: FromRawValue> ValueBuilder<V> {
    pub fn construct(&self, tag: &str, raw: &str) -> LocalizeResult<V> {
        let result = match &self.constructor {
            Some(constructor) => constructor(raw),
            None => V::from_raw(raw),
        };
        result.map_err(|e| match e {
            LocalizeError::ValueConstruction { reason, .. } => LocalizeError::ValueConstruction {
                tag: tag.to_string(),
                reason,
            },
            other => other,
        })
    }
}
