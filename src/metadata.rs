use pgrx::datum::DatumWithOid;
use pgrx::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backend::TableBinding;
use crate::config::{BATCH_SIZE_LIMIT, DEFAULT_MAX_BATCH_SIZE};
use crate::error::{LocalizeError, LocalizeResult};
use crate::validation::validate_sql_identifier;

// Generate SQL to create the registry table during extension installation
extension_sql!(
    r"
    CREATE TABLE IF NOT EXISTS public.pg_localize_meta (
        entity TEXT NOT NULL PRIMARY KEY,
        translation_table TEXT NOT NULL,
        id_column TEXT NOT NULL,
        tag_column TEXT NOT NULL,
        level_column TEXT NOT NULL,
        value_column TEXT NOT NULL,
        max_batch_size INT NOT NULL DEFAULT 100,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    COMMENT ON TABLE public.pg_localize_meta IS
        'Entity registrations for pg_localize batched resolution';
    ",
    name = "create_localize_meta",
);

/// Represents a row in pg_localize_meta (the extension's own catalog table)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizeMeta {
    pub entity: String,
    pub translation_table: String,
    pub id_column: String,
    pub tag_column: String,
    pub level_column: String,
    pub value_column: String,
    pub max_batch_size: i32,
}

impl LocalizeMeta {
    /// Convention-based registration for an entity
    ///
    /// Entity `product` maps to table `tb_product_i18n` with columns
    /// `pk_product`, `lang_tag`, `lang_level`, `val`.
    pub fn defaults_for(entity: &str) -> LocalizeResult<Self> {
        validate_sql_identifier(entity, "entity")?;
        Ok(Self {
            entity: entity.to_string(),
            translation_table: format!("tb_{entity}_i18n"),
            id_column: format!("pk_{entity}"),
            tag_column: "lang_tag".to_string(),
            level_column: "lang_level".to_string(),
            value_column: "val".to_string(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE as i32,
        })
    }

    /// Validate every identifier and the batch bound
    pub fn validate(&self) -> LocalizeResult<()> {
        validate_sql_identifier(&self.entity, "entity")?;
        validate_sql_identifier(&self.translation_table, "translation_table")?;
        validate_sql_identifier(&self.id_column, "id_column")?;
        validate_sql_identifier(&self.tag_column, "tag_column")?;
        validate_sql_identifier(&self.level_column, "level_column")?;
        validate_sql_identifier(&self.value_column, "value_column")?;

        let size = self.max_batch_size;
        if size <= 0 || size as usize > BATCH_SIZE_LIMIT {
            return Err(LocalizeError::BatchTooLarge {
                size: size.max(0) as usize,
                max_size: BATCH_SIZE_LIMIT,
            });
        }
        Ok(())
    }

    /// Schema binding used by templates and the materialize path
    pub fn binding(&self) -> TableBinding {
        TableBinding {
            table: self.translation_table.clone(),
            id_column: self.id_column.clone(),
            tag_column: self.tag_column.clone(),
            level_column: self.level_column.clone(),
            value_column: self.value_column.clone(),
        }
    }

    /// Look up a registration by entity name
    pub fn load_by_entity(entity: &str) -> LocalizeResult<Option<Self>> {
        let result = Spi::connect(|client| {
            let args = vec![unsafe {
                DatumWithOid::new(
                    entity.to_string(),
                    PgOid::BuiltIn(PgBuiltInOids::TEXTOID).value(),
                )
            }];
            let rows = client.select(
                "SELECT entity, translation_table, id_column, tag_column, \
                        level_column, value_column, max_batch_size \
                 FROM pg_localize_meta WHERE entity = $1",
                None,
                &args,
            )?;

            let mut found = None;
            for row in rows {
                found = Some(Self {
                    entity: row[1].value()?.ok_or(spi::Error::InvalidPosition)?,
                    translation_table: row[2].value()?.ok_or(spi::Error::InvalidPosition)?,
                    id_column: row[3].value()?.ok_or(spi::Error::InvalidPosition)?,
                    tag_column: row[4].value()?.ok_or(spi::Error::InvalidPosition)?,
                    level_column: row[5].value()?.ok_or(spi::Error::InvalidPosition)?,
                    value_column: row[6].value()?.ok_or(spi::Error::InvalidPosition)?,
                    max_batch_size: row[7].value()?.ok_or(spi::Error::InvalidPosition)?,
                });
                break; // entity is the primary key
            }
            Ok::<_, spi::Error>(found)
        });

        result.map_err(|e| LocalizeError::SpiError {
            query: "load pg_localize_meta row".to_string(),
            error: e.to_string(),
        })
    }

    /// Insert this registration; fails if the entity is already registered
    pub fn register(&self) -> LocalizeResult<()> {
        self.validate()?;

        if Self::load_by_entity(&self.entity)?.is_some() {
            return Err(LocalizeError::EntityAlreadyRegistered {
                entity: self.entity.clone(),
            });
        }

        let text_oid = PgOid::BuiltIn(PgBuiltInOids::TEXTOID).value();
        let args = vec![
            unsafe { DatumWithOid::new(self.entity.clone(), text_oid) },
            unsafe { DatumWithOid::new(self.translation_table.clone(), text_oid) },
            unsafe { DatumWithOid::new(self.id_column.clone(), text_oid) },
            unsafe { DatumWithOid::new(self.tag_column.clone(), text_oid) },
            unsafe { DatumWithOid::new(self.level_column.clone(), text_oid) },
            unsafe { DatumWithOid::new(self.value_column.clone(), text_oid) },
            unsafe {
                DatumWithOid::new(
                    self.max_batch_size,
                    PgOid::BuiltIn(PgBuiltInOids::INT4OID).value(),
                )
            },
        ];
        Spi::run_with_args(
            "INSERT INTO pg_localize_meta \
                 (entity, translation_table, id_column, tag_column, \
                  level_column, value_column, max_batch_size) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &args,
        )
        .map_err(|e| LocalizeError::SpiError {
            query: "insert pg_localize_meta row".to_string(),
            error: e.to_string(),
        })?;

        info!("pg_localize: registered entity '{}'", self.entity);
        Ok(())
    }

    /// Remove a registration; returns whether a row was deleted
    pub fn unregister(entity: &str) -> LocalizeResult<bool> {
        validate_sql_identifier(entity, "entity")?;

        let existed = Self::load_by_entity(entity)?.is_some();
        if existed {
            let args = vec![unsafe {
                DatumWithOid::new(
                    entity.to_string(),
                    PgOid::BuiltIn(PgBuiltInOids::TEXTOID).value(),
                )
            }];
            Spi::run_with_args("DELETE FROM pg_localize_meta WHERE entity = $1", &args)
                .map_err(|e| LocalizeError::SpiError {
                    query: "delete pg_localize_meta row".to_string(),
                    error: e.to_string(),
                })?;
            info!("pg_localize: unregistered entity '{entity}'");
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::{assert_error_contains, assert_error_sqlstate};

    #[test]
    fn test_defaults_follow_convention() {
        let meta = LocalizeMeta::defaults_for("product").unwrap();
        assert_eq!(meta.translation_table, "tb_product_i18n");
        assert_eq!(meta.id_column, "pk_product");
        assert_eq!(meta.tag_column, "lang_tag");
        assert_eq!(meta.max_batch_size as usize, DEFAULT_MAX_BATCH_SIZE);
    }

    #[test]
    fn test_defaults_reject_bad_entity() {
        assert_error_sqlstate(LocalizeMeta::defaults_for("pro duct"), "42602");
    }

    #[test]
    fn test_validate_checks_every_identifier() {
        let mut meta = LocalizeMeta::defaults_for("product").unwrap();
        meta.value_column = "val; DROP".to_string();
        assert_error_sqlstate(meta.validate(), "42602");
    }

    #[test]
    fn test_validate_bounds_batch_size() {
        let mut meta = LocalizeMeta::defaults_for("product").unwrap();
        meta.max_batch_size = 0;
        assert_error_contains(meta.validate(), "Batch size");

        meta.max_batch_size = (BATCH_SIZE_LIMIT + 1) as i32;
        assert_error_sqlstate(meta.validate(), "54000");
    }

    #[test]
    fn test_binding_mirrors_meta() {
        let meta = LocalizeMeta::defaults_for("product").unwrap();
        let binding = meta.binding();
        assert_eq!(binding.table, meta.translation_table);
        assert_eq!(binding.id_column, meta.id_column);
    }
}

#[cfg(feature = "pg_test")]
#[pg_schema]
mod pg_tests {
    use pgrx::prelude::*;

    use super::*;

    #[pg_test]
    fn test_register_load_unregister_round_trip() {
        let meta = LocalizeMeta::defaults_for("widget").expect("defaults");
        meta.register().expect("register");

        let loaded = LocalizeMeta::load_by_entity("widget")
            .expect("load")
            .expect("registered row");
        assert_eq!(loaded, meta);

        assert!(LocalizeMeta::unregister("widget").expect("unregister"));
        assert!(LocalizeMeta::load_by_entity("widget").expect("load").is_none());
        assert!(!LocalizeMeta::unregister("widget").expect("unregister again"));
    }

    #[pg_test]
    fn test_duplicate_registration_fails() {
        let meta = LocalizeMeta::defaults_for("gadget").expect("defaults");
        meta.register().expect("register");

        let result = meta.register();
        assert!(matches!(
            result,
            Err(LocalizeError::EntityAlreadyRegistered { .. })
        ));
    }
}
