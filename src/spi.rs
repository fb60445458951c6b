//! SPI implementation of the backend interface
//!
//! Executes engine-built query text through PostgreSQL SPI. Stateless: every
//! call opens its own SPI context, so the engine never retains a session
//! across calls. Identifiers inside query text come from validated bindings;
//! all values travel as positional parameters.

use pgrx::datum::DatumWithOid;
use pgrx::prelude::*;
use pgrx::warning;

use crate::backend::{EntryRow, LocaleBackend, Param, TableBinding};
use crate::error::{LocalizeError, LocalizeResult};
use crate::record::{LocalizedEntry, LocalizedRecord};

/// Backend executing against the current PostgreSQL session via SPI
#[derive(Debug, Default, Clone, Copy)]
pub struct SpiBackend;

impl SpiBackend {
    pub fn new() -> Self {
        Self
    }
}

impl LocaleBackend for SpiBackend {
    fn execute(&mut self, sql: &str, params: &[Param]) -> LocalizeResult<Vec<EntryRow>> {
        let result = Spi::connect(|client| {
            let mut args = Vec::new();
            for param in params {
                match param {
                    Param::Id(id) => args.push(unsafe {
                        DatumWithOid::new(*id, PgOid::BuiltIn(PgBuiltInOids::INT8OID).value())
                    }),
                    Param::Tag(tag) => args.push(unsafe {
                        DatumWithOid::new(tag.clone(), PgOid::BuiltIn(PgBuiltInOids::TEXTOID).value())
                    }),
                }
            }
            let rows = client.select(sql, None, &args)?;

            let mut out = Vec::new();
            for row in rows {
                let id: i64 = row[1].value()?.ok_or(spi::Error::InvalidPosition)?;
                let tag: Option<String> = row[2].value()?;
                let level: Option<i32> = row[3].value()?;
                let value: Option<String> = row[4].value()?;
                out.push(EntryRow {
                    id,
                    tag,
                    level,
                    value,
                });
            }
            Ok::<_, spi::Error>(out)
        });

        result.map_err(|e| LocalizeError::SpiError {
            query: sql.to_string(),
            error: e.to_string(),
        })
    }

    fn materialize(
        &mut self,
        binding: &TableBinding,
        id: i64,
    ) -> LocalizeResult<Option<LocalizedRecord>> {
        // Binding identifiers were whitelist-validated at configuration time
        let sql = format!(
            "SELECT {tag}, {level}, {value} FROM {table} WHERE {id_col} = $1",
            tag = binding.tag_column,
            level = binding.level_column,
            value = binding.value_column,
            table = binding.table,
            id_col = binding.id_column,
        );

        let entries = Spi::connect(|client| {
            let args = vec![unsafe {
                DatumWithOid::new(id, PgOid::BuiltIn(PgBuiltInOids::INT8OID).value())
            }];
            let rows = client.select(&sql, None, &args)?;

            let mut entries = Vec::new();
            for row in rows {
                let tag: Option<String> = row[1].value()?;
                let level: Option<i32> = row[2].value()?;
                let value: Option<String> = row[3].value()?;
                match (tag, value) {
                    (Some(tag), Some(value)) => entries.push(LocalizedEntry {
                        tag,
                        level: level.unwrap_or(0),
                        value,
                    }),
                    _ => {
                        warning!(
                            "pg_localize: discarding malformed entry row for {}[{}]",
                            binding.table,
                            id
                        );
                    }
                }
            }
            Ok::<_, spi::Error>(entries)
        })
        .map_err(|e| LocalizeError::SpiError {
            query: sql.clone(),
            error: e.to_string(),
        })?;

        // Zero entry rows means "not found", matching the batch path
        if entries.is_empty() {
            Ok(None)
        } else {
            Ok(Some(LocalizedRecord::new(id, entries)))
        }
    }
}

#[cfg(feature = "pg_test")]
#[pg_schema]
mod tests {
    use pgrx::prelude::*;

    use super::*;

    fn setup_table() -> TableBinding {
        Spi::run(
            "CREATE TABLE IF NOT EXISTS tb_spi_demo_i18n (
                 pk_demo BIGINT NOT NULL,
                 lang_tag TEXT NOT NULL,
                 lang_level INT NOT NULL,
                 val TEXT NOT NULL
             )",
        )
        .expect("create table");
        Spi::run("DELETE FROM tb_spi_demo_i18n").expect("reset table");
        Spi::run(
            "INSERT INTO tb_spi_demo_i18n VALUES
                 (1, 'und', 0, 'color'),
                 (1, 'en-CA', 2, 'colour'),
                 (2, 'fr', 1, 'couleur')",
        )
        .expect("seed rows");

        TableBinding {
            table: "tb_spi_demo_i18n".to_string(),
            id_column: "pk_demo".to_string(),
            tag_column: "lang_tag".to_string(),
            level_column: "lang_level".to_string(),
            value_column: "val".to_string(),
        }
    }

    #[pg_test]
    fn test_execute_binds_positional_params() {
        let _binding = setup_table();
        let mut backend = SpiBackend::new();

        let rows = backend
            .execute(
                "SELECT pk_demo, lang_tag, lang_level, val FROM tb_spi_demo_i18n \
                 WHERE pk_demo IN ($1, $2) AND lang_tag IN ($3)",
                &[
                    Param::Id(1),
                    Param::Id(2),
                    Param::Tag("en-CA".to_string()),
                ],
            )
            .expect("execute");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[0].tag.as_deref(), Some("en-CA"));
        assert_eq!(rows[0].level, Some(2));
    }

    #[pg_test]
    fn test_materialize_reads_all_entries() {
        let binding = setup_table();
        let mut backend = SpiBackend::new();

        let record = backend.materialize(&binding, 1).expect("materialize");
        let record = record.expect("record 1 exists");
        assert_eq!(record.entries.len(), 2);

        let absent = backend.materialize(&binding, 99).expect("materialize");
        assert!(absent.is_none());
    }
}
