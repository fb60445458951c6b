//! Query Template Builder
//!
//! Batch queries are assembled from a fixed pattern with named placeholder
//! tokens rather than ad-hoc `format!` calls. Two token flavors exist:
//!
//! - **Schema tokens** `{entity} {id} {tag} {level} {value}`: substituted
//!   with validated SQL identifiers exactly once, at configuration time
//! - **Repeating parameter tokens** `{ids*} {tags*}`: expanded to a
//!   comma-separated run of positional `$n` placeholders, with the count
//!   supplied at batch-build time (the IN-list length is only known then)
//!
//! A configured template is frozen and shared; each batch copies it, sets the
//! repeat counts for that batch, and builds the final query text. Positional
//! parameters are numbered in textual order, so the caller binds values in
//! the same order the tokens appear in the pattern.
//!
//! Tokens are enum-keyed; there is no string-driven reflection, and the
//! "each token set at most once" rule is enforced as an explicit validation
//! step.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{LocalizeError, LocalizeResult};
use crate::internal_error;
use crate::validation::validate_sql_identifier;

/// Matches `{name}` and `{name*}` placeholder tokens inside a pattern
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([a-z_]+)(\*)?\}").expect("token regex is valid")
});

/// Schema token: replaced by a validated SQL identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchemaToken {
    Entity,
    IdColumn,
    TagColumn,
    LevelColumn,
    ValueColumn,
}

impl SchemaToken {
    pub fn name(self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::IdColumn => "id",
            Self::TagColumn => "tag",
            Self::LevelColumn => "level",
            Self::ValueColumn => "value",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "entity" => Some(Self::Entity),
            "id" => Some(Self::IdColumn),
            "tag" => Some(Self::TagColumn),
            "level" => Some(Self::LevelColumn),
            "value" => Some(Self::ValueColumn),
            _ => None,
        }
    }

    fn placeholder(self) -> String {
        format!("{{{}}}", self.name())
    }
}

/// Repeating parameter token: expanded to `count` positional placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RepeatToken {
    Ids,
    Tags,
}

impl RepeatToken {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ids => "ids",
            Self::Tags => "tags",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ids" => Some(Self::Ids),
            "tags" => Some(Self::Tags),
            _ => None,
        }
    }
}

/// A query pattern in some stage of token substitution
///
/// Copy semantics: `copy()` yields an identical but unfrozen template, so a
/// frozen master can be stamped into per-batch variants without re-parsing
/// the pattern.
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    text: String,
    declared_schema: BTreeSet<SchemaToken>,
    unset_schema: BTreeSet<SchemaToken>,
    declared_repeats: BTreeSet<RepeatToken>,
    repeat_counts: BTreeMap<RepeatToken, usize>,
    frozen: bool,
}

impl QueryTemplate {
    /// Parse `pattern`, recording which tokens it declares
    ///
    /// Patterns are authored inside this crate; an unrecognized token name is
    /// a bug, not caller input.
    pub fn new(pattern: &str) -> LocalizeResult<Self> {
        let mut declared_schema = BTreeSet::new();
        let mut declared_repeats = BTreeSet::new();

        for caps in TOKEN_RE.captures_iter(pattern) {
            let name = &caps[1];
            let is_repeat = caps.get(2).is_some();

            if is_repeat {
                let token = RepeatToken::from_name(name)
                    .ok_or_else(|| internal_error!("unknown repeat token '{{{}*}}'", name))?;
                declared_repeats.insert(token);
            } else {
                let token = SchemaToken::from_name(name)
                    .ok_or_else(|| internal_error!("unknown schema token '{{{}}}'", name))?;
                declared_schema.insert(token);
            }
        }

        Ok(Self {
            text: pattern.to_string(),
            unset_schema: declared_schema.clone(),
            declared_schema,
            declared_repeats,
            repeat_counts: BTreeMap::new(),
            frozen: false,
        })
    }

    /// Substitute a schema token with a validated identifier, at most once
    ///
    /// Every occurrence of the token in the pattern is replaced by this one
    /// call; a second call for the same token is a configuration error.
    pub fn set(&mut self, token: SchemaToken, identifier: &str) -> LocalizeResult<()> {
        self.ensure_mutable()?;

        if !self.declared_schema.contains(&token) {
            return Err(LocalizeError::TokenNotDeclared {
                token: token.name().to_string(),
            });
        }
        if !self.unset_schema.remove(&token) {
            return Err(LocalizeError::TokenAlreadySet {
                token: token.name().to_string(),
            });
        }

        validate_sql_identifier(identifier, token.name())?;
        self.text = self.text.replace(&token.placeholder(), identifier);
        Ok(())
    }

    /// Supply the placeholder count for a repeating token, at most once
    ///
    /// Counts are batch-specific, so this is called on a `copy()` of the
    /// configured master, not on the master itself.
    pub fn set_repeat(&mut self, token: RepeatToken, count: usize) -> LocalizeResult<()> {
        self.ensure_mutable()?;

        if !self.declared_repeats.contains(&token) {
            return Err(LocalizeError::TokenNotDeclared {
                token: token.name().to_string(),
            });
        }
        if self.repeat_counts.contains_key(&token) {
            return Err(LocalizeError::TokenAlreadySet {
                token: token.name().to_string(),
            });
        }
        if count == 0 {
            return Err(internal_error!(
                "repeat token '{{{}*}}' expanded to zero placeholders",
                token.name()
            ));
        }

        self.repeat_counts.insert(token, count);
        Ok(())
    }

    /// Mark the template read-only; subsequent mutation fails
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Identical copy that accepts mutation again
    pub fn copy(&self) -> Self {
        let mut copied = self.clone();
        copied.frozen = false;
        copied
    }

    fn ensure_mutable(&self) -> LocalizeResult<()> {
        if self.frozen {
            return Err(LocalizeError::FrozenConfiguration {
                target: "query template".to_string(),
            });
        }
        Ok(())
    }

    /// Produce the final query text
    ///
    /// Fails while any declared token remains unset. Repeating tokens expand
    /// to sequential `$n` placeholders numbered in textual order.
    pub fn build(&self) -> LocalizeResult<String> {
        let mut missing: Vec<String> = self
            .unset_schema
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        missing.extend(
            self.declared_repeats
                .iter()
                .filter(|t| !self.repeat_counts.contains_key(t))
                .map(|t| t.name().to_string()),
        );
        if !missing.is_empty() {
            return Err(LocalizeError::TokensUnset { tokens: missing });
        }

        let mut out = String::with_capacity(self.text.len());
        let mut cursor = 0;
        let mut next_param = 1;

        for found in TOKEN_RE.find_iter(&self.text) {
            out.push_str(&self.text[cursor..found.start()]);

            let body = found
                .as_str()
                .trim_start_matches('{')
                .trim_end_matches('}')
                .trim_end_matches('*');
            let token = RepeatToken::from_name(body)
                .ok_or_else(|| internal_error!("unresolved token '{}' at build time", body))?;
            let count = self.repeat_counts[&token];

            for offset in 0..count {
                if offset > 0 {
                    out.push_str(", ");
                }
                out.push_str(&format!("${}", next_param + offset));
            }
            next_param += count;

            cursor = found.end();
        }
        out.push_str(&self.text[cursor..]);

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::{assert_error_contains, assert_error_sqlstate};

    const VALUE_PATTERN: &str = "SELECT {id}, {tag}, {level}, {value} FROM {entity} \
                                 WHERE {id} IN ({ids*}) AND {tag} IN ({tags*})";

    fn configured() -> QueryTemplate {
        let mut template = QueryTemplate::new(VALUE_PATTERN).unwrap();
        template.set(SchemaToken::IdColumn, "pk_product").unwrap();
        template.set(SchemaToken::TagColumn, "lang_tag").unwrap();
        template.set(SchemaToken::LevelColumn, "lang_level").unwrap();
        template.set(SchemaToken::ValueColumn, "val").unwrap();
        template.set(SchemaToken::Entity, "tb_product_i18n").unwrap();
        template
    }

    #[test]
    fn test_full_expansion() {
        let mut template = configured();
        template.set_repeat(RepeatToken::Ids, 3).unwrap();
        template.set_repeat(RepeatToken::Tags, 2).unwrap();

        let sql = template.build().unwrap();
        assert_eq!(
            sql,
            "SELECT pk_product, lang_tag, lang_level, val FROM tb_product_i18n \
             WHERE pk_product IN ($1, $2, $3) AND lang_tag IN ($4, $5)"
        );
    }

    #[test]
    fn test_schema_token_replaces_every_occurrence() {
        let mut template = QueryTemplate::new("SELECT {id} FROM t WHERE {id} IN ({ids*})").unwrap();
        template.set(SchemaToken::IdColumn, "pk").unwrap();
        template.set_repeat(RepeatToken::Ids, 1).unwrap();
        assert_eq!(template.build().unwrap(), "SELECT pk FROM t WHERE pk IN ($1)");
    }

    #[test]
    fn test_token_set_twice_fails() {
        let mut template = QueryTemplate::new(VALUE_PATTERN).unwrap();
        template.set(SchemaToken::Entity, "tb_a").unwrap();
        assert_error_sqlstate(template.set(SchemaToken::Entity, "tb_b"), "42710");
    }

    #[test]
    fn test_undeclared_token_fails() {
        let mut template = QueryTemplate::new("SELECT {id} FROM t WHERE {id} IN ({ids*})").unwrap();
        assert_error_sqlstate(template.set(SchemaToken::Entity, "tb_a"), "42703");
        assert_error_sqlstate(template.set_repeat(RepeatToken::Tags, 2), "42703");
    }

    #[test]
    fn test_build_with_unset_tokens_fails() {
        let mut template = QueryTemplate::new(VALUE_PATTERN).unwrap();
        template.set(SchemaToken::Entity, "tb_a").unwrap();
        let err = template.build().unwrap_err();
        match err {
            LocalizeError::TokensUnset { tokens } => {
                assert!(tokens.contains(&"id".to_string()));
                assert!(tokens.contains(&"ids".to_string()));
                assert!(tokens.contains(&"tags".to_string()));
                assert!(!tokens.contains(&"entity".to_string()));
            }
            other => panic!("Wrong error type: {other:?}"),
        }
    }

    #[test]
    fn test_frozen_template_rejects_mutation() {
        let mut template = configured();
        template.freeze();
        assert!(template.is_frozen());
        assert_error_contains(
            template.set_repeat(RepeatToken::Ids, 2),
            "read-only",
        );
    }

    #[test]
    fn test_copy_is_mutable_and_independent() {
        let mut master = configured();
        master.freeze();

        let mut batch_a = master.copy();
        batch_a.set_repeat(RepeatToken::Ids, 2).unwrap();
        batch_a.set_repeat(RepeatToken::Tags, 1).unwrap();
        let mut batch_b = master.copy();
        batch_b.set_repeat(RepeatToken::Ids, 5).unwrap();
        batch_b.set_repeat(RepeatToken::Tags, 1).unwrap();

        assert!(batch_a.build().unwrap().contains("IN ($1, $2)"));
        assert!(batch_b.build().unwrap().contains("IN ($1, $2, $3, $4, $5)"));
        assert!(master.is_frozen());
    }

    #[test]
    fn test_repeat_count_set_twice_fails() {
        let mut template = configured();
        template.set_repeat(RepeatToken::Ids, 2).unwrap();
        assert_error_sqlstate(template.set_repeat(RepeatToken::Ids, 3), "42710");
    }

    #[test]
    fn test_zero_count_expansion_is_rejected() {
        let mut template = configured();
        assert_error_contains(
            template.set_repeat(RepeatToken::Ids, 0),
            "zero placeholders",
        );
    }

    #[test]
    fn test_identifier_validation_applies_to_substitution() {
        let mut template = QueryTemplate::new(VALUE_PATTERN).unwrap();
        assert_error_sqlstate(
            template.set(SchemaToken::Entity, "tb_x; DROP TABLE y"),
            "42602",
        );
    }

    #[test]
    fn test_unknown_pattern_token_is_internal_error() {
        assert_error_contains(
            QueryTemplate::new("SELECT {nope} FROM t"),
            "unknown schema token",
        );
    }
}
