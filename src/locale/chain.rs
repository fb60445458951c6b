use std::collections::HashSet;

use unic_langid::LanguageIdentifier;

use crate::config::ROOT_LOCALE;
use crate::error::{LocalizeError, LocalizeResult};

/// Ordered candidate chain for one requested locale
///
/// Candidates run from most to least specific and always end at the root
/// tag (`und`): `fr-CA` yields `fr-CA`, `fr`, `und`. Tags are canonicalized
/// through `unic-langid`, so `FR-ca` and `fr-CA` produce the same chain.
///
/// Computing the chain parses the locale; loaders do it once at construction
/// and keep the result for their whole life.
#[derive(Debug, Clone)]
pub struct LocaleChain {
    requested: String,
    tags: Vec<String>,
    accept: HashSet<String>,
}

impl LocaleChain {
    /// Compute the fallback chain and acceptable-tag set for `locale`
    ///
    /// Pure and deterministic: same input, same chain, no side effects.
    pub fn candidates(locale: &str) -> LocalizeResult<Self> {
        let parsed: LanguageIdentifier =
            locale.trim().parse().map_err(|e| LocalizeError::InvalidLocale {
                locale: locale.to_string(),
                reason: format!("{e:?}"),
            })?;

        let mut tags = Vec::new();
        let mut current = parsed.clone();

        if current.variants().len() > 0 {
            tags.push(current.to_string());
            current.clear_variants();
        }
        if current.region.is_some() {
            tags.push(current.to_string());
            current.region = None;
        }
        if current.script.is_some() {
            tags.push(current.to_string());
            current.script = None;
        }

        let language_only = current.to_string();
        if language_only != ROOT_LOCALE {
            tags.push(language_only);
        }
        tags.push(ROOT_LOCALE.to_string());

        let accept: HashSet<String> = tags.iter().cloned().collect();

        Ok(Self {
            requested: parsed.to_string(),
            tags,
            accept,
        })
    }

    /// Canonical form of the requested locale
    pub fn requested(&self) -> &str {
        &self.requested
    }

    /// Candidate tags, most specific first, ending with the root tag
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// O(1) membership test against the acceptable-tag set
    ///
    /// Entry tags are compared verbatim; the backend is expected to store
    /// canonical BCP 47 tags (the registration path validates nothing here).
    pub fn accepts(&self, tag: &str) -> bool {
        self.accept.contains(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::assert_error_sqlstate;

    #[test]
    fn test_language_region_chain() {
        let chain = LocaleChain::candidates("fr-CA").unwrap();
        assert_eq!(chain.tags(), &["fr-CA", "fr", "und"]);
        assert_eq!(chain.requested(), "fr-CA");
    }

    #[test]
    fn test_script_chain() {
        let chain = LocaleChain::candidates("zh-Hant-TW").unwrap();
        assert_eq!(chain.tags(), &["zh-Hant-TW", "zh-Hant", "zh", "und"]);
    }

    #[test]
    fn test_language_only_chain() {
        let chain = LocaleChain::candidates("en").unwrap();
        assert_eq!(chain.tags(), &["en", "und"]);
    }

    #[test]
    fn test_root_chain_is_single_entry() {
        let chain = LocaleChain::candidates("und").unwrap();
        assert_eq!(chain.tags(), &["und"]);
    }

    #[test]
    fn test_casing_is_canonicalized() {
        let chain = LocaleChain::candidates("FR-ca").unwrap();
        assert_eq!(chain.tags(), &["fr-CA", "fr", "und"]);
        assert!(chain.accepts("fr-CA"));
        assert!(!chain.accepts("FR-ca"));
    }

    #[test]
    fn test_acceptable_set_matches_chain() {
        let chain = LocaleChain::candidates("fr-CA").unwrap();
        assert!(chain.accepts("fr-CA"));
        assert!(chain.accepts("fr"));
        assert!(chain.accepts("und"));
        assert!(!chain.accepts("en"));
        assert!(!chain.accepts("fr-FR"));
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let chain = LocaleChain::candidates("  en-GB ").unwrap();
        assert_eq!(chain.requested(), "en-GB");
    }

    #[test]
    fn test_invalid_locale_is_configuration_error() {
        assert_error_sqlstate(LocaleChain::candidates("not a locale!"), "22023");
    }
}
