//! Locale fallback resolution
//!
//! Two small, pure pieces:
//! - `LocaleChain`: the ordered fallback chain and acceptable-tag set for one
//!   requested locale, computed once per loader and cached there
//! - `select_entry`: the single-pass scan that picks the most specific
//!   acceptable entry out of a record's localized entries

mod chain;
mod select;

pub use chain::LocaleChain;
pub use select::select_entry;
