/// Batch size used when a factory does not configure one
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Hard ceiling on configured batch size
/// Keeps a single IN-list from exhausting the parameter budget
pub const BATCH_SIZE_LIMIT: usize = 1000;

/// Maximum accepted length for entity/column identifiers (PostgreSQL NAMEDATALEN - 1)
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Language tag of the fallback chain root
pub const ROOT_LOCALE: &str = "und";
