
use std::fmt;

pub mod testing;

/// Main error type for the pg_localize extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalizeError {
    // ============ Configuration Errors (42xxx) ============
    /// A builder setting was applied more than once
    SettingAlreadyApplied {
        setting: String,
    },

    /// A builder or template was mutated after being frozen
    FrozenConfiguration {
        target: String,
    },

    /// Factory built with neither direct-record nor query-based loading
    MissingResolutionPath,

    /// Operation requires a resolution path the loader was not built with
    UnsupportedOperation {
        operation: String,
    },

    /// Identifier failed whitelist validation
    InvalidIdentifier {
        identifier: String,
        parameter: String,
        reason: String,
    },

    /// Requested locale could not be parsed as a BCP 47 tag
    InvalidLocale {
        locale: String,
        reason: String,
    },

    // ============ Template Errors (42xxx) ============
    /// A template token was substituted more than once
    TokenAlreadySet {
        token: String,
    },

    /// A token was set that the pattern never declares
    TokenNotDeclared {
        token: String,
    },

    /// Template or factory built while declared tokens remain unset
    TokensUnset {
        tokens: Vec<String>,
    },

    // ============ Protocol Violations (55xxx) ============
    /// A backend-pending reference was dereferenced before `load` ran
    NotLoaded {
        id: i64,
    },

    /// The batch phase tried to resolve an already-resolved reference
    AlreadyResolved {
        id: i64,
    },

    /// `set`/`set_not_exists` called on a reference not awaiting the batch phase
    NotBatchPending {
        id: i64,
    },

    // ============ Batch Errors (54xxx) ============
    /// Configured batch size exceeds the hard limit
    BatchTooLarge {
        size: usize,
        max_size: usize,
    },

    // ============ Registry Errors (P0xxx) ============
    /// Entity has no row in pg_localize_meta
    EntityNotRegistered {
        entity: String,
    },

    /// Entity already has a row in pg_localize_meta
    EntityAlreadyRegistered {
        entity: String,
    },

    // ============ I/O and System Errors (XX000) ============
    /// SPI operation failed
    SpiError {
        query: String,
        error: String,
    },

    /// Value-construction strategy rejected a raw backend value
    ValueConstruction {
        tag: String,
        reason: String,
    },

    /// Serialization/deserialization failed
    SerializationError {
        message: String,
    },

    /// Cache error (poisoned mutex, corruption)
    CacheError {
        cache_name: String,
        reason: String,
    },

    /// Internal error (bug in extension)
    InternalError {
        message: String,
        file: &'static str,
        line: u32,
    },
}

impl LocalizeError {
    /// Get PostgreSQL SQLSTATE code for this error
    pub fn sqlstate(&self) -> &'static str {
        use LocalizeError::*;
        match self {
            SettingAlreadyApplied { .. } => "42710", // Duplicate object
            FrozenConfiguration { .. } => "55000", // Object not in prerequisite state
            MissingResolutionPath => "42P18", // Indeterminate configuration
            UnsupportedOperation { .. } => "0A000", // Feature not supported
            InvalidIdentifier { .. } => "42602", // Invalid name
            InvalidLocale { .. } => "22023", // Invalid parameter value

            TokenAlreadySet { .. } => "42710",
            TokenNotDeclared { .. } => "42703", // Undefined column (unknown token)
            TokensUnset { .. } => "42P02", // Undefined parameter

            NotLoaded { .. } => "55000",
            AlreadyResolved { .. } => "55000",
            NotBatchPending { .. } => "55000",

            BatchTooLarge { .. } => "54000", // Program limit exceeded

            EntityNotRegistered { .. } => "P0001", // Raise exception
            EntityAlreadyRegistered { .. } => "42710",

            SpiError { .. } => "XX000",
            ValueConstruction { .. } => "22P02", // Invalid text representation
            SerializationError { .. } => "XX000",
            CacheError { .. } => "XX000",
            InternalError { .. } => "XX000",
        }
    }

    /// Create internal error with file/line info
    pub fn internal(message: String, file: &'static str, line: u32) -> Self {
        LocalizeError::InternalError { message, file, line }
    }
}

impl fmt::Display for LocalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use LocalizeError::*;
        match self {
            SettingAlreadyApplied { setting } => {
                write!(f, "Configuration setting '{}' applied more than once", setting)
            }
            FrozenConfiguration { target } => {
                write!(f, "'{}' is read-only and cannot be modified", target)
            }
            MissingResolutionPath => {
                write!(f, "Factory requires at least one resolution path: \
                           configure direct record handling, query-based loading, or both")
            }
            UnsupportedOperation { operation } => {
                write!(f, "Operation '{}' is not supported by this loader configuration", operation)
            }
            InvalidIdentifier { identifier, parameter, reason } => {
                write!(f, "Invalid identifier '{}' for {}: {}", identifier, parameter, reason)
            }
            InvalidLocale { locale, reason } => {
                write!(f, "Invalid locale '{}': {}", locale, reason)
            }
            TokenAlreadySet { token } => {
                write!(f, "Template token '{}' substituted more than once", token)
            }
            TokenNotDeclared { token } => {
                write!(f, "Template token '{}' does not occur in the query pattern", token)
            }
            TokensUnset { tokens } => {
                write!(f, "Required tokens left unset: {}", tokens.join(", "))
            }
            NotLoaded { id } => {
                write!(f, "Reference for id {} is backend-pending; call load() before get()", id)
            }
            AlreadyResolved { id } => {
                write!(f, "Reference for id {} is already resolved", id)
            }
            NotBatchPending { id } => {
                write!(f, "Reference for id {} is not awaiting the batch phase", id)
            }
            BatchTooLarge { size, max_size } => {
                write!(f, "Batch size {} exceeds maximum {}", size, max_size)
            }
            EntityNotRegistered { entity } => {
                write!(f, "Entity '{}' is not registered in pg_localize_meta", entity)
            }
            EntityAlreadyRegistered { entity } => {
                write!(f, "Entity '{}' is already registered in pg_localize_meta", entity)
            }
            SpiError { query, error } => {
                write!(f, "SPI query failed: {}\nQuery: {}", error,
                       if query.len() > 100 { &query[..100] } else { query })
            }
            ValueConstruction { tag, reason } => {
                write!(f, "Failed to construct value for entry tagged '{}': {}", tag, reason)
            }
            SerializationError { message } => {
                write!(f, "Serialization error: {}", message)
            }
            CacheError { cache_name, reason } => {
                write!(f, "Cache '{}' error: {}", cache_name, reason)
            }
            InternalError { message, file, line } => {
                write!(f, "Internal error at {}:{}: {}\nPlease report this bug.",
                       file, line, message)
            }
        }
    }
}

impl std::error::Error for LocalizeError {}

/// Result type for localization operations
pub type LocalizeResult<T> = Result<T, LocalizeError>;

/// Convert SpiError to LocalizeError
impl From<pgrx::spi::Error> for LocalizeError {
    fn from(e: pgrx::spi::Error) -> Self {
        LocalizeError::SpiError {
            query: "Unknown".to_string(),
            error: e.to_string(),
        }
    }
}

/// Convert serde_json::Error to LocalizeError
impl From<serde_json::Error> for LocalizeError {
    fn from(e: serde_json::Error) -> Self {
        LocalizeError::SerializationError {
            message: format!("JSON serialization error: {}", e),
        }
    }
}

/// Convert bincode::Error to LocalizeError
impl From<bincode::Error> for LocalizeError {
    fn from(e: bincode::Error) -> Self {
        LocalizeError::SerializationError {
            message: format!("Binary serialization error: {}", e),
        }
    }
}

/// Convert std::io::Error to LocalizeError
impl From<std::io::Error> for LocalizeError {
    fn from(e: std::io::Error) -> Self {
        LocalizeError::SerializationError {
            message: format!("I/O error: {}", e),
        }
    }
}

/// Helper macro for creating internal errors with automatic file/line
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::LocalizeError::internal($msg.to_string(), file!(), line!())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::LocalizeError::internal(format!($fmt, $($arg)*), file!(), line!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_not_registered_message() {
        let err = LocalizeError::EntityNotRegistered {
            entity: "product".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("product"));
        assert!(msg.contains("not registered"));
        assert_eq!(err.sqlstate(), "P0001");
    }

    #[test]
    fn test_tokens_unset_message_lists_all() {
        let err = LocalizeError::TokensUnset {
            tokens: vec!["entity".to_string(), "value".to_string()],
        };

        let msg = err.to_string();
        assert!(msg.contains("entity, value"));
        assert_eq!(err.sqlstate(), "42P02");
    }

    #[test]
    fn test_protocol_violations_share_state_sqlstate() {
        let not_loaded = LocalizeError::NotLoaded { id: 7 };
        let resolved = LocalizeError::AlreadyResolved { id: 7 };
        let not_pending = LocalizeError::NotBatchPending { id: 7 };

        assert_eq!(not_loaded.sqlstate(), "55000");
        assert_eq!(resolved.sqlstate(), "55000");
        assert_eq!(not_pending.sqlstate(), "55000");
        assert!(not_loaded.to_string().contains("load()"));
    }

    #[test]
    fn test_internal_error_macro() {
        let err = internal_error!("Test error at {}", "location");

        match err {
            LocalizeError::InternalError { message, file, line } => {
                assert!(message.contains("Test error"));
                assert!(file.ends_with("mod.rs"));
                assert!(line > 0);
            }
            _ => panic!("Wrong error type"),
        }
    }

    #[test]
    fn test_long_query_is_truncated_in_display() {
        let err = LocalizeError::SpiError {
            query: "SELECT * FROM t WHERE ".repeat(20),
            error: "boom".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("boom"));
        assert!(msg.len() < 200);
    }
}
