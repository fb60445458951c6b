//! Input Validation Module
//!
//! Security-critical validation for every identifier that is spliced into
//! query text. Schema tokens (entity table and column names) come from
//! extension configuration, which may itself be driven by SQL-level callers,
//! so they are validated with a whitelist before any substitution happens.
//!
//! ## Principles
//!
//! 1. **Whitelist, not blacklist**: only known-safe characters pass
//! 2. **Validate early**: at configuration time, before any query is built
//! 3. **Fail securely**: clear errors, sanitized logging

use crate::config::MAX_IDENTIFIER_LENGTH;
use crate::error::{LocalizeError, LocalizeResult};

/// Validate a `PostgreSQL` identifier (table or column name)
///
/// # Security
///
/// Prevents SQL injection by ensuring only safe identifier characters.
/// Allows: alphanumeric + underscore (`PostgreSQL` identifier rules)
/// Rejects: quotes, semicolons, dashes, spaces, special chars
///
/// # Arguments
///
/// * `identifier` - String to validate
/// * `param_name` - Parameter name for error messages
pub fn validate_sql_identifier(identifier: &str, param_name: &str) -> LocalizeResult<()> {
    if identifier.is_empty() {
        return Err(LocalizeError::InvalidIdentifier {
            identifier: identifier.to_string(),
            parameter: param_name.to_string(),
            reason: "Identifier cannot be empty".to_string(),
        });
    }

    if !identifier.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(LocalizeError::InvalidIdentifier {
            identifier: sanitize_for_logging(identifier),
            parameter: param_name.to_string(),
            reason: "Identifier must contain only alphanumeric characters and underscores"
                .to_string(),
        });
    }

    // PostgreSQL identifiers can't start with a digit (unless quoted)
    if identifier.chars().next().is_some_and(char::is_numeric) {
        return Err(LocalizeError::InvalidIdentifier {
            identifier: sanitize_for_logging(identifier),
            parameter: param_name.to_string(),
            reason: "Identifier cannot start with a digit".to_string(),
        });
    }

    if identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(LocalizeError::InvalidIdentifier {
            identifier: format!("{}... ({} chars)", &identifier[..20], identifier.len()),
            parameter: param_name.to_string(),
            reason: format!("Identifier too long (max {MAX_IDENTIFIER_LENGTH} characters)"),
        });
    }

    Ok(())
}

/// Truncate and strip control characters before an identifier reaches the log
fn sanitize_for_logging(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control())
        .take(40)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::assert_error_contains;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_sql_identifier("tb_product_i18n", "table").is_ok());
        assert!(validate_sql_identifier("pk_product", "id_column").is_ok());
        assert!(validate_sql_identifier("lang_tag", "tag_column").is_ok());
        assert!(validate_sql_identifier("_private", "column").is_ok());
    }

    #[test]
    fn test_rejects_injection_attempts() {
        assert_error_contains(
            validate_sql_identifier("users; DROP TABLE t", "table"),
            "alphanumeric",
        );
        assert_error_contains(
            validate_sql_identifier("val'; --", "column"),
            "alphanumeric",
        );
        assert_error_contains(validate_sql_identifier("my table", "table"), "alphanumeric");
    }

    #[test]
    fn test_rejects_empty_and_leading_digit() {
        assert_error_contains(validate_sql_identifier("", "table"), "empty");
        assert_error_contains(validate_sql_identifier("1col", "column"), "digit");
    }

    #[test]
    fn test_rejects_overlong_identifier() {
        let long = "a".repeat(64);
        assert_error_contains(validate_sql_identifier(&long, "table"), "too long");
    }

    #[test]
    fn test_sanitize_strips_control_chars() {
        let sanitized = sanitize_for_logging("bad\0name\n");
        assert_eq!(sanitized, "badname");
    }
}
