//! # Request & Name Validation Helpers
//!
//! Validation for incoming request DTOs (via the `validator` crate) and
//! for the identifier grammar of dynamic collections and columns.
//!
//! ## Identifier Grammar
//!
//! Collection and column names become SQL identifiers, so the rules are
//! strict and checked before any SQL is built:
//!
//! | Identifier | Pattern | Length | Extra rules |
//! |------------|---------|--------|-------------|
//! | collection | `^[a-z][a-z0-9_]*$` | 2-63 | not a reserved endpoint, no `moon_` prefix, not a SQL keyword |
//! | column | `^[a-z][a-z0-9_]*$` | 3-63 | not `pkid`/`id`, not a SQL keyword |
//!
//! ## Error Response
//!
//! All failures produce a 400 with a `{"message": …}` body naming the
//! offending identifier.

use crate::errors::ApiError;
use validator::{Validate, ValidateEmail};

/// Resource names owned by built-in endpoints; a collection may not shadow
/// them.
pub const RESERVED_ENDPOINTS: &[&str] = &["collections", "auth", "users", "apikeys", "doc", "health"];

/// Prefix reserved for system tables.
pub const SYSTEM_PREFIX: &str = "moon_";

/// SQL keywords that may not be used as collection or column names, across
/// the three supported dialects. Quoting would make most of them legal, but
/// allowing them buys nothing and produces confusing queries downstream.
const SQL_KEYWORDS: &[&str] = &[
    "all", "alter", "and", "any", "as", "asc", "between", "by", "case", "cast", "check",
    "column", "constraint", "create", "cross", "current_date", "current_time",
    "current_timestamp", "database", "default", "delete", "desc", "distinct", "drop", "else",
    "end", "escape", "except", "exists", "foreign", "from", "full", "function", "grant",
    "group", "having", "in", "index", "inner", "insert", "intersect", "into", "is", "join",
    "key", "left", "like", "limit", "not", "null", "offset", "on", "or", "order", "outer",
    "primary", "procedure", "references", "revoke", "right", "schema", "select", "set",
    "some", "table", "then", "trigger", "union", "unique", "update", "values", "view",
    "when", "where",
];

// =============================================================================
// Core Validation Functions
// =============================================================================

/// Validates a request DTO that implements `Validate`.
///
/// Returns a 400 carrying the first field's message if validation fails.
pub fn validate_request<T: Validate>(data: &T) -> Result<(), ApiError> {
    data.validate().map_err(ApiError::from)
}

/// Whether a string is an RFC-5322-ish email address.
pub fn is_valid_email(value: &str) -> bool {
    value.validate_email()
}

// =============================================================================
// Identifier Grammar
// =============================================================================

/// Lowercase letter first, then lowercase letters, digits or underscores.
fn matches_identifier_grammar(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn is_sql_keyword(name: &str) -> bool {
    SQL_KEYWORDS.contains(&name)
}

/// Validates a collection name against the full rule set.
///
/// ## Errors
///
/// 400 naming the rule that failed.
pub fn validate_collection_name(name: &str) -> Result<(), ApiError> {
    if name.len() < 2 || name.len() > 63 {
        return Err(ApiError::validation(format!(
            "collection name '{}' must be between 2 and 63 characters",
            name
        )));
    }
    if !matches_identifier_grammar(name) {
        return Err(ApiError::validation(format!(
            "collection name '{}' must start with a lowercase letter and contain only lowercase letters, digits and underscores",
            name
        )));
    }
    if RESERVED_ENDPOINTS.contains(&name) {
        return Err(ApiError::validation(format!(
            "collection name '{}' conflicts with a reserved endpoint",
            name
        )));
    }
    if name.starts_with(SYSTEM_PREFIX) {
        return Err(ApiError::validation(format!(
            "collection name '{}' uses the reserved prefix '{}'",
            name, SYSTEM_PREFIX
        )));
    }
    if is_sql_keyword(name) {
        return Err(ApiError::validation(format!(
            "collection name '{}' is a reserved SQL keyword",
            name
        )));
    }
    Ok(())
}

/// Validates a column name against the full rule set.
///
/// `pkid` and `id` are the hidden system columns and may not be redefined.
pub fn validate_column_name(name: &str) -> Result<(), ApiError> {
    if name.len() < 3 || name.len() > 63 {
        return Err(ApiError::validation(format!(
            "column name '{}' must be between 3 and 63 characters",
            name
        )));
    }
    if !matches_identifier_grammar(name) {
        return Err(ApiError::validation(format!(
            "column name '{}' must start with a lowercase letter and contain only lowercase letters, digits and underscores",
            name
        )));
    }
    if name == "pkid" || name == "id" {
        return Err(ApiError::validation(format!(
            "column name '{}' is reserved for system use",
            name
        )));
    }
    if is_sql_keyword(name) {
        return Err(ApiError::validation(format!(
            "column name '{}' is a reserved SQL keyword",
            name
        )));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_collection_names() {
        for name in ["products", "order_items", "a1", "inventory_2024"] {
            assert!(validate_collection_name(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_collection_name_grammar() {
        assert!(validate_collection_name("Products").is_err()); // uppercase
        assert!(validate_collection_name("1products").is_err()); // digit first
        assert!(validate_collection_name("_products").is_err()); // underscore first
        assert!(validate_collection_name("pro-ducts").is_err()); // hyphen
        assert!(validate_collection_name("x").is_err()); // too short
        assert!(validate_collection_name(&"a".repeat(64)).is_err()); // too long
    }

    #[test]
    fn test_collection_name_reserved_endpoints() {
        for name in RESERVED_ENDPOINTS {
            assert!(validate_collection_name(name).is_err(), "{} should be reserved", name);
        }
    }

    #[test]
    fn test_collection_name_system_prefix() {
        assert!(validate_collection_name("moon_users").is_err());
        assert!(validate_collection_name("moon_anything").is_err());
        // Prefix must match exactly; "moonshot" is fine
        assert!(validate_collection_name("moonshot").is_ok());
    }

    #[test]
    fn test_collection_name_sql_keywords() {
        assert!(validate_collection_name("select").is_err());
        assert!(validate_collection_name("table").is_err());
        assert!(validate_collection_name("order").is_err());
        // Compound names containing keywords are fine
        assert!(validate_collection_name("order_items").is_ok());
    }

    #[test]
    fn test_valid_column_names() {
        for name in ["title", "unit_price", "qty", "created_by_name"] {
            assert!(validate_column_name(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_column_name_rules() {
        assert!(validate_column_name("ab").is_err()); // too short (min 3)
        assert!(validate_column_name("id").is_err()); // system column
        assert!(validate_column_name("pkid").is_err()); // system column
        assert!(validate_column_name("Title").is_err()); // uppercase
        assert!(validate_column_name("where").is_err()); // keyword
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@tld@double.com"));
        assert!(!is_valid_email(""));
    }
}
