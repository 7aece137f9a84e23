//! # Query String Parsing
//!
//! Splits the raw query pairs of a data request into the reserved
//! parameters and the `col[op]=value` filters.
//!
//! ## Reserved Parameters
//!
//! `limit`, `after`, `sort`, `q`, `fields`, `atomic`, `id`, `field`,
//! `name`. Everything else must use the bracket filter syntax; a bare
//! unknown key is a 400 naming the parameter.

use shared::errors::{ApiError, ApiResult};

use crate::service::data_service::{QueryOptions, RawFilter};

/// Everything a Moon URL can carry.
#[derive(Debug, Clone, Default)]
pub struct ParsedQuery {
    /// List/aggregate options (filters, sort, search, cursor, projection)
    pub options: QueryOptions,
    /// `?atomic=true|1` on batch writes
    pub atomic: bool,
    /// `?id=` on get/update/destroy of keyed resources
    pub id: Option<String>,
    /// `?field=` on aggregates
    pub field: Option<String>,
    /// `?name=` on collection administration
    pub name: Option<String>,
}

/// Parses decoded query pairs (the actix `Query<Vec<(String, String)>>`
/// extractor output).
pub fn parse_pairs(pairs: &[(String, String)]) -> ApiResult<ParsedQuery> {
    let mut parsed = ParsedQuery::default();

    for (key, value) in pairs {
        match key.as_str() {
            "limit" => parsed.options.limit = Some(value.clone()),
            "after" => parsed.options.after = Some(value.clone()),
            "sort" => parsed.options.sort = Some(value.clone()),
            "q" => parsed.options.q = Some(value.clone()),
            "fields" => parsed.options.fields = Some(value.clone()),
            "id" => parsed.id = Some(value.clone()),
            "field" => parsed.field = Some(value.clone()),
            "name" => parsed.name = Some(value.clone()),
            "atomic" => {
                parsed.atomic = match value.as_str() {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    other => {
                        return Err(ApiError::validation(format!(
                            "'{}' is not a valid atomic flag",
                            other
                        )))
                    }
                }
            }
            _ => {
                let (column, op) = split_filter_key(key)?;
                parsed.options.filters.push(RawFilter {
                    column,
                    op,
                    value: value.clone(),
                });
            }
        }
    }

    Ok(parsed)
}

/// Splits `col[op]` into its parts.
fn split_filter_key(key: &str) -> ApiResult<(String, String)> {
    let open = key.find('[');
    match (open, key.ends_with(']')) {
        (Some(open), true) if open > 0 && open < key.len() - 2 => {
            let column = &key[..open];
            let op = &key[open + 1..key.len() - 1];
            Ok((column.to_string(), op.to_string()))
        }
        _ => Err(ApiError::validation(format!(
            "unknown query parameter '{}'",
            key
        ))),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(input: &[(&str, &str)]) -> Vec<(String, String)> {
        input
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_reserved_parameters() {
        let parsed = parse_pairs(&pairs(&[
            ("limit", "3"),
            ("after", "01A"),
            ("sort", "-quantity,title"),
            ("q", "monitor"),
            ("fields", "title,brand"),
            ("atomic", "true"),
        ]))
        .unwrap();

        assert_eq!(parsed.options.limit.as_deref(), Some("3"));
        assert_eq!(parsed.options.after.as_deref(), Some("01A"));
        assert_eq!(parsed.options.sort.as_deref(), Some("-quantity,title"));
        assert_eq!(parsed.options.q.as_deref(), Some("monitor"));
        assert_eq!(parsed.options.fields.as_deref(), Some("title,brand"));
        assert!(parsed.atomic);
    }

    #[test]
    fn test_filters() {
        let parsed = parse_pairs(&pairs(&[
            ("quantity[gt]", "5"),
            ("brand[eq]", "Wow"),
        ]))
        .unwrap();

        assert_eq!(parsed.options.filters.len(), 2);
        assert_eq!(parsed.options.filters[0].column, "quantity");
        assert_eq!(parsed.options.filters[0].op, "gt");
        assert_eq!(parsed.options.filters[0].value, "5");
        assert_eq!(parsed.options.filters[1].column, "brand");
        assert_eq!(parsed.options.filters[1].op, "eq");
    }

    #[test]
    fn test_atomic_flag_values() {
        assert!(parse_pairs(&pairs(&[("atomic", "1")])).unwrap().atomic);
        assert!(!parse_pairs(&pairs(&[("atomic", "0")])).unwrap().atomic);
        assert!(!parse_pairs(&pairs(&[("atomic", "false")])).unwrap().atomic);
        assert!(parse_pairs(&pairs(&[("atomic", "yes")])).is_err());
    }

    #[test]
    fn test_unknown_bare_parameter_rejected() {
        let err = parse_pairs(&pairs(&[("quantity", "5")])).unwrap_err();
        assert_eq!(err.to_string(), "unknown query parameter 'quantity'");
    }

    #[test]
    fn test_malformed_filter_keys_rejected() {
        assert!(parse_pairs(&pairs(&[("[gt]", "5")])).is_err());
        assert!(parse_pairs(&pairs(&[("quantity[", "5")])).is_err());
        assert!(parse_pairs(&pairs(&[("quantity[]", "5")])).is_err());
        assert!(parse_pairs(&pairs(&[("quantity]gt[", "5")])).is_err());
    }

    #[test]
    fn test_keyed_parameters() {
        let parsed = parse_pairs(&pairs(&[
            ("id", "01ARZ3NDEKTSV4RRFFQ69G5FAV"),
            ("field", "price"),
            ("name", "products"),
        ]))
        .unwrap();
        assert_eq!(parsed.id.as_deref(), Some("01ARZ3NDEKTSV4RRFFQ69G5FAV"));
        assert_eq!(parsed.field.as_deref(), Some("price"));
        assert_eq!(parsed.name.as_deref(), Some("products"));
    }
}
