//! # Dynamic Collection Model
//!
//! Collections have runtime schemas, not compile-time types. Payloads are
//! therefore coerced exactly twice:
//!
//! ```text
//! JSON body ──► FieldValue (tagged)  ──► SqlValue (bind)        ingress
//! AnyRow    ──► FieldValue (tagged)  ──► JSON response          egress
//! ```
//!
//! Everything between the two boundaries works with tagged values; no
//! stringly-typed data crosses the middle.
//!
//! ## Column Types
//!
//! | Type | JSON ingress | Storage | JSON egress |
//! |------|--------------|---------|-------------|
//! | `string` | string | TEXT | string |
//! | `integer` | integer number | BIGINT | number |
//! | `decimal` | string or number | TEXT | string (no float loss) |
//! | `boolean` | bool | dialect-native | bool (driver forms normalized) |
//! | `datetime` | RFC 3339 string | TEXT | RFC 3339 string |
//! | `json` | any value | TEXT | parsed value |
//!
//! ## Collection Invariants
//!
//! - ≤ 100 user columns, names unique within the collection
//! - Hidden system columns `pkid` and `id` exist in storage and MUST NOT
//!   appear in responses or be settable by clients
//! - `unique` is not supported on `json` columns (no portable index)

use serde::{Deserialize, Serialize};
use shared::database::{ColumnType, SqlValue};
use shared::errors::{ApiError, ApiResult};
use shared::validation::{validate_collection_name, validate_column_name};

/// Maximum user-defined columns per collection.
pub const MAX_COLUMNS: usize = 100;

/// Boolean string forms accepted when normalising driver output.
const TRUE_FORMS: &[&str] = &["1", "true", "TRUE", "t", "T"];
const FALSE_FORMS: &[&str] = &["0", "false", "FALSE", "f", "F"];

// =============================================================================
// Column
// =============================================================================

/// A user-defined column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// `^[a-z][a-z0-9_]*$`, 3-63 chars
    pub name: String,

    /// One of the six column types
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Whether NULL is storable
    #[serde(default)]
    pub nullable: bool,

    /// Textual default applied by the database when the field is omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,

    /// Enforced with a named unique index
    #[serde(default)]
    pub unique: bool,
}

impl Column {
    /// Whether a create payload may omit this column.
    ///
    /// Nullable columns and columns with a database default are omittable;
    /// everything else must be supplied.
    pub fn is_omittable(&self) -> bool {
        self.nullable || self.default_value.is_some()
    }

    /// Validates the column definition itself.
    pub fn validate(&self) -> ApiResult<()> {
        validate_column_name(&self.name)?;

        if self.unique && self.column_type == ColumnType::Json {
            return Err(ApiError::validation(format!(
                "column '{}': unique is not supported on json columns",
                self.name
            )));
        }

        if let Some(default) = &self.default_value {
            // The default must itself be storable under the column type.
            parse_text_as(default, self.column_type).map_err(|_| {
                ApiError::validation(format!(
                    "column '{}': default value '{}' is not a valid {}",
                    self.name,
                    default,
                    self.column_type.as_str()
                ))
            })?;
        }

        Ok(())
    }
}

// =============================================================================
// Collection
// =============================================================================

/// A user-defined collection: a name plus an ordered column list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Collection {
    /// Validates the collection definition: name grammar, column budget,
    /// column name uniqueness and every column definition.
    pub fn validate(&self) -> ApiResult<()> {
        validate_collection_name(&self.name)?;

        if self.columns.is_empty() {
            return Err(ApiError::validation(format!(
                "collection '{}' must define at least one column",
                self.name
            )));
        }
        if self.columns.len() > MAX_COLUMNS {
            return Err(ApiError::validation(format!(
                "collection '{}' exceeds the limit of {} columns",
                self.name, MAX_COLUMNS
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for column in &self.columns {
            column.validate()?;
            if !seen.insert(column.name.as_str()) {
                return Err(ApiError::validation(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }

        Ok(())
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of all `string` columns, the free-text search scope.
    pub fn string_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.column_type == ColumnType::String)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Whether `name` is a sortable/filterable field: a user column or the
    /// system `id`.
    pub fn is_queryable_field(&self, name: &str) -> bool {
        name == "id" || self.column(name).is_some()
    }
}

// =============================================================================
// Field Values
// =============================================================================

/// A typed runtime value for one record field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Str(String),
    Int(i64),
    /// Canonical textual form, e.g. `"19.99"`
    Decimal(String),
    Bool(bool),
    /// Normalised RFC 3339
    DateTime(String),
    Json(serde_json::Value),
}

impl FieldValue {
    /// Ingress coercion: JSON body value → tagged value, checked against
    /// the column definition.
    ///
    /// ## Errors
    ///
    /// 400 naming the field and the expected type.
    pub fn from_json(value: &serde_json::Value, column: &Column) -> ApiResult<Self> {
        use serde_json::Value;

        if value.is_null() {
            return if column.nullable {
                Ok(Self::Null)
            } else {
                Err(ApiError::validation(format!(
                    "field '{}' must not be null",
                    column.name
                )))
            };
        }

        match column.column_type {
            ColumnType::String => match value {
                Value::String(s) => Ok(Self::Str(s.clone())),
                _ => Err(type_error(&column.name, "a string")),
            },
            ColumnType::Integer => match value.as_i64() {
                Some(n) => Ok(Self::Int(n)),
                None => Err(type_error(&column.name, "an integer")),
            },
            ColumnType::Decimal => match value {
                Value::String(s) if is_decimal_str(s) => Ok(Self::Decimal(s.clone())),
                Value::Number(n) => Ok(Self::Decimal(n.to_string())),
                _ => Err(type_error(&column.name, "a decimal string or number")),
            },
            ColumnType::Boolean => match value {
                Value::Bool(b) => Ok(Self::Bool(*b)),
                _ => Err(type_error(&column.name, "a boolean")),
            },
            ColumnType::Datetime => match value {
                Value::String(s) => parse_datetime(s)
                    .map(Self::DateTime)
                    .ok_or_else(|| type_error(&column.name, "an RFC 3339 datetime")),
                _ => Err(type_error(&column.name, "an RFC 3339 datetime")),
            },
            ColumnType::Json => Ok(Self::Json(value.clone())),
        }
    }

    /// Lowers the value to a bindable scalar.
    pub fn to_sql(&self) -> SqlValue {
        match self {
            Self::Null => SqlValue::Null,
            Self::Str(s) => SqlValue::Text(s.clone()),
            Self::Int(n) => SqlValue::Int(*n),
            Self::Decimal(s) => SqlValue::Text(s.clone()),
            Self::Bool(b) => SqlValue::Bool(*b),
            Self::DateTime(s) => SqlValue::Text(s.clone()),
            Self::Json(v) => SqlValue::Text(v.to_string()),
        }
    }

    /// Egress: tagged value → JSON response value.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null => Value::Null,
            Self::Str(s) => Value::String(s.clone()),
            Self::Int(n) => Value::Number((*n).into()),
            Self::Decimal(s) => Value::String(s.clone()),
            Self::Bool(b) => Value::Bool(*b),
            Self::DateTime(s) => Value::String(s.clone()),
            Self::Json(v) => v.clone(),
        }
    }
}

fn type_error(field: &str, expected: &str) -> ApiError {
    ApiError::validation(format!("field '{}' must be {}", field, expected))
}

// =============================================================================
// Text Coercion (filters, defaults, driver normalisation)
// =============================================================================

/// Parses a textual value (query-parameter filter or column default) into
/// a bindable scalar under the given column type.
///
/// ## Errors
///
/// 400 when the text is not parseable to the type.
pub fn parse_text_as(raw: &str, ty: ColumnType) -> ApiResult<SqlValue> {
    match ty {
        ColumnType::String => Ok(SqlValue::Text(raw.to_string())),
        ColumnType::Integer => raw
            .parse::<i64>()
            .map(SqlValue::Int)
            .map_err(|_| ApiError::validation(format!("'{}' is not a valid integer", raw))),
        ColumnType::Decimal => {
            if is_decimal_str(raw) {
                Ok(SqlValue::Text(raw.to_string()))
            } else {
                Err(ApiError::validation(format!("'{}' is not a valid decimal", raw)))
            }
        }
        ColumnType::Boolean => parse_bool_form(raw)
            .map(SqlValue::Bool)
            .ok_or_else(|| ApiError::validation(format!("'{}' is not a valid boolean", raw))),
        ColumnType::Datetime => parse_datetime(raw)
            .map(SqlValue::Text)
            .ok_or_else(|| {
                ApiError::validation(format!("'{}' is not a valid RFC 3339 datetime", raw))
            }),
        ColumnType::Json => Ok(SqlValue::Text(raw.to_string())),
    }
}

/// The accepted textual boolean forms.
pub fn parse_bool_form(raw: &str) -> Option<bool> {
    if TRUE_FORMS.contains(&raw) {
        Some(true)
    } else if FALSE_FORMS.contains(&raw) {
        Some(false)
    } else {
        None
    }
}

/// Decimal grammar: optional sign, digits, optional fractional part.
/// Deliberately not a float parse - `1e10` is rejected, `00.50` is not.
pub fn is_decimal_str(s: &str) -> bool {
    let body = s.strip_prefix('-').or_else(|| s.strip_prefix('+')).unwrap_or(s);
    if body.is_empty() {
        return false;
    }
    match body.split_once('.') {
        None => body.bytes().all(|b| b.is_ascii_digit()),
        Some((int, frac)) => {
            !int.is_empty()
                && !frac.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
    }
}

/// Parses and normalises a datetime to RFC 3339 (UTC offset preserved).
pub fn parse_datetime(raw: &str) -> Option<String> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.to_rfc3339())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn column(name: &str, ty: ColumnType, nullable: bool) -> Column {
        Column {
            name: name.to_string(),
            column_type: ty,
            nullable,
            default_value: None,
            unique: false,
        }
    }

    fn products() -> Collection {
        Collection {
            name: "products".to_string(),
            columns: vec![
                column("title", ColumnType::String, false),
                column("brand", ColumnType::String, true),
                column("price", ColumnType::Decimal, false),
                column("quantity", ColumnType::Integer, true),
                column("active", ColumnType::Boolean, true),
            ],
        }
    }

    #[test]
    fn test_collection_validates() {
        assert!(products().validate().is_ok());
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let mut c = products();
        c.columns.push(column("title", ColumnType::String, true));
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_column_budget_enforced() {
        let mut c = products();
        c.columns = (0..101)
            .map(|i| column(&format!("col_{:03}", i), ColumnType::String, true))
            .collect();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_unique_json_rejected() {
        let mut col = column("payload", ColumnType::Json, true);
        col.unique = true;
        assert!(col.validate().is_err());
    }

    #[test]
    fn test_default_value_must_match_type() {
        let mut col = column("quantity", ColumnType::Integer, false);
        col.default_value = Some("0".to_string());
        assert!(col.validate().is_ok());

        col.default_value = Some("lots".to_string());
        assert!(col.validate().is_err());
    }

    #[test]
    fn test_string_columns_scope() {
        assert_eq!(products().string_columns(), vec!["title", "brand"]);
    }

    #[test]
    fn test_queryable_fields_include_id() {
        let c = products();
        assert!(c.is_queryable_field("id"));
        assert!(c.is_queryable_field("title"));
        assert!(!c.is_queryable_field("pkid"));
        assert!(!c.is_queryable_field("nope"));
    }

    #[test]
    fn test_ingress_string() {
        let col = column("title", ColumnType::String, false);
        assert_eq!(
            FieldValue::from_json(&json!("Monitor"), &col).unwrap(),
            FieldValue::Str("Monitor".to_string())
        );
        assert!(FieldValue::from_json(&json!(42), &col).is_err());
    }

    #[test]
    fn test_ingress_integer_rejects_floats() {
        let col = column("quantity", ColumnType::Integer, false);
        assert_eq!(FieldValue::from_json(&json!(7), &col).unwrap(), FieldValue::Int(7));
        assert!(FieldValue::from_json(&json!(7.5), &col).is_err());
        assert!(FieldValue::from_json(&json!("7"), &col).is_err());
    }

    #[test]
    fn test_ingress_decimal_accepts_string_and_number() {
        let col = column("price", ColumnType::Decimal, false);
        assert_eq!(
            FieldValue::from_json(&json!("19.99"), &col).unwrap(),
            FieldValue::Decimal("19.99".to_string())
        );
        assert_eq!(
            FieldValue::from_json(&json!(5), &col).unwrap(),
            FieldValue::Decimal("5".to_string())
        );
        assert!(FieldValue::from_json(&json!("not-a-number"), &col).is_err());
    }

    #[test]
    fn test_ingress_null_respects_nullability() {
        let nullable = column("brand", ColumnType::String, true);
        let required = column("title", ColumnType::String, false);
        assert_eq!(FieldValue::from_json(&json!(null), &nullable).unwrap(), FieldValue::Null);
        assert!(FieldValue::from_json(&json!(null), &required).is_err());
    }

    #[test]
    fn test_ingress_datetime_normalised() {
        let col = column("shipped_at", ColumnType::Datetime, true);
        let v = FieldValue::from_json(&json!("2024-01-15T10:30:00Z"), &col).unwrap();
        assert!(matches!(v, FieldValue::DateTime(_)));
        assert!(FieldValue::from_json(&json!("yesterday"), &col).is_err());
    }

    #[test]
    fn test_egress_shapes() {
        assert_eq!(FieldValue::Decimal("19.99".into()).to_json(), json!("19.99"));
        assert_eq!(FieldValue::Int(5).to_json(), json!(5));
        assert_eq!(FieldValue::Bool(true).to_json(), json!(true));
        assert_eq!(FieldValue::Null.to_json(), json!(null));
        assert_eq!(FieldValue::Json(json!({"a": 1})).to_json(), json!({"a": 1}));
    }

    #[test]
    fn test_filter_value_parsing() {
        assert_eq!(
            parse_text_as("5", ColumnType::Integer).unwrap(),
            SqlValue::Int(5)
        );
        assert!(parse_text_as("five", ColumnType::Integer).is_err());
        assert_eq!(
            parse_text_as("t", ColumnType::Boolean).unwrap(),
            SqlValue::Bool(true)
        );
        assert_eq!(
            parse_text_as("FALSE", ColumnType::Boolean).unwrap(),
            SqlValue::Bool(false)
        );
        assert!(parse_text_as("yes", ColumnType::Boolean).is_err());
    }

    #[test]
    fn test_decimal_grammar() {
        for ok in ["0", "19.99", "-5.25", "+3.1", "12345678901234567890.5"] {
            assert!(is_decimal_str(ok), "{} should parse", ok);
        }
        for bad in ["", ".", "1.", ".5", "1e10", "1.2.3", "abc", "-"] {
            assert!(!is_decimal_str(bad), "{} should not parse", bad);
        }
    }

    #[test]
    fn test_boolean_forms() {
        for t in ["1", "true", "TRUE", "t", "T"] {
            assert_eq!(parse_bool_form(t), Some(true));
        }
        for f in ["0", "false", "FALSE", "f", "F"] {
            assert_eq!(parse_bool_form(f), Some(false));
        }
        assert_eq!(parse_bool_form("True"), None);
    }

    #[test]
    fn test_collection_serde_wire_shape() {
        let c = products();
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["columns"][0]["type"], "string");
        assert_eq!(json["columns"][0]["name"], "title");

        let back: Collection = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }
}
