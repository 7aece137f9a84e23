//! # Record Repository
//!
//! Executes the query builder's SQL against dynamic collection tables and
//! decodes rows back into tagged JSON values.
//!
//! ## Decoding
//!
//! The Any driver returns backend-shaped scalars, so each field is decoded
//! through a ladder keyed by the registered column type:
//!
//! | Column type | Ladder |
//! |-------------|--------|
//! | string/datetime | `String` |
//! | integer | `i64`, then string parse |
//! | decimal | `String`, then `f64` (formatted) |
//! | boolean | `bool`, then integer ≠ 0, then `1,true,TRUE,t,T` |
//! | json | `String` parsed as JSON, raw text as fallback |
//!
//! `pkid` is never part of a projection and is dropped defensively if a
//! `SELECT *` ever returns it.

use serde_json::{Map, Value};
use shared::database::{bind_values, ColumnType, Db, SqlValue};
use shared::errors::{ApiError, ApiResult};
use sqlx::any::AnyRow;
use sqlx::{Any, Row, Transaction};

use crate::domain::schema::{parse_bool_form, Collection};
use crate::repository::query_builder::{
    self, AggregateFunc, Condition, SearchClause, SelectParams,
};

#[derive(Debug, Clone)]
pub struct RecordRepository {
    db: Db,
}

impl RecordRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Runs a list query and decodes every row.
    pub async fn select(
        &self,
        collection: &Collection,
        params: &SelectParams,
    ) -> ApiResult<Vec<Map<String, Value>>> {
        let (sql, args) = query_builder::build_select(self.db.dialect(), &collection.name, params);
        let rows = self.db.fetch_all(&sql, &args).await?;

        rows.iter()
            .map(|row| decode_record(collection, &params.projection, row))
            .collect()
    }

    /// Fetches a single record by id.
    pub async fn get(
        &self,
        collection: &Collection,
        projection: &[String],
        id: &str,
    ) -> ApiResult<Option<Map<String, Value>>> {
        let params = SelectParams {
            projection: projection.to_vec(),
            conditions: vec![Condition {
                column: "id".to_string(),
                operator: query_builder::Operator::Eq,
                value: query_builder::ConditionValue::Single(SqlValue::Text(id.to_string())),
            }],
            limit: Some(1),
            ..Default::default()
        };
        let (sql, args) = query_builder::build_select(self.db.dialect(), &collection.name, &params);
        let row = self.db.fetch_optional(&sql, &args).await?;
        row.as_ref()
            .map(|row| decode_record(collection, &params.projection, row))
            .transpose()
    }

    /// COUNT with the same filters/search, no cursor.
    pub async fn count(
        &self,
        collection: &Collection,
        conditions: &[Condition],
        search: Option<&SearchClause>,
    ) -> ApiResult<i64> {
        let (sql, args) =
            query_builder::build_count(self.db.dialect(), &collection.name, conditions, search);
        let row = self.db.fetch_optional(&sql, &args).await?;
        match row {
            Some(row) => Ok(row.try_get::<i64, _>(0)?),
            None => Ok(0),
        }
    }

    /// Runs an aggregate and decodes the scalar result.
    pub async fn aggregate(
        &self,
        collection: &Collection,
        func: AggregateFunc,
        column: Option<(&str, ColumnType)>,
        conditions: &[Condition],
        search: Option<&SearchClause>,
    ) -> ApiResult<Value> {
        let (sql, args) = query_builder::build_aggregate(
            self.db.dialect(),
            &collection.name,
            func,
            column,
            conditions,
            search,
        );
        let row = self.db.fetch_optional(&sql, &args).await?;
        match row {
            Some(row) => Ok(decode_scalar(&row)),
            None => Ok(Value::Null),
        }
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Inserts one row on the pool (best-effort batches).
    pub async fn insert(&self, table: &str, fields: &[(String, SqlValue)]) -> ApiResult<u64> {
        let (sql, args) = self.insert_statement(table, fields);
        self.db.execute(&sql, &args).await
    }

    /// Inserts one row on an open transaction (atomic batches).
    pub async fn insert_in(
        &self,
        tx: &mut Transaction<'static, Any>,
        table: &str,
        fields: &[(String, SqlValue)],
    ) -> ApiResult<u64> {
        let (sql, args) = self.insert_statement(table, fields);
        let result = bind_values(sqlx::query(&sql), &args)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    fn insert_statement(
        &self,
        table: &str,
        fields: &[(String, SqlValue)],
    ) -> (String, Vec<SqlValue>) {
        let columns: Vec<&str> = fields.iter().map(|(name, _)| name.as_str()).collect();
        let sql = query_builder::build_insert(self.db.dialect(), table, &columns);
        let args = fields.iter().map(|(_, value)| value.clone()).collect();
        (sql, args)
    }

    /// Updates one row by id; returns affected rows (0 means not found).
    pub async fn update(
        &self,
        table: &str,
        id: &str,
        sets: &[(String, SqlValue)],
    ) -> ApiResult<u64> {
        let (sql, args) = self.update_statement(table, id, sets);
        self.db.execute(&sql, &args).await
    }

    pub async fn update_in(
        &self,
        tx: &mut Transaction<'static, Any>,
        table: &str,
        id: &str,
        sets: &[(String, SqlValue)],
    ) -> ApiResult<u64> {
        let (sql, args) = self.update_statement(table, id, sets);
        let result = bind_values(sqlx::query(&sql), &args)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    fn update_statement(
        &self,
        table: &str,
        id: &str,
        sets: &[(String, SqlValue)],
    ) -> (String, Vec<SqlValue>) {
        let columns: Vec<&str> = sets.iter().map(|(name, _)| name.as_str()).collect();
        let sql = query_builder::build_update(self.db.dialect(), table, &columns);
        let mut args: Vec<SqlValue> = sets.iter().map(|(_, value)| value.clone()).collect();
        args.push(SqlValue::Text(id.to_string()));
        (sql, args)
    }

    /// Deletes one row by id; returns affected rows (0 means not found).
    pub async fn delete(&self, table: &str, id: &str) -> ApiResult<u64> {
        let sql = query_builder::build_delete(self.db.dialect(), table);
        self.db
            .execute(&sql, &[SqlValue::Text(id.to_string())])
            .await
    }

    pub async fn delete_in(
        &self,
        tx: &mut Transaction<'static, Any>,
        table: &str,
        id: &str,
    ) -> ApiResult<u64> {
        let sql = query_builder::build_delete(self.db.dialect(), table);
        let result = bind_values(sqlx::query(&sql), &[SqlValue::Text(id.to_string())])
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    /// Begins a transaction for an atomic batch.
    pub async fn begin(&self) -> ApiResult<Transaction<'static, Any>> {
        self.db.begin().await
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Decodes one row into a JSON object in projection order.
///
/// `projection` must list the selected fields (`id` first); an empty
/// projection means "id plus every user column".
pub fn decode_record(
    collection: &Collection,
    projection: &[String],
    row: &AnyRow,
) -> ApiResult<Map<String, Value>> {
    let mut record = Map::new();

    let all_fields: Vec<String>;
    let fields: &[String] = if projection.is_empty() {
        all_fields = std::iter::once("id".to_string())
            .chain(collection.columns.iter().map(|c| c.name.clone()))
            .collect();
        &all_fields
    } else {
        projection
    };

    for field in fields {
        if field == "pkid" {
            continue;
        }
        if field == "id" {
            let id: String = row.try_get("id")?;
            record.insert("id".to_string(), Value::String(id));
            continue;
        }

        let column = collection.column(field).ok_or_else(|| {
            ApiError::internal(format!("projected unknown column '{}'", field))
        })?;
        record.insert(field.clone(), decode_field(row, field, column.column_type)?);
    }

    Ok(record)
}

fn decode_field(row: &AnyRow, name: &str, ty: ColumnType) -> ApiResult<Value> {
    let value = match ty {
        ColumnType::String | ColumnType::Datetime => {
            match row.try_get::<Option<String>, _>(name)? {
                Some(s) => Value::String(s),
                None => Value::Null,
            }
        }
        ColumnType::Integer => match row.try_get::<Option<i64>, _>(name) {
            Ok(Some(n)) => Value::Number(n.into()),
            Ok(None) => Value::Null,
            Err(_) => match row.try_get::<Option<String>, _>(name)? {
                Some(s) => s
                    .parse::<i64>()
                    .map(|n| Value::Number(n.into()))
                    .unwrap_or(Value::Null),
                None => Value::Null,
            },
        },
        ColumnType::Decimal => match row.try_get::<Option<String>, _>(name) {
            Ok(Some(s)) => Value::String(s),
            Ok(None) => Value::Null,
            Err(_) => match row.try_get::<Option<f64>, _>(name)? {
                Some(f) => Value::String(format_float(f)),
                None => Value::Null,
            },
        },
        ColumnType::Boolean => decode_boolean(row, name)?,
        ColumnType::Json => match row.try_get::<Option<String>, _>(name)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
            None => Value::Null,
        },
    };
    Ok(value)
}

/// Boolean normalisation: native bool, driver integer, or one of the
/// accepted string forms (`1,true,TRUE,t,T` and their false duals).
fn decode_boolean(row: &AnyRow, name: &str) -> ApiResult<Value> {
    if let Ok(value) = row.try_get::<Option<bool>, _>(name) {
        return Ok(value.map(Value::Bool).unwrap_or(Value::Null));
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(name) {
        return Ok(value.map(|n| Value::Bool(n != 0)).unwrap_or(Value::Null));
    }
    let value = row.try_get::<Option<String>, _>(name)?;
    Ok(value
        .as_deref()
        .and_then(parse_bool_form)
        .map(Value::Bool)
        .unwrap_or(Value::Null))
}

/// Decodes the single `value` column of a COUNT/aggregate row.
fn decode_scalar(row: &AnyRow) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(0) {
        return Value::Number(n.into());
    }
    if let Ok(Some(f)) = row.try_get::<Option<f64>, _>(0) {
        return serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(0) {
        return Value::String(s);
    }
    Value::Null
}

/// Formats an aggregate float without the `.0` tail on integral values.
pub fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(5.0), "5");
        assert_eq!(format_float(19.99), "19.99");
        assert_eq!(format_float(-3.5), "-3.5");
        assert_eq!(format_float(0.0), "0");
    }
}
