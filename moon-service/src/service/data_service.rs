//! # Data Engine
//!
//! End-to-end list/get/create/update/destroy and the analytic aggregates
//! for dynamic collections. Sits between the handlers and the record
//! repository: validates and types every input against the registered
//! schema, then hands typed structures to the query builder.
//!
//! ## Batch Write Semantics
//!
//! | Mode | Behavior |
//! |------|----------|
//! | atomic (`?atomic=true`) | validate everything first, execute in one transaction, any failure rolls back with one error |
//! | best-effort (default) | validate and execute per item; the response counts `succeeded`/`failed` and `succeeded + failed == total` |
//!
//! ## Pagination Contract
//!
//! - `next`: id of the last returned row iff a `limit+1` peek saw more.
//! - `prev`: computed only when the request carried `after`; a reverse
//!   probe (`id < first returned`, DESC, `limit+1`) must return exactly
//!   `limit+1` rows, and the last of them is the cursor. Otherwise the
//!   prior page is page 1, reached by omitting `after`, and `prev` is
//!   null.
//! - `total`: COUNT under the same filters/search, no cursor; a count
//!   failure degrades `total` to 0 without failing the request.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use shared::config::{BatchConfig, PaginationConfig};
use shared::database::{ColumnType, SqlValue};
use shared::errors::{is_unique_violation, ApiError, ApiResult};
use shared::ulid::UlidService;

use crate::domain::schema::{parse_text_as, Collection, Column, FieldValue};
use crate::repository::query_builder::{
    AggregateFunc, Condition, ConditionValue, CursorDirection, Operator, SearchClause,
    SelectParams, SortDirection, SortField,
};
use crate::repository::RecordRepository;
use crate::service::registry::SchemaRegistry;

// =============================================================================
// Inputs & Outputs
// =============================================================================

/// One raw `col[op]=value` filter from the query string.
#[derive(Debug, Clone)]
pub struct RawFilter {
    pub column: String,
    pub op: String,
    pub value: String,
}

/// Raw list/aggregate options as parsed from the URL, still untyped.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub limit: Option<String>,
    pub after: Option<String>,
    pub sort: Option<String>,
    pub q: Option<String>,
    pub fields: Option<String>,
    pub filters: Vec<RawFilter>,
}

/// A page of records plus the pagination meta.
#[derive(Debug, Clone)]
pub struct ListOutcome {
    pub data: Vec<Map<String, Value>>,
    pub limit: u32,
    pub next: Option<String>,
    pub prev: Option<String>,
    pub total: i64,
}

/// Outcome of a best-effort batch (atomic failures surface as errors).
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub data: Vec<Map<String, Value>>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchOutcome {
    pub fn all_failed(&self) -> bool {
        self.succeeded == 0
    }
}

// =============================================================================
// Service
// =============================================================================

#[derive(Clone)]
pub struct DataService {
    registry: Arc<SchemaRegistry>,
    records: RecordRepository,
    ulid: Arc<UlidService>,
    pagination: PaginationConfig,
    batch: BatchConfig,
}

impl DataService {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        records: RecordRepository,
        ulid: Arc<UlidService>,
        pagination: PaginationConfig,
        batch: BatchConfig,
    ) -> Self {
        Self {
            registry,
            records,
            ulid,
            pagination,
            batch,
        }
    }

    /// Resolves a collection or fails with the canonical 404.
    pub async fn collection(&self, name: &str) -> ApiResult<Collection> {
        self.registry
            .get(name)
            .await
            .ok_or_else(|| ApiError::not_found(format!("collection '{}' not found", name)))
    }

    // =========================================================================
    // LIST
    // =========================================================================

    pub async fn list(&self, name: &str, options: &QueryOptions) -> ApiResult<ListOutcome> {
        let collection = self.collection(name).await?;

        let limit = self.parse_limit(options.limit.as_deref())?;
        let projection = parse_projection(&collection, options.fields.as_deref())?;
        let sort = parse_sort(&collection, options.sort.as_deref())?;
        let conditions = parse_filters(&collection, &options.filters)?;
        let search = build_search(&collection, options.q.as_deref());
        let cursor = match options.after.as_deref() {
            Some(after) => {
                validate_ulid(after)?;
                Some((CursorDirection::After, after.to_string()))
            }
            None => None,
        };

        // Peek one row past the page to learn whether a next page exists
        let params = SelectParams {
            projection: projection.clone(),
            conditions: conditions.clone(),
            search: search.clone(),
            cursor: cursor.clone(),
            sort,
            limit: Some(limit + 1),
            offset: None,
        };
        let mut rows = self.records.select(&collection, &params).await?;

        let has_more = rows.len() as u32 > limit;
        rows.truncate(limit as usize);

        let next = if has_more {
            rows.last().and_then(row_id)
        } else {
            None
        };

        let prev = match (&cursor, rows.first().and_then(row_id)) {
            (Some(_), Some(first_id)) => {
                self.compute_prev(&collection, &conditions, &search, &first_id, limit)
                    .await?
            }
            _ => None,
        };

        let total = match self.records.count(&collection, &conditions, search.as_ref()).await {
            Ok(total) => total,
            Err(e) => {
                warn!(collection = %name, error = %e, "Count query failed; degrading total to 0");
                0
            }
        };

        Ok(ListOutcome {
            data: rows,
            limit,
            next,
            prev,
            total,
        })
    }

    /// The reverse probe behind `prev`: strictly-before rows in DESC id
    /// order. Only a full `limit+1` result proves a page boundary before
    /// the current one that is not page 1.
    async fn compute_prev(
        &self,
        collection: &Collection,
        conditions: &[Condition],
        search: &Option<SearchClause>,
        first_id: &str,
        limit: u32,
    ) -> ApiResult<Option<String>> {
        let params = SelectParams {
            projection: vec!["id".to_string()],
            conditions: conditions.to_vec(),
            search: search.clone(),
            cursor: Some((CursorDirection::Before, first_id.to_string())),
            sort: vec![SortField {
                column: "id".to_string(),
                direction: SortDirection::Desc,
            }],
            limit: Some(limit + 1),
            offset: None,
        };
        let rows = self.records.select(collection, &params).await?;
        if rows.len() as u32 == limit + 1 {
            Ok(rows.last().and_then(row_id))
        } else {
            Ok(None)
        }
    }

    fn parse_limit(&self, raw: Option<&str>) -> ApiResult<u32> {
        let max = self.pagination.max_page_size;
        match raw {
            None => Ok(self.pagination.default_page_size),
            Some(raw) => {
                let limit: i64 = raw.parse().map_err(|_| {
                    ApiError::validation(format!("'{}' is not a valid limit", raw))
                })?;
                if limit < 1 || limit > max as i64 {
                    return Err(ApiError::validation(format!(
                        "limit must be between 1 and {}",
                        max
                    )));
                }
                Ok(limit as u32)
            }
        }
    }

    // =========================================================================
    // GET & SCHEMA
    // =========================================================================

    pub async fn get(&self, name: &str, id: &str) -> ApiResult<Map<String, Value>> {
        let collection = self.collection(name).await?;
        validate_ulid(id)?;

        self.records
            .get(&collection, &[], id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("record with id '{}' not found", id)))
    }

    /// The schema projection: user columns only, system columns filtered.
    pub async fn schema(&self, name: &str) -> ApiResult<Collection> {
        self.collection(name).await
    }

    // =========================================================================
    // AGGREGATES
    // =========================================================================

    pub async fn aggregate(
        &self,
        name: &str,
        func: AggregateFunc,
        field: Option<&str>,
        options: &QueryOptions,
    ) -> ApiResult<Value> {
        let collection = self.collection(name).await?;
        let conditions = parse_filters(&collection, &options.filters)?;
        let search = build_search(&collection, options.q.as_deref());

        let column = match func {
            AggregateFunc::Count => None,
            _ => {
                let field = field.ok_or_else(|| {
                    ApiError::validation("the 'field' parameter is required for this operation")
                })?;
                let column = collection.column(field).ok_or_else(|| {
                    ApiError::validation(format!("unknown field '{}'", field))
                })?;
                validate_aggregate_column(func, column)?;
                Some((field, column.column_type))
            }
        };

        let value = self
            .records
            .aggregate(&collection, func, column, &conditions, search.as_ref())
            .await?;

        // Decimal values travel as strings end to end
        if let Some((_, ColumnType::Decimal)) = column {
            if let Value::Number(n) = &value {
                if let Some(f) = n.as_f64() {
                    return Ok(Value::String(
                        crate::repository::record_repository::format_float(f),
                    ));
                }
            }
        }
        Ok(value)
    }

    // =========================================================================
    // CREATE
    // =========================================================================

    pub async fn create(&self, name: &str, data: &Value, atomic: bool) -> ApiResult<BatchOutcome> {
        let collection = self.collection(name).await?;
        let items = self.batch_items(data)?;

        // Validation pass: type every item before any SQL
        let prepared: Vec<ApiResult<(Vec<(String, SqlValue)>, Map<String, Value>)>> = items
            .iter()
            .map(|item| self.prepare_insert(&collection, item))
            .collect();

        if atomic {
            let mut rows = Vec::with_capacity(prepared.len());
            for result in prepared {
                rows.push(result?);
            }

            let mut tx = self.records.begin().await?;
            for (fields, _) in &rows {
                self.records
                    .insert_in(&mut tx, &collection.name, fields)
                    .await
                    .map_err(map_write_error)?;
            }
            tx.commit().await?;

            let total = rows.len();
            Ok(BatchOutcome {
                data: rows.into_iter().map(|(_, echo)| echo).collect(),
                total,
                succeeded: total,
                failed: 0,
            })
        } else {
            let mut outcome = BatchOutcome {
                data: Vec::new(),
                total: prepared.len(),
                succeeded: 0,
                failed: 0,
            };
            for result in prepared {
                match result {
                    Ok((fields, echo)) => {
                        match self.records.insert(&collection.name, &fields).await {
                            Ok(_) => {
                                outcome.succeeded += 1;
                                outcome.data.push(echo);
                            }
                            Err(e) => {
                                warn!(collection = %name, error = %e, "Batch item insert failed");
                                outcome.failed += 1;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(collection = %name, error = %e, "Batch item rejected");
                        outcome.failed += 1;
                    }
                }
            }
            Ok(outcome)
        }
    }

    /// Types one create item: assigns the server-side ULID, applies column
    /// defaults, enforces required fields and rejects unknown ones.
    fn prepare_insert(
        &self,
        collection: &Collection,
        item: &Value,
    ) -> ApiResult<(Vec<(String, SqlValue)>, Map<String, Value>)> {
        let object = item
            .as_object()
            .ok_or_else(|| ApiError::validation("each record must be a JSON object"))?;

        for key in object.keys() {
            // A client-supplied id is ignored, not an error
            if key != "id" && key != "pkid" && collection.column(key).is_none() {
                return Err(ApiError::validation(format!("unknown field '{}'", key)));
            }
        }

        let id = self.ulid.generate();
        let mut fields: Vec<(String, SqlValue)> =
            vec![("id".to_string(), SqlValue::Text(id.clone()))];
        let mut echo = Map::new();
        echo.insert("id".to_string(), Value::String(id));

        for column in &collection.columns {
            match object.get(&column.name) {
                Some(value) => {
                    let typed = FieldValue::from_json(value, column)?;
                    echo.insert(column.name.clone(), typed.to_json());
                    fields.push((column.name.clone(), typed.to_sql()));
                }
                None => {
                    if let Some(default) = &column.default_value {
                        let sql_value = parse_text_as(default, column.column_type)?;
                        echo.insert(column.name.clone(), default_echo(&sql_value));
                        fields.push((column.name.clone(), sql_value));
                    } else if column.nullable {
                        echo.insert(column.name.clone(), Value::Null);
                    } else {
                        return Err(ApiError::validation(format!(
                            "field '{}' is required",
                            column.name
                        )));
                    }
                }
            }
        }

        Ok((fields, echo))
    }

    // =========================================================================
    // UPDATE
    // =========================================================================

    pub async fn update(&self, name: &str, data: &Value, atomic: bool) -> ApiResult<BatchOutcome> {
        let collection = self.collection(name).await?;
        let items = self.batch_items(data)?;

        let prepared: Vec<ApiResult<(String, Vec<(String, SqlValue)>, Map<String, Value>)>> =
            items
                .iter()
                .map(|item| self.prepare_update(&collection, item))
                .collect();

        if atomic {
            let mut updates = Vec::with_capacity(prepared.len());
            for result in prepared {
                updates.push(result?);
            }

            let mut tx = self.records.begin().await?;
            for (id, sets, _) in &updates {
                let affected = self
                    .records
                    .update_in(&mut tx, &collection.name, id, sets)
                    .await
                    .map_err(map_write_error)?;
                if affected == 0 {
                    return Err(ApiError::not_found(format!(
                        "record with id '{}' not found",
                        id
                    )));
                }
            }
            tx.commit().await?;

            let total = updates.len();
            Ok(BatchOutcome {
                data: updates.into_iter().map(|(_, _, echo)| echo).collect(),
                total,
                succeeded: total,
                failed: 0,
            })
        } else {
            let mut outcome = BatchOutcome {
                data: Vec::new(),
                total: prepared.len(),
                succeeded: 0,
                failed: 0,
            };
            for result in prepared {
                match result {
                    Ok((id, sets, echo)) => {
                        match self.records.update(&collection.name, &id, &sets).await {
                            Ok(affected) if affected > 0 => {
                                outcome.succeeded += 1;
                                outcome.data.push(echo);
                            }
                            Ok(_) => outcome.failed += 1,
                            Err(e) => {
                                warn!(collection = %name, error = %e, "Batch item update failed");
                                outcome.failed += 1;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(collection = %name, error = %e, "Batch item rejected");
                        outcome.failed += 1;
                    }
                }
            }
            Ok(outcome)
        }
    }

    fn prepare_update(
        &self,
        collection: &Collection,
        item: &Value,
    ) -> ApiResult<(String, Vec<(String, SqlValue)>, Map<String, Value>)> {
        let object = item
            .as_object()
            .ok_or_else(|| ApiError::validation("each record must be a JSON object"))?;

        let id = object
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::validation("field 'id' is required for update"))?;
        validate_ulid(id)?;

        let mut sets: Vec<(String, SqlValue)> = Vec::new();
        let mut echo = Map::new();
        echo.insert("id".to_string(), Value::String(id.to_string()));

        for (key, value) in object {
            if key == "id" || key == "pkid" {
                continue;
            }
            let column = collection
                .column(key)
                .ok_or_else(|| ApiError::validation(format!("unknown field '{}'", key)))?;
            let typed = FieldValue::from_json(value, column)?;
            echo.insert(key.clone(), typed.to_json());
            sets.push((key.clone(), typed.to_sql()));
        }

        if sets.is_empty() {
            return Err(ApiError::validation(
                "update requires at least one field besides 'id'",
            ));
        }

        Ok((id.to_string(), sets, echo))
    }

    // =========================================================================
    // DESTROY
    // =========================================================================

    pub async fn destroy(&self, name: &str, data: &Value, atomic: bool) -> ApiResult<BatchOutcome> {
        let collection = self.collection(name).await?;
        let items = self.batch_items(data)?;

        let ids: Vec<ApiResult<String>> = items
            .iter()
            .map(|item| {
                let id = item
                    .as_str()
                    .ok_or_else(|| ApiError::validation("each destroy item must be a record id"))?;
                validate_ulid(id)?;
                Ok(id.to_string())
            })
            .collect();

        if atomic {
            let mut validated = Vec::with_capacity(ids.len());
            for result in ids {
                validated.push(result?);
            }

            let mut tx = self.records.begin().await?;
            for id in &validated {
                let affected = self
                    .records
                    .delete_in(&mut tx, &collection.name, id)
                    .await?;
                if affected == 0 {
                    return Err(ApiError::not_found(format!(
                        "record with id '{}' not found",
                        id
                    )));
                }
            }
            tx.commit().await?;

            let total = validated.len();
            Ok(BatchOutcome {
                data: validated.into_iter().map(id_echo).collect(),
                total,
                succeeded: total,
                failed: 0,
            })
        } else {
            let mut outcome = BatchOutcome {
                data: Vec::new(),
                total: ids.len(),
                succeeded: 0,
                failed: 0,
            };
            for result in ids {
                match result {
                    Ok(id) => match self.records.delete(&collection.name, &id).await {
                        Ok(affected) if affected > 0 => {
                            outcome.succeeded += 1;
                            outcome.data.push(id_echo(id));
                        }
                        Ok(_) => outcome.failed += 1,
                        Err(e) => {
                            warn!(collection = %name, error = %e, "Batch item delete failed");
                            outcome.failed += 1;
                        }
                    },
                    Err(e) => {
                        warn!(collection = %name, error = %e, "Batch item rejected");
                        outcome.failed += 1;
                    }
                }
            }
            Ok(outcome)
        }
    }

    // =========================================================================
    // SHARED HELPERS
    // =========================================================================

    /// Extracts and bounds the batch array.
    fn batch_items<'a>(&self, data: &'a Value) -> ApiResult<&'a Vec<Value>> {
        let items = data
            .as_array()
            .ok_or_else(|| ApiError::validation("data must be a JSON array"))?;
        if items.is_empty() {
            return Err(ApiError::validation("data must not be empty"));
        }
        if items.len() > self.batch.max_size as usize {
            return Err(ApiError::validation(format!(
                "batch exceeds the maximum size of {} items",
                self.batch.max_size
            )));
        }
        Ok(items)
    }
}

// =============================================================================
// Parsing Helpers (pure)
// =============================================================================

fn validate_ulid(id: &str) -> ApiResult<()> {
    if UlidService::is_valid(id) {
        Ok(())
    } else {
        Err(ApiError::validation(format!("'{}' is not a valid ULID", id)))
    }
}

fn row_id(row: &Map<String, Value>) -> Option<String> {
    row.get("id").and_then(Value::as_str).map(String::from)
}

fn id_echo(id: String) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("id".to_string(), Value::String(id));
    map
}

fn default_echo(value: &SqlValue) -> Value {
    match value {
        SqlValue::Text(s) => Value::String(s.clone()),
        SqlValue::Int(n) => Value::Number((*n).into()),
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Null => Value::Null,
    }
}

/// `fields=` projection: `id` is always included, every other entry must
/// name a user column.
fn parse_projection(collection: &Collection, fields: Option<&str>) -> ApiResult<Vec<String>> {
    let Some(fields) = fields else {
        return Ok(Vec::new());
    };

    let mut projection = vec!["id".to_string()];
    for field in fields.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        if field == "id" {
            continue;
        }
        if collection.column(field).is_none() {
            return Err(ApiError::validation(format!("unknown field '{}'", field)));
        }
        if !projection.iter().any(|f| f == field) {
            projection.push(field.to_string());
        }
    }
    Ok(projection)
}

/// `sort=` specification: comma-separated, `-` prefix for DESC, validated
/// against the collection's columns plus `id`.
fn parse_sort(collection: &Collection, sort: Option<&str>) -> ApiResult<Vec<SortField>> {
    let Some(sort) = sort else {
        return Ok(Vec::new());
    };

    let mut parsed = Vec::new();
    for token in sort.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let field = SortField::parse(token);
        if !collection.is_queryable_field(&field.column) {
            return Err(ApiError::validation(format!(
                "unknown sort field '{}'",
                field.column
            )));
        }
        parsed.push(field);
    }
    Ok(parsed)
}

/// Types the raw `col[op]=value` filters against the schema.
fn parse_filters(collection: &Collection, filters: &[RawFilter]) -> ApiResult<Vec<Condition>> {
    let mut conditions = Vec::with_capacity(filters.len());

    for filter in filters {
        let operator = Operator::parse(&filter.op)
            .ok_or_else(|| ApiError::validation(format!("unknown operator '{}'", filter.op)))?;

        if !collection.is_queryable_field(&filter.column) {
            return Err(ApiError::validation(format!(
                "unknown filter column '{}'",
                filter.column
            )));
        }
        // `id` filters are typed as strings
        let column_type = collection
            .column(&filter.column)
            .map(|c| c.column_type)
            .unwrap_or(ColumnType::String);

        let value = match operator {
            Operator::Null | Operator::NotNull => ConditionValue::None,
            Operator::In => {
                let values: ApiResult<Vec<SqlValue>> = filter
                    .value
                    .split(',')
                    .map(|part| parse_text_as(part.trim(), column_type))
                    .collect();
                ConditionValue::List(values?)
            }
            Operator::Like => {
                if column_type != ColumnType::String {
                    return Err(ApiError::validation(format!(
                        "operator 'like' requires a string column, '{}' is {}",
                        filter.column,
                        column_type.as_str()
                    )));
                }
                // The caller owns the % wrapping by contract
                ConditionValue::Single(SqlValue::Text(filter.value.clone()))
            }
            _ => ConditionValue::Single(parse_text_as(&filter.value, column_type)?),
        };

        conditions.push(Condition {
            column: filter.column.clone(),
            operator,
            value,
        });
    }

    Ok(conditions)
}

/// `q=` search across the collection's string columns; collections without
/// string columns ignore the term.
fn build_search(collection: &Collection, q: Option<&str>) -> Option<SearchClause> {
    let term = q?.trim();
    if term.is_empty() {
        return None;
    }
    let columns: Vec<String> = collection
        .string_columns()
        .into_iter()
        .map(String::from)
        .collect();
    if columns.is_empty() {
        return None;
    }
    Some(SearchClause {
        term: term.to_string(),
        columns,
    })
}

fn validate_aggregate_column(func: AggregateFunc, column: &Column) -> ApiResult<()> {
    let numeric = matches!(
        column.column_type,
        ColumnType::Integer | ColumnType::Decimal
    );
    match func {
        AggregateFunc::Sum | AggregateFunc::Avg if !numeric => Err(ApiError::validation(format!(
            "field '{}' must be a numeric column",
            column.name
        ))),
        AggregateFunc::Min | AggregateFunc::Max
            if matches!(column.column_type, ColumnType::Boolean | ColumnType::Json) =>
        {
            Err(ApiError::validation(format!(
                "field '{}' cannot be aggregated",
                column.name
            )))
        }
        _ => Ok(()),
    }
}

/// Classifies write errors: unique violations are client conflicts.
fn map_write_error(e: ApiError) -> ApiError {
    match e {
        ApiError::Database(db_err) if is_unique_violation(&db_err) => {
            ApiError::conflict("unique constraint violated")
        }
        other => other,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::Column;

    fn products() -> Collection {
        Collection {
            name: "products".to_string(),
            columns: vec![
                Column {
                    name: "title".to_string(),
                    column_type: ColumnType::String,
                    nullable: false,
                    default_value: None,
                    unique: true,
                },
                Column {
                    name: "brand".to_string(),
                    column_type: ColumnType::String,
                    nullable: true,
                    default_value: None,
                    unique: false,
                },
                Column {
                    name: "quantity".to_string(),
                    column_type: ColumnType::Integer,
                    nullable: true,
                    default_value: Some("0".to_string()),
                    unique: false,
                },
            ],
        }
    }

    #[test]
    fn test_projection_always_includes_id() {
        let projection = parse_projection(&products(), Some("title,brand")).unwrap();
        assert_eq!(projection, vec!["id", "title", "brand"]);
    }

    #[test]
    fn test_projection_rejects_unknown_field() {
        let err = parse_projection(&products(), Some("title,nope")).unwrap_err();
        assert_eq!(err.to_string(), "unknown field 'nope'");
    }

    #[test]
    fn test_projection_dedupes() {
        let projection = parse_projection(&products(), Some("title,title,id")).unwrap();
        assert_eq!(projection, vec!["id", "title"]);
    }

    #[test]
    fn test_sort_validation() {
        let sort = parse_sort(&products(), Some("-quantity,title")).unwrap();
        assert_eq!(sort.len(), 2);
        assert_eq!(sort[0].column, "quantity");
        assert_eq!(sort[0].direction, SortDirection::Desc);

        assert!(parse_sort(&products(), Some("-price")).is_err());
        assert!(parse_sort(&products(), Some("id")).is_ok());
    }

    #[test]
    fn test_filter_typing() {
        let filters = vec![RawFilter {
            column: "quantity".to_string(),
            op: "gt".to_string(),
            value: "5".to_string(),
        }];
        let conditions = parse_filters(&products(), &filters).unwrap();
        assert_eq!(conditions[0].operator, Operator::Gt);
        assert_eq!(
            conditions[0].value,
            ConditionValue::Single(SqlValue::Int(5))
        );
    }

    #[test]
    fn test_filter_rejects_bad_value_type() {
        let filters = vec![RawFilter {
            column: "quantity".to_string(),
            op: "eq".to_string(),
            value: "many".to_string(),
        }];
        assert!(parse_filters(&products(), &filters).is_err());
    }

    #[test]
    fn test_filter_rejects_unknown_column_and_operator() {
        let unknown_column = vec![RawFilter {
            column: "price".to_string(),
            op: "eq".to_string(),
            value: "1".to_string(),
        }];
        let err = parse_filters(&products(), &unknown_column).unwrap_err();
        assert_eq!(err.to_string(), "unknown filter column 'price'");

        let unknown_op = vec![RawFilter {
            column: "quantity".to_string(),
            op: "between".to_string(),
            value: "1".to_string(),
        }];
        let err = parse_filters(&products(), &unknown_op).unwrap_err();
        assert_eq!(err.to_string(), "unknown operator 'between'");
    }

    #[test]
    fn test_in_filter_splits_values() {
        let filters = vec![RawFilter {
            column: "brand".to_string(),
            op: "in".to_string(),
            value: "Wow,Acme".to_string(),
        }];
        let conditions = parse_filters(&products(), &filters).unwrap();
        assert_eq!(
            conditions[0].value,
            ConditionValue::List(vec![
                SqlValue::Text("Wow".to_string()),
                SqlValue::Text("Acme".to_string()),
            ])
        );
    }

    #[test]
    fn test_like_requires_string_column() {
        let filters = vec![RawFilter {
            column: "quantity".to_string(),
            op: "like".to_string(),
            value: "%5%".to_string(),
        }];
        assert!(parse_filters(&products(), &filters).is_err());
    }

    #[test]
    fn test_search_scope_is_string_columns() {
        let search = build_search(&products(), Some("monitor")).unwrap();
        assert_eq!(search.columns, vec!["title", "brand"]);
        assert!(build_search(&products(), Some("   ")).is_none());
        assert!(build_search(&products(), None).is_none());
    }

    #[test]
    fn test_aggregate_column_rules() {
        let c = products();
        let title = c.column("title").unwrap();
        let quantity = c.column("quantity").unwrap();

        assert!(validate_aggregate_column(AggregateFunc::Sum, quantity).is_ok());
        assert!(validate_aggregate_column(AggregateFunc::Sum, title).is_err());
        assert!(validate_aggregate_column(AggregateFunc::Min, title).is_ok());
        assert!(validate_aggregate_column(AggregateFunc::Max, quantity).is_ok());
    }

    #[test]
    fn test_ulid_validation_messages() {
        assert!(validate_ulid("01ARZ3NDEKTSV4RRFFQ69G5FAV").is_ok());
        let err = validate_ulid("nope").unwrap_err();
        assert_eq!(err.to_string(), "'nope' is not a valid ULID");
    }
}
