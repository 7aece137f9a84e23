//! # Query Builder
//!
//! Pure SQL construction for the data engine. Never touches the database;
//! emits a `(sql, args)` pair with dialect-appropriate placeholders and
//! quoting, ready for the record repository to bind and execute.
//!
//! ## Responsibilities
//!
//! - SELECT with projection, filters, free-text search, cursor clause,
//!   multi-field ORDER BY and LIMIT/OFFSET
//! - COUNT and the `sum/avg/min/max` aggregates
//! - Single-row INSERT/UPDATE/DELETE shapes for batch execution
//!
//! ## Inputs Are Pre-Validated
//!
//! Every column and table name reaching this module has passed the
//! identifier grammar, and every value is already a typed [`SqlValue`].
//! The builder still quotes all identifiers.
//!
//! ## LIKE Escaping
//!
//! Free-text search terms are escaped (`%`, `_` and the escape char
//! itself) and wrapped in `%…%` here; `!` is used as the escape character
//! because it needs no doubling in any of the three dialects. Client
//! `like` filters are passed through verbatim - the caller owns the
//! pattern by contract.

use shared::database::{ColumnType, Dialect, SqlValue};

// =============================================================================
// Condition Model
// =============================================================================

/// Filter operators accepted in `col[op]=value` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
    In,
    Null,
    NotNull,
}

impl Operator {
    /// Parses the operator name between brackets.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "gte" => Some(Self::Gte),
            "lte" => Some(Self::Lte),
            "like" => Some(Self::Like),
            "in" => Some(Self::In),
            "null" => Some(Self::Null),
            "notnull" => Some(Self::NotNull),
            _ => None,
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            // In / Null / NotNull render their own shapes
            Self::In | Self::Null | Self::NotNull => "",
        }
    }
}

/// The right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Single(SqlValue),
    List(Vec<SqlValue>),
    /// `null` / `notnull` carry no value
    None,
}

/// One `col[op]=value` filter, typed and validated.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub value: ConditionValue,
}

// =============================================================================
// Sort Model
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One field of a `sort=` specification.
#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    pub column: String,
    pub direction: SortDirection,
}

impl SortField {
    /// Parses one sort token: `-` prefix for DESC, optional `+` for ASC.
    pub fn parse(token: &str) -> Self {
        if let Some(rest) = token.strip_prefix('-') {
            Self {
                column: rest.to_string(),
                direction: SortDirection::Desc,
            }
        } else {
            Self {
                column: token.strip_prefix('+').unwrap_or(token).to_string(),
                direction: SortDirection::Asc,
            }
        }
    }
}

// =============================================================================
// Cursor & Search
// =============================================================================

/// Direction of the cursor clause relative to `id` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorDirection {
    /// `id > cursor` - the next page
    After,
    /// `id < cursor` - used by the prev-cursor probe
    Before,
}

/// Free-text search: OR of LIKE over the collection's string columns.
#[derive(Debug, Clone)]
pub struct SearchClause {
    /// Raw term; escaped and `%`-wrapped during building
    pub term: String,
    /// The string-typed columns in scope
    pub columns: Vec<String>,
}

/// Aggregate functions for the analytic endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

// =============================================================================
// Select Parameters
// =============================================================================

/// Everything a list query can carry.
#[derive(Debug, Clone, Default)]
pub struct SelectParams {
    /// Projected columns, `id` first; empty means all columns
    pub projection: Vec<String>,
    pub conditions: Vec<Condition>,
    pub search: Option<SearchClause>,
    pub cursor: Option<(CursorDirection, String)>,
    pub sort: Vec<SortField>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// =============================================================================
// Placeholder Counter
// =============================================================================

/// Sequential placeholder source; PostgreSQL numbers its parameters.
struct Placeholders {
    dialect: Dialect,
    n: usize,
}

impl Placeholders {
    fn new(dialect: Dialect) -> Self {
        Self { dialect, n: 0 }
    }

    fn next(&mut self) -> String {
        self.n += 1;
        self.dialect.placeholder(self.n)
    }
}

// =============================================================================
// LIKE Escaping
// =============================================================================

/// Escape character for search patterns. `!` is inert in string literals
/// across all three dialects, unlike backslash.
pub const LIKE_ESCAPE_CHAR: char = '!';

/// Escapes `%`, `_` and the escape character itself in a search term.
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE_CHAR {
            out.push(LIKE_ESCAPE_CHAR);
        }
        out.push(c);
    }
    out
}

// =============================================================================
// WHERE Assembly
// =============================================================================

/// Renders the WHERE clause (with leading ` WHERE `) or an empty string.
/// Filters, search and the cursor clause are ANDed together.
fn build_where(
    dialect: Dialect,
    ph: &mut Placeholders,
    args: &mut Vec<SqlValue>,
    conditions: &[Condition],
    search: Option<&SearchClause>,
    cursor: Option<&(CursorDirection, String)>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    for condition in conditions {
        let col = dialect.quote_ident(&condition.column);
        match (&condition.operator, &condition.value) {
            (Operator::Null, _) => parts.push(format!("{} IS NULL", col)),
            (Operator::NotNull, _) => parts.push(format!("{} IS NOT NULL", col)),
            (Operator::In, ConditionValue::List(values)) => {
                if values.is_empty() {
                    // An empty in-list matches nothing
                    parts.push("1 = 0".to_string());
                } else {
                    let placeholders: Vec<String> =
                        values.iter().map(|_| ph.next()).collect();
                    args.extend(values.iter().cloned());
                    parts.push(format!("{} IN ({})", col, placeholders.join(", ")));
                }
            }
            (op, ConditionValue::Single(value)) if *op != Operator::In => {
                let placeholder = ph.next();
                args.push(value.clone());
                parts.push(format!("{} {} {}", col, op.sql(), placeholder));
            }
            // Shape mismatches are filtered out during request parsing
            _ => {}
        }
    }

    if let Some(search) = search {
        if !search.columns.is_empty() {
            let pattern = format!("%{}%", escape_like(&search.term));
            let ors: Vec<String> = search
                .columns
                .iter()
                .map(|column| {
                    let placeholder = ph.next();
                    args.push(SqlValue::Text(pattern.clone()));
                    format!(
                        "{} LIKE {} ESCAPE '{}'",
                        dialect.quote_ident(column),
                        placeholder,
                        LIKE_ESCAPE_CHAR
                    )
                })
                .collect();
            parts.push(format!("({})", ors.join(" OR ")));
        }
    }

    if let Some((direction, id)) = cursor {
        let cmp = match direction {
            CursorDirection::After => ">",
            CursorDirection::Before => "<",
        };
        let placeholder = ph.next();
        args.push(SqlValue::Text(id.clone()));
        parts.push(format!("{} {} {}", dialect.quote_ident("id"), cmp, placeholder));
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn build_order_by(dialect: Dialect, sort: &[SortField]) -> String {
    if sort.is_empty() {
        return format!(" ORDER BY {} ASC", dialect.quote_ident("id"));
    }
    let fields: Vec<String> = sort
        .iter()
        .map(|field| {
            let dir = match field.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            format!("{} {}", dialect.quote_ident(&field.column), dir)
        })
        .collect();
    format!(" ORDER BY {}", fields.join(", "))
}

// =============================================================================
// Statement Builders
// =============================================================================

/// Builds a SELECT over a collection table.
pub fn build_select(dialect: Dialect, table: &str, params: &SelectParams) -> (String, Vec<SqlValue>) {
    let mut ph = Placeholders::new(dialect);
    let mut args = Vec::new();

    let columns = if params.projection.is_empty() {
        "*".to_string()
    } else {
        params
            .projection
            .iter()
            .map(|c| dialect.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut sql = format!("SELECT {} FROM {}", columns, dialect.quote_ident(table));
    sql.push_str(&build_where(
        dialect,
        &mut ph,
        &mut args,
        &params.conditions,
        params.search.as_ref(),
        params.cursor.as_ref(),
    ));
    sql.push_str(&build_order_by(dialect, &params.sort));

    if let Some(limit) = params.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = params.offset {
        sql.push_str(&format!(" OFFSET {}", offset));
    }

    (sql, args)
}

/// Builds a COUNT with the same filters/search but no cursor clause.
pub fn build_count(
    dialect: Dialect,
    table: &str,
    conditions: &[Condition],
    search: Option<&SearchClause>,
) -> (String, Vec<SqlValue>) {
    build_aggregate(dialect, table, AggregateFunc::Count, None, conditions, search)
}

/// Builds an aggregate query. `column` is required for everything but
/// COUNT and carries the column type so decimal text can be cast for the
/// engine, and the result cast so the driver can decode it.
pub fn build_aggregate(
    dialect: Dialect,
    table: &str,
    func: AggregateFunc,
    column: Option<(&str, ColumnType)>,
    conditions: &[Condition],
    search: Option<&SearchClause>,
) -> (String, Vec<SqlValue>) {
    let mut ph = Placeholders::new(dialect);
    let mut args = Vec::new();

    let expr = aggregate_expr(dialect, func, column);
    let mut sql = format!(
        "SELECT {} AS value FROM {}",
        expr,
        dialect.quote_ident(table)
    );
    sql.push_str(&build_where(dialect, &mut ph, &mut args, conditions, search, None));

    (sql, args)
}

/// The select expression for an aggregate, with the casts that keep the
/// result decodable through the Any driver.
fn aggregate_expr(dialect: Dialect, func: AggregateFunc, column: Option<(&str, ColumnType)>) -> String {
    let float = dialect.float_cast_type();
    match (func, column) {
        (AggregateFunc::Count, _) => "COUNT(*)".to_string(),
        (func, Some((name, ty))) => {
            let quoted = dialect.quote_ident(name);
            // Decimal values are stored textually; cast before aggregating.
            let operand = if ty == ColumnType::Decimal {
                format!("CAST({} AS {})", quoted, float)
            } else {
                quoted
            };
            let call = match func {
                AggregateFunc::Sum => format!("SUM({})", operand),
                AggregateFunc::Avg => format!("AVG({})", operand),
                AggregateFunc::Min => format!("MIN({})", operand),
                AggregateFunc::Max => format!("MAX({})", operand),
                AggregateFunc::Count => unreachable!(),
            };
            match func {
                // SUM/AVG results are NUMERIC on PostgreSQL even for
                // bigint inputs; cast so every backend returns a double.
                AggregateFunc::Sum | AggregateFunc::Avg => {
                    format!("CAST({} AS {})", call, float)
                }
                // MIN/MAX preserve the operand type, which is already
                // decodable (text, bigint or the cast double).
                _ => call,
            }
        }
        // Validated upstream: non-count aggregates require a field
        (_, None) => "COUNT(*)".to_string(),
    }
}

/// Builds a single-row INSERT. The caller binds one arg per column.
pub fn build_insert(dialect: Dialect, table: &str, columns: &[&str]) -> String {
    let mut ph = Placeholders::new(dialect);
    let quoted: Vec<String> = columns.iter().map(|c| dialect.quote_ident(c)).collect();
    let placeholders: Vec<String> = columns.iter().map(|_| ph.next()).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.quote_ident(table),
        quoted.join(", "),
        placeholders.join(", ")
    )
}

/// Builds a single-row UPDATE by id. The caller binds the set values in
/// column order followed by the id.
pub fn build_update(dialect: Dialect, table: &str, columns: &[&str]) -> String {
    let mut ph = Placeholders::new(dialect);
    let sets: Vec<String> = columns
        .iter()
        .map(|c| format!("{} = {}", dialect.quote_ident(c), ph.next()))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = {}",
        dialect.quote_ident(table),
        sets.join(", "),
        dialect.quote_ident("id"),
        ph.next()
    )
}

/// Builds a single-row DELETE by id.
pub fn build_delete(dialect: Dialect, table: &str) -> String {
    let mut ph = Placeholders::new(dialect);
    format!(
        "DELETE FROM {} WHERE {} = {}",
        dialect.quote_ident(table),
        dialect.quote_ident("id"),
        ph.next()
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(column: &str, op: Operator, value: SqlValue) -> Condition {
        Condition {
            column: column.to_string(),
            operator: op,
            value: ConditionValue::Single(value),
        }
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!(Operator::parse("eq"), Some(Operator::Eq));
        assert_eq!(Operator::parse("gte"), Some(Operator::Gte));
        assert_eq!(Operator::parse("notnull"), Some(Operator::NotNull));
        assert_eq!(Operator::parse("regex"), None);
        assert_eq!(Operator::parse("EQ"), None);
    }

    #[test]
    fn test_sort_field_parsing() {
        assert_eq!(
            SortField::parse("-quantity"),
            SortField { column: "quantity".to_string(), direction: SortDirection::Desc }
        );
        assert_eq!(
            SortField::parse("title"),
            SortField { column: "title".to_string(), direction: SortDirection::Asc }
        );
        assert_eq!(
            SortField::parse("+title"),
            SortField { column: "title".to_string(), direction: SortDirection::Asc }
        );
    }

    #[test]
    fn test_plain_select_defaults_to_id_order() {
        let (sql, args) = build_select(Dialect::Sqlite, "products", &SelectParams::default());
        assert_eq!(sql, "SELECT * FROM \"products\" ORDER BY \"id\" ASC");
        assert!(args.is_empty());
    }

    #[test]
    fn test_select_with_projection_and_limit() {
        let params = SelectParams {
            projection: vec!["id".to_string(), "title".to_string()],
            limit: Some(4),
            ..Default::default()
        };
        let (sql, _) = build_select(Dialect::Sqlite, "products", &params);
        assert_eq!(
            sql,
            "SELECT \"id\", \"title\" FROM \"products\" ORDER BY \"id\" ASC LIMIT 4"
        );
    }

    #[test]
    fn test_conditions_use_positional_placeholders() {
        let params = SelectParams {
            conditions: vec![
                cond("quantity", Operator::Gt, SqlValue::Int(5)),
                cond("brand", Operator::Eq, SqlValue::Text("Wow".to_string())),
            ],
            ..Default::default()
        };
        let (sql, args) = build_select(Dialect::Sqlite, "products", &params);
        assert_eq!(
            sql,
            "SELECT * FROM \"products\" WHERE \"quantity\" > ? AND \"brand\" = ? \
             ORDER BY \"id\" ASC"
        );
        assert_eq!(args, vec![SqlValue::Int(5), SqlValue::Text("Wow".to_string())]);
    }

    #[test]
    fn test_postgres_numbers_placeholders() {
        let params = SelectParams {
            conditions: vec![
                cond("quantity", Operator::Gt, SqlValue::Int(5)),
                cond("brand", Operator::Eq, SqlValue::Text("Wow".to_string())),
            ],
            cursor: Some((CursorDirection::After, "01A".to_string())),
            ..Default::default()
        };
        let (sql, args) = build_select(Dialect::Postgres, "products", &params);
        assert_eq!(
            sql,
            "SELECT * FROM \"products\" WHERE \"quantity\" > $1 AND \"brand\" = $2 \
             AND \"id\" > $3 ORDER BY \"id\" ASC"
        );
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_in_condition() {
        let params = SelectParams {
            conditions: vec![Condition {
                column: "brand".to_string(),
                operator: Operator::In,
                value: ConditionValue::List(vec![
                    SqlValue::Text("Wow".to_string()),
                    SqlValue::Text("Acme".to_string()),
                ]),
            }],
            ..Default::default()
        };
        let (sql, args) = build_select(Dialect::Postgres, "products", &params);
        assert!(sql.contains("\"brand\" IN ($1, $2)"), "{}", sql);
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_empty_in_list_matches_nothing() {
        let params = SelectParams {
            conditions: vec![Condition {
                column: "brand".to_string(),
                operator: Operator::In,
                value: ConditionValue::List(vec![]),
            }],
            ..Default::default()
        };
        let (sql, args) = build_select(Dialect::Sqlite, "products", &params);
        assert!(sql.contains("WHERE 1 = 0"), "{}", sql);
        assert!(args.is_empty());
    }

    #[test]
    fn test_null_operators_bind_nothing() {
        let params = SelectParams {
            conditions: vec![
                Condition {
                    column: "brand".to_string(),
                    operator: Operator::Null,
                    value: ConditionValue::None,
                },
                Condition {
                    column: "title".to_string(),
                    operator: Operator::NotNull,
                    value: ConditionValue::None,
                },
            ],
            ..Default::default()
        };
        let (sql, args) = build_select(Dialect::Sqlite, "products", &params);
        assert!(sql.contains("\"brand\" IS NULL AND \"title\" IS NOT NULL"), "{}", sql);
        assert!(args.is_empty());
    }

    #[test]
    fn test_search_ors_string_columns_and_escapes() {
        let params = SelectParams {
            search: Some(SearchClause {
                term: "50%_off".to_string(),
                columns: vec!["title".to_string(), "brand".to_string()],
            }),
            ..Default::default()
        };
        let (sql, args) = build_select(Dialect::Sqlite, "products", &params);
        assert!(
            sql.contains(
                "(\"title\" LIKE ? ESCAPE '!' OR \"brand\" LIKE ? ESCAPE '!')"
            ),
            "{}",
            sql
        );
        assert_eq!(
            args,
            vec![
                SqlValue::Text("%50!%!_off%".to_string()),
                SqlValue::Text("%50!%!_off%".to_string()),
            ]
        );
    }

    #[test]
    fn test_search_combines_with_filters_via_and() {
        let params = SelectParams {
            conditions: vec![cond("quantity", Operator::Gt, SqlValue::Int(5))],
            search: Some(SearchClause {
                term: "monitor".to_string(),
                columns: vec!["title".to_string()],
            }),
            ..Default::default()
        };
        let (sql, _) = build_select(Dialect::Sqlite, "products", &params);
        assert!(
            sql.contains("WHERE \"quantity\" > ? AND (\"title\" LIKE ? ESCAPE '!')"),
            "{}",
            sql
        );
    }

    #[test]
    fn test_cursor_directions() {
        let forward = SelectParams {
            cursor: Some((CursorDirection::After, "01A".to_string())),
            ..Default::default()
        };
        let (sql, _) = build_select(Dialect::Sqlite, "products", &forward);
        assert!(sql.contains("\"id\" > ?"), "{}", sql);

        let backward = SelectParams {
            cursor: Some((CursorDirection::Before, "01A".to_string())),
            ..Default::default()
        };
        let (sql, _) = build_select(Dialect::Sqlite, "products", &backward);
        assert!(sql.contains("\"id\" < ?"), "{}", sql);
    }

    #[test]
    fn test_multi_field_sort() {
        let params = SelectParams {
            sort: vec![
                SortField::parse("-quantity"),
                SortField::parse("title"),
            ],
            ..Default::default()
        };
        let (sql, _) = build_select(Dialect::Sqlite, "products", &params);
        assert!(sql.ends_with("ORDER BY \"quantity\" DESC, \"title\" ASC"), "{}", sql);
    }

    #[test]
    fn test_count_ignores_cursor() {
        let conditions = vec![cond("quantity", Operator::Gt, SqlValue::Int(5))];
        let (sql, args) = build_count(Dialect::Postgres, "products", &conditions, None);
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS value FROM \"products\" WHERE \"quantity\" > $1"
        );
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_sum_casts_result() {
        let (sql, _) = build_aggregate(
            Dialect::Postgres,
            "products",
            AggregateFunc::Sum,
            Some(("quantity", ColumnType::Integer)),
            &[],
            None,
        );
        assert_eq!(
            sql,
            "SELECT CAST(SUM(\"quantity\") AS DOUBLE PRECISION) AS value FROM \"products\""
        );
    }

    #[test]
    fn test_decimal_aggregate_casts_operand() {
        let (sql, _) = build_aggregate(
            Dialect::Sqlite,
            "products",
            AggregateFunc::Avg,
            Some(("price", ColumnType::Decimal)),
            &[],
            None,
        );
        assert_eq!(
            sql,
            "SELECT CAST(AVG(CAST(\"price\" AS REAL)) AS REAL) AS value FROM \"products\""
        );
    }

    #[test]
    fn test_min_on_string_has_no_cast() {
        let (sql, _) = build_aggregate(
            Dialect::MySql,
            "products",
            AggregateFunc::Min,
            Some(("title", ColumnType::String)),
            &[],
            None,
        );
        assert_eq!(sql, "SELECT MIN(`title`) AS value FROM `products`");
    }

    #[test]
    fn test_insert_shape() {
        let sql = build_insert(Dialect::Postgres, "products", &["id", "title", "price"]);
        assert_eq!(
            sql,
            "INSERT INTO \"products\" (\"id\", \"title\", \"price\") VALUES ($1, $2, $3)"
        );
        let sql = build_insert(Dialect::MySql, "products", &["id", "title"]);
        assert_eq!(sql, "INSERT INTO `products` (`id`, `title`) VALUES (?, ?)");
    }

    #[test]
    fn test_update_shape() {
        let sql = build_update(Dialect::Postgres, "products", &["title", "price"]);
        assert_eq!(
            sql,
            "UPDATE \"products\" SET \"title\" = $1, \"price\" = $2 WHERE \"id\" = $3"
        );
    }

    #[test]
    fn test_delete_shape() {
        assert_eq!(
            build_delete(Dialect::Sqlite, "products"),
            "DELETE FROM \"products\" WHERE \"id\" = ?"
        );
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("monitor"), "monitor");
        assert_eq!(escape_like("50%"), "50!%");
        assert_eq!(escape_like("a_b"), "a!_b");
        assert_eq!(escape_like("wow!"), "wow!!");
    }

    #[test]
    fn test_mysql_quoting_in_select() {
        let params = SelectParams {
            conditions: vec![cond("brand", Operator::Eq, SqlValue::Text("Wow".to_string()))],
            ..Default::default()
        };
        let (sql, _) = build_select(Dialect::MySql, "products", &params);
        assert_eq!(
            sql,
            "SELECT * FROM `products` WHERE `brand` = ? ORDER BY `id` ASC"
        );
    }
}
