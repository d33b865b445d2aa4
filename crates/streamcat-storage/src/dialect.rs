//! Dialect-specific SQL generation.
//!
//! Each dialect turns an entity or key into parameterized SQL text plus an
//! ordered bind-value list. Column order is derived once per namespace from
//! the fixed field ordering and held stable, so generated text is reusable as
//! a cache key; the per-shape memo in [`SqlFormatter`] means a dialect never
//! re-derives structure per call.
//!
//! Upsert is where dialects diverge: `INSERT … ON CONFLICT` for SQLite,
//! `INSERT … ON DUPLICATE KEY UPDATE` for MySQL (every column is referenced
//! twice, so bind values are doubled), and native `UPSERT INTO` for Phoenix,
//! which has no plain insert at all. Identifier quoting (double-quote vs
//! backtick) is a dialect parameter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::query::{NextIdPlan, QueryShape, RawSql, SqlOp, SqlQuery};
use crate::storable::{QueryParam, Storable, StorableKey};
use crate::value::{FieldMap, Value};

/// Bookkeeping table used by the sequence-emulating dialects.
const SEQUENCE_TABLE: &str = "storage_sequences";

pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// `SELECT *` over the whole namespace.
    fn select(&self, namespace: &str) -> SqlQuery;

    /// Select scoped by primary-key equality.
    fn select_by_key(&self, key: &StorableKey) -> SqlQuery;

    /// Select scoped by a conjunction of field-equality filters. An empty
    /// filter list degenerates to [`Dialect::select`].
    fn select_where(&self, namespace: &str, params: &[QueryParam]) -> SqlQuery;

    fn insert(&self, storable: &dyn Storable) -> Result<SqlQuery>;

    fn upsert(&self, storable: &dyn Storable) -> Result<SqlQuery>;

    fn delete(&self, key: &StorableKey) -> SqlQuery;

    /// Reserve and return the next id for an auto-increment namespace.
    fn next_id(&self, namespace: &str) -> NextIdPlan;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quoting {
    DoubleQuote,
    Backtick,
}

impl Quoting {
    fn quote(self, ident: &str) -> String {
        match self {
            Quoting::DoubleQuote => format!("\"{ident}\""),
            Quoting::Backtick => format!("`{ident}`"),
        }
    }
}

/// Shared ANSI-flavored renderer with a per-shape text memo.
struct SqlFormatter {
    quoting: Quoting,
    memo: Mutex<HashMap<QueryShape, Arc<str>>>,
}

impl SqlFormatter {
    fn new(quoting: Quoting) -> Self {
        Self {
            quoting,
            memo: Mutex::new(HashMap::new()),
        }
    }

    fn q(&self, ident: &str) -> String {
        self.quoting.quote(ident)
    }

    /// Memoized text lookup: the render closure runs at most once per shape.
    fn text<F>(&self, shape: &QueryShape, render: F) -> Arc<str>
    where
        F: FnOnce(&Self, &QueryShape) -> String,
    {
        let mut memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(text) = memo.get(shape) {
            return text.clone();
        }
        let text: Arc<str> = Arc::from(render(self, shape));
        memo.insert(shape.clone(), text.clone());
        text
    }

    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.q(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn placeholders(&self, count: usize) -> String {
        vec!["?"; count].join(", ")
    }

    fn where_clause(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| format!("{} = ?", self.q(c)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn select_sql(&self, shape: &QueryShape) -> String {
        let mut sql = format!("SELECT * FROM {}", self.q(shape.namespace()));
        if !shape.where_columns().is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clause(shape.where_columns()));
        }
        sql
    }

    fn insert_sql(&self, shape: &QueryShape, verb: &str) -> String {
        format!(
            "{verb} INTO {} ({}) VALUES ({})",
            self.q(shape.namespace()),
            self.column_list(shape.columns()),
            self.placeholders(shape.columns().len()),
        )
    }

    fn delete_sql(&self, shape: &QueryShape) -> String {
        format!(
            "DELETE FROM {} WHERE {}",
            self.q(shape.namespace()),
            self.where_clause(shape.where_columns()),
        )
    }
}

/// Split a field map into its fixed column ordering and aligned values.
fn columns_and_values(fields: &FieldMap) -> (Vec<String>, Vec<Value>) {
    let mut columns = Vec::with_capacity(fields.len());
    let mut values = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        columns.push(name.clone());
        values.push(value.clone());
    }
    (columns, values)
}

/// Sort filters by field name so equivalent filter sets share one SQL text.
fn sorted_filters(params: &[QueryParam]) -> (Vec<String>, Vec<Value>) {
    let mut sorted: Vec<&QueryParam> = params.iter().collect();
    sorted.sort_by(|a, b| a.field.cmp(&b.field));
    let columns = sorted.iter().map(|p| p.field.clone()).collect();
    let values = sorted.iter().map(|p| p.value.clone()).collect();
    (columns, values)
}

fn build_select(fmt: &SqlFormatter, namespace: &str) -> SqlQuery {
    let shape = QueryShape::new(namespace, SqlOp::Select, vec![], vec![]);
    let text = fmt.text(&shape, SqlFormatter::select_sql);
    SqlQuery::new(shape, text, vec![])
}

fn build_select_by_key(fmt: &SqlFormatter, key: &StorableKey) -> SqlQuery {
    let (columns, values) = columns_and_values(key.fields());
    let shape = QueryShape::new(key.namespace(), SqlOp::Select, vec![], columns);
    let text = fmt.text(&shape, SqlFormatter::select_sql);
    SqlQuery::new(shape, text, values)
}

fn build_select_where(fmt: &SqlFormatter, namespace: &str, params: &[QueryParam]) -> SqlQuery {
    if params.is_empty() {
        return build_select(fmt, namespace);
    }
    let (columns, values) = sorted_filters(params);
    let shape = QueryShape::new(namespace, SqlOp::Select, vec![], columns);
    let text = fmt.text(&shape, SqlFormatter::select_sql);
    SqlQuery::new(shape, text, values)
}

fn build_insert(fmt: &SqlFormatter, storable: &dyn Storable, verb: &str) -> Result<SqlQuery> {
    let fields = storable.to_fields()?;
    let (columns, values) = columns_and_values(&fields);
    let op = if verb == "UPSERT" {
        SqlOp::Upsert
    } else {
        SqlOp::Insert
    };
    let shape = QueryShape::new(storable.namespace(), op, columns, vec![]);
    let text = fmt.text(&shape, |fmt, shape| fmt.insert_sql(shape, verb));
    Ok(SqlQuery::new(shape, text, values))
}

fn build_delete(fmt: &SqlFormatter, key: &StorableKey) -> SqlQuery {
    let (columns, values) = columns_and_values(key.fields());
    let shape = QueryShape::new(key.namespace(), SqlOp::Delete, vec![], columns);
    let text = fmt.text(&shape, SqlFormatter::delete_sql);
    SqlQuery::new(shape, text, values)
}

/// Generic dialect for SQLite and compatible ANSI backends.
pub struct SqliteDialect {
    fmt: SqlFormatter,
}

impl SqliteDialect {
    pub fn new() -> Self {
        Self {
            fmt: SqlFormatter::new(Quoting::DoubleQuote),
        }
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn select(&self, namespace: &str) -> SqlQuery {
        build_select(&self.fmt, namespace)
    }

    fn select_by_key(&self, key: &StorableKey) -> SqlQuery {
        build_select_by_key(&self.fmt, key)
    }

    fn select_where(&self, namespace: &str, params: &[QueryParam]) -> SqlQuery {
        build_select_where(&self.fmt, namespace, params)
    }

    fn insert(&self, storable: &dyn Storable) -> Result<SqlQuery> {
        build_insert(&self.fmt, storable, "INSERT")
    }

    fn upsert(&self, storable: &dyn Storable) -> Result<SqlQuery> {
        let fields = storable.to_fields()?;
        let (columns, values) = columns_and_values(&fields);
        let (key_columns, _) = columns_and_values(&storable.primary_key());
        let shape = QueryShape::new(
            storable.namespace(),
            SqlOp::Upsert,
            columns,
            key_columns,
        );
        let text = self.fmt.text(&shape, |fmt, shape| {
            let non_key: Vec<&String> = shape
                .columns()
                .iter()
                .filter(|c| !shape.where_columns().contains(c))
                .collect();
            let conflict_action = if non_key.is_empty() {
                "DO NOTHING".to_string()
            } else {
                let updates = non_key
                    .iter()
                    .map(|c| format!("{} = excluded.{}", fmt.q(c), fmt.q(c)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("DO UPDATE SET {updates}")
            };
            format!(
                "{} ON CONFLICT({}) {}",
                fmt.insert_sql(shape, "INSERT"),
                fmt.column_list(shape.where_columns()),
                conflict_action,
            )
        });
        Ok(SqlQuery::new(shape, text, values))
    }

    fn delete(&self, key: &StorableKey) -> SqlQuery {
        build_delete(&self.fmt, key)
    }

    fn next_id(&self, namespace: &str) -> NextIdPlan {
        let create = format!(
            "CREATE TABLE IF NOT EXISTS \"{SEQUENCE_TABLE}\" \
             (\"namespace\" TEXT NOT NULL PRIMARY KEY, \"seq\" INTEGER NOT NULL)"
        );
        let reserve = format!(
            "INSERT INTO \"{SEQUENCE_TABLE}\" (\"namespace\", \"seq\") VALUES (?, 1) \
             ON CONFLICT(\"namespace\") DO UPDATE SET \"seq\" = \"seq\" + 1 \
             RETURNING \"seq\""
        );
        NextIdPlan {
            setup: vec![RawSql::new(create, vec![])],
            query: RawSql::new(reserve, vec![Value::Text(namespace.to_string())]),
        }
    }
}

/// MySQL-flavored dialect: backtick quoting, `ON DUPLICATE KEY UPDATE`
/// upsert, `LAST_INSERT_ID` sequence emulation.
pub struct MySqlDialect {
    fmt: SqlFormatter,
}

impl MySqlDialect {
    pub fn new() -> Self {
        Self {
            fmt: SqlFormatter::new(Quoting::Backtick),
        }
    }
}

impl Default for MySqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn select(&self, namespace: &str) -> SqlQuery {
        build_select(&self.fmt, namespace)
    }

    fn select_by_key(&self, key: &StorableKey) -> SqlQuery {
        build_select_by_key(&self.fmt, key)
    }

    fn select_where(&self, namespace: &str, params: &[QueryParam]) -> SqlQuery {
        build_select_where(&self.fmt, namespace, params)
    }

    fn insert(&self, storable: &dyn Storable) -> Result<SqlQuery> {
        build_insert(&self.fmt, storable, "INSERT")
    }

    fn upsert(&self, storable: &dyn Storable) -> Result<SqlQuery> {
        let fields = storable.to_fields()?;
        let (columns, values) = columns_and_values(&fields);
        let shape = QueryShape::new(storable.namespace(), SqlOp::Upsert, columns, vec![]);
        let text = self.fmt.text(&shape, |fmt, shape| {
            let updates = shape
                .columns()
                .iter()
                .map(|c| format!("{} = ?", fmt.q(c)))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "{} ON DUPLICATE KEY UPDATE {updates}",
                fmt.insert_sql(shape, "INSERT"),
            )
        });
        // Each column is referenced twice, once in VALUES and once in the
        // update list, so the bind values are doubled.
        let mut params = values.clone();
        params.extend(values);
        Ok(SqlQuery::new(shape, text, params))
    }

    fn delete(&self, key: &StorableKey) -> SqlQuery {
        build_delete(&self.fmt, key)
    }

    fn next_id(&self, namespace: &str) -> NextIdPlan {
        let ns = Value::Text(namespace.to_string());
        let create = format!(
            "CREATE TABLE IF NOT EXISTS `{SEQUENCE_TABLE}` \
             (`namespace` VARCHAR(255) NOT NULL PRIMARY KEY, `seq` BIGINT NOT NULL)"
        );
        let seed = format!(
            "INSERT IGNORE INTO `{SEQUENCE_TABLE}` (`namespace`, `seq`) VALUES (?, 0)"
        );
        let reserve = format!(
            "UPDATE `{SEQUENCE_TABLE}` SET `seq` = LAST_INSERT_ID(`seq` + 1) \
             WHERE `namespace` = ?"
        );
        NextIdPlan {
            setup: vec![
                RawSql::new(create, vec![]),
                RawSql::new(seed, vec![ns.clone()]),
                RawSql::new(reserve, vec![ns]),
            ],
            query: RawSql::new("SELECT LAST_INSERT_ID()", vec![]),
        }
    }
}

/// Phoenix-flavored dialect for HBase-backed SQL: double-quote quoting,
/// native `UPSERT INTO` (there is no plain insert), native sequences.
pub struct PhoenixDialect {
    fmt: SqlFormatter,
}

impl PhoenixDialect {
    pub fn new() -> Self {
        Self {
            fmt: SqlFormatter::new(Quoting::DoubleQuote),
        }
    }

    fn sequence_name(&self, namespace: &str) -> String {
        format!("\"{namespace}_sequence\"")
    }
}

impl Default for PhoenixDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for PhoenixDialect {
    fn name(&self) -> &'static str {
        "phoenix"
    }

    fn select(&self, namespace: &str) -> SqlQuery {
        build_select(&self.fmt, namespace)
    }

    fn select_by_key(&self, key: &StorableKey) -> SqlQuery {
        build_select_by_key(&self.fmt, key)
    }

    fn select_where(&self, namespace: &str, params: &[QueryParam]) -> SqlQuery {
        build_select_where(&self.fmt, namespace, params)
    }

    fn insert(&self, storable: &dyn Storable) -> Result<SqlQuery> {
        // Phoenix only has UPSERT semantics; insert-only enforcement happens
        // a layer up, in the storage manager.
        self.upsert(storable)
    }

    fn upsert(&self, storable: &dyn Storable) -> Result<SqlQuery> {
        build_insert(&self.fmt, storable, "UPSERT")
    }

    fn delete(&self, key: &StorableKey) -> SqlQuery {
        build_delete(&self.fmt, key)
    }

    fn next_id(&self, namespace: &str) -> NextIdPlan {
        let sequence = self.sequence_name(namespace);
        NextIdPlan {
            setup: vec![RawSql::new(
                format!("CREATE SEQUENCE IF NOT EXISTS {sequence}"),
                vec![],
            )],
            query: RawSql::new(format!("SELECT NEXT VALUE FOR {sequence}"), vec![]),
        }
    }
}
