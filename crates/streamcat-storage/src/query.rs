//! Parameterized query descriptors.
//!
//! [`QueryShape`] is the identity of a SQL operation for statement caching:
//! namespace, operation kind, and the column sets involved. Bind values and
//! object identity are never part of it, because the cache targets the query
//! *shape*, not a single invocation.

use std::sync::Arc;

use crate::value::Value;

/// Operation kind of a generated statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlOp {
    Select,
    Insert,
    Upsert,
    Delete,
    NextId,
}

/// Semantic shape of a parameterized SQL operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryShape {
    namespace: String,
    op: SqlOp,
    columns: Vec<String>,
    where_columns: Vec<String>,
}

impl QueryShape {
    pub fn new(
        namespace: impl Into<String>,
        op: SqlOp,
        columns: Vec<String>,
        where_columns: Vec<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            op,
            columns,
            where_columns,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn op(&self) -> SqlOp {
        self.op
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn where_columns(&self) -> &[String] {
        &self.where_columns
    }
}

/// SQL text plus the ordered bind values for one invocation. The text is
/// shared (`Arc<str>`) because dialects compute it once per shape and reuse
/// it.
#[derive(Debug, Clone)]
pub struct SqlQuery {
    pub shape: QueryShape,
    pub text: Arc<str>,
    pub params: Vec<Value>,
}

impl SqlQuery {
    pub fn new(shape: QueryShape, text: Arc<str>, params: Vec<Value>) -> Self {
        Self {
            shape,
            text,
            params,
        }
    }
}

/// Uncacheable statement text plus bind values. Used for sequence plumbing
/// that never goes through the statement cache.
#[derive(Debug, Clone)]
pub struct RawSql {
    pub text: Arc<str>,
    pub params: Vec<Value>,
}

impl RawSql {
    pub fn new(text: impl Into<Arc<str>>, params: Vec<Value>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }
}

/// Dialect-specific plan for reserving the next id of a namespace. All
/// statements run sequentially on one connection; the final query yields a
/// single row with a single integer column.
#[derive(Debug, Clone)]
pub struct NextIdPlan {
    pub setup: Vec<RawSql>,
    pub query: RawSql,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_identity_ignores_bind_values() {
        let shape = QueryShape::new(
            "widgets",
            SqlOp::Select,
            vec![],
            vec!["id".to_string()],
        );
        let a = SqlQuery::new(shape.clone(), "SELECT 1".into(), vec![Value::Integer(1)]);
        let b = SqlQuery::new(shape.clone(), "SELECT 1".into(), vec![Value::Integer(2)]);
        assert_eq!(a.shape, b.shape);
    }

    #[test]
    fn shape_identity_covers_operation_and_columns() {
        let select = QueryShape::new("widgets", SqlOp::Select, vec![], vec![]);
        let delete = QueryShape::new("widgets", SqlOp::Delete, vec![], vec![]);
        assert_ne!(select, delete);

        let by_id = QueryShape::new("widgets", SqlOp::Select, vec![], vec!["id".to_string()]);
        assert_ne!(select, by_id);
    }
}
