//! SQL store driver over JSON document tables
//!
//! Each resource lives in its own table:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "Person" (
//!     seq BIGSERIAL,
//!     id UUID PRIMARY KEY,
//!     data JSONB NOT NULL
//! )
//! ```
//!
//! Pushed-down conditions become a parameterized `WHERE` clause over `data`.
//! Every comparison is guarded by `jsonb_typeof`, so a member of the wrong
//! JSON type fails `=` and the ordered operators, and passes `!=`, exactly as
//! the in-memory evaluator does. Strings compare with `COLLATE "C"`
//! (byte order).
//!
//! Statements are executed through [`SqlBackend`]; the PostgreSQL backend
//! lives behind the `postgres` feature.

use crate::core::{Operator, Resource, Value};
use crate::query::condition::Condition;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// A bound statement parameter; every value travels as text and is cast in
/// SQL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    TextArray(Vec<String>),
}

/// SQL text with `$n` placeholders and their parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter and return its placeholder
    fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }
}

/// Executes statements against a database
#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// Run a query whose single column is a JSON document
    async fn fetch_documents(&self, statement: &SqlStatement) -> Result<Vec<serde_json::Value>>;

    /// Run statements in one transaction, returning the affected row count
    async fn execute_batch(&self, statements: &[SqlStatement]) -> Result<u64>;
}

/// Quote an identifier for use as a table name
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ---------------------------------------------------------------------------
// WHERE clause
// ---------------------------------------------------------------------------

fn comparison_symbol(operator: Operator) -> &'static str {
    match operator {
        Operator::Equals | Operator::NotEquals => "=",
        other => other.symbol(),
    }
}

/// Trailing UTC offset of a stored date-time string
const OFFSET_PATTERN: &str = r"[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?\s*([Zz]|[+-]\d{2}(:?\d{2})?)$";

/// Cast a stored date-time string to `timestamptz`.
///
/// Strings without an offset are read as UTC, whatever the session
/// `TimeZone` is.
fn stored_timestamp(text: &str) -> String {
    format!(
        "(CASE WHEN {} ~ '{}' THEN {}::timestamptz ELSE {}::timestamp AT TIME ZONE 'UTC' END)",
        text, OFFSET_PATTERN, text, text
    )
}

/// Render one condition, binding its parameters into `statement`
pub fn condition_sql(condition: &Condition, statement: &mut SqlStatement) -> String {
    let path = statement.bind(SqlParam::TextArray(
        condition.term().path().into_iter().map(str::to_string).collect(),
    ));
    let member = format!("(data #> {}::text[])", path);
    let text = format!("(data #>> {}::text[])", path);
    let operator = condition.operator();

    let value = condition.value();
    if value.is_null() {
        let is_null = format!("({} IS NULL OR jsonb_typeof({}) = 'null')", member, member);
        return match operator {
            Operator::NotEquals => format!("NOT {}", is_null),
            _ => is_null,
        };
    }

    let param = statement.bind(SqlParam::Text(value.to_text()));
    let symbol = comparison_symbol(operator);
    let (json_type, comparison) = match value {
        Value::Bool(_) => (
            "boolean",
            format!("{}::boolean {} {}::boolean", text, symbol, param),
        ),
        Value::Number(_) => (
            "number",
            format!("{}::numeric {} {}::numeric", text, symbol, param),
        ),
        Value::DateTime(_) => (
            "string",
            format!(
                "CASE WHEN {} ~ '^\\d{{4}}-\\d{{2}}-\\d{{2}}' THEN {} {} {}::timestamptz ELSE FALSE END",
                text,
                stored_timestamp(&text),
                symbol,
                param
            ),
        ),
        _ => (
            "string",
            format!("{} COLLATE \"C\" {} {} COLLATE \"C\"", text, symbol, param),
        ),
    };
    let guarded = format!(
        "(CASE WHEN jsonb_typeof({}) = '{}' THEN {} ELSE FALSE END)",
        member, json_type, comparison
    );
    match operator {
        Operator::NotEquals => format!("NOT {}", guarded),
        _ => guarded,
    }
}

/// Render a conjunction as a `WHERE` clause, empty when there is nothing
/// to filter on
pub fn where_clause(conditions: &[Condition], statement: &mut SqlStatement) -> String {
    if conditions.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = conditions
        .iter()
        .map(|condition| condition_sql(condition, statement))
        .collect();
    format!(" WHERE {}", parts.join(" AND "))
}

// ---------------------------------------------------------------------------
// SqlStore<T>
// ---------------------------------------------------------------------------

/// Store driver backed by a JSON document table
pub struct SqlStore<T> {
    table: String,
    backend: Arc<dyn SqlBackend>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for SqlStore<T> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            backend: self.backend.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Resource> SqlStore<T> {
    /// A store over the table named after the resource
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self::with_table(backend, T::descriptor().name)
    }

    pub fn with_table(backend: Arc<dyn SqlBackend>, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            backend,
            _marker: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the table if missing (idempotent)
    pub async fn ensure_table(&self) -> Result<()> {
        let statement = SqlStatement::new(format!(
            "CREATE TABLE IF NOT EXISTS {} (seq BIGSERIAL, id UUID PRIMARY KEY, data JSONB NOT NULL)",
            quote_identifier(&self.table)
        ));
        self.backend
            .execute_batch(&[statement])
            .await
            .map_err(|e| anyhow!("Failed to create table {}: {}", self.table, e))?;
        Ok(())
    }

    pub fn select_statement(&self, conditions: &[Condition], cap: Option<usize>) -> SqlStatement {
        let mut statement = SqlStatement::default();
        let filter = where_clause(conditions, &mut statement);
        let mut sql = format!(
            "SELECT data FROM {}{} ORDER BY seq",
            quote_identifier(&self.table),
            filter
        );
        if let Some(cap) = cap {
            sql.push_str(&format!(" LIMIT {}", cap));
        }
        statement.sql = sql;
        statement
    }

    pub async fn select(&self, conditions: &[Condition], cap: Option<usize>) -> Result<Vec<T>> {
        let statement = self.select_statement(conditions, cap);
        tracing::trace!(sql = %statement.sql, params = statement.params.len(), "sql select");
        self.backend
            .fetch_documents(&statement)
            .await?
            .into_iter()
            .map(|document| {
                T::from_document(document)
                    .map_err(|e| anyhow!("Failed to deserialize {} row: {}", self.table, e))
            })
            .collect()
    }

    fn row_statement(&self, sql: &str, entity: &T, with_document: bool) -> Result<SqlStatement> {
        let mut statement = SqlStatement::new(sql.replace("{table}", &quote_identifier(&self.table)));
        statement.params.push(SqlParam::Text(entity.id().to_string()));
        if with_document {
            let document = entity
                .to_document()
                .map_err(|e| anyhow!("Failed to serialize entity: {}", e))?;
            statement.params.push(SqlParam::Text(document.to_string()));
        }
        Ok(statement)
    }

    pub async fn insert(&self, entities: Vec<T>) -> Result<Vec<T>> {
        let statements = entities
            .iter()
            .map(|e| {
                self.row_statement(
                    "INSERT INTO {table} (id, data) VALUES ($1::uuid, $2::jsonb)",
                    e,
                    true,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        self.backend.execute_batch(&statements).await?;
        Ok(entities)
    }

    pub async fn update(&self, entities: Vec<T>) -> Result<Vec<T>> {
        let statements = entities
            .iter()
            .map(|e| {
                self.row_statement(
                    "UPDATE {table} SET data = $2::jsonb WHERE id = $1::uuid",
                    e,
                    true,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        self.backend.execute_batch(&statements).await?;
        Ok(entities)
    }

    pub async fn delete(&self, entities: &[T]) -> Result<usize> {
        let statements = entities
            .iter()
            .map(|e| self.row_statement("DELETE FROM {table} WHERE id = $1::uuid", e, false))
            .collect::<Result<Vec<_>>>()?;
        let affected = self.backend.execute_batch(&statements).await?;
        Ok(affected as usize)
    }
}
