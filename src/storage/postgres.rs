//! PostgreSQL backend for [`SqlStore`](crate::storage::SqlStore) using sqlx.
//!
//! # Feature flag
//!
//! This module is gated behind the `postgres` feature flag:
//! ```toml
//! [dependencies]
//! this-conditions = { version = "0.0.9", features = ["postgres"] }
//! ```

use crate::storage::sql::{SqlBackend, SqlParam, SqlStatement};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;

/// [`SqlBackend`] over a `sqlx::PgPool`
#[derive(Clone, Debug)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    /// Create a new `PgBackend` with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SqlBackend for PgBackend {
    async fn fetch_documents(&self, statement: &SqlStatement) -> Result<Vec<serde_json::Value>> {
        let mut query = sqlx::query_scalar::<_, Json<serde_json::Value>>(&statement.sql);
        for param in &statement.params {
            query = match param {
                SqlParam::Text(text) => query.bind(text.clone()),
                SqlParam::TextArray(items) => query.bind(items.clone()),
            };
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!("Failed to run query: {}", e))?;
        Ok(rows.into_iter().map(|Json(document)| document).collect())
    }

    async fn execute_batch(&self, statements: &[SqlStatement]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| anyhow!("Failed to begin transaction: {}", e))?;

        let mut affected = 0;
        for statement in statements {
            let mut query = sqlx::query(&statement.sql);
            for param in &statement.params {
                query = match param {
                    SqlParam::Text(text) => query.bind(text.clone()),
                    SqlParam::TextArray(items) => query.bind(items.clone()),
                };
            }
            let result = query
                .execute(&mut *tx)
                .await
                .map_err(|e| anyhow!("Failed to execute statement: {}", e))?;
            affected += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| anyhow!("Failed to commit transaction: {}", e))?;
        Ok(affected)
    }
}
