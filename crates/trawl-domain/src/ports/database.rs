//! Database executor port.
//!
//! Abstraction for SQL execution so repositories and application code do
//! not depend on a concrete driver (e.g. SQLite/sqlx). Implementations
//! live in the provider crate and are injected by the tenant router.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Parameter for prepared statement binding (driver-agnostic).
#[derive(Debug, Clone)]
pub enum SqlParam {
    /// String value
    String(String),
    /// 64-bit integer
    I64(i64),
    /// 64-bit float
    F64(f64),
    /// Boolean (stored as integer on SQLite)
    Bool(bool),
    /// Null
    Null,
}

/// One statement plus its bound parameters, for transactional batches.
#[derive(Debug, Clone)]
pub struct SqlStatement {
    /// The SQL text
    pub sql: String,
    /// Bound parameters in order
    pub params: Vec<SqlParam>,
}

impl SqlStatement {
    /// Build a statement.
    pub fn new(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Abstraction for a single query result row.
///
/// Implementations wrap driver-specific rows and expose values by column
/// name so repository code can map to domain entities without depending on
/// the driver.
pub trait SqlRow: Send + Sync {
    /// Try to get a string by column name.
    ///
    /// # Errors
    /// Returns an error when the column cannot be decoded.
    fn try_get_string(&self, name: &str) -> Result<Option<String>>;

    /// Try to get an i64 by column name.
    ///
    /// # Errors
    /// Returns an error when the column cannot be decoded.
    fn try_get_i64(&self, name: &str) -> Result<Option<i64>>;

    /// Try to get an f64 by column name.
    ///
    /// # Errors
    /// Returns an error when the column cannot be decoded.
    fn try_get_f64(&self, name: &str) -> Result<Option<f64>>;

    /// Try to get a bool by column name (integer-backed on SQLite).
    ///
    /// # Errors
    /// Returns an error when the column cannot be decoded.
    fn try_get_bool(&self, name: &str) -> Result<Option<bool>> {
        Ok(self.try_get_i64(name)?.map(|v| v != 0))
    }
}

/// Port for executing SQL.
///
/// Repositories depend on this trait; they do not hold pools or use driver
/// types directly.
#[async_trait]
pub trait DatabaseExecutor: Send + Sync {
    /// Execute a statement without results.
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<()>;

    /// Execute a batch of statements inside one transaction.
    async fn execute_transaction(&self, statements: &[SqlStatement]) -> Result<()>;

    /// Fetch at most one row.
    async fn query_one(&self, sql: &str, params: &[SqlParam]) -> Result<Option<Arc<dyn SqlRow>>>;

    /// Fetch all rows.
    async fn query_all(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Arc<dyn SqlRow>>>;
}
