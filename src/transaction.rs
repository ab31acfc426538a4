//! The batch-wide transaction handle: real when a transactional store is
//! configured, a no-op stub otherwise.

use crate::error::ApiError;
use sqlx::postgres::PgConnection;
use sqlx::PgPool;

/// Selected once at batch start. Every operation in the batch reads and
/// writes through this one handle; no processor opens its own transaction.
pub enum Transaction {
    Pg(sqlx::Transaction<'static, sqlx::Postgres>),
    Noop,
}

impl Transaction {
    /// Opens a real transaction when a pool is configured, otherwise a no-op
    /// stub so non-transactional backends stay supported.
    pub async fn begin(pool: Option<&PgPool>) -> Result<Self, ApiError> {
        match pool {
            Some(pool) => Ok(Transaction::Pg(pool.begin().await?)),
            None => Ok(Transaction::Noop),
        }
    }

    /// The database connection, for processors that need one. `None` on the
    /// no-op stub.
    pub fn connection(&mut self) -> Option<&mut PgConnection> {
        match self {
            Transaction::Pg(tx) => Some(&mut *tx),
            Transaction::Noop => None,
        }
    }

    pub async fn commit(self) -> Result<(), ApiError> {
        match self {
            Transaction::Pg(tx) => Ok(tx.commit().await?),
            Transaction::Noop => Ok(()),
        }
    }

    /// Rolls back, recording the error that triggered it. Rollback failures
    /// are logged rather than surfaced so the triggering error stays primary.
    pub async fn rollback(self, cause: &ApiError) {
        match self {
            Transaction::Pg(tx) => {
                tracing::warn!(error = %cause, "rolling back batch");
                if let Err(e) = tx.rollback().await {
                    tracing::warn!(error = %e, "rollback failed");
                }
            }
            Transaction::Noop => {
                tracing::debug!(error = %cause, "batch failed (no transactional store)");
            }
        }
    }
}
