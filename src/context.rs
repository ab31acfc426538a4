//! Per-request context: the active transaction handle and, once resolved,
//! the authenticated user.

use crate::error::ApiError;
use crate::resource::Resource;
use crate::transaction::Transaction;
use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};

/// Owned by one `execute_operations` call at a time: created fresh per call
/// unless explicitly supplied, its transaction handle cleared when that call
/// returns regardless of outcome.
///
/// The transaction is shared read-and-write by every operation of the batch;
/// access serializes on the handle itself.
#[derive(Default)]
pub struct AppContext {
    transaction: Mutex<Option<Transaction>>,
    user: std::sync::RwLock<Option<Resource>>,
}

impl AppContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn begin(&self, pool: Option<&PgPool>) -> Result<(), ApiError> {
        let tx = Transaction::begin(pool).await?;
        *self.transaction.lock().await = Some(tx);
        Ok(())
    }

    /// Commits and clears the handle. The handle is taken out before the
    /// commit so it is released even when the commit itself fails.
    pub(crate) async fn commit(&self) -> Result<(), ApiError> {
        match self.transaction.lock().await.take() {
            Some(tx) => tx.commit().await,
            None => Ok(()),
        }
    }

    /// Rolls back with the triggering error and clears the handle.
    pub(crate) async fn rollback(&self, cause: &ApiError) {
        if let Some(tx) = self.transaction.lock().await.take() {
            tx.rollback(cause).await;
        }
    }

    /// Lock for the duration of one storage call. Processors run all their
    /// statements under a single acquisition so concurrent operations
    /// interleave between calls, never inside one.
    pub async fn lock_transaction(&self) -> MutexGuard<'_, Option<Transaction>> {
        self.transaction.lock().await
    }

    pub fn user(&self) -> Option<Resource> {
        self.user.read().expect("user lock poisoned").clone()
    }

    pub fn set_user(&self, user: Resource) {
        *self.user.write().expect("user lock poisoned") = Some(user);
    }
}
