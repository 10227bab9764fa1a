use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, Statement,
    TransactionTrait, Value,
};
use tracing::debug;

use crate::config::AdvisoryLockStrategy;
use crate::error::HierarchyError;

/// Transaction that holds a PostgreSQL advisory lock for its lifetime.
///
/// The lock is transaction-scoped, so PostgreSQL releases it on commit or
/// rollback. On other backends the strategy is ignored and a plain
/// transaction is used.
pub struct LockedTransaction {
    txn: Option<DatabaseTransaction>,
}

impl LockedTransaction {
    pub async fn acquire(
        strategy: &AdvisoryLockStrategy,
        db: &DatabaseConnection,
    ) -> Result<Self, HierarchyError> {
        let key = match (db.get_database_backend(), strategy) {
            (DbBackend::Postgres, AdvisoryLockStrategy::Namespaced(key)) => Some(key.as_str()),
            _ => None,
        };

        let txn = db.begin().await?;

        if let Some(key) = key {
            if let Err(err) = acquire_lock(&txn, key).await {
                let _ = txn.rollback().await;
                return Err(err);
            }
            debug!(key = %key, "advisory lock acquired");
        }

        Ok(Self { txn: Some(txn) })
    }

    pub fn connection(&self) -> Result<&DatabaseTransaction, HierarchyError> {
        self.txn
            .as_ref()
            .ok_or_else(|| HierarchyError::invariant("transaction already consumed"))
    }

    pub async fn commit(mut self) -> Result<(), HierarchyError> {
        if let Some(txn) = self.txn.take() {
            txn.commit().await?;
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), HierarchyError> {
        if let Some(txn) = self.txn.take() {
            txn.rollback().await?;
        }
        Ok(())
    }
}

async fn acquire_lock(txn: &DatabaseTransaction, key: &str) -> Result<(), HierarchyError> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1), 0)",
        vec![Value::from(key)],
    ))
    .await?;
    Ok(())
}
