pub mod config;
pub mod recording;

use std::fmt;

use async_trait::async_trait;
use log::warn;

use crate::core::{Result, Value};
use crate::facade::Database;

/// Connection to the embedded SQL engine.
///
/// Implemented by the storage-engine wrapper; this crate only issues
/// DDL/DML text through it.
#[async_trait]
pub trait SqlConnection: Send {
    /// Execute a statement, returning the number of affected rows
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Execute a query, returning its rows in select-list order
    async fn query(&mut self, sql: &str) -> Result<Vec<Vec<Value>>>;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// Upgrade/downgrade hooks run while the database is marked not ready.
#[async_trait]
pub trait Migrator: Send + Sync + fmt::Debug {
    async fn upgrade(
        &self,
        db: &Database,
        conn: &mut dyn SqlConnection,
        from_version: u32,
        to_version: u32,
    ) -> Result<()>;

    async fn downgrade(
        &self,
        db: &Database,
        conn: &mut dyn SqlConnection,
        from_version: u32,
        to_version: u32,
    ) -> Result<()>;
}

/// Runs all statements in one transaction, rolling back on the first failure.
pub async fn run_in_transaction(
    conn: &mut dyn SqlConnection,
    statements: &[String],
) -> Result<()> {
    conn.begin().await?;
    for sql in statements {
        if let Err(err) = conn.execute(sql).await {
            warn!("Rolling back after failed statement: {}", err);
            if let Err(rollback_err) = conn.rollback().await {
                warn!("Rollback failed: {}", rollback_err);
            }
            return Err(err);
        }
    }
    conn.commit().await
}
