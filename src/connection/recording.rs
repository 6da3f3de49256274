use std::collections::HashMap;

use async_trait::async_trait;

use super::SqlConnection;
use crate::core::{OrmError, Result, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Active,
    InTransaction,
}

/// Connection that records every statement instead of executing it.
///
/// Useful for dry runs (capturing the schema script) and tests. Queries are
/// answered from canned results registered per table name.
#[derive(Debug)]
pub struct RecordingConnection {
    state: ConnectionState,
    log: Vec<String>,
    results: HashMap<String, Vec<Vec<Value>>>,
    fail_on: Option<String>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Active,
            log: Vec::new(),
            results: HashMap::new(),
            fail_on: None,
        }
    }

    /// Makes any statement containing `fragment` fail.
    pub fn fail_on(mut self, fragment: &str) -> Self {
        self.fail_on = Some(fragment.to_string());
        self
    }

    /// Rows returned by queries selecting from `table`.
    pub fn with_rows(mut self, table: &str, rows: Vec<Vec<Value>>) -> Self {
        self.results.insert(table.to_string(), rows);
        self
    }

    /// Every statement executed so far, including `BEGIN`/`COMMIT`/`ROLLBACK`.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Executed statements excluding transaction control.
    pub fn statements(&self) -> Vec<&str> {
        self.log
            .iter()
            .map(String::as_str)
            .filter(|sql| !matches!(*sql, "BEGIN" | "COMMIT" | "ROLLBACK"))
            .collect()
    }

    pub fn is_in_transaction(&self) -> bool {
        self.state == ConnectionState::InTransaction
    }

    fn check(&self, sql: &str) -> Result<()> {
        match &self.fail_on {
            Some(fragment) if sql.contains(fragment.as_str()) => Err(OrmError::Storage(format!(
                "statement rejected: {}",
                sql
            ))),
            _ => Ok(()),
        }
    }
}

impl Default for RecordingConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SqlConnection for RecordingConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.check(sql)?;
        self.log.push(sql.to_string());
        Ok(1)
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Vec<Value>>> {
        self.check(sql)?;
        self.log.push(sql.to_string());
        let rows = self
            .results
            .iter()
            .find(|(table, _)| sql.contains(&format!("FROM \"{}\"", table)))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        Ok(rows)
    }

    async fn begin(&mut self) -> Result<()> {
        if self.state == ConnectionState::InTransaction {
            return Err(OrmError::Storage("Transaction already active".into()));
        }
        self.state = ConnectionState::InTransaction;
        self.log.push("BEGIN".to_string());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.state != ConnectionState::InTransaction {
            return Err(OrmError::Storage("No active transaction".into()));
        }
        self.state = ConnectionState::Active;
        self.log.push("COMMIT".to_string());
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.state != ConnectionState::InTransaction {
            return Err(OrmError::Storage("No active transaction".into()));
        }
        self.state = ConnectionState::Active;
        self.log.push("ROLLBACK".to_string());
        Ok(())
    }
}
