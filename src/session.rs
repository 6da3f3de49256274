use std::sync::Arc;

use log::{debug, info};

use crate::connection::{SqlConnection, run_in_transaction};
use crate::core::naming::{quote_identifier, sql_literal, sql_literal_list};
use crate::core::{OrmError, Result};
use crate::facade::Database;
use crate::marshal::{MappedObject, ObjectRecord, TableRow};

/// Persists, updates and removes single objects over one connection.
///
/// Each operation waits until the database is ready and runs as one
/// transaction.
pub struct Session<C> {
    db: Arc<Database>,
    conn: C,
}

impl<C: SqlConnection> Session<C> {
    pub fn new(db: Arc<Database>, conn: C) -> Self {
        Self { db, conn }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn into_connection(self) -> C {
        self.conn
    }

    pub async fn persist<T: MappedObject>(&mut self, object: &T) -> Result<()> {
        self.persist_record(&object.to_record()).await
    }

    pub async fn update<T: MappedObject>(&mut self, object: &T) -> Result<()> {
        self.update_record(&object.to_record()).await
    }

    pub async fn remove<T: MappedObject>(&mut self, object: &T) -> Result<()> {
        self.remove_record(&object.to_record()).await
    }

    /// Inserts one row per table, root table first.
    pub async fn persist_record(&mut self, record: &ObjectRecord) -> Result<()> {
        let rows = self.prepare(record).await?;
        let statements = rows
            .iter()
            .map(insert_statement)
            .collect::<Result<Vec<_>>>()?;
        self.run("persist", record, &statements).await
    }

    /// Updates every non-key column, keyed by the primary key.
    pub async fn update_record(&mut self, record: &ObjectRecord) -> Result<()> {
        let rows = self.prepare(record).await?;
        let mut statements = Vec::new();
        for row in &rows {
            if let Some(statement) = self.update_statement(row)? {
                statements.push(statement);
            }
        }
        self.run("update", record, &statements).await
    }

    /// Deletes the object's rows, leaf table first.
    pub async fn remove_record(&mut self, record: &ObjectRecord) -> Result<()> {
        let rows = self.prepare(record).await?;
        let mut statements = Vec::new();
        for row in rows.iter().rev() {
            statements.push(format!(
                "DELETE FROM {} WHERE {}",
                quote_identifier(row.table()),
                self.key_condition(row)?
            ));
        }
        self.run("remove", record, &statements).await
    }

    async fn prepare(&self, record: &ObjectRecord) -> Result<Vec<TableRow>> {
        self.db.require_mapped().await?;
        self.db.wait_ready().await;
        self.db.marshaller().object_to_rows(record)
    }

    async fn run(
        &mut self,
        operation: &str,
        record: &ObjectRecord,
        statements: &[String],
    ) -> Result<()> {
        for statement in statements {
            debug!("{} {}: {}", operation, record.type_name, statement);
        }
        run_in_transaction(&mut self.conn, statements).await?;
        info!(
            "{} of '{}' committed ({} statements)",
            operation,
            record.type_name,
            statements.len()
        );
        Ok(())
    }

    fn update_statement(&self, row: &TableRow) -> Result<Option<String>> {
        let keys = self.key_names(row)?;
        let assignments = row
            .values()
            .iter()
            .filter(|(column, _)| !keys.contains(column))
            .map(|(column, value)| -> Result<String> {
                Ok(format!("{} = {}", quote_identifier(column), sql_literal(value)?))
            })
            .collect::<Result<Vec<_>>>()?;
        if assignments.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!(
            "UPDATE {} SET {} WHERE {}",
            quote_identifier(row.table()),
            assignments.join(", "),
            self.key_condition(row)?
        )))
    }

    fn key_names(&self, row: &TableRow) -> Result<Vec<String>> {
        let owner = self.db.entity_by_id(row.entity())?;
        let keys: Vec<String> = owner
            .primary_keys()
            .iter()
            .map(|column| column.name().to_string())
            .collect();
        if keys.is_empty() {
            return Err(OrmError::Mapping(format!(
                "Table '{}' has no primary key",
                row.table()
            )));
        }
        Ok(keys)
    }

    fn key_condition(&self, row: &TableRow) -> Result<String> {
        let mut conditions = Vec::new();
        for key in self.key_names(row)? {
            let value = row
                .get(&key)
                .filter(|value| !value.is_null())
                .ok_or_else(|| {
                    OrmError::Query(format!(
                        "Primary key '{}' of table '{}' has no value",
                        key,
                        row.table()
                    ))
                })?;
            conditions.push(format!("{} = {}", quote_identifier(&key), sql_literal(value)?));
        }
        Ok(conditions.join(" AND "))
    }
}

fn insert_statement(row: &TableRow) -> Result<String> {
    let columns: Vec<String> = row.columns().map(quote_identifier).collect();
    let values = sql_literal_list(row.values().iter().map(|(_, value)| value))?;
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(row.table()),
        columns.join(", "),
        values
    ))
}
