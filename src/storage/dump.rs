//! Schema dump handed to the migration framework.
//!
//! A dump preserves the rows of every mapped table across a non-additive
//! schema change: take it before dropping tables, recreate the schema, then
//! replay `restore_statements`.

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::connection::SqlConnection;
use crate::core::naming::{quote_identifier, quote_identifier_list, sql_literal_list};
use crate::core::{Result, Value};
use crate::facade::Database;

/// Rows of one table, in select-list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDump {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TableDump {
    pub fn select_statement(&self) -> String {
        select_statement(&self.table, &self.columns)
    }

    /// Fails when a row holds a value with no SQL literal.
    pub fn insert_statements(&self) -> Result<Vec<String>> {
        let columns = quote_identifier_list(self.columns.iter().map(String::as_str));
        self.rows
            .iter()
            .map(|row| -> Result<String> {
                Ok(format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quote_identifier(&self.table),
                    columns,
                    sql_literal_list(row)?
                ))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpMetadata {
    pub created_at: DateTime<Utc>,
    pub row_count: usize,
    pub table_count: usize,
}

/// Contents of every table of a database at one schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDump {
    pub database: String,
    pub version: u32,
    /// Entity tables first, then join tables.
    pub tables: Vec<TableDump>,
    pub metadata: DumpMetadata,
}

impl SchemaDump {
    pub fn new(database: &str, version: u32, tables: Vec<TableDump>) -> Self {
        let row_count = tables.iter().map(|table| table.rows.len()).sum();
        let table_count = tables.len();
        Self {
            database: database.to_string(),
            version,
            tables,
            metadata: DumpMetadata {
                created_at: Utc::now(),
                row_count,
                table_count,
            },
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableDump> {
        self.tables.iter().find(|table| table.table == name)
    }

    /// `INSERT`s recreating every dumped row, table by table.
    pub fn restore_statements(&self) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for table in &self.tables {
            statements.extend(table.insert_statements()?);
        }
        Ok(statements)
    }
}

fn select_statement(table: &str, columns: &[String]) -> String {
    format!(
        "SELECT {} FROM {}",
        quote_identifier_list(columns.iter().map(String::as_str)),
        quote_identifier(table)
    )
}

/// Reads every table of `db` through `conn`.
pub async fn dump(db: &Database, conn: &mut dyn SqlConnection) -> Result<SchemaDump> {
    let layout = db.table_layout().await?;
    let mut tables = Vec::with_capacity(layout.len());
    for (table, columns) in layout {
        let rows = conn.query(&select_statement(&table, &columns)).await?;
        tables.push(TableDump {
            table,
            columns,
            rows,
        });
    }

    let dump = SchemaDump::new(db.name(), db.version(), tables);
    info!(
        "Dumped {} rows from {} tables of database '{}'",
        dump.metadata.row_count,
        dump.metadata.table_count,
        dump.database
    );
    Ok(dump)
}
