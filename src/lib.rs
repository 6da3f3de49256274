// ============================================================================
// entitymap: entity mapping and schema synthesis
// ============================================================================

//! Maps declaratively described domain types onto relational tables.
//!
//! A [`Database`] collects [`EntityDescriptor`]s, resolves them concurrently
//! into an entity graph (parents, children, columns, relationships and
//! discriminators), synthesizes `CREATE TABLE` text for the embedded SQL
//! engine and converts polymorphic objects to and from rows.

pub mod connection;
pub mod core;
pub mod ddl;
pub mod descriptor;
pub mod facade;
pub mod mapping;
pub mod marshal;
pub mod prelude;
pub mod session;
pub mod storage;

// Re-export main types for convenience
pub use connection::config::DatabaseConfig;
pub use connection::{Migrator, SqlConnection};
pub use core::{OrmError, Result, Value};
pub use descriptor::EntityDescriptor;
pub use facade::Database;
pub use marshal::{MappedObject, ObjectRecord, Reference, Row, TableRow};
pub use session::Session;
pub use storage::SchemaDump;
