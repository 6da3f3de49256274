//! Everything needed to describe, map and use a database.

pub use crate::connection::config::DatabaseConfig;
pub use crate::connection::{Migrator, SqlConnection};
pub use crate::core::{
    AttributeType, DiscriminatorKind, ForeignKeyAction, OrmError, Result, SqlType, Value,
};
pub use crate::descriptor::{
    ColumnDescriptor, DiscriminatorDescriptor, EntityDescriptor, FieldDescriptor,
    InheritanceStrategy, JoinColumnDescriptor, JoinTableDescriptor, RelationshipDescriptor,
    RelationshipKind, TableDescriptor,
};
pub use crate::facade::Database;
pub use crate::mapping::{Column, Entity, EntityId, Relationship};
pub use crate::marshal::{MappedObject, ObjectRecord, Reference, Row, TableRow};
pub use crate::session::Session;
pub use crate::storage::SchemaDump;
