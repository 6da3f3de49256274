//! Declarative mapping metadata.
//!
//! Descriptors are plain data: they are built by hand, generated, or
//! deserialized from a configuration file, and handed to a `Database`
//! before resolution starts. Resolution never mutates them.

mod entity;
mod field;

pub use entity::{DiscriminatorDescriptor, EntityDescriptor, InheritanceStrategy, TableDescriptor};
pub use field::{
    ColumnDescriptor, FieldDescriptor, FieldMapping, JoinColumnDescriptor, JoinTableDescriptor,
    RelationshipDescriptor, RelationshipKind,
};
