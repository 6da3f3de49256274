//! Resolved entity graph.
//!
//! Entities live in an arena owned by their `Database` and refer to each
//! other by `EntityId`. Every field that resolution computes is published
//! once through a `Promise` and is read without locking afterwards.

mod column;
mod entity;
mod promise;
mod relationship;
pub(crate) mod resolver;

pub use column::{Column, ColumnKind, ColumnMapping, ForeignKeyTarget};
pub use entity::{Entity, EntityId};
pub use promise::Promise;
pub use relationship::{JoinTable, Relationship};
