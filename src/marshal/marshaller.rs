use std::sync::Arc;

use super::{ObjectRecord, Row, TableRow};
use crate::core::{OrmError, Result, Value};
use crate::descriptor::InheritanceStrategy;
use crate::facade::Database;
use crate::mapping::{Column, ColumnKind, Entity, ForeignKeyTarget};

/// Converts objects to per-table rows and query rows back to objects, using
/// the resolved entity graph of one database.
pub struct Marshaller<'a> {
    db: &'a Database,
}

impl<'a> Marshaller<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Splits an object into one row per table that stores part of it, root
    /// table first. The leaf's discriminator value is written into the
    /// discriminator columns along the way.
    pub fn object_to_rows(&self, record: &ObjectRecord) -> Result<Vec<TableRow>> {
        let entity = self.resolved_entity(&record.type_name)?;
        if entity.is_abstract() {
            return Err(OrmError::Query(format!(
                "Cannot persist an instance of abstract entity '{}'",
                entity.type_name()
            )));
        }

        let chain = self.db.ancestry(&entity)?;
        let strategy = entity.strategy();
        let mut rows = Vec::new();

        match strategy {
            InheritanceStrategy::Joined => {
                for (level, member) in chain.iter().enumerate() {
                    let mut row = TableRow::new(member.id(), own_table(member)?, level);
                    for column in member.columns() {
                        self.write_column(record, &chain, level, strategy, column, &mut row)?;
                    }
                    rows.push(row);
                }
            }
            InheritanceStrategy::SingleTable => {
                let Some((root, descendants)) = chain.split_first() else {
                    return Err(OrmError::Mapping(format!(
                        "Entity '{}' has an empty ancestry",
                        entity.type_name()
                    )));
                };
                let mut row = TableRow::new(root.id(), own_table(root)?, 0);
                for column in root.columns() {
                    self.write_column(record, &chain, 0, strategy, column, &mut row)?;
                }
                for member in descendants {
                    for column in member.own_columns() {
                        self.write_column(record, &chain, 0, strategy, column, &mut row)?;
                    }
                }
                rows.push(row);
            }
            InheritanceStrategy::TablePerClass => {
                let mut row = TableRow::new(entity.id(), own_table(&entity)?, 0);
                for column in entity.columns() {
                    self.write_column(record, &chain, 0, strategy, column, &mut row)?;
                }
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Builds the object a query row over `type_name` describes, descending
    /// to the leaf type named by the discriminator. Relationship columns are
    /// not loaded.
    pub fn row_to_object(&self, type_name: &str, row: &Row) -> Result<ObjectRecord> {
        let entity = self.resolved_entity(type_name)?;
        let leaf = self.leaf_for(&entity, row)?;
        if leaf.is_abstract() {
            return Err(OrmError::Marshalling(format!(
                "Row of '{}' resolves to abstract entity '{}'",
                type_name,
                leaf.type_name()
            )));
        }

        let mut record = ObjectRecord::new(leaf.type_name());
        for member in self.db.ancestry(&leaf)? {
            let level = self.db.alias_level(&member)?;
            for column in member.own_columns() {
                if column.is_foreign_key() {
                    continue;
                }
                let Some(field) = column.field() else {
                    continue;
                };
                record.values.insert(field.to_string(), column.read(row, level)?);
            }
        }
        Ok(record)
    }

    /// Finds the most specific entity the row describes.
    pub fn leaf_for(&self, entity: &Arc<Entity>, row: &Row) -> Result<Arc<Entity>> {
        match entity.strategy() {
            InheritanceStrategy::Joined => {
                let mut current = Arc::clone(entity);
                while let Some(column) = current.discriminator_column() {
                    let stored = column.read(row, self.db.depth(&current)?)?;
                    if stop_at(&current, &stored) {
                        break;
                    }
                    let children = current
                        .children()
                        .iter()
                        .map(|id| self.db.entity_by_id(*id))
                        .collect::<Result<Vec<_>>>()?;
                    current = find_by_value(&current, children, &stored)?;
                }
                Ok(current)
            }
            InheritanceStrategy::SingleTable | InheritanceStrategy::TablePerClass => {
                if !entity.has_children() {
                    return Ok(Arc::clone(entity));
                }
                let root = self.db.root_of(entity)?;
                let Some(column) = root.discriminator_column() else {
                    return Ok(Arc::clone(entity));
                };
                let stored = column.read(row, 0)?;
                if stop_at(entity, &stored) {
                    return Ok(Arc::clone(entity));
                }
                find_by_value(entity, self.db.descendants(entity)?, &stored)
            }
        }
    }

    fn resolved_entity(&self, type_name: &str) -> Result<Arc<Entity>> {
        let entity = self.db.require_entity(type_name)?;
        if !entity.is_resolved() {
            return Err(OrmError::Query(format!(
                "Entity '{}' is not mapped; map the database first",
                type_name
            )));
        }
        Ok(entity)
    }

    fn write_column(
        &self,
        record: &ObjectRecord,
        chain: &[Arc<Entity>],
        owner: usize,
        strategy: InheritanceStrategy,
        column: &Column,
        row: &mut TableRow,
    ) -> Result<()> {
        let value = match column.kind() {
            ColumnKind::Discriminator(_) => stored_discriminator(chain, owner, strategy, column)?,
            ColumnKind::ForeignKey(target) => self.reference_value(record, column, target)?,
            ColumnKind::Simple => column
                .field()
                .map(|field| record.get(field).clone())
                .unwrap_or(Value::Null),
        };
        column.write(&value, row)
    }

    fn reference_value(
        &self,
        record: &ObjectRecord,
        column: &Column,
        target: &ForeignKeyTarget,
    ) -> Result<Value> {
        let Some(reference) = record.references.get(&target.relationship) else {
            if column.is_nullable() {
                return Ok(Value::Null);
            }
            return Err(OrmError::Query(format!(
                "'{}.{}' requires a reference for column '{}'",
                record.type_name,
                target.relationship,
                column.name()
            )));
        };

        let referenced = self.db.require_entity(&reference.target)?;
        if !self
            .db
            .ancestry(&referenced)?
            .iter()
            .any(|member| member.id() == target.entity)
        {
            return Err(OrmError::Query(format!(
                "'{}.{}' cannot refer to a '{}'",
                record.type_name, target.relationship, reference.target
            )));
        }

        let key = reference.key.as_ref().ok_or_else(|| {
            OrmError::Query(format!(
                "'{}.{}' refers to a '{}' that is not persisted yet",
                record.type_name, target.relationship, reference.target
            ))
        })?;
        key.get(target.referenced.name()).cloned().ok_or_else(|| {
            OrmError::Query(format!(
                "Reference key for '{}.{}' lacks column '{}'",
                record.type_name,
                target.relationship,
                target.referenced.name()
            ))
        })
    }
}

fn own_table(entity: &Entity) -> Result<&str> {
    entity.table_name().ok_or_else(|| {
        OrmError::Mapping(format!("Entity '{}' has no table", entity.type_name()))
    })
}

/// Value stored in a discriminator column owned by `chain[owner]`: the value
/// of the next entity on the instance's path for joined hierarchies (the
/// owner's own value when it is the instance's type), the leaf's value
/// otherwise.
fn stored_discriminator(
    chain: &[Arc<Entity>],
    owner: usize,
    strategy: InheritanceStrategy,
    column: &Column,
) -> Result<Value> {
    let source = match strategy {
        InheritanceStrategy::Joined => chain.get(owner + 1).or_else(|| chain.get(owner)),
        InheritanceStrategy::SingleTable | InheritanceStrategy::TablePerClass => chain.last(),
    };
    let source = source.ok_or_else(|| {
        OrmError::Mapping(format!(
            "No entity on the path stores discriminator column '{}'",
            column.name()
        ))
    })?;
    source.discriminator_value().cloned().ok_or_else(|| {
        OrmError::Query(format!(
            "Entity '{}' has no discriminator value for column '{}'",
            source.type_name(),
            column.name()
        ))
    })
}

fn stop_at(entity: &Entity, stored: &Value) -> bool {
    stored.is_null() || entity.discriminator_value() == Some(stored)
}

fn find_by_value(
    from: &Entity,
    candidates: Vec<Arc<Entity>>,
    stored: &Value,
) -> Result<Arc<Entity>> {
    candidates
        .into_iter()
        .find(|candidate| candidate.discriminator_value() == Some(stored))
        .ok_or_else(|| {
            OrmError::Marshalling(format!(
                "Discriminator value '{}' matches no entity below '{}'",
                stored,
                from.type_name()
            ))
        })
}
