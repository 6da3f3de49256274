//! Per-entity resolution task.
//!
//! Each registered entity is resolved by exactly one task. Steps publish
//! their results through the entity's promises; a task that needs another
//! entity's partial state awaits the matching promise:
//!
//! 1. parent link (awaits only the candidate parent having *started*),
//! 2. hierarchy barrier, then child set, strategy and table name,
//! 3. relationships (descriptor-only),
//! 4. base columns: own plain columns, inherited copies and the discriminator
//!    (awaits the parent's base columns),
//! 5. full columns: adds relationship foreign keys (awaits each target's base
//!    columns only, so mutual and self references cannot deadlock),
//! 6. discriminator values of the entities whose column this entity owns.

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;
use tracing::{Instrument, info_span};

use super::{Column, Entity, EntityId, ForeignKeyTarget, JoinTable, Relationship};
use crate::core::naming::{
    default_foreign_key_name, default_join_table_name, default_table_name,
};
use crate::core::{ForeignKeyAction, OrmError, Result, Value};
use crate::descriptor::{
    DiscriminatorDescriptor, EntityDescriptor, FieldMapping, InheritanceStrategy,
    JoinColumnDescriptor, RelationshipKind,
};
use crate::facade::Database;

pub(crate) async fn resolve_entity(db: &Database, entity: &Arc<Entity>) -> Result<()> {
    let span = info_span!(
        "resolve_entity",
        entity = entity.type_name(),
        id = entity.id().index()
    );
    resolve_steps(db, entity).instrument(span).await
}

async fn resolve_steps(db: &Database, entity: &Arc<Entity>) -> Result<()> {
    entity.parent_started.fulfill(());
    let parent = link_parent(db, entity).await?;

    db.wait_hierarchy_linked().await;
    entity.seal_children()?;
    check_acyclic(db, entity)?;

    let strategy = resolve_strategy(db, entity)?;
    resolve_table_name(entity, strategy, parent.is_some())?;
    resolve_relationships(db, entity)?;

    let discriminator = resolve_base_columns(db, entity, strategy, parent.as_ref()).await?;
    resolve_columns(db, entity, strategy, parent.as_ref()).await?;

    if parent.is_none() {
        let own = own_discriminator_value(entity, discriminator.as_ref())?;
        entity.discriminator_value.fulfill(own);
    }
    if let Some(discriminator) = &discriminator {
        coerce_discriminator_values(db, entity, strategy, discriminator).await?;
    }
    entity.discriminator_value.wait().await;

    debug!(
        "Resolved entity '{}': table {:?}, {} columns, {} relationships",
        entity.type_name(),
        entity.table_name(),
        entity.columns().len(),
        entity.relationships().len()
    );
    Ok(())
}

/// The first ancestor that is a registered entity becomes the parent.
async fn link_parent(db: &Database, entity: &Arc<Entity>) -> Result<Option<Arc<Entity>>> {
    for ancestor in &entity.descriptor().ancestors {
        let Some(candidate) = db.wait_recognized(ancestor).await else {
            continue;
        };
        candidate.parent_started.wait().await;
        candidate.add_child(entity.id())?;
        entity.parent.fulfill(Some(candidate.id()));
        debug!("'{}' extends '{}'", entity.type_name(), candidate.type_name());
        return Ok(Some(candidate));
    }
    entity.parent.fulfill(None);
    Ok(None)
}

/// Descriptors can declare ancestor chains that loop; a type system cannot.
fn check_acyclic(db: &Database, entity: &Entity) -> Result<()> {
    let mut seen = HashSet::from([entity.id()]);
    let mut current = entity.parent();
    while let Some(id) = current {
        if !seen.insert(id) {
            return Err(OrmError::configuration(
                entity.type_name(),
                "ancestor chain contains a cycle",
            ));
        }
        current = db.entity_by_id(id)?.parent();
    }
    Ok(())
}

fn resolve_strategy(db: &Database, entity: &Arc<Entity>) -> Result<InheritanceStrategy> {
    let root = db.root_of(entity)?;
    let strategy = root
        .descriptor()
        .inheritance
        .unwrap_or(db.config().default_inheritance);

    if let Some(declared) = entity.descriptor().inheritance {
        if declared != strategy {
            return Err(OrmError::configuration(
                entity.type_name(),
                format!(
                    "declares {:?} inheritance but its hierarchy root '{}' uses {:?}",
                    declared,
                    root.type_name(),
                    strategy
                ),
            ));
        }
    }
    entity.strategy.fulfill(strategy);
    Ok(strategy)
}

fn resolve_table_name(
    entity: &Entity,
    strategy: InheritanceStrategy,
    has_parent: bool,
) -> Result<()> {
    let needs_table = match strategy {
        InheritanceStrategy::Joined => true,
        InheritanceStrategy::SingleTable => !has_parent,
        InheritanceStrategy::TablePerClass => !entity.is_abstract(),
    };

    let name = if needs_table {
        let table = entity.descriptor().table.as_ref().ok_or_else(|| {
            OrmError::configuration(
                entity.type_name(),
                format!("{:?} inheritance requires table metadata", strategy),
            )
        })?;
        Some(
            table
                .name
                .clone()
                .unwrap_or_else(|| default_table_name(entity.type_name())),
        )
    } else {
        None
    };
    entity.table_name.fulfill(name);
    Ok(())
}

fn resolve_relationships(db: &Database, entity: &Entity) -> Result<()> {
    let descriptor = entity.descriptor();
    let mut relationships = Vec::new();

    for field in descriptor.fields.iter().filter(|field| !field.transient) {
        let FieldMapping::Relationship(relationship) = &field.mapping else {
            continue;
        };
        let linked = db.entity(&relationship.target).ok_or_else(|| {
            OrmError::field_configuration(
                entity.type_name(),
                &field.name,
                format!("target '{}' is not an entity", relationship.target),
            )
        })?;
        let linked_ancestors: Vec<Arc<Entity>> = linked
            .descriptor()
            .ancestors
            .iter()
            .filter_map(|name| db.entity(name))
            .collect();
        let ancestors: Vec<(EntityId, &EntityDescriptor)> = linked_ancestors
            .iter()
            .map(|ancestor| (ancestor.id(), ancestor.descriptor()))
            .collect();
        relationships.push(Arc::new(Relationship::classify(
            entity.id(),
            descriptor,
            &field.name,
            relationship,
            linked.id(),
            linked.descriptor(),
            &ancestors,
        )?));
    }

    entity.relationships.fulfill(relationships.into());
    Ok(())
}

/// Publishes own plain columns, inherited copies and (when owned) the
/// discriminator column. Returns the discriminator descriptor when this
/// entity owns the column.
async fn resolve_base_columns(
    db: &Database,
    entity: &Arc<Entity>,
    strategy: InheritanceStrategy,
    parent: Option<&Arc<Entity>>,
) -> Result<Option<DiscriminatorDescriptor>> {
    let mut columns: Vec<Arc<Column>> = Vec::new();
    if let Some(parent) = parent {
        let inherited = parent.wait_base_columns().await;
        columns.extend(
            inherited
                .iter()
                .filter(|column| {
                    strategy == InheritanceStrategy::TablePerClass || column.is_primary_key()
                })
                .map(|column| Arc::new(column.inherited_copy())),
        );
    }

    let mut own = Vec::new();
    for field in entity.descriptor().fields.iter().filter(|field| !field.transient) {
        let FieldMapping::Column { attribute, id, column } = &field.mapping else {
            continue;
        };
        if *id && parent.is_some() {
            return Err(OrmError::field_configuration(
                entity.type_name(),
                &field.name,
                "only a hierarchy root can declare primary key columns",
            ));
        }
        own.push(Column::simple(entity.id(), &field.name, attribute.clone(), *id, column));
    }

    let owns_discriminator = entity.has_children()
        && (strategy == InheritanceStrategy::Joined || parent.is_none());
    let discriminator = if owns_discriminator {
        let descriptor = find_discriminator_descriptor(db, entity)?;
        if let Some(parent) = parent {
            // one value kind per hierarchy
            let parent_descriptor = find_discriminator_descriptor(db, parent)?;
            if parent_descriptor.kind != descriptor.kind {
                return Err(OrmError::configuration(
                    entity.type_name(),
                    format!(
                        "discriminator kind {:?} differs from the kind {:?} used by '{}'",
                        descriptor.kind,
                        parent_descriptor.kind,
                        parent.type_name()
                    ),
                ));
            }
        }
        match own.iter().position(|column| column.name() == descriptor.name) {
            Some(index) => {
                let explicit = own.remove(index);
                if explicit.is_primary_key() {
                    return Err(OrmError::configuration(
                        entity.type_name(),
                        format!(
                            "primary key column '{}' cannot be the discriminator",
                            descriptor.name
                        ),
                    ));
                }
                if explicit.attribute().sql_type() != descriptor.kind.attribute_type().sql_type() {
                    return Err(OrmError::configuration(
                        entity.type_name(),
                        format!(
                            "column '{}' of type {} cannot hold {:?} discriminator values",
                            descriptor.name,
                            explicit.attribute(),
                            descriptor.kind
                        ),
                    ));
                }
                own.insert(index, explicit.into_discriminator(descriptor.kind));
            }
            None => own.push(Column::discriminator(entity.id(), &descriptor)),
        }
        Some(descriptor)
    } else {
        None
    };

    columns.extend(own.into_iter().map(Arc::new));

    if parent.is_none() && !columns.iter().any(|column| column.is_primary_key()) {
        return Err(OrmError::configuration(
            entity.type_name(),
            "hierarchy root declares no primary key",
        ));
    }
    check_unique_names(entity, &columns)?;
    entity.base_columns.fulfill(columns.into());
    Ok(discriminator)
}

/// Nearest declaration among the entity itself and its ancestors.
fn find_discriminator_descriptor(
    db: &Database,
    entity: &Arc<Entity>,
) -> Result<DiscriminatorDescriptor> {
    db.ancestry(entity)?
        .iter()
        .rev()
        .find_map(|candidate| candidate.descriptor().discriminator_column.clone())
        .ok_or_else(|| {
            OrmError::configuration(
                entity.type_name(),
                "has child entities but no discriminator column is declared",
            )
        })
}

async fn resolve_columns(
    db: &Database,
    entity: &Arc<Entity>,
    strategy: InheritanceStrategy,
    parent: Option<&Arc<Entity>>,
) -> Result<()> {
    let mut columns: Vec<Arc<Column>> = entity.wait_base_columns().await.to_vec();

    if let (InheritanceStrategy::TablePerClass, Some(parent)) = (strategy, parent) {
        let inherited = parent.wait_columns().await;
        columns.extend(
            inherited
                .iter()
                .filter(|column| column.is_foreign_key())
                .map(|column| Arc::new(column.inherited_copy())),
        );
    }

    for relationship in entity.relationships() {
        if !relationship.has_local_foreign_key() {
            continue;
        }
        let target = db.entity_by_id(relationship.linked())?;
        let target_columns = target.wait_base_columns().await;
        let specs = join_column_specs(
            entity.type_name(),
            relationship.field(),
            relationship.join_columns(),
            &target,
            &target_columns,
            |referenced| default_foreign_key_name(relationship.field(), referenced),
        )?;

        let single = specs.len() == 1;
        for spec in specs {
            let unique =
                spec.unique || (single && relationship.kind() == RelationshipKind::OneToOne);
            columns.push(Arc::new(Column::new_foreign_key(
                entity.id(),
                spec.name,
                spec.nullable,
                unique,
                ForeignKeyTarget {
                    entity: target.id(),
                    relationship: relationship.field().to_string(),
                    referenced: spec.referenced,
                    on_update: spec.on_update.unwrap_or(db.config().default_on_update),
                    on_delete: spec.on_delete.unwrap_or(db.config().default_on_delete),
                },
            )));
        }
    }

    check_unique_names(entity, &columns)?;
    entity.columns.fulfill(columns.into());
    Ok(())
}

/// A root's own value, coerced by its own discriminator column. Roots without
/// a column (or without a declared value) have none.
fn own_discriminator_value(
    entity: &Entity,
    discriminator: Option<&DiscriminatorDescriptor>,
) -> Result<Option<Value>> {
    match (discriminator, &entity.descriptor().discriminator_value) {
        (Some(descriptor), Some(raw)) => coerce_value(entity, descriptor, raw).map(Some),
        _ => Ok(None),
    }
}

/// Coerces and checks the values stored in this entity's discriminator column:
/// its direct children for joined hierarchies, every descendant otherwise.
async fn coerce_discriminator_values(
    db: &Database,
    owner: &Arc<Entity>,
    strategy: InheritanceStrategy,
    descriptor: &DiscriminatorDescriptor,
) -> Result<()> {
    let targets = match strategy {
        InheritanceStrategy::Joined => owner
            .children()
            .iter()
            .map(|id| db.entity_by_id(*id))
            .collect::<Result<Vec<_>>>()?,
        InheritanceStrategy::SingleTable | InheritanceStrategy::TablePerClass => {
            db.descendants(owner)?
        }
    };

    let mut taken: Vec<(Value, String)> = Vec::new();
    if let Some(own) = owner.discriminator_value.wait().await {
        taken.push((own.clone(), owner.type_name().to_string()));
    }

    for target in targets {
        let raw = target.descriptor().discriminator_value.as_deref().ok_or_else(|| {
            OrmError::configuration(
                target.type_name(),
                format!("extends '{}' but declares no discriminator value", owner.type_name()),
            )
        })?;
        let value = coerce_value(&target, descriptor, raw)?;
        if let Some((_, holder)) = taken.iter().find(|(taken, _)| *taken == value) {
            return Err(OrmError::configuration(
                target.type_name(),
                format!("discriminator value '{}' is already used by '{}'", value, holder),
            ));
        }
        taken.push((value.clone(), target.type_name().to_string()));
        target.discriminator_value.fulfill(Some(value));
    }
    Ok(())
}

fn coerce_value(entity: &Entity, descriptor: &DiscriminatorDescriptor, raw: &str) -> Result<Value> {
    let value = descriptor.kind.coerce(raw).map_err(|reason| {
        OrmError::configuration(entity.type_name(), format!("discriminator value {}", reason))
    })?;
    if let (Some(length), Some(text)) = (descriptor.length, value.as_str()) {
        if text.chars().count() > length {
            return Err(OrmError::configuration(
                entity.type_name(),
                format!(
                    "discriminator value '{}' exceeds the column length {}",
                    text, length
                ),
            ));
        }
    }
    Ok(value)
}

fn check_unique_names(entity: &Entity, columns: &[Arc<Column>]) -> Result<()> {
    let mut names = HashSet::new();
    for column in columns {
        if !names.insert(column.name()) {
            return Err(OrmError::configuration(
                entity.type_name(),
                format!("column '{}' is mapped more than once", column.name()),
            ));
        }
    }
    Ok(())
}

/// One foreign-key column to create, before it is bound to its table.
struct JoinColumnSpec {
    name: String,
    referenced: Arc<Column>,
    nullable: bool,
    unique: bool,
    on_update: Option<ForeignKeyAction>,
    on_delete: Option<ForeignKeyAction>,
}

/// Pairs declared join columns with the columns they reference on `target`.
/// Without declarations, one column per target primary key is generated.
fn join_column_specs(
    entity: &str,
    field: &str,
    declared: &[JoinColumnDescriptor],
    target: &Entity,
    target_columns: &[Arc<Column>],
    default_name: impl Fn(&str) -> String,
) -> Result<Vec<JoinColumnSpec>> {
    let keys: Vec<&Arc<Column>> = target_columns
        .iter()
        .filter(|column| column.is_primary_key())
        .collect();
    if keys.is_empty() {
        return Err(OrmError::field_configuration(
            entity,
            field,
            format!("target '{}' has no primary key to reference", target.type_name()),
        ));
    }

    if declared.is_empty() {
        return Ok(keys
            .into_iter()
            .map(|key| JoinColumnSpec {
                name: default_name(key.name()),
                referenced: Arc::clone(key),
                nullable: true,
                unique: false,
                on_update: None,
                on_delete: None,
            })
            .collect());
    }

    declared
        .iter()
        .map(|join_column| {
            let referenced = match &join_column.referenced_column {
                Some(name) => target_columns
                    .iter()
                    .find(|column| column.name() == name)
                    .ok_or_else(|| {
                        OrmError::field_configuration(
                            entity,
                            field,
                            format!("'{}' has no column '{}'", target.type_name(), name),
                        )
                    })?,
                None if keys.len() == 1 => keys[0],
                None => {
                    return Err(OrmError::field_configuration(
                        entity,
                        field,
                        format!(
                            "join column must name its referenced column; '{}' has a composite key",
                            target.type_name()
                        ),
                    ));
                }
            };
            Ok(JoinColumnSpec {
                name: join_column
                    .name
                    .clone()
                    .unwrap_or_else(|| default_name(referenced.name())),
                referenced: Arc::clone(referenced),
                nullable: join_column.nullable,
                unique: join_column.unique,
                on_update: join_column.on_update,
                on_delete: join_column.on_delete,
            })
        })
        .collect()
}

/// Builds the join table of an owning many-to-many relationship. Runs lazily,
/// on first demand, once both sides are resolved.
pub(crate) async fn build_join_table(
    db: &Database,
    relationship: &Relationship,
) -> Result<Arc<JoinTable>> {
    let local = db.entity_by_id(relationship.local())?;
    let linked = db.entity_by_id(relationship.linked())?;
    local.wait_resolved().await?;
    linked.wait_resolved().await?;

    let local_table = table_of(db, &local, &local, relationship)?;
    let linked_table = table_of(db, &local, &linked, relationship)?;
    let descriptor = relationship.join_table_descriptor().cloned().unwrap_or_default();
    let name = descriptor
        .name
        .clone()
        .unwrap_or_else(|| default_join_table_name(&local_table, &linked_table));

    let join_table = JoinTable {
        direct: join_table_group(
            &local,
            relationship,
            &descriptor.join_columns,
            &local,
            &local_table,
        )?,
        inverse: join_table_group(
            &local,
            relationship,
            &descriptor.inverse_join_columns,
            &linked,
            &linked_table,
        )?,
        name,
        relationship: relationship.field().to_string(),
        local: local.id(),
        linked: linked.id(),
    };

    let mut names = HashSet::new();
    if let Some(column) = join_table.columns().find(|column| !names.insert(column.name())) {
        return Err(OrmError::field_configuration(
            local.type_name(),
            relationship.field(),
            format!(
                "join table '{}' maps column '{}' more than once",
                join_table.name,
                column.name()
            ),
        ));
    }
    debug!(
        "Join table '{}' for '{}.{}'",
        join_table.name,
        local.type_name(),
        relationship.field()
    );
    Ok(Arc::new(join_table))
}

/// Columns of one side of a join table, referencing `side`'s keys.
fn join_table_group(
    local: &Entity,
    relationship: &Relationship,
    declared: &[JoinColumnDescriptor],
    side: &Entity,
    table: &str,
) -> Result<Vec<Arc<Column>>> {
    let specs = join_column_specs(
        local.type_name(),
        relationship.field(),
        declared,
        side,
        side.columns(),
        |referenced| format!("{}_{}", table, referenced),
    )?;
    Ok(specs
        .into_iter()
        .map(|spec| {
            Arc::new(Column::new_foreign_key(
                side.id(),
                spec.name,
                false,
                false,
                ForeignKeyTarget {
                    entity: side.id(),
                    relationship: relationship.field().to_string(),
                    referenced: spec.referenced,
                    on_update: spec.on_update.unwrap_or(ForeignKeyAction::Cascade),
                    on_delete: spec.on_delete.unwrap_or(ForeignKeyAction::Cascade),
                },
            ))
        })
        .collect())
}

fn table_of(
    db: &Database,
    local: &Entity,
    side: &Arc<Entity>,
    relationship: &Relationship,
) -> Result<String> {
    db.table_owner(side)
        .ok()
        .and_then(|owner| owner.table_name().map(str::to_string))
        .ok_or_else(|| {
            OrmError::field_configuration(
                local.type_name(),
                relationship.field(),
                format!("'{}' has no table a join table could reference", side.type_name()),
            )
        })
}
