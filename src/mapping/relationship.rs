use std::sync::Arc;

use tokio::sync::OnceCell;

use super::{Column, EntityId};
use crate::core::{OrmError, Result};
use crate::descriptor::{
    EntityDescriptor, JoinColumnDescriptor, JoinTableDescriptor, RelationshipDescriptor,
    RelationshipKind,
};

/// A resolved cross-entity reference.
#[derive(Debug)]
pub struct Relationship {
    field: String,
    local: EntityId,
    linked: EntityId,
    kind: RelationshipKind,
    owning: bool,
    /// Mirror field and the entity declaring it.
    mirror: Option<(EntityId, String)>,
    join_columns: Vec<JoinColumnDescriptor>,
    join_table_descriptor: Option<JoinTableDescriptor>,
    join_table: OnceCell<Arc<JoinTable>>,
}

/// Auxiliary table of an owning many-to-many relationship.
#[derive(Debug)]
pub struct JoinTable {
    pub name: String,
    /// Relationship field on the owning entity.
    pub relationship: String,
    pub local: EntityId,
    pub linked: EntityId,
    /// Columns referencing the owning side, in declaration order.
    pub direct: Vec<Arc<Column>>,
    /// Columns referencing the other side, in declaration order.
    pub inverse: Vec<Arc<Column>>,
}

impl JoinTable {
    pub fn columns(&self) -> impl Iterator<Item = &Arc<Column>> {
        self.direct.iter().chain(self.inverse.iter())
    }
}

impl Relationship {
    /// Classifies a reference field and checks it against its mirror on the
    /// linked entity or one of its ancestors, nearest first. Uses only
    /// descriptors, never another entity's state.
    pub(crate) fn classify(
        local: EntityId,
        local_descriptor: &EntityDescriptor,
        field: &str,
        descriptor: &RelationshipDescriptor,
        linked: EntityId,
        linked_descriptor: &EntityDescriptor,
        linked_ancestors: &[(EntityId, &EntityDescriptor)],
    ) -> Result<Self> {
        let entity = local_descriptor.type_name.as_str();
        let owning = match (descriptor.kind, &descriptor.mapped_by) {
            (RelationshipKind::ManyToOne, Some(_)) => {
                return Err(OrmError::field_configuration(
                    entity,
                    field,
                    "a many-to-one relationship always owns its foreign key and cannot be mapped_by",
                ));
            }
            (RelationshipKind::OneToMany, None) => {
                return Err(OrmError::field_configuration(
                    entity,
                    field,
                    "a one-to-many relationship must be mapped_by its many-to-one mirror",
                ));
            }
            (_, mapped_by) => mapped_by.is_none(),
        };

        if !owning && !descriptor.join_columns.is_empty() {
            return Err(OrmError::field_configuration(
                entity,
                field,
                "join columns can only be declared on the owning side",
            ));
        }
        if descriptor.join_table.is_some()
            && !(owning && descriptor.kind == RelationshipKind::ManyToMany)
        {
            return Err(OrmError::field_configuration(
                entity,
                field,
                "a join table can only be declared on the owning side of a many-to-many relationship",
            ));
        }

        let lineage: Vec<(EntityId, &EntityDescriptor)> =
            std::iter::once((linked, linked_descriptor))
                .chain(linked_ancestors.iter().copied())
                .collect();
        let mirror = match &descriptor.mapped_by {
            Some(mapped_by) => {
                let holder =
                    check_mirror(local_descriptor, field, descriptor, &lineage, mapped_by)?;
                Some((holder, mapped_by.clone()))
            }
            None => find_inverse(local_descriptor, field, descriptor, &lineage)?,
        };

        Ok(Self {
            field: field.to_string(),
            local,
            linked,
            kind: descriptor.kind,
            owning,
            mirror,
            join_columns: descriptor.join_columns.clone(),
            join_table_descriptor: descriptor.join_table.clone(),
            join_table: OnceCell::new(),
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Entity declaring the field.
    pub fn local(&self) -> EntityId {
        self.local
    }

    /// Entity the field refers to.
    pub fn linked(&self) -> EntityId {
        self.linked
    }

    pub fn kind(&self) -> RelationshipKind {
        self.kind
    }

    pub fn is_owning(&self) -> bool {
        self.owning
    }

    /// Field on the linked entity describing the same relationship, if any.
    pub fn mirror(&self) -> Option<&str> {
        self.mirror.as_ref().map(|(_, field)| field.as_str())
    }

    pub fn join_columns(&self) -> &[JoinColumnDescriptor] {
        &self.join_columns
    }

    pub fn join_table_descriptor(&self) -> Option<&JoinTableDescriptor> {
        self.join_table_descriptor.as_ref()
    }

    /// Whether this side's table carries foreign-key columns.
    pub fn has_local_foreign_key(&self) -> bool {
        self.owning && matches!(self.kind, RelationshipKind::ManyToOne | RelationshipKind::OneToOne)
    }

    pub fn has_join_table(&self) -> bool {
        self.owning && self.kind == RelationshipKind::ManyToMany
    }

    /// Entity and field carrying the foreign key. For a non-owning
    /// one-to-one or one-to-many this is the mirror on the other side,
    /// possibly declared by an ancestor of the linked entity; many-to-many
    /// relationships keep their keys in the join table.
    pub fn foreign_key_holder(&self) -> Option<(EntityId, &str)> {
        match self.kind {
            RelationshipKind::ManyToMany => None,
            _ if self.owning => Some((self.local, self.field.as_str())),
            _ => self
                .mirror
                .as_ref()
                .map(|(holder, mirror)| (*holder, mirror.as_str())),
        }
    }

    pub(crate) fn join_table_cell(&self) -> &OnceCell<Arc<JoinTable>> {
        &self.join_table
    }

    /// The join table, if it has already been resolved.
    pub fn resolved_join_table(&self) -> Option<&Arc<JoinTable>> {
        self.join_table.get()
    }
}

fn targets(descriptor: &RelationshipDescriptor, entity: &EntityDescriptor) -> bool {
    descriptor.target == entity.type_name || entity.ancestors.contains(&descriptor.target)
}

fn reciprocal(kind: RelationshipKind) -> RelationshipKind {
    match kind {
        RelationshipKind::OneToMany => RelationshipKind::ManyToOne,
        RelationshipKind::ManyToOne => RelationshipKind::OneToMany,
        other => other,
    }
}

/// Checks the field named by `mapped_by` and returns the entity declaring it.
fn check_mirror(
    local: &EntityDescriptor,
    field: &str,
    descriptor: &RelationshipDescriptor,
    lineage: &[(EntityId, &EntityDescriptor)],
    mapped_by: &str,
) -> Result<EntityId> {
    let linked = lineage
        .first()
        .map_or("", |(_, entity)| entity.type_name.as_str());
    let broken = |reason: &str| {
        OrmError::field_configuration(
            &local.type_name,
            field,
            format!("mapped_by '{}.{}' {}", linked, mapped_by, reason),
        )
    };

    let (holder, declared) = lineage
        .iter()
        .find_map(|(id, entity)| entity.field_named(mapped_by).map(|declared| (*id, declared)))
        .ok_or_else(|| broken("does not exist"))?;
    let mirror = declared
        .relationship_descriptor()
        .ok_or_else(|| broken("is not a relationship"))?;

    if mirror.kind != reciprocal(descriptor.kind) {
        return Err(broken("has a non-reciprocal cardinality"));
    }
    if mirror.mapped_by.is_some() {
        return Err(broken("is itself mapped_by another field"));
    }
    if !targets(mirror, local) {
        return Err(broken(&format!("refers to '{}'", mirror.target)));
    }
    Ok(holder)
}

/// Finds the non-owning field naming this owning field, searching the
/// linked entity first and then its ancestors.
fn find_inverse(
    local: &EntityDescriptor,
    field: &str,
    descriptor: &RelationshipDescriptor,
    lineage: &[(EntityId, &EntityDescriptor)],
) -> Result<Option<(EntityId, String)>> {
    let candidates = lineage.iter().flat_map(|&(id, entity)| {
        entity
            .fields
            .iter()
            .map(move |candidate| (id, entity, candidate))
    });
    for (holder, linked, candidate) in candidates {
        let Some(inverse) = candidate.relationship_descriptor() else {
            continue;
        };
        if inverse.mapped_by.as_deref() != Some(field) || !targets(inverse, local) {
            continue;
        }
        if inverse.kind != reciprocal(descriptor.kind) {
            return Err(OrmError::field_configuration(
                &linked.type_name,
                &candidate.name,
                format!(
                    "mapped_by '{}.{}' has a non-reciprocal cardinality",
                    local.type_name, field
                ),
            ));
        }
        return Ok(Some((holder, candidate.name.clone())));
    }
    Ok(None)
}
