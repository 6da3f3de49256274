use std::fmt;
use std::sync::{Arc, Mutex};

use super::{Column, Promise, Relationship};
use crate::core::{OrmError, Result, Value};
use crate::descriptor::{EntityDescriptor, InheritanceStrategy};

/// Index of an entity in its database's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub(crate) usize);

impl EntityId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One mapped domain type.
///
/// Every resolution step publishes its result exactly once through a
/// `Promise`; other entities' resolution tasks await the steps they depend on.
/// After resolution the entity is immutable and all accessors are lock-free.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    descriptor: EntityDescriptor,
    pub(crate) parent_started: Promise<()>,
    pub(crate) parent: Promise<Option<EntityId>>,
    pending_children: Mutex<Vec<EntityId>>,
    pub(crate) children: Promise<Arc<[EntityId]>>,
    pub(crate) strategy: Promise<InheritanceStrategy>,
    pub(crate) table_name: Promise<Option<String>>,
    pub(crate) discriminator_value: Promise<Option<Value>>,
    pub(crate) relationships: Promise<Arc<[Arc<Relationship>]>>,
    pub(crate) base_columns: Promise<Arc<[Arc<Column>]>>,
    pub(crate) columns: Promise<Arc<[Arc<Column>]>>,
    pub(crate) outcome: Promise<Result<()>>,
}

impl Entity {
    pub(crate) fn new(id: EntityId, descriptor: EntityDescriptor) -> Self {
        Self {
            id,
            descriptor,
            parent_started: Promise::new(),
            parent: Promise::new(),
            pending_children: Mutex::new(Vec::new()),
            children: Promise::new(),
            strategy: Promise::new(),
            table_name: Promise::new(),
            discriminator_value: Promise::new(),
            relationships: Promise::new(),
            base_columns: Promise::new(),
            columns: Promise::new(),
            outcome: Promise::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.descriptor.type_name
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    pub fn is_abstract(&self) -> bool {
        self.descriptor.is_abstract
    }

    /// Registers a child during parent lookup.
    pub(crate) fn add_child(&self, child: EntityId) -> Result<()> {
        let mut pending = self.pending_children.lock()?;
        if !pending.contains(&child) {
            pending.push(child);
        }
        Ok(())
    }

    /// Freezes the child set once every parent link of the database is known.
    pub(crate) fn seal_children(&self) -> Result<Arc<[EntityId]>> {
        let mut children = self.pending_children.lock()?.clone();
        children.sort();
        let children: Arc<[EntityId]> = children.into();
        self.children.fulfill(Arc::clone(&children));
        Ok(children)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.outcome.get(), Some(Ok(())))
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent.get().copied().flatten()
    }

    pub fn children(&self) -> &[EntityId] {
        self.children.get().map_or(&[], |children| &children[..])
    }

    pub fn has_children(&self) -> bool {
        !self.children().is_empty()
    }

    pub fn strategy(&self) -> InheritanceStrategy {
        self.strategy.get().copied().unwrap_or_default()
    }

    /// Own table name; `None` when the entity lives in an ancestor's table or
    /// has no table at all.
    pub fn table_name(&self) -> Option<&str> {
        self.table_name.get().and_then(|name| name.as_deref())
    }

    /// Normalized discriminator value; `None` for roots.
    pub fn discriminator_value(&self) -> Option<&Value> {
        self.discriminator_value.get().and_then(Option::as_ref)
    }

    pub fn relationships(&self) -> &[Arc<Relationship>] {
        self.relationships.get().map_or(&[], |relationships| &relationships[..])
    }

    pub fn relationship(&self, field: &str) -> Option<&Arc<Relationship>> {
        self.relationships()
            .iter()
            .find(|relationship| relationship.field() == field)
    }

    /// Effective column set: own, inherited and discriminator columns.
    pub fn columns(&self) -> &[Arc<Column>] {
        self.columns.get().map_or(&[], |columns| &columns[..])
    }

    pub fn column(&self, name: &str) -> Option<&Arc<Column>> {
        self.columns().iter().find(|column| column.name() == name)
    }

    /// Looks a column up by name, failing for names the entity does not map.
    pub fn require_column(&self, name: &str) -> Result<&Arc<Column>> {
        self.column(name).ok_or_else(|| {
            OrmError::Query(format!(
                "Column '{}' does not belong to entity '{}'",
                name,
                self.type_name()
            ))
        })
    }

    pub fn primary_keys(&self) -> Vec<Arc<Column>> {
        self.columns()
            .iter()
            .filter(|column| column.is_primary_key())
            .cloned()
            .collect()
    }

    /// Columns declared by this entity itself (not inherited copies).
    pub fn own_columns(&self) -> impl Iterator<Item = &Arc<Column>> {
        self.columns().iter().filter(|column| !column.is_inherited())
    }

    /// The discriminator column this entity owns, if it owns one.
    pub fn discriminator_column(&self) -> Option<&Arc<Column>> {
        self.own_columns().find(|column| column.is_discriminator())
    }

    pub async fn wait_parent(&self) -> Option<EntityId> {
        *self.parent.wait().await
    }

    /// Waits until own and inherited plain columns (keys included) are final.
    pub async fn wait_base_columns(&self) -> Arc<[Arc<Column>]> {
        Arc::clone(self.base_columns.wait().await)
    }

    /// Waits until the full column set is final.
    pub async fn wait_columns(&self) -> Arc<[Arc<Column>]> {
        Arc::clone(self.columns.wait().await)
    }

    /// Waits for the outcome of this entity's resolution.
    pub async fn wait_resolved(&self) -> Result<()> {
        self.outcome.wait().await.clone()
    }
}
