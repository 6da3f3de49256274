use std::sync::Arc;

use async_recursion::async_recursion;
use tokio::sync::OnceCell;

use super::EntityId;
use crate::core::{AttributeType, DiscriminatorKind, ForeignKeyAction, Result, SqlType, Value};
use crate::descriptor::{ColumnDescriptor, DiscriminatorDescriptor};
use crate::marshal::{Row, TableRow};

/// Role of a column inside its entity.
#[derive(Debug, Clone)]
pub enum ColumnKind {
    Simple,
    ForeignKey(ForeignKeyTarget),
    Discriminator(DiscriminatorKind),
}

/// The referenced side of a foreign-key column.
#[derive(Debug, Clone)]
pub struct ForeignKeyTarget {
    /// Entity whose table holds the referenced column.
    pub entity: EntityId,
    /// Relationship field that produced the column; columns sharing it form
    /// one (possibly composite) foreign key.
    pub relationship: String,
    pub referenced: Arc<Column>,
    pub on_update: ForeignKeyAction,
    pub on_delete: ForeignKeyAction,
}

/// Final storage shape of a column, computed once on first demand.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub sql_type: SqlType,
    pub nullable: bool,
    pub unique: bool,
    pub default_value: Option<String>,
    pub definition: Option<String>,
}

/// A mapped column: plain attribute, foreign key or discriminator.
#[derive(Debug)]
pub struct Column {
    name: String,
    field: Option<String>,
    declared_by: EntityId,
    inherited: bool,
    attribute: AttributeType,
    nullable: bool,
    unique: bool,
    primary_key: bool,
    default_value: Option<String>,
    definition: Option<String>,
    kind: ColumnKind,
    mapping: OnceCell<ColumnMapping>,
}

impl Column {
    pub(crate) fn simple(
        declared_by: EntityId,
        field: &str,
        attribute: AttributeType,
        primary_key: bool,
        descriptor: &ColumnDescriptor,
    ) -> Self {
        Self {
            name: descriptor.name.clone().unwrap_or_else(|| field.to_string()),
            field: Some(field.to_string()),
            declared_by,
            inherited: false,
            attribute,
            nullable: descriptor.nullable && !primary_key,
            unique: descriptor.unique,
            primary_key,
            default_value: descriptor.default_value.clone(),
            definition: descriptor.definition.clone(),
            kind: ColumnKind::Simple,
            mapping: OnceCell::new(),
        }
    }

    pub(crate) fn new_foreign_key(
        declared_by: EntityId,
        name: String,
        nullable: bool,
        unique: bool,
        target: ForeignKeyTarget,
    ) -> Self {
        Self {
            name,
            field: Some(target.relationship.clone()),
            declared_by,
            inherited: false,
            attribute: target.referenced.attribute.clone(),
            nullable,
            unique,
            primary_key: false,
            default_value: None,
            definition: None,
            kind: ColumnKind::ForeignKey(target),
            mapping: OnceCell::new(),
        }
    }

    /// A synthesized discriminator column. Never nullable, never a key.
    pub(crate) fn discriminator(declared_by: EntityId, descriptor: &DiscriminatorDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            field: None,
            declared_by,
            inherited: false,
            attribute: descriptor.kind.attribute_type(),
            nullable: false,
            unique: false,
            primary_key: false,
            default_value: None,
            definition: descriptor.definition.clone(),
            kind: ColumnKind::Discriminator(descriptor.kind),
            mapping: OnceCell::new(),
        }
    }

    /// An explicit attribute column taking over the discriminator role.
    pub(crate) fn into_discriminator(mut self, kind: DiscriminatorKind) -> Self {
        self.nullable = false;
        self.kind = ColumnKind::Discriminator(kind);
        self
    }

    /// A copy of this column carried by a descendant entity.
    pub(crate) fn inherited_copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            field: self.field.clone(),
            declared_by: self.declared_by,
            inherited: true,
            attribute: self.attribute.clone(),
            nullable: self.nullable,
            unique: self.unique,
            primary_key: self.primary_key,
            default_value: self.default_value.clone(),
            definition: self.definition.clone(),
            kind: self.kind.clone(),
            mapping: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute field backing the column; `None` for synthesized discriminators.
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Entity whose descriptor declares the column.
    pub fn declared_by(&self) -> EntityId {
        self.declared_by
    }

    pub fn is_inherited(&self) -> bool {
        self.inherited
    }

    pub fn attribute(&self) -> &AttributeType {
        &self.attribute
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    pub fn foreign_key(&self) -> Option<&ForeignKeyTarget> {
        match &self.kind {
            ColumnKind::ForeignKey(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_foreign_key(&self) -> bool {
        matches!(self.kind, ColumnKind::ForeignKey(_))
    }

    pub fn is_discriminator(&self) -> bool {
        matches!(self.kind, ColumnKind::Discriminator(_))
    }

    /// Resolves the storage shape of the column. A foreign-key column takes
    /// its type from the column it references, awaiting that column's mapping.
    #[async_recursion]
    pub async fn mapping(&self) -> Result<ColumnMapping> {
        self.mapping
            .get_or_try_init(|| self.compute_mapping())
            .await
            .cloned()
    }

    /// The mapping if it has already been resolved.
    pub fn resolved_mapping(&self) -> Option<&ColumnMapping> {
        self.mapping.get()
    }

    async fn compute_mapping(&self) -> Result<ColumnMapping> {
        let sql_type = match &self.kind {
            ColumnKind::ForeignKey(target) => target.referenced.mapping().await?.sql_type,
            ColumnKind::Simple | ColumnKind::Discriminator(_) => self.attribute.sql_type(),
        };
        Ok(ColumnMapping {
            sql_type,
            nullable: self.nullable && !self.primary_key,
            unique: self.unique,
            default_value: self.default_value.clone(),
            definition: self.definition.clone(),
        })
    }

    /// Reads the column from a query row at the given alias level and lifts
    /// the stored value to the attribute's type.
    pub fn read(&self, row: &Row, level: usize) -> Result<Value> {
        let stored = row.get(&self.name, level)?;
        self.attribute.from_column(&self.name, stored)
    }

    /// Lowers an attribute value and writes it into a table row.
    pub fn write(&self, value: &Value, row: &mut TableRow) -> Result<()> {
        let stored = self.attribute.to_column(&self.name, value)?;
        row.set(self.name.clone(), stored);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DiscriminatorDescriptor;

    fn id_column() -> Arc<Column> {
        Arc::new(Column::simple(
            EntityId(0),
            "id",
            AttributeType::Long,
            true,
            &ColumnDescriptor::default(),
        ))
    }

    #[tokio::test]
    async fn test_primary_key_is_never_nullable() {
        let column = id_column();
        assert!(!column.is_nullable());
        let mapping = column.mapping().await.unwrap();
        assert_eq!(mapping.sql_type, SqlType::Integer);
        assert!(!mapping.nullable);
    }

    #[tokio::test]
    async fn test_foreign_key_takes_referenced_type() {
        let referenced = Arc::new(Column::simple(
            EntityId(0),
            "code",
            AttributeType::String,
            true,
            &ColumnDescriptor::default(),
        ));
        let column = Column::new_foreign_key(
            EntityId(1),
            "country_code".to_string(),
            true,
            false,
            ForeignKeyTarget {
                entity: EntityId(0),
                relationship: "country".to_string(),
                referenced: Arc::clone(&referenced),
                on_update: ForeignKeyAction::Cascade,
                on_delete: ForeignKeyAction::SetNull,
            },
        );

        assert!(referenced.resolved_mapping().is_none());
        let mapping = column.mapping().await.unwrap();
        assert_eq!(mapping.sql_type, SqlType::Text);
        assert!(mapping.nullable);
        assert!(referenced.resolved_mapping().is_some());
        assert_eq!(column.field(), Some("country"));
    }

    #[test]
    fn test_discriminator_column_shape() {
        let column = Column::discriminator(
            EntityId(0),
            &DiscriminatorDescriptor::new("type").kind(DiscriminatorKind::Integer),
        );
        assert!(column.is_discriminator());
        assert!(!column.is_nullable());
        assert!(!column.is_primary_key());
        assert_eq!(column.attribute().sql_type(), SqlType::Integer);
    }

    #[test]
    fn test_read_and_write_through_rows() {
        let column = Column::simple(
            EntityId(0),
            "active",
            AttributeType::Boolean,
            false,
            &ColumnDescriptor::default(),
        );
        let mut table_row = TableRow::new(EntityId(0), "flags", 0);
        column.write(&Value::Boolean(true), &mut table_row).unwrap();
        assert_eq!(table_row.get("active"), Some(&Value::Integer(1)));

        let mut row = Row::new();
        row.insert("active", 0, Value::Integer(0));
        assert_eq!(column.read(&row, 0).unwrap(), Value::Boolean(false));
        assert!(column.read(&row, 1).is_err());
    }
}
