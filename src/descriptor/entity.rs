use serde::{Deserialize, Serialize};

use super::FieldDescriptor;
use crate::core::DiscriminatorKind;

/// How a class hierarchy is laid out over tables. Chosen on the hierarchy root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InheritanceStrategy {
    /// One table per entity; a child table holds its own columns plus the
    /// inherited primary key, which references the parent table.
    #[default]
    Joined,
    /// One table for the whole hierarchy, owned by the root.
    SingleTable,
    /// One standalone table per concrete entity, holding every inherited column.
    TablePerClass,
}

/// Table metadata of an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Explicit table name; derived from the type name when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Multi-column uniqueness constraints, by column name.
    #[serde(default)]
    pub unique_constraints: Vec<Vec<String>>,
}

/// Discriminator column metadata, declared on a hierarchy root (or any
/// ancestor of the entity that needs it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscriminatorDescriptor {
    #[serde(default = "DiscriminatorDescriptor::default_name")]
    pub name: String,
    #[serde(default)]
    pub kind: DiscriminatorKind,
    /// Maximum length of string discriminator values.
    #[serde(default)]
    pub length: Option<usize>,
    /// Raw column definition replacing the generated one.
    #[serde(default)]
    pub definition: Option<String>,
}

impl DiscriminatorDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DiscriminatorKind::default(),
            length: None,
            definition: None,
        }
    }

    fn default_name() -> String {
        "dtype".to_string()
    }

    pub fn kind(mut self, kind: DiscriminatorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }
}

impl Default for DiscriminatorDescriptor {
    fn default() -> Self {
        Self::new(Self::default_name())
    }
}

/// Mapping metadata of one domain type.
///
/// # Examples
///
/// ```
/// use entitymap::core::AttributeType;
/// use entitymap::descriptor::{DiscriminatorDescriptor, EntityDescriptor, FieldDescriptor};
///
/// let animal = EntityDescriptor::new("Animal")
///     .table("animal")
///     .discriminator_column(DiscriminatorDescriptor::new("kind"))
///     .field(FieldDescriptor::new("id", AttributeType::Long).id());
///
/// let dog = EntityDescriptor::new("Dog")
///     .extends("Animal")
///     .table("dog")
///     .discriminator_value("dog")
///     .field(FieldDescriptor::new("good_boy", AttributeType::Boolean));
///
/// assert_eq!(dog.ancestors, vec!["Animal".to_string()]);
/// assert!(animal.field_named("id").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub type_name: String,
    /// Ancestor types, nearest first. Ancestors that are not registered
    /// entities are skipped during parent lookup.
    #[serde(default)]
    pub ancestors: Vec<String>,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub table: Option<TableDescriptor>,
    #[serde(default)]
    pub inheritance: Option<InheritanceStrategy>,
    #[serde(default)]
    pub discriminator_column: Option<DiscriminatorDescriptor>,
    #[serde(default)]
    pub discriminator_value: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ancestors: Vec::new(),
            is_abstract: false,
            table: None,
            inheritance: None,
            discriminator_column: None,
            discriminator_value: None,
            fields: Vec::new(),
        }
    }

    /// Appends the next ancestor in the chain (call nearest first).
    pub fn extends(mut self, ancestor: impl Into<String>) -> Self {
        self.ancestors.push(ancestor.into());
        self
    }

    pub fn abstract_entity(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Declares table metadata with an explicit name.
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table_descriptor_mut().name = Some(name.into());
        self
    }

    /// Declares table metadata whose name is derived from the type name.
    pub fn default_table(mut self) -> Self {
        self.table_descriptor_mut();
        self
    }

    pub fn unique_constraint<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        self.table_descriptor_mut().unique_constraints.push(columns);
        self
    }

    pub fn inheritance(mut self, strategy: InheritanceStrategy) -> Self {
        self.inheritance = Some(strategy);
        self
    }

    pub fn discriminator_column(mut self, discriminator: DiscriminatorDescriptor) -> Self {
        self.discriminator_column = Some(discriminator);
        self
    }

    pub fn discriminator_value(mut self, value: impl Into<String>) -> Self {
        self.discriminator_value = Some(value.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    fn table_descriptor_mut(&mut self) -> &mut TableDescriptor {
        self.table.get_or_insert_with(TableDescriptor::default)
    }
}
