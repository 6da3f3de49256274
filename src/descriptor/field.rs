use serde::{Deserialize, Serialize};

use crate::core::{AttributeType, ForeignKeyAction};

/// Cardinality of a cross-entity reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

/// Column overrides of a plain attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name; the field name when absent.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    /// SQL literal used as the column default.
    #[serde(default)]
    pub default_value: Option<String>,
    /// Raw column definition replacing the generated type and constraints.
    #[serde(default)]
    pub definition: Option<String>,
}

impl Default for ColumnDescriptor {
    fn default() -> Self {
        Self {
            name: None,
            nullable: true,
            unique: false,
            default_value: None,
            definition: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One foreign-key column of a relationship or join table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinColumnDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    /// Column of the referenced table; its single primary key when absent.
    #[serde(default)]
    pub referenced_column: Option<String>,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub on_update: Option<ForeignKeyAction>,
    #[serde(default)]
    pub on_delete: Option<ForeignKeyAction>,
}

impl JoinColumnDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            referenced_column: None,
            nullable: true,
            unique: false,
            on_update: None,
            on_delete: None,
        }
    }

    pub fn referencing(name: impl Into<String>, referenced_column: impl Into<String>) -> Self {
        Self::new(name).referenced_column(referenced_column)
    }

    pub fn referenced_column(mut self, column: impl Into<String>) -> Self {
        self.referenced_column = Some(column.into());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = Some(action);
        self
    }

    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = Some(action);
        self
    }
}

/// Join table of a many-to-many relationship.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinTableDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    /// Columns referencing the owning side.
    #[serde(default)]
    pub join_columns: Vec<JoinColumnDescriptor>,
    /// Columns referencing the other side.
    #[serde(default)]
    pub inverse_join_columns: Vec<JoinColumnDescriptor>,
}

impl JoinTableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn join_column(mut self, column: JoinColumnDescriptor) -> Self {
        self.join_columns.push(column);
        self
    }

    pub fn inverse_join_column(mut self, column: JoinColumnDescriptor) -> Self {
        self.inverse_join_columns.push(column);
        self
    }
}

/// Reference field metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    pub kind: RelationshipKind,
    /// Type name of the referenced entity.
    pub target: String,
    /// Field of the target that owns this relationship.
    #[serde(default)]
    pub mapped_by: Option<String>,
    #[serde(default)]
    pub join_columns: Vec<JoinColumnDescriptor>,
    #[serde(default)]
    pub join_table: Option<JoinTableDescriptor>,
}

impl RelationshipDescriptor {
    pub fn new(kind: RelationshipKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            mapped_by: None,
            join_columns: Vec::new(),
            join_table: None,
        }
    }

    pub fn many_to_one(target: impl Into<String>) -> Self {
        Self::new(RelationshipKind::ManyToOne, target)
    }

    pub fn one_to_one(target: impl Into<String>) -> Self {
        Self::new(RelationshipKind::OneToOne, target)
    }

    pub fn one_to_many(target: impl Into<String>, mapped_by: impl Into<String>) -> Self {
        Self::new(RelationshipKind::OneToMany, target).mapped_by(mapped_by)
    }

    pub fn many_to_many(target: impl Into<String>) -> Self {
        Self::new(RelationshipKind::ManyToMany, target)
    }

    pub fn mapped_by(mut self, field: impl Into<String>) -> Self {
        self.mapped_by = Some(field.into());
        self
    }

    pub fn join_column(mut self, column: JoinColumnDescriptor) -> Self {
        self.join_columns.push(column);
        self
    }

    pub fn join_table(mut self, join_table: JoinTableDescriptor) -> Self {
        self.join_table = Some(join_table);
        self
    }
}

/// What a field maps to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldMapping {
    Column {
        attribute: AttributeType,
        #[serde(default)]
        id: bool,
        #[serde(default)]
        column: ColumnDescriptor,
    },
    Relationship(RelationshipDescriptor),
}

/// One field of a domain type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// Transient fields are never mapped.
    #[serde(default)]
    pub transient: bool,
    pub mapping: FieldMapping,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, attribute: AttributeType) -> Self {
        Self {
            name: name.into(),
            transient: false,
            mapping: FieldMapping::Column {
                attribute,
                id: false,
                column: ColumnDescriptor::default(),
            },
        }
    }

    pub fn relationship(name: impl Into<String>, relationship: RelationshipDescriptor) -> Self {
        Self {
            name: name.into(),
            transient: false,
            mapping: FieldMapping::Relationship(relationship),
        }
    }

    /// Marks the field as (part of) the primary key.
    pub fn id(mut self) -> Self {
        if let FieldMapping::Column { id, .. } = &mut self.mapping {
            *id = true;
        }
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn column_name(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with_column(|column| column.name = Some(name))
    }

    pub fn not_null(self) -> Self {
        self.with_column(|column| column.nullable = false)
    }

    pub fn unique(self) -> Self {
        self.with_column(|column| column.unique = true)
    }

    pub fn default_value(self, literal: impl Into<String>) -> Self {
        let literal = literal.into();
        self.with_column(|column| column.default_value = Some(literal))
    }

    pub fn definition(self, definition: impl Into<String>) -> Self {
        let definition = definition.into();
        self.with_column(|column| column.definition = Some(definition))
    }

    pub fn relationship_descriptor(&self) -> Option<&RelationshipDescriptor> {
        match &self.mapping {
            FieldMapping::Relationship(relationship) => Some(relationship),
            FieldMapping::Column { .. } => None,
        }
    }

    fn with_column(mut self, update: impl FnOnce(&mut ColumnDescriptor)) -> Self {
        if let FieldMapping::Column { column, .. } = &mut self.mapping {
            update(column);
        }
        self
    }
}
