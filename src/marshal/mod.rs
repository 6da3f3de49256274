//! Conversion between polymorphic objects and flat rows.
//!
//! Objects cross this boundary as `ObjectRecord`s: the leaf type name plus
//! field values and references. Typed domain values implement
//! `MappedObject` to convert to and from records.

mod marshaller;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::naming::column_label;
use crate::core::{OrmError, Result, Value};
use crate::mapping::EntityId;

pub use marshaller::Marshaller;

/// A query result row. Columns are labelled `{column}_{level}` so that
/// columns of different joined ancestor tables cannot collide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: &str, level: usize, value: Value) {
        self.values.insert(column_label(column, level), value);
    }

    /// Inserts a value under an already-built label.
    pub fn insert_labelled(&mut self, label: impl Into<String>, value: Value) {
        self.values.insert(label.into(), value);
    }

    pub fn get(&self, column: &str, level: usize) -> Result<&Value> {
        let label = column_label(column, level);
        self.values.get(&label).ok_or_else(|| {
            OrmError::Marshalling(format!("Row has no column labelled '{}'", label))
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The row a query joining the given table rows would return.
    pub fn from_table_rows<'r>(rows: impl IntoIterator<Item = &'r TableRow>) -> Self {
        let mut row = Self::new();
        for table_row in rows {
            for (column, value) in table_row.values() {
                row.insert(column, table_row.level(), value.clone());
            }
        }
        row
    }
}

/// Column values destined for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    entity: EntityId,
    table: String,
    level: usize,
    values: Vec<(String, Value)>,
}

impl TableRow {
    pub fn new(entity: EntityId, table: impl Into<String>, level: usize) -> Self {
        Self {
            entity,
            table: table.into(),
            level,
            values: Vec::new(),
        }
    }

    /// Sets a column, replacing an earlier value of the same column.
    pub fn set(&mut self, column: String, value: Value) {
        match self.values.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.values.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Entity owning the table.
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Alias level of the table in a query over the whole hierarchy.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }
}

/// Reference from an object to another entity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Type name of the referenced instance.
    pub target: String,
    /// Values of the referenced columns; `None` while the target is not
    /// persisted.
    pub key: Option<BTreeMap<String, Value>>,
}

impl Reference {
    pub fn persisted<I, S>(target: impl Into<String>, key: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Self {
            target: target.into(),
            key: Some(key.into_iter().map(|(name, value)| (name.into(), value)).collect()),
        }
    }

    pub fn unpersisted(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            key: None,
        }
    }
}

/// Field-level view of one object, keyed by its leaf type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub type_name: String,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    #[serde(default)]
    pub references: BTreeMap<String, Reference>,
}

impl ObjectRecord {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn with_reference(mut self, field: impl Into<String>, reference: Reference) -> Self {
        self.references.insert(field.into(), reference);
        self
    }

    /// Field value; `Null` for fields the record does not carry.
    pub fn get(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&Value::Null)
    }

    /// Removes and returns a field value, for building typed objects.
    pub fn take(&mut self, field: &str) -> Value {
        self.values.remove(field).unwrap_or(Value::Null)
    }
}

/// A typed domain value the marshaller can convert.
///
/// Polymorphic hierarchies are usually an enum with one variant per concrete
/// entity; `from_record` picks the variant from `record.type_name`.
pub trait MappedObject: Sized {
    fn to_record(&self) -> ObjectRecord;

    fn from_record(record: ObjectRecord) -> Result<Self>;
}
