use std::fmt;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{OrmError, Result, Value};

/// Storage type families understood by the embedded engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Blob,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Real => write!(f, "REAL"),
            Self::Text => write!(f, "TEXT"),
            Self::Blob => write!(f, "BLOB"),
        }
    }
}

/// Declared type of a mapped attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    Boolean,
    Char,
    String,
    Bytes,
    /// Stored as milliseconds since the Unix epoch.
    Date,
    /// Stored as hyphenated text.
    Uuid,
    /// Stored as the variant name.
    Enum(Vec<String>),
}

impl AttributeType {
    pub fn sql_type(&self) -> SqlType {
        match self {
            Self::Byte | Self::Short | Self::Integer | Self::Long | Self::Boolean | Self::Date => {
                SqlType::Integer
            }
            Self::Float | Self::Double => SqlType::Real,
            Self::Char | Self::String | Self::Uuid | Self::Enum(_) => SqlType::Text,
            Self::Bytes => SqlType::Blob,
        }
    }

    /// Lowers an attribute value to the value stored in the column.
    pub fn to_column(&self, column: &str, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match (self, value) {
            (Self::Byte | Self::Short | Self::Integer | Self::Long, Value::Integer(i)) => {
                self.check_range(column, *i)?;
                Ok(Value::Integer(*i))
            }
            (Self::Float, Value::Float(f)) => {
                if f.is_finite() && f.abs() > f64::from(f32::MAX) {
                    return Err(self.mismatch(column, value));
                }
                Ok(Value::Float(*f))
            }
            (Self::Double, Value::Float(f)) => Ok(Value::Float(*f)),
            (Self::Boolean, Value::Boolean(b)) => Ok(Value::Integer(i64::from(*b))),
            (Self::Char, Value::Text(s)) if s.chars().count() == 1 => Ok(Value::Text(s.clone())),
            (Self::String, Value::Text(s)) => Ok(Value::Text(s.clone())),
            (Self::Bytes, Value::Blob(bytes)) => Ok(Value::Blob(bytes.clone())),
            (Self::Date, Value::Timestamp(ts)) => {
                // the column keeps milliseconds only
                if ts.timestamp_subsec_nanos() % 1_000_000 != 0 {
                    return Err(OrmError::Marshalling(format!(
                        "Column '{}' stores milliseconds, {} carries sub-millisecond precision",
                        column, ts
                    )));
                }
                Ok(Value::Integer(ts.timestamp_millis()))
            }
            (Self::Uuid, Value::Uuid(id)) => Ok(Value::Text(id.hyphenated().to_string())),
            (Self::Enum(variants), Value::Text(s)) if variants.contains(s) => {
                Ok(Value::Text(s.clone()))
            }
            _ => Err(self.mismatch(column, value)),
        }
    }

    /// Lifts a stored column value back to the attribute's value.
    pub fn from_column(&self, column: &str, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match (self, value) {
            (Self::Byte | Self::Short | Self::Integer | Self::Long, Value::Integer(i)) => {
                self.check_range(column, *i)?;
                Ok(Value::Integer(*i))
            }
            (Self::Float | Self::Double, Value::Float(f)) => Ok(Value::Float(*f)),
            (Self::Boolean, Value::Integer(0)) => Ok(Value::Boolean(false)),
            (Self::Boolean, Value::Integer(1)) => Ok(Value::Boolean(true)),
            (Self::Char, Value::Text(s)) if s.chars().count() == 1 => Ok(Value::Text(s.clone())),
            (Self::String, Value::Text(s)) => Ok(Value::Text(s.clone())),
            (Self::Bytes, Value::Blob(bytes)) => Ok(Value::Blob(bytes.clone())),
            (Self::Date, Value::Integer(millis)) => DateTime::from_timestamp_millis(*millis)
                .map(Value::Timestamp)
                .ok_or_else(|| {
                    OrmError::Marshalling(format!(
                        "Column '{}' holds an out-of-range epoch value {}",
                        column, millis
                    ))
                }),
            (Self::Uuid, Value::Text(s)) => Uuid::parse_str(s).map(Value::Uuid).map_err(|e| {
                OrmError::Marshalling(format!("Column '{}' holds an invalid uuid: {}", column, e))
            }),
            (Self::Enum(variants), Value::Text(s)) if variants.contains(s) => {
                Ok(Value::Text(s.clone()))
            }
            _ => Err(self.mismatch(column, value)),
        }
    }

    fn check_range(&self, column: &str, value: i64) -> Result<()> {
        let fits = match self {
            Self::Byte => i8::try_from(value).is_ok(),
            Self::Short => i16::try_from(value).is_ok(),
            Self::Integer => i32::try_from(value).is_ok(),
            _ => true,
        };
        if fits {
            Ok(())
        } else {
            Err(OrmError::Marshalling(format!(
                "Column '{}' of type {} cannot hold {}",
                column, self, value
            )))
        }
    }

    fn mismatch(&self, column: &str, value: &Value) -> OrmError {
        OrmError::Marshalling(format!(
            "Column '{}' expects {}, got {} ({})",
            column,
            self,
            value.type_name(),
            value
        ))
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte => write!(f, "byte"),
            Self::Short => write!(f, "short"),
            Self::Integer => write!(f, "integer"),
            Self::Long => write!(f, "long"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::Boolean => write!(f, "boolean"),
            Self::Char => write!(f, "char"),
            Self::String => write!(f, "string"),
            Self::Bytes => write!(f, "bytes"),
            Self::Date => write!(f, "date"),
            Self::Uuid => write!(f, "uuid"),
            Self::Enum(variants) => write!(f, "enum({})", variants.join("|")),
        }
    }
}

/// Declared type of a discriminator column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DiscriminatorKind {
    Char,
    #[default]
    String,
    Integer,
}

impl DiscriminatorKind {
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            Self::Char => AttributeType::Char,
            Self::String => AttributeType::String,
            Self::Integer => AttributeType::Long,
        }
    }

    /// Coerces a declared (always textual) discriminator value to this kind.
    pub fn coerce(&self, raw: &str) -> std::result::Result<Value, String> {
        match self {
            Self::Char => {
                if raw.chars().count() == 1 {
                    Ok(Value::Text(raw.to_string()))
                } else {
                    Err(format!("'{}' is not a single character", raw))
                }
            }
            Self::String => Ok(Value::Text(raw.to_string())),
            Self::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| format!("'{}' is not an integer", raw)),
        }
    }
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    SetNull,
    SetDefault,
    Cascade,
}

impl fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAction => write!(f, "NO ACTION"),
            Self::Restrict => write!(f, "RESTRICT"),
            Self::SetNull => write!(f, "SET NULL"),
            Self::SetDefault => write!(f, "SET DEFAULT"),
            Self::Cascade => write!(f, "CASCADE"),
        }
    }
}
