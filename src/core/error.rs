use thiserror::Error;

/// Errors raised while mapping entities, synthesizing schema or marshalling rows.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrmError {
    /// Invalid or incomplete mapping metadata; surfaced at resolution time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An internal invariant of the resolved entity graph was violated.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// A row or object value does not fit the declared attribute type.
    #[error("Marshalling error: {0}")]
    Marshalling(String),

    /// The caller referenced something the database does not know about,
    /// or asked for an operation the current state does not allow.
    #[error("Query error: {0}")]
    Query(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, OrmError>;

impl OrmError {
    pub fn configuration(entity: &str, message: impl AsRef<str>) -> Self {
        Self::Configuration(format!("entity '{}': {}", entity, message.as_ref()))
    }

    pub fn field_configuration(entity: &str, field: &str, message: impl AsRef<str>) -> Self {
        Self::Configuration(format!(
            "entity '{}', field '{}': {}",
            entity,
            field,
            message.as_ref()
        ))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for OrmError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}
