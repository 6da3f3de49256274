pub mod error;
pub mod naming;
pub mod types;
pub mod value;

pub use error::{OrmError, Result};
pub use types::{AttributeType, DiscriminatorKind, ForeignKeyAction, SqlType};
pub use value::Value;
