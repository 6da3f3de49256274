mod catalog;
mod database;

pub(crate) use catalog::Catalog;
pub use database::{Database, VersionChange};
