pub mod dump;

pub use dump::{DumpMetadata, SchemaDump, TableDump};
