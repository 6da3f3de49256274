/// Session, schema dump and version change tests
///
/// Statements are captured by a recording connection.
/// Run with: cargo test --test session_tests

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use common::{joined_hierarchy, mapped, pets, vehicles};
use entitymap::connection::recording::RecordingConnection;
use entitymap::{
    Database, DatabaseConfig, Migrator, ObjectRecord, OrmError, Reference, Result, Session,
    SqlConnection, Value,
};

fn leaf() -> ObjectRecord {
    ObjectRecord::new("AAA")
        .with("id", 1)
        .with("note", "hi")
        .with("extra", 7)
}

#[tokio::test]
async fn test_persist_inserts_root_table_first() {
    let db = mapped(joined_hierarchy()).await;
    let mut session = Session::new(db, RecordingConnection::new());
    session.persist_record(&leaf()).await.unwrap();

    let conn = session.into_connection();
    assert_eq!(
        conn.log(),
        &[
            "BEGIN",
            "INSERT INTO \"a\" (\"id\", \"type\") VALUES (1, 'aa')",
            "INSERT INTO \"aa\" (\"id\", \"note\", \"type\") VALUES (1, 'hi', 'aaa')",
            "INSERT INTO \"aaa\" (\"id\", \"extra\") VALUES (1, 7)",
            "COMMIT",
        ]
    );
}

#[tokio::test]
async fn test_update_sets_non_key_columns() {
    let db = mapped(joined_hierarchy()).await;
    let mut session = Session::new(db, RecordingConnection::new());
    session.update_record(&leaf()).await.unwrap();

    assert_eq!(
        session.connection().statements(),
        vec![
            "UPDATE \"a\" SET \"type\" = 'aa' WHERE \"id\" = 1",
            "UPDATE \"aa\" SET \"note\" = 'hi', \"type\" = 'aaa' WHERE \"id\" = 1",
            "UPDATE \"aaa\" SET \"extra\" = 7 WHERE \"id\" = 1",
        ]
    );
}

#[tokio::test]
async fn test_remove_deletes_leaf_table_first() {
    let db = mapped(joined_hierarchy()).await;
    let mut session = Session::new(db, RecordingConnection::new());
    session.remove_record(&leaf()).await.unwrap();

    assert_eq!(
        session.connection().statements(),
        vec![
            "DELETE FROM \"aaa\" WHERE \"id\" = 1",
            "DELETE FROM \"aa\" WHERE \"id\" = 1",
            "DELETE FROM \"a\" WHERE \"id\" = 1",
        ]
    );
}

#[tokio::test]
async fn test_remove_requires_primary_key_value() {
    let db = mapped(joined_hierarchy()).await;
    let mut session = Session::new(db, RecordingConnection::new());
    let err = session
        .remove_record(&ObjectRecord::new("AA").with("note", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Query(_)));
    assert!(session.connection().log().is_empty());
}

#[tokio::test]
async fn test_failed_statement_rolls_back() {
    let db = mapped(joined_hierarchy()).await;
    let mut session = Session::new(db, RecordingConnection::new().fail_on("\"aaa\""));
    assert!(session.persist_record(&leaf()).await.is_err());

    let conn = session.connection();
    assert_eq!(conn.log().first().map(String::as_str), Some("BEGIN"));
    assert_eq!(conn.log().last().map(String::as_str), Some("ROLLBACK"));
    assert!(!conn.is_in_transaction());
}

#[tokio::test]
async fn test_single_table_persist_writes_one_row() {
    let db = mapped(vehicles()).await;
    let mut session = Session::new(db, RecordingConnection::new());
    let car = ObjectRecord::new("Car")
        .with("id", 3)
        .with("wheels", 4)
        .with("doors", 5);
    session.persist_record(&car).await.unwrap();

    assert_eq!(
        session.connection().statements(),
        vec!["INSERT INTO \"vehicle\" (\"id\", \"wheels\", \"kind\", \"doors\") VALUES (3, 4, 'car', 5)"]
    );
}

#[tokio::test]
async fn test_non_finite_real_is_not_written() {
    let db = mapped(vehicles()).await;
    let mut session = Session::new(db, RecordingConnection::new());
    let truck = ObjectRecord::new("Truck")
        .with("id", 4)
        .with("wheels", 6)
        .with("payload", f64::NAN);

    let err = session.persist_record(&truck).await.unwrap_err();
    assert!(matches!(err, OrmError::Marshalling(_)));
    let err = session.update_record(&truck).await.unwrap_err();
    assert!(matches!(err, OrmError::Marshalling(_)));
    assert!(session.connection().log().is_empty());
}

#[tokio::test]
async fn test_persist_with_reference() {
    let db = mapped(pets()).await;
    let mut session = Session::new(db, RecordingConnection::new());
    let pet = ObjectRecord::new("Pet")
        .with("id", 2)
        .with_reference("owner", Reference::persisted("Person", [("id", Value::Integer(1))]));
    session.persist_record(&pet).await.unwrap();

    assert_eq!(
        session.connection().statements(),
        vec!["INSERT INTO \"pet\" (\"id\", \"owner_id\") VALUES (2, 1)"]
    );
}

#[tokio::test]
async fn test_session_before_mapping_fails() {
    let db = Database::with_entities(DatabaseConfig::new("test"), joined_hierarchy()).unwrap();
    let mut session = Session::new(db, RecordingConnection::new());
    let err = session.persist_record(&leaf()).await.unwrap_err();
    assert!(matches!(err, OrmError::Query(_)));
}

#[tokio::test]
async fn test_dump_reads_every_table() {
    let db = mapped(pets()).await;
    let mut conn = RecordingConnection::new().with_rows(
        "person",
        vec![vec![Value::Integer(1), Value::from("Ann")]],
    );

    let dump = db.dump(&mut conn).await.unwrap();
    assert_eq!(
        conn.statements(),
        vec![
            "SELECT \"id\", \"name\" FROM \"person\"",
            "SELECT \"id\", \"owner_id\" FROM \"pet\"",
        ]
    );
    assert_eq!(dump.database, "test");
    assert_eq!(dump.version, 1);
    assert_eq!(dump.metadata.table_count, 2);
    assert_eq!(dump.metadata.row_count, 1);
    assert!(dump.table("pet").unwrap().rows.is_empty());
    assert_eq!(
        dump.restore_statements().unwrap(),
        vec!["INSERT INTO \"person\" (\"id\", \"name\") VALUES (1, 'Ann')"]
    );
}

#[derive(Debug, Default)]
struct RecordingMigrator {
    calls: Mutex<Vec<(&'static str, u32, u32, bool)>>,
    fail: bool,
}

impl RecordingMigrator {
    fn calls(&self) -> Vec<(&'static str, u32, u32, bool)> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(
        &self,
        direction: &'static str,
        db: &Database,
        conn: &mut dyn SqlConnection,
        from_version: u32,
        to_version: u32,
    ) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((direction, from_version, to_version, db.is_ready()));
        if self.fail {
            return Err(OrmError::Storage("migration failed".to_string()));
        }
        conn.execute(&format!("-- {} {} -> {}", direction, from_version, to_version))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Migrator for RecordingMigrator {
    async fn upgrade(
        &self,
        db: &Database,
        conn: &mut dyn SqlConnection,
        from_version: u32,
        to_version: u32,
    ) -> Result<()> {
        self.record("upgrade", db, conn, from_version, to_version).await
    }

    async fn downgrade(
        &self,
        db: &Database,
        conn: &mut dyn SqlConnection,
        from_version: u32,
        to_version: u32,
    ) -> Result<()> {
        self.record("downgrade", db, conn, from_version, to_version).await
    }
}

async fn versioned(migrator: Option<Arc<RecordingMigrator>>) -> Arc<Database> {
    let mut config = DatabaseConfig::new("shop").version(3);
    if let Some(migrator) = migrator {
        config = config.migrator(migrator);
    }
    let db = Database::with_entities(config, pets()).unwrap();
    db.map_entities().await.unwrap();
    db
}

#[tokio::test]
async fn test_version_change_upgrades_and_downgrades() {
    let migrator = Arc::new(RecordingMigrator::default());
    let db = versioned(Some(Arc::clone(&migrator))).await;
    let mut conn = RecordingConnection::new();

    db.apply_version_change(&mut conn, 1).await.unwrap();
    db.apply_version_change(&mut conn, 5).await.unwrap();

    assert_eq!(
        migrator.calls(),
        vec![("upgrade", 1, 3, false), ("downgrade", 5, 3, false)]
    );
    assert_eq!(conn.log(), &["-- upgrade 1 -> 3", "-- downgrade 5 -> 3"]);
    assert!(db.is_ready());
}

#[tokio::test]
async fn test_same_version_needs_no_migrator() {
    let db = versioned(None).await;
    let mut conn = RecordingConnection::new();
    db.apply_version_change(&mut conn, 3).await.unwrap();
    assert!(conn.log().is_empty());

    let err = db.apply_version_change(&mut conn, 2).await.unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_failed_migration_restores_readiness() {
    let migrator = Arc::new(RecordingMigrator {
        fail: true,
        ..RecordingMigrator::default()
    });
    let db = versioned(Some(Arc::clone(&migrator))).await;
    let mut conn = RecordingConnection::new();

    let err = db.apply_version_change(&mut conn, 2).await.unwrap_err();
    assert!(matches!(err, OrmError::Storage(_)));
    assert_eq!(migrator.calls().len(), 1);
    assert!(db.is_ready());
}
