/// DDL synthesis tests
///
/// Exact CREATE TABLE text for every inheritance strategy, relationship
/// foreign keys and join tables.
/// Run with: cargo test --test ddl_tests

mod common;

use common::{id_field, joined_hierarchy, mapped, pets, shapes, vehicles};
use entitymap::connection::recording::RecordingConnection;
use entitymap::core::{AttributeType, ForeignKeyAction};
use entitymap::descriptor::{
    DiscriminatorDescriptor, EntityDescriptor, FieldDescriptor, JoinColumnDescriptor,
    JoinTableDescriptor, RelationshipDescriptor,
};
use entitymap::{Database, DatabaseConfig};

const DEFERRED: &str = "DEFERRABLE INITIALLY DEFERRED";

#[tokio::test]
async fn test_joined_child_references_parent_with_cascade() {
    let db = mapped(vec![
        EntityDescriptor::new("A")
            .table("a")
            .discriminator_column(DiscriminatorDescriptor::new("type"))
            .field(id_field()),
        EntityDescriptor::new("AA")
            .extends("A")
            .table("aa")
            .discriminator_value("aa"),
    ])
    .await;

    assert_eq!(
        db.schema_ddl().await.unwrap(),
        vec![
            "CREATE TABLE \"a\" (\"id\" INTEGER NOT NULL, \"type\" TEXT NOT NULL, PRIMARY KEY (\"id\"))".to_string(),
            format!(
                "CREATE TABLE \"aa\" (\"id\" INTEGER NOT NULL, PRIMARY KEY (\"id\"), \
                 FOREIGN KEY (\"id\") REFERENCES \"a\" (\"id\") ON UPDATE CASCADE ON DELETE CASCADE {})",
                DEFERRED
            ),
        ]
    );
}

#[tokio::test]
async fn test_intermediate_table_carries_its_own_discriminator() {
    let db = mapped(joined_hierarchy()).await;
    let aa = db.entity("AA").unwrap();
    let ddl = db.ddl().entity_ddl(&aa).await.unwrap().unwrap();

    assert_eq!(
        ddl,
        format!(
            "CREATE TABLE \"aa\" (\"id\" INTEGER NOT NULL, \"note\" TEXT, \"type\" TEXT NOT NULL, \
             PRIMARY KEY (\"id\"), FOREIGN KEY (\"id\") REFERENCES \"a\" (\"id\") \
             ON UPDATE CASCADE ON DELETE CASCADE {})",
            DEFERRED
        )
    );
}

#[tokio::test]
async fn test_single_table_holds_descendant_columns_as_nullable() {
    let db = mapped(vehicles()).await;

    assert_eq!(
        db.schema_ddl().await.unwrap(),
        vec![
            "CREATE TABLE \"vehicle\" (\"id\" INTEGER NOT NULL, \"wheels\" INTEGER, \
             \"kind\" TEXT NOT NULL, \"doors\" INTEGER, \"payload\" REAL, PRIMARY KEY (\"id\"))"
                .to_string()
        ]
    );
    let car = db.entity("Car").unwrap();
    assert_eq!(db.ddl().entity_ddl(&car).await.unwrap(), None);
}

#[tokio::test]
async fn test_table_per_class_has_no_parent_foreign_key() {
    let db = mapped(shapes()).await;

    assert_eq!(
        db.schema_ddl().await.unwrap(),
        vec![
            "CREATE TABLE \"circle\" (\"id\" INTEGER NOT NULL, \"name\" TEXT, \
             \"dtype\" TEXT NOT NULL, \"radius\" REAL, PRIMARY KEY (\"id\"))"
                .to_string(),
            "CREATE TABLE \"square\" (\"id\" INTEGER NOT NULL, \"name\" TEXT, \
             \"dtype\" TEXT NOT NULL, \"side\" REAL, PRIMARY KEY (\"id\"))"
                .to_string(),
        ]
    );
}

#[tokio::test]
async fn test_many_to_one_foreign_key_uses_configured_defaults() {
    let db = Database::with_entities(
        DatabaseConfig::new("test")
            .default_foreign_key_actions(ForeignKeyAction::Cascade, ForeignKeyAction::SetNull),
        pets(),
    )
    .unwrap();
    db.map_entities().await.unwrap();

    let pet = db.entity("Pet").unwrap();
    assert_eq!(
        db.ddl().entity_ddl(&pet).await.unwrap().unwrap(),
        format!(
            "CREATE TABLE \"pet\" (\"id\" INTEGER NOT NULL, \"owner_id\" INTEGER, PRIMARY KEY (\"id\"), \
             FOREIGN KEY (\"owner_id\") REFERENCES \"person\" (\"id\") ON UPDATE CASCADE ON DELETE SET NULL {})",
            DEFERRED
        )
    );

    // the one-to-many side holds no column
    let person = db.entity("Person").unwrap();
    assert!(person.column("pets_id").is_none());
    let pets = person.relationship("pets").unwrap();
    assert!(!pets.is_owning());
    assert_eq!(pets.foreign_key_holder(), Some((pet.id(), "owner")));
}

#[tokio::test]
async fn test_one_to_one_join_column_is_unique() {
    let mut descriptors = pets();
    descriptors.push(
        EntityDescriptor::new("Passport")
            .table("passport")
            .field(FieldDescriptor::new("number", AttributeType::String).id())
            .field(FieldDescriptor::relationship(
                "holder",
                RelationshipDescriptor::one_to_one("Person").join_column(
                    JoinColumnDescriptor::new("holder")
                        .not_null()
                        .on_delete(ForeignKeyAction::Cascade),
                ),
            )),
    );
    let db = mapped(descriptors).await;

    let passport = db.entity("Passport").unwrap();
    assert_eq!(
        db.ddl().entity_ddl(&passport).await.unwrap().unwrap(),
        format!(
            "CREATE TABLE \"passport\" (\"number\" TEXT NOT NULL, \"holder\" INTEGER NOT NULL UNIQUE, \
             PRIMARY KEY (\"number\"), FOREIGN KEY (\"holder\") REFERENCES \"person\" (\"id\") \
             ON UPDATE NO ACTION ON DELETE CASCADE {})",
            DEFERRED
        )
    );
}

#[tokio::test]
async fn test_self_and_mutual_references_resolve() {
    let db = mapped(vec![
        EntityDescriptor::new("Employee")
            .table("employee")
            .field(id_field())
            .field(FieldDescriptor::relationship(
                "manager",
                RelationshipDescriptor::many_to_one("Employee"),
            ))
            .field(FieldDescriptor::relationship(
                "department",
                RelationshipDescriptor::many_to_one("Department"),
            )),
        EntityDescriptor::new("Department")
            .table("department")
            .field(FieldDescriptor::new("code", AttributeType::String).id())
            .field(FieldDescriptor::relationship(
                "head",
                RelationshipDescriptor::many_to_one("Employee"),
            )),
    ])
    .await;

    let employee = db.entity("Employee").unwrap();
    let ddl = db.ddl().entity_ddl(&employee).await.unwrap().unwrap();
    assert!(ddl.contains("\"manager_id\" INTEGER, \"department_code\" TEXT"), "{}", ddl);
    assert!(ddl.contains("FOREIGN KEY (\"manager_id\") REFERENCES \"employee\" (\"id\")"));
    assert!(ddl.contains("FOREIGN KEY (\"department_code\") REFERENCES \"department\" (\"code\")"));
}

#[tokio::test]
async fn test_unique_constraints_follow_primary_key() {
    let db = mapped(vec![EntityDescriptor::new("Account")
        .table("account")
        .unique_constraint(["bank", "number"])
        .field(id_field())
        .field(FieldDescriptor::new("bank", AttributeType::String))
        .field(FieldDescriptor::new("number", AttributeType::String).default_value("'0000'"))])
    .await;

    assert_eq!(
        db.schema_ddl().await.unwrap(),
        vec![
            "CREATE TABLE \"account\" (\"id\" INTEGER NOT NULL, \"bank\" TEXT, \
             \"number\" TEXT DEFAULT '0000', PRIMARY KEY (\"id\"), UNIQUE (\"bank\", \"number\"))"
                .to_string()
        ]
    );
}

#[tokio::test]
async fn test_unique_constraint_on_unknown_column_fails() {
    let db = mapped(vec![EntityDescriptor::new("Account")
        .table("account")
        .unique_constraint(["iban"])
        .field(id_field())])
    .await;
    let err = db.schema_ddl().await.unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("'iban'"));
}

#[tokio::test]
async fn test_identifiers_are_quoted() {
    let db = mapped(vec![EntityDescriptor::new("Odd")
        .table("we\"ird")
        .field(id_field().column_name("i\"d"))])
    .await;
    assert_eq!(
        db.schema_ddl().await.unwrap(),
        vec!["CREATE TABLE \"we\"\"ird\" (\"i\"\"d\" INTEGER NOT NULL, PRIMARY KEY (\"i\"\"d\"))".to_string()]
    );
}

fn students_and_courses(join_table: Option<JoinTableDescriptor>) -> Vec<EntityDescriptor> {
    let mut courses = RelationshipDescriptor::many_to_many("Course");
    if let Some(join_table) = join_table {
        courses = courses.join_table(join_table);
    }
    vec![
        EntityDescriptor::new("Student")
            .table("student")
            .field(FieldDescriptor::new("school", AttributeType::Integer).id())
            .field(FieldDescriptor::new("number", AttributeType::Integer).id())
            .field(FieldDescriptor::relationship("courses", courses)),
        EntityDescriptor::new("Course")
            .table("course")
            .field(FieldDescriptor::new("code", AttributeType::String).id())
            .field(FieldDescriptor::new("term", AttributeType::Integer).id())
            .field(FieldDescriptor::relationship(
                "students",
                RelationshipDescriptor::many_to_many("Student").mapped_by("courses"),
            )),
    ]
}

#[tokio::test]
async fn test_many_to_many_join_table_with_composite_groups() {
    let join_table = JoinTableDescriptor::new("enrollment")
        .join_column(JoinColumnDescriptor::referencing("student_school", "school"))
        .join_column(JoinColumnDescriptor::referencing("student_number", "number"))
        .inverse_join_column(JoinColumnDescriptor::referencing("course_code", "code"))
        .inverse_join_column(JoinColumnDescriptor::referencing("course_term", "term"));
    let db = mapped(students_and_courses(Some(join_table))).await;

    let ddl = db.schema_ddl().await.unwrap();
    assert_eq!(ddl.len(), 3);
    assert_eq!(
        ddl[2],
        format!(
            "CREATE TABLE \"enrollment\" (\"student_school\" INTEGER NOT NULL, \
             \"student_number\" INTEGER NOT NULL, \"course_code\" TEXT NOT NULL, \
             \"course_term\" INTEGER NOT NULL, PRIMARY KEY (\"student_school\", \
             \"student_number\", \"course_code\", \"course_term\"), \
             FOREIGN KEY (\"student_school\", \"student_number\") REFERENCES \"student\" \
             (\"school\", \"number\") ON UPDATE CASCADE ON DELETE CASCADE {deferred}, \
             FOREIGN KEY (\"course_code\", \"course_term\") REFERENCES \"course\" \
             (\"code\", \"term\") ON UPDATE CASCADE ON DELETE CASCADE {deferred})",
            deferred = DEFERRED
        )
    );
    assert_eq!(ddl[2].matches("FOREIGN KEY").count(), 2);
}

#[tokio::test]
async fn test_join_table_default_names() {
    let db = mapped(students_and_courses(None)).await;
    let student = db.entity("Student").unwrap();
    let courses = student.relationship("courses").unwrap();
    let join_table = db.join_table(courses).await.unwrap();

    assert_eq!(join_table.name, "student_course");
    let names: Vec<&str> = join_table.columns().map(|c| c.name()).collect();
    assert_eq!(
        names,
        vec!["student_school", "student_number", "course_code", "course_term"]
    );

    let course = db.entity("Course").unwrap();
    let students = course.relationship("students").unwrap();
    assert!(db.join_table(students).await.is_err());
}

#[tokio::test]
async fn test_create_schema_runs_in_one_transaction() {
    let db = mapped(pets()).await;
    let mut conn = RecordingConnection::new();
    db.create_schema(&mut conn).await.unwrap();

    let log = conn.log();
    assert_eq!(log.len(), 4);
    assert_eq!(log[0], "BEGIN");
    assert!(log[1].starts_with("CREATE TABLE \"person\""));
    assert!(log[2].starts_with("CREATE TABLE \"pet\""));
    assert_eq!(log[3], "COMMIT");
}

#[tokio::test]
async fn test_create_schema_rolls_back_on_failure() {
    let db = mapped(pets()).await;
    let mut conn = RecordingConnection::new().fail_on("\"pet\"");
    assert!(db.create_schema(&mut conn).await.is_err());
    assert_eq!(conn.log().last().map(String::as_str), Some("ROLLBACK"));
}

#[tokio::test]
async fn test_schema_ddl_requires_mapping() {
    let db = Database::with_entities(DatabaseConfig::new("test"), pets()).unwrap();
    assert!(db.schema_ddl().await.is_err());
}
