#![allow(dead_code)]

use std::sync::Arc;

use entitymap::core::AttributeType;
use entitymap::descriptor::{
    DiscriminatorDescriptor, EntityDescriptor, FieldDescriptor, InheritanceStrategy,
    RelationshipDescriptor,
};
use entitymap::{Database, DatabaseConfig};

pub fn id_field() -> FieldDescriptor {
    FieldDescriptor::new("id", AttributeType::Long).id()
}

pub async fn mapped(descriptors: Vec<EntityDescriptor>) -> Arc<Database> {
    let db = Database::with_entities(DatabaseConfig::new("test"), descriptors).unwrap();
    db.map_entities().await.unwrap();
    db
}

/// `A` (table `a`, discriminator `type`) <- `AA` ("aa") <- `AAA` ("aaa"), joined.
pub fn joined_hierarchy() -> Vec<EntityDescriptor> {
    vec![
        EntityDescriptor::new("A")
            .table("a")
            .discriminator_column(DiscriminatorDescriptor::new("type"))
            .field(id_field()),
        EntityDescriptor::new("AA")
            .extends("A")
            .table("aa")
            .discriminator_value("aa")
            .field(FieldDescriptor::new("note", AttributeType::String)),
        EntityDescriptor::new("AAA")
            .extends("AA")
            .extends("A")
            .table("aaa")
            .discriminator_value("aaa")
            .field(FieldDescriptor::new("extra", AttributeType::Integer)),
    ]
}

/// Single-table `Vehicle` with `Car` and `Truck`.
pub fn vehicles() -> Vec<EntityDescriptor> {
    vec![
        EntityDescriptor::new("Vehicle")
            .table("vehicle")
            .inheritance(InheritanceStrategy::SingleTable)
            .discriminator_column(DiscriminatorDescriptor::new("kind").length(8))
            .field(id_field())
            .field(FieldDescriptor::new("wheels", AttributeType::Integer)),
        EntityDescriptor::new("Car")
            .extends("Vehicle")
            .discriminator_value("car")
            .field(FieldDescriptor::new("doors", AttributeType::Integer).not_null()),
        EntityDescriptor::new("Truck")
            .extends("Vehicle")
            .discriminator_value("truck")
            .field(FieldDescriptor::new("payload", AttributeType::Double)),
    ]
}

/// Abstract table-per-class `Shape` with `Circle` and `Square`.
pub fn shapes() -> Vec<EntityDescriptor> {
    vec![
        EntityDescriptor::new("Shape")
            .abstract_entity()
            .inheritance(InheritanceStrategy::TablePerClass)
            .discriminator_column(DiscriminatorDescriptor::default())
            .field(id_field())
            .field(FieldDescriptor::new("name", AttributeType::String)),
        EntityDescriptor::new("Circle")
            .extends("Shape")
            .table("circle")
            .discriminator_value("circle")
            .field(FieldDescriptor::new("radius", AttributeType::Double)),
        EntityDescriptor::new("Square")
            .extends("Shape")
            .table("square")
            .discriminator_value("square")
            .field(FieldDescriptor::new("side", AttributeType::Double)),
    ]
}

/// `Person` owning many `Pet`s through `Pet.owner`.
pub fn pets() -> Vec<EntityDescriptor> {
    vec![
        EntityDescriptor::new("Person")
            .table("person")
            .field(id_field())
            .field(FieldDescriptor::new("name", AttributeType::String).not_null())
            .field(FieldDescriptor::relationship(
                "pets",
                RelationshipDescriptor::one_to_many("Pet", "owner"),
            )),
        EntityDescriptor::new("Pet")
            .table("pet")
            .field(id_field())
            .field(FieldDescriptor::relationship(
                "owner",
                RelationshipDescriptor::many_to_one("Person"),
            )),
    ]
}
