//! `CREATE TABLE` synthesis for resolved entities and join tables.
//!
//! Clause order is fixed: column definitions, `PRIMARY KEY`, one `UNIQUE`
//! per declared constraint, then one `FOREIGN KEY` per inheritance link and
//! per owning relationship. Every foreign key is
//! `DEFERRABLE INITIALLY DEFERRED`, so the rows of one object can be
//! inserted in any order inside a transaction.

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;

use crate::core::naming::{quote_identifier, quote_identifier_list};
use crate::core::{ForeignKeyAction, OrmError, Result};
use crate::descriptor::InheritanceStrategy;
use crate::facade::Database;
use crate::mapping::{Column, Entity, EntityId, Relationship};

pub struct DdlSynthesizer<'a> {
    db: &'a Database,
}

impl<'a> DdlSynthesizer<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// `CREATE TABLE` text of an entity, or `None` when the entity has no
    /// table of its own.
    pub async fn entity_ddl(&self, entity: &Arc<Entity>) -> Result<Option<String>> {
        let Some(table) = entity.table_name() else {
            return Ok(None);
        };

        let columns = self.table_columns(entity)?;
        let mut clauses = Vec::with_capacity(columns.len() + 2);
        for (column, force_nullable) in &columns {
            clauses.push(column_definition(column, *force_nullable).await?);
        }

        let keys = entity.primary_keys();
        if !keys.is_empty() {
            clauses.push(format!(
                "PRIMARY KEY ({})",
                quote_identifier_list(keys.iter().map(|column| column.name()))
            ));
        }

        let names: HashSet<&str> = columns.iter().map(|(column, _)| column.name()).collect();
        for constraint in entity
            .descriptor()
            .table
            .iter()
            .flat_map(|table| table.unique_constraints.iter())
        {
            if let Some(missing) = constraint.iter().find(|name| !names.contains(name.as_str())) {
                return Err(OrmError::configuration(
                    entity.type_name(),
                    format!("unique constraint names unknown column '{}'", missing),
                ));
            }
            clauses.push(format!(
                "UNIQUE ({})",
                quote_identifier_list(constraint.iter().map(String::as_str))
            ));
        }

        if entity.strategy() == InheritanceStrategy::Joined {
            if let Some(parent) = entity.parent() {
                let parent = self.db.entity_by_id(parent)?;
                let parent_table = self.referenced_table(entity, &parent)?;
                let key_names: Vec<&str> = keys.iter().map(|column| column.name()).collect();
                clauses.push(foreign_key_clause(
                    &key_names,
                    &parent_table,
                    &key_names,
                    ForeignKeyAction::Cascade,
                    ForeignKeyAction::Cascade,
                ));
            }
        }

        for group in foreign_key_groups(columns.iter().map(|(column, _)| column)) {
            let Some(first) = group.first().and_then(|column| column.foreign_key()) else {
                continue;
            };
            let target = self.db.entity_by_id(first.entity)?;
            let target_table = self.referenced_table(entity, &target)?;
            let local: Vec<&str> = group.iter().map(|column| column.name()).collect();
            let referenced: Vec<&str> = group
                .iter()
                .filter_map(|column| column.foreign_key())
                .map(|target| target.referenced.name())
                .collect();
            clauses.push(foreign_key_clause(
                &local,
                &target_table,
                &referenced,
                first.on_update,
                first.on_delete,
            ));
        }

        let ddl = format!("CREATE TABLE {} ({})", quote_identifier(table), clauses.join(", "));
        debug!("DDL for '{}': {}", entity.type_name(), ddl);
        Ok(Some(ddl))
    }

    /// `CREATE TABLE` text of the join table of an owning many-to-many
    /// relationship.
    pub async fn join_table_ddl(&self, relationship: &Relationship) -> Result<String> {
        let join_table = self.db.join_table(relationship).await?;
        let local = self.db.entity_by_id(join_table.local)?;

        let mut clauses = Vec::new();
        for column in join_table.columns() {
            let mapping = column.mapping().await?;
            clauses.push(format!(
                "{} {} NOT NULL",
                quote_identifier(column.name()),
                mapping.sql_type
            ));
        }
        clauses.push(format!(
            "PRIMARY KEY ({})",
            quote_identifier_list(join_table.columns().map(|column| column.name()))
        ));

        for group in [&join_table.direct, &join_table.inverse] {
            let Some(first) = group.first().and_then(|column| column.foreign_key()) else {
                continue;
            };
            let target = self.db.entity_by_id(first.entity)?;
            let target_table = self.referenced_table(&local, &target)?;
            let names: Vec<&str> = group.iter().map(|column| column.name()).collect();
            let referenced: Vec<&str> = group
                .iter()
                .filter_map(|column| column.foreign_key())
                .map(|target| target.referenced.name())
                .collect();
            clauses.push(foreign_key_clause(
                &names,
                &target_table,
                &referenced,
                first.on_update,
                first.on_delete,
            ));
        }

        let ddl = format!(
            "CREATE TABLE {} ({})",
            quote_identifier(&join_table.name),
            clauses.join(", ")
        );
        debug!("DDL for join table '{}': {}", join_table.name, ddl);
        Ok(ddl)
    }

    /// Columns stored in the entity's table. A single-table root also holds
    /// every descendant's own columns, which must be nullable there.
    pub(crate) fn table_columns(&self, entity: &Arc<Entity>) -> Result<Vec<(Arc<Column>, bool)>> {
        let mut columns: Vec<(Arc<Column>, bool)> = entity
            .columns()
            .iter()
            .map(|column| (Arc::clone(column), false))
            .collect();

        if entity.strategy() == InheritanceStrategy::SingleTable {
            for descendant in self.db.descendants(entity)? {
                for column in descendant.own_columns() {
                    if let Some((existing, _)) =
                        columns.iter().find(|(existing, _)| existing.name() == column.name())
                    {
                        return Err(OrmError::configuration(
                            descendant.type_name(),
                            format!(
                                "column '{}' clashes with the one mapped by '{}' in single table '{}'",
                                column.name(),
                                self.type_name_of(existing.declared_by()),
                                entity.table_name().unwrap_or_default()
                            ),
                        ));
                    }
                    columns.push((Arc::clone(column), true));
                }
            }
        }
        Ok(columns)
    }

    fn referenced_table(&self, from: &Entity, target: &Arc<Entity>) -> Result<String> {
        self.db
            .table_owner(target)
            .ok()
            .and_then(|owner| owner.table_name().map(str::to_string))
            .ok_or_else(|| {
                OrmError::configuration(
                    from.type_name(),
                    format!("references '{}', which has no table", target.type_name()),
                )
            })
    }

    fn type_name_of(&self, id: EntityId) -> String {
        self.db
            .entity_by_id(id)
            .map(|entity| entity.type_name().to_string())
            .unwrap_or_else(|_| id.to_string())
    }
}

async fn column_definition(column: &Column, force_nullable: bool) -> Result<String> {
    let mapping = column.mapping().await?;
    let name = quote_identifier(column.name());
    if let Some(definition) = &mapping.definition {
        return Ok(format!("{} {}", name, definition));
    }

    let mut ddl = format!("{} {}", name, mapping.sql_type);
    if !mapping.nullable && !force_nullable {
        ddl.push_str(" NOT NULL");
    }
    if mapping.unique {
        ddl.push_str(" UNIQUE");
    }
    if let Some(default) = &mapping.default_value {
        ddl.push_str(" DEFAULT ");
        ddl.push_str(default);
    }
    Ok(ddl)
}

fn foreign_key_clause(
    columns: &[&str],
    table: &str,
    referenced: &[&str],
    on_update: ForeignKeyAction,
    on_delete: ForeignKeyAction,
) -> String {
    format!(
        "FOREIGN KEY ({}) REFERENCES {} ({}) ON UPDATE {} ON DELETE {} DEFERRABLE INITIALLY DEFERRED",
        quote_identifier_list(columns.iter().copied()),
        quote_identifier(table),
        quote_identifier_list(referenced.iter().copied()),
        on_update,
        on_delete
    )
}

/// Relationship foreign-key columns grouped per (declaring entity, field),
/// in order of first appearance.
fn foreign_key_groups<'c>(
    columns: impl Iterator<Item = &'c Arc<Column>>,
) -> Vec<Vec<&'c Arc<Column>>> {
    let mut groups: Vec<((EntityId, &str), Vec<&Arc<Column>>)> = Vec::new();
    for column in columns {
        let Some(target) = column.foreign_key() else {
            continue;
        };
        let key = (column.declared_by(), target.relationship.as_str());
        match groups.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, group)) => group.push(column),
            None => groups.push((key, vec![column])),
        }
    }
    groups.into_iter().map(|(_, group)| group).collect()
}
