use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use futures::future::{join_all, try_join_all};
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::Catalog;
use crate::connection::config::DatabaseConfig;
use crate::connection::{SqlConnection, run_in_transaction};
use crate::core::{OrmError, Result};
use crate::ddl::DdlSynthesizer;
use crate::descriptor::{EntityDescriptor, InheritanceStrategy};
use crate::mapping::{Entity, EntityId, JoinTable, Promise, Relationship, resolver};
use crate::marshal::{MappedObject, Marshaller, Row, TableRow};
use crate::storage::{SchemaDump, dump};

#[derive(Debug, Clone, Copy, Default)]
struct MappingStatus {
    registered: usize,
    sealed: bool,
    /// Entities whose resolution has not completed yet.
    remaining: usize,
    /// Version-change guards currently alive.
    upgrading: usize,
}

impl MappingStatus {
    fn is_mapped(&self) -> bool {
        self.sealed && self.remaining == 0
    }

    fn is_ready(&self) -> bool {
        self.is_mapped() && self.upgrading == 0
    }
}

/// Registry of every entity of one logical database.
///
/// Entities are registered first; the first call to `map_entities` (or
/// `resolve`) seals the registry and resolves every entity concurrently, one
/// task per entity. The registry is explicitly constructed and passed around,
/// so several independent databases can live in one process.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use entitymap::core::AttributeType;
/// use entitymap::descriptor::{EntityDescriptor, FieldDescriptor};
/// use entitymap::{Database, DatabaseConfig};
///
/// # #[tokio::main]
/// # async fn main() -> entitymap::Result<()> {
/// let db = Arc::new(Database::new(DatabaseConfig::new("shop")));
/// db.register(
///     EntityDescriptor::new("Customer")
///         .default_table()
///         .field(FieldDescriptor::new("id", AttributeType::Long).id()),
/// )?;
/// db.map_entities().await?;
///
/// let ddl = db.schema_ddl().await?;
/// assert_eq!(
///     ddl,
///     vec!["CREATE TABLE \"customer\" (\"id\" INTEGER NOT NULL, PRIMARY KEY (\"id\"))"]
/// );
/// # Ok(())
/// # }
/// ```
pub struct Database {
    config: DatabaseConfig,
    catalog: RwLock<Catalog>,
    /// Published when resolution starts; read lock-free from then on.
    sealed: OnceLock<Catalog>,
    status: watch::Sender<MappingStatus>,
    started: OnceLock<()>,
    outcome: Promise<Result<()>>,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Self {
        let (status, _) = watch::channel(MappingStatus::default());
        Self {
            config,
            catalog: RwLock::new(Catalog::new()),
            sealed: OnceLock::new(),
            status,
            started: OnceLock::new(),
            outcome: Promise::new(),
        }
    }

    /// Creates a database and registers every descriptor, in order.
    pub fn with_entities(
        config: DatabaseConfig,
        descriptors: impl IntoIterator<Item = EntityDescriptor>,
    ) -> Result<Arc<Self>> {
        config.validate().map_err(OrmError::Configuration)?;
        let db = Self::new(config);
        for descriptor in descriptors {
            db.register(descriptor)?;
        }
        Ok(Arc::new(db))
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn version(&self) -> u32 {
        self.config.version
    }

    /// Adds a domain type. Fails once resolution has started.
    pub fn register(&self, descriptor: EntityDescriptor) -> Result<EntityId> {
        let mut catalog = self.catalog.write()?;
        if self.sealed.get().is_some() {
            return Err(OrmError::configuration(
                &descriptor.type_name,
                format!(
                    "database '{}' is already mapping; entities must be registered first",
                    self.config.name
                ),
            ));
        }

        let type_name = descriptor.type_name.clone();
        let (next, id) = catalog.clone().with_entity(descriptor)?;
        *catalog = next;
        self.status.send_modify(|status| {
            status.registered += 1;
            status.remaining += 1;
        });
        debug!("Registered entity '{}' as {} in '{}'", type_name, id, self.config.name);
        Ok(id)
    }

    fn catalog(&self) -> Catalog {
        match self.sealed.get() {
            Some(catalog) => catalog.clone(),
            None => self
                .catalog
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    fn seal(&self) -> Catalog {
        let catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        let sealed = self.sealed.get_or_init(|| catalog.clone()).clone();
        self.status.send_modify(|status| status.sealed = true);
        sealed
    }

    pub fn entity(&self, type_name: &str) -> Option<Arc<Entity>> {
        self.catalog().lookup(type_name).cloned()
    }

    /// Looks up a registered entity, failing for types outside this database.
    pub fn require_entity(&self, type_name: &str) -> Result<Arc<Entity>> {
        self.entity(type_name).ok_or_else(|| {
            OrmError::Query(format!(
                "'{}' is not an entity of database '{}'",
                type_name, self.config.name
            ))
        })
    }

    pub fn entity_by_id(&self, id: EntityId) -> Result<Arc<Entity>> {
        self.catalog().get(id).cloned().ok_or_else(|| {
            OrmError::Mapping(format!(
                "entity {} is not part of database '{}'",
                id, self.config.name
            ))
        })
    }

    pub fn entities(&self) -> Vec<Arc<Entity>> {
        self.catalog().entities().to_vec()
    }

    /// Waits until `type_name` is registered. Returns `None` once the
    /// registry is sealed without it.
    pub async fn wait_recognized(&self, type_name: &str) -> Option<Arc<Entity>> {
        let mut rx = self.status.subscribe();
        loop {
            let status = *rx.borrow_and_update();
            if let Some(entity) = self.entity(type_name) {
                return Some(entity);
            }
            if status.sealed {
                return None;
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Resolves every entity. Idempotent: concurrent and repeated calls share
    /// one resolution pass and observe the same outcome.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn map_entities(self: &Arc<Self>) -> Result<()> {
        self.start_mapping();
        self.outcome.wait().await.clone()
    }

    /// Resolves one entity (starting resolution of the whole database if
    /// needed) and returns it once its own resolution has completed.
    pub async fn resolve(self: &Arc<Self>, type_name: &str) -> Result<Arc<Entity>> {
        self.start_mapping();
        let entity = self.require_entity(type_name)?;
        entity.wait_resolved().await?;
        Ok(entity)
    }

    fn start_mapping(self: &Arc<Self>) {
        self.started.get_or_init(|| {
            let catalog = self.seal();
            info!(
                "Mapping {} entities of database '{}'",
                catalog.len(),
                self.config.name
            );
            let db = Arc::clone(self);
            tokio::spawn(async move { db.drive_resolution(catalog).await });
        });
    }

    async fn drive_resolution(self: Arc<Self>, catalog: Catalog) {
        let mut tasks = JoinSet::new();
        for entity in catalog.entities() {
            let db = Arc::clone(&self);
            let entity = Arc::clone(entity);
            tasks.spawn(async move {
                let result = resolver::resolve_entity(&db, &entity).await;
                entity.outcome.fulfill(result.clone());
                if result.is_ok() {
                    db.status.send_modify(|status| status.remaining -= 1);
                }
                result
            });
        }

        let mut outcome = Ok(());
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| OrmError::Mapping(format!("entity resolution task failed: {}", e)))
                .and_then(|result| result);
            if let Err(err) = result {
                tasks.abort_all();
                outcome = Err(err);
                break;
            }
        }

        match &outcome {
            Ok(()) => info!("Database '{}' mapped", self.config.name),
            Err(err) => {
                warn!("Mapping database '{}' failed: {}", self.config.name, err);
                for entity in catalog.entities() {
                    entity.outcome.fulfill(Err(err.clone()));
                }
            }
        }
        self.outcome.fulfill(outcome);
    }

    /// Number of entities not yet resolved.
    pub fn mapping_status(&self) -> usize {
        self.status.borrow().remaining
    }

    pub fn is_mapped(&self) -> bool {
        self.status.borrow().is_mapped()
    }

    pub fn is_ready(&self) -> bool {
        self.status.borrow().is_ready()
    }

    /// Waits until every entity is resolved.
    pub async fn wait_mapped(&self) {
        let mut rx = self.status.subscribe();
        let _ = rx.wait_for(MappingStatus::is_mapped).await;
    }

    /// Waits until every entity is resolved and no version change is running.
    pub async fn wait_ready(&self) {
        let mut rx = self.status.subscribe();
        let _ = rx.wait_for(MappingStatus::is_ready).await;
    }

    /// Marks the database not ready until the returned guard is dropped.
    ///
    /// Guards nest: readiness returns once the last one is dropped.
    pub fn begin_version_change(&self) -> VersionChange<'_> {
        self.status.send_modify(|status| status.upgrading += 1);
        VersionChange { db: self }
    }

    /// Brings a store at `stored_version` to the configured version through the
    /// configured migrator. Readiness is withheld while it runs.
    pub async fn apply_version_change(
        &self,
        conn: &mut dyn SqlConnection,
        stored_version: u32,
    ) -> Result<()> {
        self.wait_mapped().await;
        let target = self.config.version;
        if stored_version == target {
            return Ok(());
        }
        let migrator = self.config.migrator.clone().ok_or_else(|| {
            OrmError::configuration(
                &self.config.name,
                format!(
                    "no migrator to move from version {} to {}",
                    stored_version, target
                ),
            )
        })?;

        let _change = self.begin_version_change();
        info!(
            "Migrating database '{}' from version {} to {}",
            self.config.name, stored_version, target
        );
        if stored_version < target {
            migrator.upgrade(self, conn, stored_version, target).await
        } else {
            migrator.downgrade(self, conn, stored_version, target).await
        }
    }

    /// Waits until every parent link of the database is established.
    pub(crate) async fn wait_hierarchy_linked(&self) {
        let catalog = self.catalog();
        join_all(catalog.entities().iter().map(|entity| entity.wait_parent())).await;
    }

    /// Entities from the hierarchy root down to `entity`.
    pub fn ancestry(&self, entity: &Arc<Entity>) -> Result<Vec<Arc<Entity>>> {
        let mut chain = vec![Arc::clone(entity)];
        let mut current = entity.parent();
        while let Some(id) = current {
            let parent = self.entity_by_id(id)?;
            current = parent.parent();
            chain.push(parent);
        }
        chain.reverse();
        Ok(chain)
    }

    pub fn root_of(&self, entity: &Arc<Entity>) -> Result<Arc<Entity>> {
        let mut current = Arc::clone(entity);
        while let Some(id) = current.parent() {
            current = self.entity_by_id(id)?;
        }
        Ok(current)
    }

    /// Distance from the hierarchy root.
    pub fn depth(&self, entity: &Entity) -> Result<usize> {
        let mut depth = 0;
        let mut current = entity.parent();
        while let Some(id) = current {
            depth += 1;
            current = self.entity_by_id(id)?.parent();
        }
        Ok(depth)
    }

    /// Every entity below `entity`, depth-first in child order.
    pub fn descendants(&self, entity: &Entity) -> Result<Vec<Arc<Entity>>> {
        let mut found = Vec::new();
        let mut stack: Vec<EntityId> = entity.children().iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let child = self.entity_by_id(id)?;
            stack.extend(child.children().iter().rev().copied());
            found.push(child);
        }
        Ok(found)
    }

    /// Entity whose table stores `entity`'s own columns.
    pub fn table_owner(&self, entity: &Arc<Entity>) -> Result<Arc<Entity>> {
        let owner = match entity.strategy() {
            InheritanceStrategy::SingleTable => self.root_of(entity)?,
            InheritanceStrategy::Joined | InheritanceStrategy::TablePerClass => Arc::clone(entity),
        };
        if owner.table_name().is_none() {
            return Err(OrmError::Query(format!(
                "entity '{}' has no table of its own",
                entity.type_name()
            )));
        }
        Ok(owner)
    }

    /// Alias level of the table holding `entity`'s own columns: the depth
    /// for joined hierarchies, 0 where one physical table holds each row.
    pub fn alias_level(&self, entity: &Entity) -> Result<usize> {
        match entity.strategy() {
            InheritanceStrategy::Joined => self.depth(entity),
            InheritanceStrategy::SingleTable | InheritanceStrategy::TablePerClass => Ok(0),
        }
    }

    /// Fails unless resolution has run and succeeded; waits for it while it
    /// is still running.
    pub async fn require_mapped(&self) -> Result<()> {
        if self.started.get().is_none() {
            return Err(OrmError::Query(format!(
                "database '{}' is not mapped; call map_entities first",
                self.config.name
            )));
        }
        self.outcome.wait().await.clone()
    }

    /// Join table of an owning many-to-many relationship, built on first use.
    pub async fn join_table(&self, relationship: &Relationship) -> Result<Arc<JoinTable>> {
        if !relationship.has_join_table() {
            return Err(OrmError::Query(format!(
                "relationship '{}' has no join table",
                relationship.field()
            )));
        }
        relationship
            .join_table_cell()
            .get_or_try_init(|| resolver::build_join_table(self, relationship))
            .await
            .cloned()
    }

    /// Every relationship that owns a join table, in entity order.
    pub fn join_table_relationships(&self) -> Vec<Arc<Relationship>> {
        self.catalog()
            .entities()
            .iter()
            .flat_map(|entity| entity.relationships().iter())
            .filter(|relationship| relationship.has_join_table())
            .cloned()
            .collect()
    }

    pub fn ddl(&self) -> DdlSynthesizer<'_> {
        DdlSynthesizer::new(self)
    }

    pub fn marshaller(&self) -> Marshaller<'_> {
        Marshaller::new(self)
    }

    /// Rows storing `object`, root table first.
    pub fn to_rows<T: MappedObject>(&self, object: &T) -> Result<Vec<TableRow>> {
        self.marshaller().object_to_rows(&object.to_record())
    }

    /// Reads a query row over `type_name` back into a typed object.
    pub fn from_row<T: MappedObject>(&self, type_name: &str, row: &Row) -> Result<T> {
        T::from_record(self.marshaller().row_to_object(type_name, row)?)
    }

    /// `CREATE TABLE` statements for the whole database: entity tables in
    /// registration order, then join tables.
    pub async fn schema_ddl(&self) -> Result<Vec<String>> {
        self.require_mapped().await?;
        let ddl = self.ddl();
        let catalog = self.catalog();
        let mut statements: Vec<String> =
            try_join_all(catalog.entities().iter().map(|entity| ddl.entity_ddl(entity)))
                .await?
                .into_iter()
                .flatten()
                .collect();
        for relationship in self.join_table_relationships() {
            statements.push(ddl.join_table_ddl(&relationship).await?);
        }
        Ok(statements)
    }

    /// Table names with their column names, in `schema_ddl` order.
    pub async fn table_layout(&self) -> Result<Vec<(String, Vec<String>)>> {
        self.require_mapped().await?;
        let ddl = self.ddl();
        let mut layout = Vec::new();
        for entity in self.catalog().entities() {
            let Some(table) = entity.table_name() else {
                continue;
            };
            let columns = ddl
                .table_columns(entity)?
                .iter()
                .map(|(column, _)| column.name().to_string())
                .collect();
            layout.push((table.to_string(), columns));
        }
        for relationship in self.join_table_relationships() {
            let join_table = self.join_table(&relationship).await?;
            let columns = join_table
                .columns()
                .map(|column| column.name().to_string())
                .collect();
            layout.push((join_table.name.clone(), columns));
        }
        Ok(layout)
    }

    /// Reads the rows of every table, for the migration framework.
    pub async fn dump(&self, conn: &mut dyn SqlConnection) -> Result<SchemaDump> {
        dump::dump(self, conn).await
    }

    /// Creates every table in one transaction, entity tables before join tables.
    pub async fn create_schema(&self, conn: &mut dyn SqlConnection) -> Result<()> {
        let statements = self.schema_ddl().await?;
        info!(
            "Creating {} tables for database '{}'",
            statements.len(),
            self.config.name
        );
        run_in_transaction(conn, &statements).await
    }
}

/// Guard returned by `Database::begin_version_change`.
pub struct VersionChange<'a> {
    db: &'a Database,
}

impl Drop for VersionChange<'_> {
    fn drop(&mut self) {
        self.db
            .status
            .send_modify(|status| status.upgrading = status.upgrading.saturating_sub(1));
    }
}
