use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Migrator;
use crate::core::ForeignKeyAction;
use crate::descriptor::InheritanceStrategy;

/// Logical database configuration
///
/// Carries the name/version/migrator triple handed over by the configuration
/// loader, plus mapping defaults applied where descriptors are silent.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Logical database name
    pub name: String,

    /// Schema version the mapped entities describe
    pub version: u32,

    /// Strategy of hierarchy roots that declare none
    #[serde(default)]
    pub default_inheritance: InheritanceStrategy,

    /// `ON UPDATE` action of relationship foreign keys that declare none
    #[serde(default)]
    pub default_on_update: ForeignKeyAction,

    /// `ON DELETE` action of relationship foreign keys that declare none
    #[serde(default)]
    pub default_on_delete: ForeignKeyAction,

    /// Upgrade/downgrade hooks between schema versions
    #[serde(skip)]
    pub migrator: Option<Arc<dyn Migrator>>,
}

impl DatabaseConfig {
    /// Create a configuration at version 1
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: 1,
            default_inheritance: InheritanceStrategy::default(),
            default_on_update: ForeignKeyAction::default(),
            default_on_delete: ForeignKeyAction::default(),
            migrator: None,
        }
    }

    /// Set the schema version
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the strategy used by roots that declare none
    pub fn default_inheritance(mut self, strategy: InheritanceStrategy) -> Self {
        self.default_inheritance = strategy;
        self
    }

    /// Set the default referential actions of relationship foreign keys
    pub fn default_foreign_key_actions(
        mut self,
        on_update: ForeignKeyAction,
        on_delete: ForeignKeyAction,
    ) -> Self {
        self.default_on_update = on_update;
        self.default_on_delete = on_delete;
        self
    }

    /// Set the migrator
    pub fn migrator(mut self, migrator: Arc<dyn Migrator>) -> Self {
        self.migrator = Some(migrator);
        self
    }

    /// Parse from a database URL
    ///
    /// Format: "entitymap://name" or "entitymap://name/version"
    ///
    /// # Examples
    ///
    /// ```
    /// use entitymap::DatabaseConfig;
    ///
    /// let config = DatabaseConfig::from_url("entitymap://inventory/3").unwrap();
    /// assert_eq!(config.name, "inventory");
    /// assert_eq!(config.version, 3);
    /// ```
    pub fn from_url(url: &str) -> Result<Self, String> {
        let rest = url
            .strip_prefix("entitymap://")
            .ok_or_else(|| "URL must start with 'entitymap://'".to_string())?;

        let (name, version) = match rest.split_once('/') {
            Some((name, version)) => {
                let version = version
                    .parse()
                    .map_err(|_| format!("Invalid version '{}'", version))?;
                (name, version)
            }
            None => (rest, 1),
        };

        let config = Self::new(name).version(version);
        config.validate()?;
        Ok(config)
    }

    /// Convert to a database URL
    pub fn to_url(&self) -> String {
        format!("entitymap://{}/{}", self.name, self.version)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Database name cannot be empty".to_string());
        }

        if self.version == 0 {
            return Err("Database version must be > 0".to_string());
        }

        Ok(())
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("default_inheritance", &self.default_inheritance)
            .field("default_on_update", &self.default_on_update)
            .field("default_on_delete", &self.default_on_delete)
            .field("migrator", &self.migrator.is_some())
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new("main")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DatabaseConfig::default();
        assert_eq!(config.name, "main");
        assert_eq!(config.version, 1);
        assert_eq!(config.default_inheritance, InheritanceStrategy::Joined);
        assert!(config.migrator.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = DatabaseConfig::new("shop")
            .version(4)
            .default_inheritance(InheritanceStrategy::SingleTable)
            .default_foreign_key_actions(ForeignKeyAction::Cascade, ForeignKeyAction::SetNull);

        assert_eq!(config.version, 4);
        assert_eq!(config.default_inheritance, InheritanceStrategy::SingleTable);
        assert_eq!(config.default_on_update, ForeignKeyAction::Cascade);
        assert_eq!(config.default_on_delete, ForeignKeyAction::SetNull);
    }

    #[test]
    fn test_from_url() {
        let config = DatabaseConfig::from_url("entitymap://ledger/7").unwrap();
        assert_eq!(config.name, "ledger");
        assert_eq!(config.version, 7);
        assert_eq!(config.to_url(), "entitymap://ledger/7");

        let config = DatabaseConfig::from_url("entitymap://ledger").unwrap();
        assert_eq!(config.version, 1);
    }

    #[test]
    fn test_invalid_url() {
        assert!(DatabaseConfig::from_url("postgres://ledger").is_err());
        assert!(DatabaseConfig::from_url("entitymap://ledger/x").is_err());
        assert!(DatabaseConfig::from_url("entitymap://ledger/0").is_err());
        assert!(DatabaseConfig::from_url("entitymap:///2").is_err());
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: DatabaseConfig = serde_json::from_str(
            r#"{"name": "crm", "version": 2, "default_inheritance": "SingleTable"}"#,
        )
        .unwrap();
        assert_eq!(config.name, "crm");
        assert_eq!(config.default_inheritance, InheritanceStrategy::SingleTable);
        assert_eq!(config.default_on_delete, ForeignKeyAction::NoAction);
    }
}
