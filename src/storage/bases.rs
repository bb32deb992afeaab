//! Knowledge base management
//!
//! Bases are directories under `<data_dir>/bases/`. Opening a base is lazy
//! and the handle (database plus vector index) is cached, so concurrent
//! requests against the same base share one connection and one index.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::VectorIndex;

use super::database::{BaseDb, BaseStats};

/// Name of the base that always exists
pub const DEFAULT_BASE: &str = "default";

/// Open handles for one knowledge base
pub struct BaseHandle {
    pub name: String,
    pub db: BaseDb,
    pub index: Mutex<VectorIndex>,
}

/// Summary of a base for listings
#[derive(Debug, Clone, serde::Serialize)]
pub struct BaseInfo {
    pub name: String,
    #[serde(flatten)]
    pub stats: BaseStats,
}

/// Manages knowledge base directories and cached handles
pub struct BaseManager {
    config: Config,
    handles: DashMap<String, Arc<BaseHandle>>,
}

impl BaseManager {
    /// Create the manager, bootstrapping the bases directory and the
    /// default base.
    pub fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(config.bases_dir())?;
        let manager = Self {
            config,
            handles: DashMap::new(),
        };
        if !manager.exists(DEFAULT_BASE) {
            manager.create(DEFAULT_BASE)?;
            tracing::info!("Created default knowledge base");
        }
        Ok(manager)
    }

    /// Base names must be safe as directory names
    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > 64 {
            return Err(Error::Config(format!(
                "Invalid base name '{}': must be 1-64 characters",
                name
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::Config(format!(
                "Invalid base name '{}': only letters, digits, '-' and '_' are allowed",
                name
            )));
        }
        Ok(())
    }

    /// Whether a base directory exists on disk
    pub fn exists(&self, name: &str) -> bool {
        self.config.base_dir(name).is_dir()
    }

    /// Create a new base. Fails if it already exists.
    pub fn create(&self, name: &str) -> Result<Arc<BaseHandle>> {
        Self::validate_name(name)?;
        if self.exists(name) {
            return Err(Error::BaseExists(name.to_string()));
        }

        std::fs::create_dir_all(self.config.documents_dir(name))?;
        std::fs::create_dir_all(self.config.index_dir(name))?;
        tracing::info!(base = name, "Created knowledge base");
        self.open(name)
    }

    /// Get a handle to an existing base, opening it if needed
    pub fn get(&self, name: &str) -> Result<Arc<BaseHandle>> {
        if let Some(handle) = self.handles.get(name) {
            return Ok(Arc::clone(&handle));
        }
        if !self.exists(name) {
            return Err(Error::BaseNotFound(name.to_string()));
        }
        self.open(name)
    }

    fn open(&self, name: &str) -> Result<Arc<BaseHandle>> {
        let db = BaseDb::open(self.config.database_path(name))?;
        let index = VectorIndex::open(
            self.config.index_dir(name),
            self.config.embeddings.dimensions,
            self.config.index.clone(),
        )?;
        let handle = Arc::new(BaseHandle {
            name: name.to_string(),
            db,
            index: Mutex::new(index),
        });
        self.handles.insert(name.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// List all bases with their stats
    pub fn list(&self) -> Result<Vec<BaseInfo>> {
        let mut infos = Vec::new();
        for entry in std::fs::read_dir(self.config.bases_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            let handle = self.get(&name)?;
            infos.push(BaseInfo {
                name,
                stats: handle.db.stats()?,
            });
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    /// Delete a base and everything under it. The default base cannot be
    /// deleted.
    pub fn delete(&self, name: &str) -> Result<()> {
        if name == DEFAULT_BASE {
            return Err(Error::Config(
                "The default base cannot be deleted".to_string(),
            ));
        }
        if !self.exists(name) {
            return Err(Error::BaseNotFound(name.to_string()));
        }

        self.handles.remove(name);
        std::fs::remove_dir_all(self.config.base_dir(name))?;
        tracing::info!(base = name, "Deleted knowledge base");
        Ok(())
    }

    /// The configuration this manager was built with
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_manager(dir: &TempDir) -> BaseManager {
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_path_buf();
        BaseManager::new(config).unwrap()
    }

    #[test]
    fn default_base_is_bootstrapped() {
        let dir = TempDir::new().unwrap();
        let manager = test_manager(&dir);
        assert!(manager.exists(DEFAULT_BASE));
        assert!(manager.get(DEFAULT_BASE).is_ok());
    }

    #[test]
    fn create_and_list_bases() {
        let dir = TempDir::new().unwrap();
        let manager = test_manager(&dir);
        manager.create("project-a").unwrap();

        let names: Vec<String> = manager.list().unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["default", "project-a"]);
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = test_manager(&dir);
        manager.create("notes").unwrap();
        assert!(matches!(
            manager.create("notes"),
            Err(Error::BaseExists(_))
        ));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = test_manager(&dir);
        assert!(manager.create("").is_err());
        assert!(manager.create("has space").is_err());
        assert!(manager.create("../escape").is_err());
    }

    #[test]
    fn delete_removes_base_but_not_default() {
        let dir = TempDir::new().unwrap();
        let manager = test_manager(&dir);
        manager.create("scratch").unwrap();
        manager.delete("scratch").unwrap();
        assert!(!manager.exists("scratch"));
        assert!(matches!(
            manager.get("scratch"),
            Err(Error::BaseNotFound(_))
        ));

        assert!(manager.delete(DEFAULT_BASE).is_err());
        assert!(matches!(manager.delete("missing"), Err(Error::BaseNotFound(_))));
    }

    #[test]
    fn handles_are_cached() {
        let dir = TempDir::new().unwrap();
        let manager = test_manager(&dir);
        let a = manager.get(DEFAULT_BASE).unwrap();
        let b = manager.get(DEFAULT_BASE).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
