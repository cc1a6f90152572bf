//! Library configuration, optionally read from a `library.toml` file.
//!
//! ```toml
//! [library]
//! root = "data"               # relative to the config file's directory
//! backup_prefix = ".backup-"
//! purge_stale_isolations = true
//!
//! [[stores]]
//! name = "covers"
//! layout = "per-claim-file"
//! claim_type = "anime"
//! extension = "jpg"
//! sandbox_editable = true
//! policy = "overwrite"
//! ```

use crate::commit::DEFAULT_BACKUP_PREFIX;
use crate::error::{LibraryError, LibraryResult};
use serde::{Deserialize, Serialize};
use stash_types::{StoreDef, StorePolicy};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default name of the reserved store holding live sandboxes.
pub const DEFAULT_ISOLATION_STORE: &str = "isolation";
/// Default name of the reserved scratch store.
pub const DEFAULT_TEMP_STORE: &str = "tmp";

/// A store to register when the library opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDecl {
    #[serde(flatten)]
    pub def: StoreDef,
    pub policy: StorePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub root: PathBuf,
    #[serde(default = "default_isolation_store")]
    pub isolation_store: String,
    #[serde(default = "default_temp_store")]
    pub temp_store: String,
    #[serde(default = "default_backup_prefix")]
    pub backup_prefix: String,
    /// Delete sandbox directories left behind by a previous process on open.
    #[serde(default = "default_purge")]
    pub purge_stale_isolations: bool,
    #[serde(default)]
    pub stores: Vec<StoreDecl>,
}

fn default_isolation_store() -> String {
    DEFAULT_ISOLATION_STORE.to_string()
}

fn default_temp_store() -> String {
    DEFAULT_TEMP_STORE.to_string()
}

fn default_backup_prefix() -> String {
    DEFAULT_BACKUP_PREFIX.to_string()
}

fn default_purge() -> bool {
    true
}

impl LibraryConfig {
    /// Default configuration for a library rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            isolation_store: default_isolation_store(),
            temp_store: default_temp_store(),
            backup_prefix: default_backup_prefix(),
            purge_stale_isolations: default_purge(),
            stores: Vec::new(),
        }
    }

    /// Adds a store declaration.
    #[must_use]
    pub fn with_store(mut self, def: StoreDef, policy: StorePolicy) -> Self {
        self.stores.push(StoreDecl { def, policy });
        self
    }

    /// Parses a `library.toml` document. A relative root is kept relative.
    pub fn parse(contents: &str) -> LibraryResult<Self> {
        let file: LibraryFile =
            toml::from_str(contents).map_err(|e| LibraryError::Config(e.to_string()))?;
        let config = file.into_config();
        for decl in &config.stores {
            decl.def.validate()?;
        }
        Ok(config)
    }

    /// Reads and parses `path`. A relative root is resolved against the
    /// directory containing `path`.
    pub fn read(path: &Path) -> LibraryResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LibraryError::io(path, e))?;
        let mut config = Self::parse(&contents)?;
        if config.root.is_relative() {
            if let Some(base) = path.parent() {
                config.root = base.join(&config.root);
            }
        }
        Ok(config)
    }

    /// Loads `path` if it exists, falling back to defaults rooted at
    /// `fallback_root` when it is missing or unreadable.
    pub fn load_from(path: &Path, fallback_root: impl Into<PathBuf>) -> Self {
        if !path.exists() {
            info!("No library config found at {:?}, using defaults", path);
            return Self::new(fallback_root);
        }
        match Self::read(path) {
            Ok(config) => {
                info!("Loaded library config from {:?}", path);
                config
            }
            Err(e) => {
                warn!(
                    "Failed to load library config {:?}: {}. Falling back to defaults.",
                    path, e
                );
                Self::new(fallback_root)
            }
        }
    }
}

/// Raw TOML structure matching the `library.toml` format.
#[derive(Deserialize)]
struct LibraryFile {
    library: LibrarySection,
    #[serde(default)]
    stores: Vec<StoreDecl>,
}

#[derive(Deserialize)]
struct LibrarySection {
    root: PathBuf,
    #[serde(default = "default_isolation_store")]
    isolation_store: String,
    #[serde(default = "default_temp_store")]
    temp_store: String,
    #[serde(default = "default_backup_prefix")]
    backup_prefix: String,
    #[serde(default = "default_purge")]
    purge_stale_isolations: bool,
}

impl LibraryFile {
    fn into_config(self) -> LibraryConfig {
        LibraryConfig {
            root: self.library.root,
            isolation_store: self.library.isolation_store,
            temp_store: self.library.temp_store,
            backup_prefix: self.library.backup_prefix,
            purge_stale_isolations: self.library.purge_stale_isolations,
            stores: self.stores,
        }
    }
}
