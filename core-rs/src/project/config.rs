/**
 * config.rs
 * Per-project bucket configuration (project_lightrag.json)
 *
 * Format:
 * ```json
 * {
 *   "project_name": "alpha",
 *   "created_at": "2025-01-25T10:00:00+00:00",
 *   "imported_buckets": ["lore_1a2b3c4d"],
 *   "local_buckets": ["drafts"],
 *   "active_buckets": ["lore_1a2b3c4d"]
 * }
 * ```
 *
 * The file lives in <project>/lightrag_working_dir/ next to the
 * imported/ and local/ bucket directories.
 */

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::drivers::{read_json_opt, write_json_atomic, FileLock};
use crate::errors::{LizzyError, Result};

/// Working directory holding every bucket a project can see
pub const LIGHTRAG_DIR: &str = "lightrag_working_dir";

/// Subdirectory of links to shared library buckets
pub const IMPORTED_DIR: &str = "imported";

/// Subdirectory of project-private buckets
pub const LOCAL_DIR: &str = "local";

/// Project bucket configuration file name
pub const PROJECT_CONFIG_FILE: &str = "project_lightrag.json";

/// Resolve the LightRAG working directory of a project
pub fn lightrag_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(LIGHTRAG_DIR)
}

/// project_lightrag.json structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectBucketConfig {
    pub project_name: String,
    pub created_at: String,
    /// Ids of library buckets linked under imported/
    #[serde(default)]
    pub imported_buckets: BTreeSet<String>,
    /// Names of buckets under local/
    #[serde(default)]
    pub local_buckets: BTreeSet<String>,
    /// Imported ids or local names currently enabled for queries
    #[serde(default)]
    pub active_buckets: BTreeSet<String>,
}

impl ProjectBucketConfig {
    /// Create an empty configuration for a project
    pub fn new(project_name: &str) -> Self {
        ProjectBucketConfig {
            project_name: project_name.to_string(),
            created_at: Utc::now().to_rfc3339(),
            imported_buckets: BTreeSet::new(),
            local_buckets: BTreeSet::new(),
            active_buckets: BTreeSet::new(),
        }
    }

    /// Path of the configuration file inside a LightRAG working directory
    pub fn config_path(lightrag_dir: &Path) -> PathBuf {
        lightrag_dir.join(PROJECT_CONFIG_FILE)
    }

    /// Load the configuration, `None` if the project has none yet
    pub fn load(lightrag_dir: &Path) -> Result<Option<Self>> {
        let config: Option<Self> = read_json_opt(&Self::config_path(lightrag_dir))?;
        if let Some(ref config) = config {
            config.validate()?;
        }
        Ok(config)
    }

    /// Load the configuration or start a fresh one for `project_name`
    pub fn load_or_default(lightrag_dir: &Path, project_name: &str) -> Result<Self> {
        Ok(Self::load(lightrag_dir)?.unwrap_or_else(|| Self::new(project_name)))
    }

    /// Persist the configuration atomically
    pub fn save(&self, lightrag_dir: &Path) -> Result<()> {
        self.validate()?;
        write_json_atomic(&Self::config_path(lightrag_dir), self)
    }

    /// Read-modify-write under the project lock
    ///
    /// Must not be called while the same project's lock is already held
    /// by this process.
    pub fn update<T, F>(lightrag_dir: &Path, project_name: &str, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> T,
    {
        let _lock = FileLock::acquire(lightrag_dir)?;
        let mut config = Self::load_or_default(lightrag_dir, project_name)?;
        let out = mutate(&mut config);
        config.save(lightrag_dir)?;
        Ok(out)
    }

    /// Ensures project_name is present
    pub fn validate(&self) -> Result<()> {
        if self.project_name.is_empty() {
            return Err(LizzyError::ValidationError(
                "project_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `identifier` names a bucket visible to this project
    pub fn knows(&self, identifier: &str) -> bool {
        self.imported_buckets.contains(identifier) || self.local_buckets.contains(identifier)
    }
}
