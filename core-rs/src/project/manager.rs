/**
 * manager.rs
 * One project's view of its LightRAG buckets
 *
 * Layout under <project>/lightrag_working_dir/:
 * - imported/<bucket_id>  links to shared library buckets
 * - local/<name>/         project-private buckets
 * - project_lightrag.json which of them exist and which are active
 * - promotion.json        present only while a promotion is in flight
 *
 * Never hold the project lock while calling into the library: the library
 * takes its own lock first and then updates project_lightrag.json itself.
 */

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::config::{lightrag_dir, ProjectBucketConfig, IMPORTED_DIR, LOCAL_DIR};
use super::promotion::{PromotionJournal, PromotionStage, Recovery};
use crate::drivers::{copy_dir_all, is_symlink, path_occupied, read_json_opt, remove_link, write_json_atomic};
use crate::errors::{LizzyError, Result};
use crate::library::{
    generate_bucket_id, validate_bucket_id, validate_name, BucketInfo, BucketLibrary, ImportOutcome,
    BUCKET_METADATA_FILE,
};

/// Metadata file of a local bucket (local/<name>/bucket_metadata.json)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalBucketMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "local_type")]
    pub bucket_type: String,
    pub created_at: String,
    pub project: String,
}

fn local_type() -> String {
    "local".to_string()
}

/// Every bucket visible to a project
#[derive(Debug, Clone, Serialize)]
pub struct ProjectListing {
    pub imported: Vec<BucketInfo>,
    pub local: Vec<LocalBucketMetadata>,
    pub total: usize,
}

/// Result of promoting a local bucket
#[derive(Debug, Clone, Serialize)]
pub struct PromotionOutcome {
    pub bucket_id: String,
    pub local_name: String,
    pub link_path: PathBuf,
    pub bytes_copied: u64,
}

/// Manages the buckets of a single project
#[derive(Debug, Clone)]
pub struct ProjectBuckets {
    project_dir: PathBuf,
    project_name: String,
    lightrag_dir: PathBuf,
    imported_dir: PathBuf,
    local_dir: PathBuf,
    library: BucketLibrary,
}

impl ProjectBuckets {
    /// Open a project, creating its directory structure and repairing any
    /// interrupted promotion
    pub fn open<P: AsRef<Path>>(project_dir: P, project_name: &str, library: BucketLibrary) -> Result<Self> {
        validate_name("project", project_name)?;

        let project_dir = project_dir.as_ref().to_path_buf();
        let lightrag_dir = lightrag_dir(&project_dir);
        let project = ProjectBuckets {
            imported_dir: lightrag_dir.join(IMPORTED_DIR),
            local_dir: lightrag_dir.join(LOCAL_DIR),
            lightrag_dir,
            project_dir,
            project_name: project_name.to_string(),
            library,
        };

        fs::create_dir_all(&project.imported_dir)?;
        fs::create_dir_all(&project.local_dir)?;

        // Writes the default config on first use
        ProjectBucketConfig::update(&project.lightrag_dir, project_name, |_| ())?;

        if let Some(recovery) = project.recover_promotion()? {
            info!(project = %project_name, ?recovery, "recovered interrupted promotion");
        }

        Ok(project)
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn lightrag_dir(&self) -> &Path {
        &self.lightrag_dir
    }

    pub fn library(&self) -> &BucketLibrary {
        &self.library
    }

    /// Current project_lightrag.json contents
    pub fn config(&self) -> Result<ProjectBucketConfig> {
        ProjectBucketConfig::load_or_default(&self.lightrag_dir, &self.project_name)
    }

    fn update_config<T, F: FnOnce(&mut ProjectBucketConfig) -> T>(&self, mutate: F) -> Result<T> {
        ProjectBucketConfig::update(&self.lightrag_dir, &self.project_name, mutate)
    }

    fn local_path(&self, name: &str) -> PathBuf {
        self.local_dir.join(name)
    }

    fn imported_path(&self, bucket_id: &str) -> PathBuf {
        self.imported_dir.join(bucket_id)
    }

    /// Create a project-private bucket under local/
    pub fn create_local_bucket(&self, bucket_name: &str, description: &str) -> Result<PathBuf> {
        validate_name("bucket", bucket_name)?;

        let bucket_path = self.local_path(bucket_name);
        if path_occupied(&bucket_path) {
            return Err(LizzyError::LocalBucketExists(bucket_name.to_string()));
        }
        if self.config()?.imported_buckets.contains(bucket_name) {
            return Err(LizzyError::InvalidName(format!(
                "'{}' is already used by an imported bucket",
                bucket_name
            )));
        }

        fs::create_dir_all(&bucket_path)?;
        let metadata = LocalBucketMetadata {
            name: bucket_name.to_string(),
            description: description.to_string(),
            bucket_type: local_type(),
            created_at: Utc::now().to_rfc3339(),
            project: self.project_name.clone(),
        };
        write_json_atomic(&bucket_path.join(BUCKET_METADATA_FILE), &metadata)?;

        self.update_config(|config| {
            config.local_buckets.insert(bucket_name.to_string());
        })?;

        info!(project = %self.project_name, bucket = %bucket_name, "created local bucket");
        Ok(bucket_path)
    }

    /// Delete a local bucket and everything in it
    pub fn delete_local_bucket(&self, bucket_name: &str) -> Result<()> {
        validate_name("bucket", bucket_name)?;

        let bucket_path = self.local_path(bucket_name);
        let registered = self.config()?.local_buckets.contains(bucket_name);
        if !registered && !path_occupied(&bucket_path) {
            return Err(LizzyError::LocalBucketNotFound(bucket_name.to_string()));
        }

        if path_occupied(&bucket_path) {
            fs::remove_dir_all(&bucket_path).map_err(|e| {
                LizzyError::IoError(format!("Failed to remove local bucket: {}", e))
            })?;
        }

        self.update_config(|config| {
            config.local_buckets.remove(bucket_name);
            config.active_buckets.remove(bucket_name);
        })?;

        info!(project = %self.project_name, bucket = %bucket_name, "deleted local bucket");
        Ok(())
    }

    /// Import a shared bucket from the library
    pub fn import_from_library(&self, bucket_id: &str) -> Result<ImportOutcome> {
        self.library
            .import_bucket_to_project(bucket_id, &self.project_name, &self.project_dir)
    }

    /// Remove an imported reference
    ///
    /// Only the link (or fallback copy) is removed. The shared bucket
    /// stays in the library; this project is dropped from its share list.
    pub fn remove_import(&self, bucket_id: &str) -> Result<()> {
        validate_bucket_id(bucket_id)?;
        let link_path = self.imported_path(bucket_id);
        let registered = self.config()?.imported_buckets.contains(bucket_id);
        if !registered && !path_occupied(&link_path) {
            return Err(LizzyError::BucketNotFound(bucket_id.to_string()));
        }

        remove_link(&link_path)?;

        self.update_config(|config| {
            config.imported_buckets.remove(bucket_id);
            config.active_buckets.remove(bucket_id);
        })?;

        self.library.unshare_bucket(bucket_id, &self.project_name)?;

        info!(project = %self.project_name, bucket_id = %bucket_id, "removed imported bucket");
        Ok(())
    }

    /// Promote a local bucket into the shared library
    ///
    /// The local bucket's files (its metadata file excepted) are copied into
    /// a new shared bucket, the bucket is imported back into this project
    /// and the local directory is removed. An active local bucket stays
    /// active under its new id. Progress is journaled so that `open` can
    /// finish or undo an interrupted promotion.
    pub fn promote_to_library(&self, local_name: &str, description: &str) -> Result<PromotionOutcome> {
        validate_name("bucket", local_name)?;

        let local_path = self.local_path(local_name);
        if !local_path.is_dir() {
            return Err(LizzyError::LocalBucketNotFound(local_name.to_string()));
        }
        if let Some(pending) = PromotionJournal::load(&self.lightrag_dir)? {
            return Err(LizzyError::ValidationError(format!(
                "Promotion of '{}' is still pending (stage {}); run recovery first",
                pending.local_name, pending.stage
            )));
        }

        let description = if description.is_empty() {
            read_json_opt::<LocalBucketMetadata>(&local_path.join(BUCKET_METADATA_FILE))
                .ok()
                .flatten()
                .map(|m| m.description)
                .unwrap_or_default()
        } else {
            description.to_string()
        };

        let bucket_id = generate_bucket_id(local_name, &self.project_name);
        let mut journal = PromotionJournal::begin(local_name, &bucket_id);
        journal.save(&self.lightrag_dir)?;

        let staged = (|| -> Result<(u64, ImportOutcome)> {
            let created = self.library.create_bucket_with_id(
                &bucket_id,
                local_name,
                &self.project_name,
                &description,
            )?;
            let bytes_copied = copy_dir_all(&local_path, &created.path, &[BUCKET_METADATA_FILE])?;
            let imported = self.import_from_library(&bucket_id)?;
            Ok((bytes_copied, imported))
        })();

        let (bytes_copied, imported) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                // Undo now rather than waiting for the next open
                match self.rollback_promotion(&bucket_id) {
                    Ok(()) => PromotionJournal::clear(&self.lightrag_dir)?,
                    Err(rollback) => {
                        warn!(bucket_id = %bucket_id, error = %rollback, "promotion rollback failed")
                    }
                }
                return Err(e);
            }
        };

        journal.advance(&self.lightrag_dir, PromotionStage::Linked)?;
        self.finish_promotion(local_name, &bucket_id)?;
        journal.advance(&self.lightrag_dir, PromotionStage::Done)?;
        PromotionJournal::clear(&self.lightrag_dir)?;

        info!(
            project = %self.project_name,
            local = %local_name,
            bucket_id = %bucket_id,
            bytes = bytes_copied,
            "promoted local bucket to library"
        );

        Ok(PromotionOutcome {
            bucket_id,
            local_name: local_name.to_string(),
            link_path: imported.link_path,
            bytes_copied,
        })
    }

    /// Remove the promoted local bucket and hand its config entries over to
    /// the shared id. Safe to run more than once.
    fn finish_promotion(&self, local_name: &str, bucket_id: &str) -> Result<()> {
        let local_path = self.local_path(local_name);
        if path_occupied(&local_path) {
            fs::remove_dir_all(&local_path)?;
        }

        self.update_config(|config| {
            config.local_buckets.remove(local_name);
            config.imported_buckets.insert(bucket_id.to_string());
            if config.active_buckets.remove(local_name) {
                config.active_buckets.insert(bucket_id.to_string());
            }
        })
    }

    /// Undo a promotion that never reached the linked stage
    fn rollback_promotion(&self, bucket_id: &str) -> Result<()> {
        let link_path = self.imported_path(bucket_id);
        if is_symlink(&link_path) || link_path.is_dir() {
            remove_link(&link_path)?;
        }

        self.update_config(|config| {
            config.imported_buckets.remove(bucket_id);
            config.active_buckets.remove(bucket_id);
        })?;

        self.library.discard_bucket(bucket_id)
    }

    /// Repair a promotion left behind by a crash
    pub fn recover_promotion(&self) -> Result<Option<Recovery>> {
        let journal = match PromotionJournal::load(&self.lightrag_dir)? {
            Some(journal) => journal,
            None => return Ok(None),
        };

        let recovery = match journal.stage {
            PromotionStage::Copying => {
                warn!(
                    local = %journal.local_name,
                    bucket_id = %journal.bucket_id,
                    "rolling back interrupted promotion"
                );
                self.rollback_promotion(&journal.bucket_id)?;
                Recovery::RolledBack {
                    local_name: journal.local_name,
                    bucket_id: journal.bucket_id,
                }
            }
            PromotionStage::Linked => {
                warn!(
                    local = %journal.local_name,
                    bucket_id = %journal.bucket_id,
                    "completing interrupted promotion"
                );
                self.finish_promotion(&journal.local_name, &journal.bucket_id)?;
                Recovery::RolledForward {
                    local_name: journal.local_name,
                    bucket_id: journal.bucket_id,
                }
            }
            PromotionStage::Done => Recovery::Cleared {
                local_name: journal.local_name,
            },
        };

        PromotionJournal::clear(&self.lightrag_dir)?;
        Ok(Some(recovery))
    }

    /// Imported and local buckets of this project
    pub fn list_all_buckets(&self) -> Result<ProjectListing> {
        let config = self.config()?;

        let mut imported = Vec::new();
        for bucket_id in &config.imported_buckets {
            match self.library.get_bucket_info(bucket_id)? {
                Some(info) => imported.push(info),
                None => warn!(bucket_id = %bucket_id, "imported bucket no longer in library"),
            }
        }

        let mut local = Vec::new();
        for name in &config.local_buckets {
            let metadata_file = self.local_path(name).join(BUCKET_METADATA_FILE);
            match read_json_opt::<LocalBucketMetadata>(&metadata_file) {
                Ok(Some(metadata)) => local.push(metadata),
                Ok(None) => debug!(bucket = %name, "local bucket has no metadata"),
                Err(e) => warn!(bucket = %name, error = %e, "skipping unreadable local bucket"),
            }
        }

        let total = imported.len() + local.len();
        Ok(ProjectListing { imported, local, total })
    }

    /// Enable a bucket for queries; returns whether the active set changed
    pub fn activate_bucket(&self, identifier: &str) -> Result<bool> {
        if !self.config()?.knows(identifier) {
            return Err(LizzyError::BucketNotFound(identifier.to_string()));
        }
        self.update_config(|config| config.active_buckets.insert(identifier.to_string()))
    }

    /// Disable a bucket; returns whether the active set changed
    pub fn deactivate_bucket(&self, identifier: &str) -> Result<bool> {
        self.update_config(|config| config.active_buckets.remove(identifier))
    }

    /// Buckets currently enabled, sorted
    pub fn active_buckets(&self) -> Result<Vec<String>> {
        Ok(self.config()?.active_buckets.into_iter().collect())
    }

    /// (identifier, directory) of every imported and local bucket present on disk
    pub fn bucket_dirs(&self) -> Result<Vec<(String, PathBuf)>> {
        let config = self.config()?;
        let imported = config
            .imported_buckets
            .iter()
            .map(|id| (id.clone(), self.imported_path(id)));
        let local = config
            .local_buckets
            .iter()
            .map(|name| (name.clone(), self.local_path(name)));

        Ok(imported.chain(local).filter(|(_, path)| path.exists()).collect())
    }

    /// Directory of an imported or local bucket
    pub fn resolve_bucket_path(&self, identifier: &str) -> Result<PathBuf> {
        if identifier.is_empty() || identifier.contains(['/', '\\']) || identifier.starts_with('.') {
            return Err(LizzyError::BucketNotFound(identifier.to_string()));
        }

        let config = self.config()?;
        let imported = self.imported_path(identifier);
        let local = self.local_path(identifier);

        if config.imported_buckets.contains(identifier) && imported.exists() {
            Ok(imported)
        } else if config.local_buckets.contains(identifier) && local.is_dir() {
            Ok(local)
        } else if imported.exists() {
            Ok(imported)
        } else if local.is_dir() {
            Ok(local)
        } else {
            Err(LizzyError::BucketNotFound(identifier.to_string()))
        }
    }
}
