/**
 * workspace.rs
 * Integration layer tying one project to the shared library
 *
 * A Workspace is what the CLI operates on: the library, the current
 * project's bucket view, and the legacy layout migration.
 */

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::drivers::copy_dir_all;
use crate::errors::{LizzyError, Result};
use crate::knowledge::graph_stats;
use crate::library::{
    validate_name, BucketInfo, BucketLibrary, BucketMetadata, BucketStats, ImportOutcome,
    LibraryStats, BUCKET_METADATA_FILE,
};
use crate::project::{ProjectBuckets, ProjectListing, PromotionOutcome, IMPORTED_DIR, LOCAL_DIR};
use crate::settings::Settings;

/// Marker left in a legacy bucket directory once it has been migrated
pub const MIGRATED_MARKER: &str = ".migrated";

/// Where a new bucket is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Shared library bucket, imported into the current project
    Library,
    /// Project-private bucket under local/
    Local,
}

impl FromStr for Scope {
    type Err = LizzyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "library" => Ok(Scope::Library),
            "local" => Ok(Scope::Local),
            other => Err(LizzyError::ValidationError(format!(
                "Unknown scope '{}', expected 'library' or 'local'",
                other
            ))),
        }
    }
}

/// A bucket created through the workspace
#[derive(Debug, Clone, Serialize)]
pub struct NewBucket {
    pub scope: Scope,
    /// Library id, or the local name
    pub identifier: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigratedBucket {
    pub original: String,
    pub bucket_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub bucket: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedItem {
    pub bucket: String,
    pub reason: String,
}

/// Outcome of migrate_existing_buckets
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub migrated: Vec<MigratedBucket>,
    pub failed: Vec<FailedItem>,
    pub skipped: Vec<SkippedItem>,
}

/// Outcome of batch_import_buckets
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchImportReport {
    pub imported: Vec<String>,
    pub failed: Vec<FailedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryAvailability {
    pub imported: Vec<BucketInfo>,
    pub available: Vec<BucketMetadata>,
    pub total: usize,
}

/// Project buckets plus library buckets that could still be imported
#[derive(Debug, Clone, Serialize)]
pub struct AvailableBuckets {
    pub project: ProjectListing,
    pub library: LibraryAvailability,
}

/// Outcome of synchronize_bucket
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub import: ImportOutcome,
    pub stats: BucketStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub library_stats: LibraryStats,
    pub project_buckets: ProjectListing,
    pub active_buckets: Vec<String>,
    pub project_name: String,
    pub project_dir: PathBuf,
}

/// The current project bound to a bucket library
#[derive(Debug, Clone)]
pub struct Workspace {
    library: BucketLibrary,
    project: ProjectBuckets,
}

impl Workspace {
    /// Open the library and the project
    ///
    /// The project name defaults to the project directory's file name.
    pub fn open(library_path: &Path, project_dir: &Path, project_name: Option<&str>) -> Result<Self> {
        let project_name = match project_name {
            Some(name) => name.to_string(),
            None => default_project_name(project_dir)?,
        };

        let library = BucketLibrary::open(library_path)?;
        let project = ProjectBuckets::open(project_dir, &project_name, library.clone())?;

        debug!(project = %project_name, library = %library_path.display(), "opened workspace");
        Ok(Workspace { library, project })
    }

    /// Open using resolved settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::open(
            &settings.library_path,
            &settings.project_dir,
            settings.project_name.as_deref(),
        )
    }

    pub fn library(&self) -> &BucketLibrary {
        &self.library
    }

    pub fn project(&self) -> &ProjectBuckets {
        &self.project
    }

    pub fn project_name(&self) -> &str {
        self.project.project_name()
    }

    /// Create a bucket in the library (and import it) or locally
    pub fn create_bucket(&self, bucket_name: &str, description: &str, scope: Scope) -> Result<NewBucket> {
        match scope {
            Scope::Library => {
                let created = self
                    .library
                    .create_bucket(bucket_name, self.project_name(), description)?;
                let imported = self.project.import_from_library(&created.bucket_id)?;
                Ok(NewBucket {
                    scope,
                    identifier: created.bucket_id,
                    path: imported.link_path,
                })
            }
            Scope::Local => {
                let path = self.project.create_local_bucket(bucket_name, description)?;
                Ok(NewBucket {
                    scope,
                    identifier: bucket_name.to_string(),
                    path,
                })
            }
        }
    }

    /// Move buckets from the flat legacy layout into the library
    ///
    /// Every directory directly under lightrag_working_dir other than
    /// imported/, local/ and dot-directories is copied into a new library
    /// bucket and imported. The original directory is kept and marked so
    /// that a second run skips it.
    pub fn migrate_existing_buckets(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        let project_name = self.project_name().to_string();

        let mut candidates: Vec<PathBuf> = fs::read_dir(self.project.lightrag_dir())?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        candidates.sort();

        for bucket_dir in candidates {
            let name = match bucket_dir.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if name == IMPORTED_DIR || name == LOCAL_DIR || name.starts_with('.') {
                continue;
            }

            if bucket_dir.join(MIGRATED_MARKER).exists() {
                report.skipped.push(SkippedItem {
                    bucket: name,
                    reason: "already migrated".to_string(),
                });
                continue;
            }
            if let Err(e) = validate_name("bucket", &name) {
                report.skipped.push(SkippedItem {
                    bucket: name,
                    reason: e.to_string(),
                });
                continue;
            }

            match self.migrate_one(&bucket_dir, &name, &project_name) {
                Ok(bucket_id) => {
                    info!(original = %name, bucket_id = %bucket_id, "migrated legacy bucket");
                    report.migrated.push(MigratedBucket {
                        original: name,
                        bucket_id,
                    });
                }
                Err(e) => {
                    warn!(bucket = %name, error = %e, "migration failed");
                    report.failed.push(FailedItem {
                        bucket: name,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    fn migrate_one(&self, bucket_dir: &Path, name: &str, project_name: &str) -> Result<String> {
        let created = self.library.create_bucket(
            name,
            project_name,
            &format!("Migrated from {}", project_name),
        )?;
        copy_dir_all(bucket_dir, &created.path, &[BUCKET_METADATA_FILE, MIGRATED_MARKER])?;
        self.project.import_from_library(&created.bucket_id)?;

        fs::write(bucket_dir.join(MIGRATED_MARKER), &created.bucket_id)?;
        Ok(created.bucket_id)
    }

    /// Project listing plus library buckets not yet imported
    pub fn list_available_buckets(&self) -> Result<AvailableBuckets> {
        let project = self.project.list_all_buckets()?;
        let library_buckets = self.library.list_library_buckets()?;
        let total = library_buckets.len();

        let available = library_buckets
            .into_iter()
            .filter(|bucket| !project.imported.iter().any(|info| info.metadata.id == bucket.id))
            .collect();

        Ok(AvailableBuckets {
            library: LibraryAvailability {
                imported: project.imported.clone(),
                available,
                total,
            },
            project,
        })
    }

    /// Import several library buckets, collecting failures
    pub fn batch_import_buckets<S: AsRef<str>>(&self, bucket_ids: &[S]) -> BatchImportReport {
        let mut report = BatchImportReport::default();
        for bucket_id in bucket_ids {
            let bucket_id = bucket_id.as_ref();
            match self.project.import_from_library(bucket_id) {
                Ok(_) => report.imported.push(bucket_id.to_string()),
                Err(e) => report.failed.push(FailedItem {
                    bucket: bucket_id.to_string(),
                    error: e.to_string(),
                }),
            }
        }
        report
    }

    /// Refresh a bucket's link in this project and its cached graph stats
    pub fn synchronize_bucket(&self, bucket_id: &str) -> Result<SyncReport> {
        if self.library.get_bucket_info(bucket_id)?.is_none() {
            return Err(LizzyError::BucketNotFound(bucket_id.to_string()));
        }

        let import = self.project.import_from_library(bucket_id)?;
        let graph = graph_stats(&self.library.bucket_path(bucket_id));
        let metadata = self.library.update_bucket_stats(bucket_id, graph.into())?;

        Ok(SyncReport {
            import,
            stats: metadata.stats,
        })
    }

    /// Share a library bucket with another project
    pub fn share_bucket_with_project(&self, bucket_id: &str, target_project: &str) -> Result<BucketMetadata> {
        self.library
            .share_bucket_between_projects(bucket_id, self.project_name(), target_project)
    }

    pub fn export_bucket(&self, bucket_id: &str, export_path: &Path) -> Result<PathBuf> {
        self.library.export_bucket(bucket_id, export_path)
    }

    pub fn promote_local_bucket(&self, local_name: &str, description: &str) -> Result<PromotionOutcome> {
        self.project.promote_to_library(local_name, description)
    }

    pub fn search_library(&self, query: &str) -> Result<Vec<BucketMetadata>> {
        self.library.search_buckets(query)
    }

    pub fn get_library_dashboard(&self) -> Result<Dashboard> {
        Ok(Dashboard {
            library_stats: self.library.get_library_stats()?,
            project_buckets: self.project.list_all_buckets()?,
            active_buckets: self.project.active_buckets()?,
            project_name: self.project_name().to_string(),
            project_dir: self.project.project_dir().to_path_buf(),
        })
    }
}

/// File name of the project directory, used when no project name is given
pub fn default_project_name(project_dir: &Path) -> Result<String> {
    let resolved = if project_dir.is_absolute() {
        project_dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(project_dir)
    };
    let resolved = fs::canonicalize(&resolved).unwrap_or(resolved);

    resolved
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| {
            LizzyError::ValidationError(format!(
                "Cannot derive a project name from {}",
                project_dir.display()
            ))
        })
}
