/**
 * registry.rs
 * Centralized library of shared LightRAG buckets
 *
 * The library is stored in: ~/lightrag_library/ (override with LIZZY_LIBRARY)
 * - buckets/<id>/     bucket data plus bucket_metadata.json
 * - projects/<name>.json  buckets registered for each project
 * - library_config.json   bucket and project counters
 *
 * Every mutation holds the library lock (.lock in the library root) for its
 * whole read-modify-write cycle. Lock order is library first, then project.
 */

use serde::Serialize;
use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::bucket_id::{generate_bucket_id, validate_bucket_id, validate_name};
use super::metadata::{
    BucketInfo, BucketMetadata, BucketStats, CreatedBucket, LibraryConfig, LibraryProject,
    LibraryStats, StorageInfo, BUCKET_METADATA_FILE,
};
use crate::drivers::{
    bytes_to_mb, copy_dir_all, dir_size, is_symlink, link_or_copy, path_occupied, read_json,
    read_json_opt, remove_link, write_json_atomic, FileLock, LinkKind,
};
use crate::errors::{LizzyError, Result};
use crate::project::config::{lightrag_dir, ProjectBucketConfig, IMPORTED_DIR};

/// Environment variable overriding the library location
pub const LIBRARY_ENV: &str = "LIZZY_LIBRARY";

/// Default library directory name under $HOME
pub const DEFAULT_LIBRARY_DIR: &str = "lightrag_library";

/// Number of entries reported in most_shared_buckets
const MOST_SHARED_LIMIT: usize = 5;

/// Outcome of importing a bucket into a project
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub bucket_id: String,
    pub project: String,
    pub link_path: PathBuf,
    pub copied: bool,
}

/// Bucket Library - manages the shared bucket registry
#[derive(Debug, Clone)]
pub struct BucketLibrary {
    library_path: PathBuf,
    buckets_dir: PathBuf,
    projects_dir: PathBuf,
    config_file: PathBuf,
}

impl BucketLibrary {
    /// Open (creating if needed) a library rooted at `library_path`
    pub fn open<P: AsRef<Path>>(library_path: P) -> Result<Self> {
        let library_path = library_path.as_ref().to_path_buf();
        let library = BucketLibrary {
            buckets_dir: library_path.join("buckets"),
            projects_dir: library_path.join("projects"),
            config_file: library_path.join("library_config.json"),
            library_path,
        };

        fs::create_dir_all(&library.buckets_dir).map_err(|e| {
            LizzyError::IoError(format!("Failed to create library directory: {}", e))
        })?;
        fs::create_dir_all(&library.projects_dir)?;

        let _lock = library.lock()?;
        if !library.config_file.exists() {
            write_json_atomic(&library.config_file, &LibraryConfig::new())?;
            info!(library = %library.library_path.display(), "initialized bucket library");
        }

        Ok(library)
    }

    /// Open the library at $LIZZY_LIBRARY or ~/lightrag_library
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_library_path()?)
    }

    /// Resolve the default library location
    pub fn default_library_path() -> Result<PathBuf> {
        if let Ok(path) = env::var(LIBRARY_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }

        let home_dir = env::var("HOME").map_err(|_| {
            LizzyError::ValidationError("HOME environment variable not set".to_string())
        })?;
        Ok(PathBuf::from(home_dir).join(DEFAULT_LIBRARY_DIR))
    }

    /// Library root directory
    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    /// Directory of a shared bucket
    pub fn bucket_path(&self, bucket_id: &str) -> PathBuf {
        self.buckets_dir.join(bucket_id)
    }

    fn metadata_path(&self, bucket_id: &str) -> PathBuf {
        self.bucket_path(bucket_id).join(BUCKET_METADATA_FILE)
    }

    fn project_file(&self, project_name: &str) -> PathBuf {
        self.projects_dir.join(format!("{}.json", project_name))
    }

    fn lock(&self) -> Result<FileLock> {
        FileLock::acquire(&self.library_path)
    }

    /// Current library counters
    pub fn config(&self) -> Result<LibraryConfig> {
        read_json(&self.config_file)
    }

    fn update_config<F: FnOnce(&mut LibraryConfig)>(&self, mutate: F) -> Result<()> {
        let mut config: LibraryConfig = read_json_opt(&self.config_file)?.unwrap_or_default();
        mutate(&mut config);
        write_json_atomic(&self.config_file, &config)
    }

    /// Whether a bucket with this id is registered
    pub fn contains(&self, bucket_id: &str) -> bool {
        self.metadata_path(bucket_id).exists()
    }

    /// Load a bucket's metadata
    pub fn load_bucket(&self, bucket_id: &str) -> Result<BucketMetadata> {
        if bucket_id.is_empty() || bucket_id.contains(['/', '\\']) || bucket_id.starts_with('.') {
            return Err(LizzyError::BucketNotFound(bucket_id.to_string()));
        }
        match read_json_opt(&self.metadata_path(bucket_id))? {
            Some(metadata) => Ok(metadata),
            None => Err(LizzyError::BucketNotFound(bucket_id.to_string())),
        }
    }

    fn save_bucket(&self, metadata: &BucketMetadata) -> Result<()> {
        write_json_atomic(&self.metadata_path(&metadata.id), metadata)
    }

    /// Create a new shared bucket and assign it to a project
    ///
    /// # Errors
    /// - `InvalidName` if the bucket or project name is not portable
    /// - `BucketAlreadyExists` if the generated directory is taken
    pub fn create_bucket(
        &self,
        bucket_name: &str,
        project_name: &str,
        description: &str,
    ) -> Result<CreatedBucket> {
        let bucket_id = generate_bucket_id(bucket_name, project_name);
        self.create_bucket_with_id(&bucket_id, bucket_name, project_name, description)
    }

    /// Create a shared bucket under an id reserved by the caller
    pub(crate) fn create_bucket_with_id(
        &self,
        bucket_id: &str,
        bucket_name: &str,
        project_name: &str,
        description: &str,
    ) -> Result<CreatedBucket> {
        validate_name("bucket", bucket_name)?;
        validate_name("project", project_name)?;
        validate_bucket_id(bucket_id)?;

        let _lock = self.lock()?;

        let bucket_id = bucket_id.to_string();
        let bucket_path = self.bucket_path(&bucket_id);
        if path_occupied(&bucket_path) {
            return Err(LizzyError::BucketAlreadyExists(bucket_id));
        }

        fs::create_dir(&bucket_path).map_err(|e| {
            LizzyError::IoError(format!("Failed to create bucket directory: {}", e))
        })?;

        let registered = (|| -> Result<()> {
            let metadata = BucketMetadata::new(
                bucket_id.clone(),
                bucket_name.to_string(),
                description.to_string(),
                project_name.to_string(),
            );
            self.save_bucket(&metadata)?;
            self.add_bucket_to_project_locked(project_name, &bucket_id)?;
            self.update_config(|config| config.bucket_count += 1)
        })();
        if let Err(e) = registered {
            warn!(bucket_id = %bucket_id, error = %e, "bucket creation failed, removing directory");
            let _ = fs::remove_dir_all(&bucket_path);
            return Err(e);
        }

        info!(bucket_id = %bucket_id, project = %project_name, "created library bucket");

        Ok(CreatedBucket {
            bucket_id,
            path: bucket_path,
        })
    }

    /// Register `bucket_id` in a project's library file (lock held)
    fn add_bucket_to_project_locked(&self, project_name: &str, bucket_id: &str) -> Result<()> {
        let project_file = self.project_file(project_name);
        let mut project = match read_json_opt::<LibraryProject>(&project_file)? {
            Some(project) => project,
            None => {
                self.update_config(|config| config.project_count += 1)?;
                LibraryProject::new(project_name)
            }
        };

        if project.add_bucket(bucket_id) || !project_file.exists() {
            write_json_atomic(&project_file, &project)?;
        }
        Ok(())
    }

    /// Import a library bucket into a project directory
    ///
    /// Creates `<project>/lightrag_working_dir/imported/<id>` as a symlink
    /// (falling back to a copy), adds the project to the bucket's
    /// `shared_with`, and records the import in both the library project
    /// file and the project's `project_lightrag.json`.
    ///
    /// An existing symlink is replaced. Any other existing path is left
    /// alone and reported as `PathConflict`.
    pub fn import_bucket_to_project(
        &self,
        bucket_id: &str,
        project_name: &str,
        project_dir: &Path,
    ) -> Result<ImportOutcome> {
        validate_name("project", project_name)?;
        let _lock = self.lock()?;

        let mut metadata = self.load_bucket(bucket_id)?;
        let bucket_path = self.bucket_path(bucket_id);

        let project_lightrag = lightrag_dir(project_dir);
        let imported_dir = project_lightrag.join(IMPORTED_DIR);
        fs::create_dir_all(&imported_dir)?;

        let link_path = imported_dir.join(bucket_id);
        if path_occupied(&link_path) {
            if is_symlink(&link_path) {
                remove_link(&link_path)?;
            } else {
                return Err(LizzyError::PathConflict(format!(
                    "{} already exists and is not a symlink",
                    link_path.display()
                )));
            }
        }

        let kind = link_or_copy(&bucket_path, &link_path)?;

        if metadata.shared_with.insert(project_name.to_string()) {
            self.save_bucket(&metadata)?;
        }
        self.add_bucket_to_project_locked(project_name, bucket_id)?;

        ProjectBucketConfig::update(&project_lightrag, project_name, |config| {
            config.imported_buckets.insert(bucket_id.to_string());
        })?;

        info!(
            bucket_id = %bucket_id,
            project = %project_name,
            copied = kind == LinkKind::Copy,
            "imported bucket into project"
        );

        Ok(ImportOutcome {
            bucket_id: bucket_id.to_string(),
            project: project_name.to_string(),
            link_path,
            copied: kind == LinkKind::Copy,
        })
    }

    /// List all buckets in the library, sorted by id
    pub fn list_library_buckets(&self) -> Result<Vec<BucketMetadata>> {
        let mut buckets = Vec::new();

        let entries = fs::read_dir(&self.buckets_dir).map_err(|e| {
            LizzyError::IoError(format!("Failed to read buckets directory: {}", e))
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let metadata_file = path.join(BUCKET_METADATA_FILE);
            if !metadata_file.exists() {
                continue;
            }
            match read_json::<BucketMetadata>(&metadata_file) {
                Ok(metadata) => buckets.push(metadata),
                Err(e) => warn!(path = %metadata_file.display(), error = %e, "skipping unreadable bucket"),
            }
        }

        buckets.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(count = buckets.len(), "listed library buckets");
        Ok(buckets)
    }

    /// Library membership record of a project
    pub fn get_project(&self, project_name: &str) -> Result<Option<LibraryProject>> {
        validate_name("project", project_name)?;
        read_json_opt(&self.project_file(project_name))
    }

    /// All projects registered in the library, sorted by name
    pub fn list_projects(&self) -> Result<Vec<LibraryProject>> {
        let mut projects = Vec::new();
        for entry in fs::read_dir(&self.projects_dir)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match read_json::<LibraryProject>(&path) {
                Ok(project) => projects.push(project),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable project"),
            }
        }
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    /// List all buckets associated with a project, in registration order
    pub fn list_project_buckets(&self, project_name: &str) -> Result<Vec<BucketMetadata>> {
        let project = match self.get_project(project_name)? {
            Some(project) => project,
            None => return Ok(Vec::new()),
        };

        let mut buckets = Vec::new();
        for bucket_id in &project.buckets {
            match self.load_bucket(bucket_id) {
                Ok(metadata) => buckets.push(metadata),
                Err(LizzyError::BucketNotFound(_)) => {
                    warn!(bucket_id = %bucket_id, project = %project_name, "project references missing bucket");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(buckets)
    }

    /// Metadata plus storage path and size, `None` if unknown
    pub fn get_bucket_info(&self, bucket_id: &str) -> Result<Option<BucketInfo>> {
        let metadata = match self.load_bucket(bucket_id) {
            Ok(metadata) => metadata,
            Err(LizzyError::BucketNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let path = self.bucket_path(bucket_id);
        let size_mb = bytes_to_mb(dir_size(&path));

        Ok(Some(BucketInfo {
            metadata,
            storage: StorageInfo { path, size_mb },
        }))
    }

    /// Search buckets by name or description (case-insensitive)
    pub fn search_buckets(&self, query: &str) -> Result<Vec<BucketMetadata>> {
        let query_lower = query.to_lowercase();
        Ok(self
            .list_library_buckets()?
            .into_iter()
            .filter(|bucket| bucket.matches(&query_lower))
            .collect())
    }

    /// Statistics about the whole library
    pub fn get_library_stats(&self) -> Result<LibraryStats> {
        let buckets = self.list_library_buckets()?;
        let total_projects = self.list_projects()?.len();
        let total_size_mb = bytes_to_mb(dir_size(&self.library_path));

        let average_bucket_size_mb = if buckets.is_empty() {
            0.0
        } else {
            total_size_mb / buckets.len() as f64
        };

        let mut most_shared = buckets.clone();
        // Stable sort keeps id order among equally shared buckets
        most_shared.sort_by(|a, b| b.shared_with.len().cmp(&a.shared_with.len()));
        most_shared.truncate(MOST_SHARED_LIMIT);

        Ok(LibraryStats {
            total_buckets: buckets.len(),
            total_projects,
            total_size_mb,
            average_bucket_size_mb,
            most_shared_buckets: most_shared,
            library_path: self.library_path.clone(),
        })
    }

    /// Share a bucket from one project to another
    ///
    /// Only the registry is updated; the target project still needs an
    /// import to get a link on disk.
    pub fn share_bucket_between_projects(
        &self,
        bucket_id: &str,
        from_project: &str,
        to_project: &str,
    ) -> Result<BucketMetadata> {
        validate_name("project", to_project)?;
        let _lock = self.lock()?;

        let mut metadata = self.load_bucket(bucket_id)?;
        if metadata.shared_with.insert(to_project.to_string()) {
            self.save_bucket(&metadata)?;
        }
        self.add_bucket_to_project_locked(to_project, bucket_id)?;

        info!(bucket_id = %bucket_id, from = %from_project, to = %to_project, "shared bucket");
        Ok(metadata)
    }

    /// Remove a project from a bucket's share list
    ///
    /// The owning project is never removed. Returns whether anything changed.
    pub fn unshare_bucket(&self, bucket_id: &str, project_name: &str) -> Result<bool> {
        validate_name("project", project_name)?;
        let _lock = self.lock()?;

        let mut changed = false;
        match self.load_bucket(bucket_id) {
            Ok(mut metadata) => {
                if metadata.owning_project != project_name
                    && metadata.shared_with.remove(project_name)
                {
                    self.save_bucket(&metadata)?;
                    changed = true;
                }
            }
            Err(LizzyError::BucketNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let project_file = self.project_file(project_name);
        if let Some(mut project) = read_json_opt::<LibraryProject>(&project_file)? {
            if project.remove_bucket(bucket_id) {
                write_json_atomic(&project_file, &project)?;
                changed = true;
            }
        }

        if changed {
            info!(bucket_id = %bucket_id, project = %project_name, "unshared bucket");
        }
        Ok(changed)
    }

    /// Replace the cached knowledge-graph counters of a bucket
    pub fn update_bucket_stats(&self, bucket_id: &str, stats: BucketStats) -> Result<BucketMetadata> {
        let _lock = self.lock()?;
        let mut metadata = self.load_bucket(bucket_id)?;
        if metadata.stats != stats {
            metadata.stats = stats;
            self.save_bucket(&metadata)?;
        }
        Ok(metadata)
    }

    /// Copy a bucket to `<export_path>/<id>`
    pub fn export_bucket(&self, bucket_id: &str, export_path: &Path) -> Result<PathBuf> {
        self.load_bucket(bucket_id)?;

        let export_dest = export_path.join(bucket_id);
        if path_occupied(&export_dest) {
            return Err(LizzyError::PathConflict(format!(
                "{} already exists",
                export_dest.display()
            )));
        }

        copy_dir_all(&self.bucket_path(bucket_id), &export_dest, &[])?;
        info!(bucket_id = %bucket_id, dest = %export_dest.display(), "exported bucket");
        Ok(export_dest)
    }

    /// Write a bucket to `<export_path>/<id>.tar.gz`
    pub fn export_bucket_archive(&self, bucket_id: &str, export_path: &Path) -> Result<PathBuf> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use tar::Builder;

        self.load_bucket(bucket_id)?;
        fs::create_dir_all(export_path)?;

        let tarball_path = export_path.join(format!("{}.tar.gz", bucket_id));
        if path_occupied(&tarball_path) {
            return Err(LizzyError::PathConflict(format!(
                "{} already exists",
                tarball_path.display()
            )));
        }

        let tar_gz = File::create(&tarball_path).map_err(|e| {
            LizzyError::IoError(format!("Failed to create archive: {}", e))
        })?;
        let enc = GzEncoder::new(tar_gz, Compression::default());
        let mut tar = Builder::new(enc);
        tar.follow_symlinks(false);

        tar.append_dir_all(bucket_id, self.bucket_path(bucket_id)).map_err(|e| {
            LizzyError::IoError(format!("Failed to add bucket to archive: {}", e))
        })?;
        let enc = tar.into_inner().map_err(|e| {
            LizzyError::IoError(format!("Failed to finish archive: {}", e))
        })?;
        enc.finish().map_err(|e| {
            LizzyError::IoError(format!("Failed to finish archive: {}", e))
        })?;

        info!(bucket_id = %bucket_id, archive = %tarball_path.display(), "archived bucket");
        Ok(tarball_path)
    }

    /// Restore a bucket archive written by `export_bucket_archive`
    ///
    /// The archived id is kept. The importing project is added to the
    /// bucket's share list and registered in the library.
    pub fn import_bucket_archive(&self, archive_path: &Path, project_name: &str) -> Result<BucketMetadata> {
        use flate2::read::GzDecoder;
        use tar::Archive;

        validate_name("project", project_name)?;
        let _lock = self.lock()?;

        let staging = self
            .buckets_dir
            .join(format!(".incoming-{}", std::process::id()));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let result = (|| -> Result<BucketMetadata> {
            let tar_gz = File::open(archive_path).map_err(|e| {
                LizzyError::IoError(format!("Failed to open archive: {}", e))
            })?;
            let mut archive = Archive::new(GzDecoder::new(tar_gz));
            archive.unpack(&staging).map_err(|e| {
                LizzyError::IoError(format!("Failed to extract archive: {}", e))
            })?;

            let roots: Vec<PathBuf> = fs::read_dir(&staging)?
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            let root = match roots.as_slice() {
                [root] => root.clone(),
                _ => {
                    return Err(LizzyError::ValidationError(
                        "Archive must contain exactly one bucket directory".to_string(),
                    ))
                }
            };

            let mut metadata: BucketMetadata = read_json(&root.join(BUCKET_METADATA_FILE))?;
            validate_name("bucket", &metadata.name)?;
            validate_bucket_id(&metadata.id)?;
            if self.contains(&metadata.id) || path_occupied(&self.bucket_path(&metadata.id)) {
                return Err(LizzyError::BucketAlreadyExists(metadata.id));
            }

            metadata.shared_with.insert(project_name.to_string());
            write_json_atomic(&root.join(BUCKET_METADATA_FILE), &metadata)?;
            fs::rename(&root, self.bucket_path(&metadata.id))?;
            Ok(metadata)
        })();

        let _ = fs::remove_dir_all(&staging);
        let metadata = result?;

        let registered = (|| -> Result<()> {
            self.add_bucket_to_project_locked(project_name, &metadata.id)?;
            self.update_config(|config| config.bucket_count += 1)
        })();
        if let Err(e) = registered {
            warn!(bucket_id = %metadata.id, error = %e, "archive restore failed, removing bucket");
            let _ = fs::remove_dir_all(self.bucket_path(&metadata.id));
            return Err(e);
        }

        info!(bucket_id = %metadata.id, project = %project_name, "restored bucket archive");
        Ok(metadata)
    }

    /// Delete a shared bucket
    ///
    /// Refuses while projects other than the owner still use the bucket,
    /// unless `force` is set. Links in other projects are left dangling.
    pub fn delete_bucket(&self, bucket_id: &str, force: bool) -> Result<BucketMetadata> {
        let _lock = self.lock()?;
        self.delete_bucket_locked(bucket_id, force)
    }

    fn delete_bucket_locked(&self, bucket_id: &str, force: bool) -> Result<BucketMetadata> {
        let metadata = self.load_bucket(bucket_id)?;

        let borrowers = metadata.borrowers();
        if !borrowers.is_empty() && !force {
            return Err(LizzyError::BucketInUse {
                bucket_id: bucket_id.to_string(),
                projects: borrowers.join(", "),
            });
        }

        fs::remove_dir_all(self.bucket_path(bucket_id)).map_err(|e| {
            LizzyError::IoError(format!("Failed to remove bucket directory: {}", e))
        })?;

        for entry in fs::read_dir(&self.projects_dir)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Ok(mut project) = read_json::<LibraryProject>(&path) {
                if project.remove_bucket(bucket_id) {
                    write_json_atomic(&path, &project)?;
                }
            }
        }

        self.update_config(|config| config.bucket_count = config.bucket_count.saturating_sub(1))?;

        info!(bucket_id = %bucket_id, forced = force, "deleted library bucket");
        Ok(metadata)
    }

    /// Delete a bucket that was only partially created (promotion rollback)
    pub(crate) fn discard_bucket(&self, bucket_id: &str) -> Result<()> {
        let _lock = self.lock()?;
        if self.contains(bucket_id) {
            self.delete_bucket_locked(bucket_id, true)?;
        } else if path_occupied(&self.bucket_path(bucket_id)) {
            fs::remove_dir_all(self.bucket_path(bucket_id))?;
        }
        Ok(())
    }
}
