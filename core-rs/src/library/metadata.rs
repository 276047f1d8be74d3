/**
 * metadata.rs
 * On-disk records of the shared bucket library
 *
 * Files:
 * - <library>/library_config.json           -> LibraryConfig
 * - <library>/buckets/<id>/bucket_metadata.json -> BucketMetadata
 * - <library>/projects/<project>.json       -> LibraryProject
 *
 * Field names follow the JSON layout written by earlier LIZZY releases, so
 * existing libraries load unchanged. Timestamps stay strings because older
 * files carry naive local ISO-8601 times.
 */

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Library format version written into new library configs
pub const LIBRARY_FORMAT_VERSION: &str = "1.0.0";

/// Name of the per-bucket metadata file
pub const BUCKET_METADATA_FILE: &str = "bucket_metadata.json";

/// Library-wide counters (library_config.json)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryConfig {
    pub version: String,
    pub created_at: String,
    pub bucket_count: u64,
    pub project_count: u64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl LibraryConfig {
    pub fn new() -> Self {
        LibraryConfig {
            version: LIBRARY_FORMAT_VERSION.to_string(),
            created_at: Utc::now().to_rfc3339(),
            bucket_count: 0,
            project_count: 0,
            metadata: serde_json::Map::new(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Knowledge-graph counters cached in bucket metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BucketStats {
    #[serde(default)]
    pub document_count: u64,
    #[serde(default)]
    pub entity_count: u64,
    #[serde(default)]
    pub relationship_count: u64,
}

/// Shared bucket record (bucket_metadata.json)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BucketMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: String,
    /// Project that created (or promoted) the bucket
    #[serde(rename = "created_by_project")]
    pub owning_project: String,
    /// Every project the bucket is visible in, owner included
    #[serde(rename = "projects", default)]
    pub shared_with: BTreeSet<String>,
    #[serde(default)]
    pub stats: BucketStats,
}

impl BucketMetadata {
    pub fn new(id: String, name: String, description: String, owning_project: String) -> Self {
        let mut shared_with = BTreeSet::new();
        shared_with.insert(owning_project.clone());

        BucketMetadata {
            id,
            name,
            description,
            created_at: Utc::now().to_rfc3339(),
            owning_project,
            shared_with,
            stats: BucketStats::default(),
        }
    }

    /// Projects other than the owner that use this bucket
    pub fn borrowers(&self) -> Vec<&str> {
        self.shared_with
            .iter()
            .filter(|p| **p != self.owning_project)
            .map(|p| p.as_str())
            .collect()
    }

    /// Case-insensitive match of `query_lower` against name and description
    pub fn matches(&self, query_lower: &str) -> bool {
        self.name.to_lowercase().contains(query_lower)
            || self.description.to_lowercase().contains(query_lower)
    }
}

/// A project's membership list in the library (projects/<name>.json)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryProject {
    pub name: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// Bucket ids in the order they were added
    #[serde(default)]
    pub buckets: Vec<String>,
    #[serde(default)]
    pub settings: serde_json::Map<String, Value>,
}

impl LibraryProject {
    pub fn new(name: &str) -> Self {
        LibraryProject {
            name: name.to_string(),
            created_at: Utc::now().to_rfc3339(),
            last_modified: None,
            buckets: Vec::new(),
            settings: serde_json::Map::new(),
        }
    }

    /// Append `bucket_id` if absent; returns whether the list changed
    pub fn add_bucket(&mut self, bucket_id: &str) -> bool {
        if self.buckets.iter().any(|b| b == bucket_id) {
            return false;
        }
        self.buckets.push(bucket_id.to_string());
        self.last_modified = Some(Utc::now().to_rfc3339());
        true
    }

    /// Remove `bucket_id`; returns whether the list changed
    pub fn remove_bucket(&mut self, bucket_id: &str) -> bool {
        let before = self.buckets.len();
        self.buckets.retain(|b| b != bucket_id);
        let changed = self.buckets.len() != before;
        if changed {
            self.last_modified = Some(Utc::now().to_rfc3339());
        }
        changed
    }
}

/// Storage location and footprint of a bucket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageInfo {
    pub path: PathBuf,
    pub size_mb: f64,
}

/// Bucket metadata plus storage details (get_bucket_info)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketInfo {
    #[serde(flatten)]
    pub metadata: BucketMetadata,
    pub storage: StorageInfo,
}

/// Aggregate library statistics (get_library_stats)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryStats {
    pub total_buckets: usize,
    pub total_projects: usize,
    pub total_size_mb: f64,
    pub average_bucket_size_mb: f64,
    pub most_shared_buckets: Vec<BucketMetadata>,
    pub library_path: PathBuf,
}

/// Result of creating a shared bucket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedBucket {
    pub bucket_id: String,
    pub path: PathBuf,
}
