//! Batch ingestion of source files into a bucket
//!
//! The LightRAG pipeline itself runs outside this crate. An `Ingestor`
//! receives each file's text; the default one stages it under `inputs/`
//! where that pipeline picks it up.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use walkdir::WalkDir;

use super::documents::record_document;
use super::queue::{mark_all_processed, pending_files};
use super::stats::{graph_stats, GraphStats};
use crate::analytics::PerformanceTracker;
use crate::errors::{LizzyError, Result};

/// Extensions collected when none are configured
pub const DEFAULT_EXTENSIONS: &[&str] = &[".txt", ".md", ".pdf", ".docx"];

/// Directory inside a bucket where staged inputs are written
pub const INPUTS_DIR: &str = "inputs";

/// Receives document text destined for a bucket
pub trait Ingestor {
    fn ingest(&mut self, bucket_dir: &Path, filename: &str, content: &str) -> Result<()>;
}

/// Copies content into `<bucket>/inputs/<filename>`
#[derive(Debug, Default, Clone)]
pub struct StagingIngestor;

impl Ingestor for StagingIngestor {
    fn ingest(&mut self, bucket_dir: &Path, filename: &str, content: &str) -> Result<()> {
        let inputs = bucket_dir.join(INPUTS_DIR);
        fs::create_dir_all(&inputs)?;
        fs::write(inputs.join(filename), content)
            .map_err(|e| LizzyError::Ingest(format!("Failed to stage {}: {}", filename, e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub bucket: String,
    pub total_files: usize,
    pub processed: usize,
    pub failed: usize,
    pub results: Vec<FileResult>,
    pub final_stats: GraphStats,
    pub timestamp: String,
}

/// Recursively collect files whose extension is in `extensions`
///
/// Matching ignores case. An empty list means `DEFAULT_EXTENSIONS`.
pub fn collect_files<S: AsRef<str>>(directory: &Path, extensions: &[S]) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Err(LizzyError::FileNotFound(directory.display().to_string()));
    }

    let wanted: Vec<String> = if extensions.is_empty() {
        DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
    } else {
        extensions.iter().map(|e| e.as_ref().to_lowercase()).collect()
    };

    let mut files: Vec<PathBuf> = WalkDir::new(directory)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_lowercase();
            wanted.iter().any(|ext| name.ends_with(ext.as_str()))
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

fn process_file(bucket_dir: &Path, file: &Path, ingestor: &mut dyn Ingestor) -> Result<usize> {
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| LizzyError::Ingest(format!("Not a file: {}", file.display())))?;

    let bytes = fs::read(file)?;
    let content = String::from_utf8_lossy(&bytes);

    ingestor.ingest(bucket_dir, &filename, &content)?;

    let mut metadata = Map::new();
    metadata.insert("source_file".to_string(), Value::from(file.display().to_string()));
    metadata.insert("filename".to_string(), Value::from(filename));
    record_document(bucket_dir, &content, metadata)?;

    Ok(content.chars().count())
}

/// Feed files into a bucket
///
/// With `files` unset the pending processing queue is used, and its items
/// are marked processed afterwards. Per-file failures are collected in the
/// report; only setup errors abort the run.
pub fn batch_process(
    bucket_dir: &Path,
    files: Option<Vec<PathBuf>>,
    ingestor: &mut dyn Ingestor,
    mut tracker: Option<&mut PerformanceTracker>,
) -> Result<BatchReport> {
    if !bucket_dir.is_dir() {
        return Err(LizzyError::BucketNotFound(bucket_dir.display().to_string()));
    }
    let bucket = bucket_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let from_queue = files.is_none();
    let files = match files {
        Some(files) => files
            .into_iter()
            .filter(|f| {
                let exists = f.is_file();
                if !exists {
                    warn!(file = %f.display(), "file not found, skipping");
                }
                exists
            })
            .collect::<Vec<_>>(),
        None => {
            let (found, missing) = pending_files(bucket_dir)?;
            for name in missing {
                warn!(file = %name, "queued file not found");
            }
            found
        }
    };

    if files.is_empty() {
        return Err(LizzyError::Ingest("No files to process".to_string()));
    }

    info!(bucket = %bucket, files = files.len(), "starting batch processing");

    let mut results = Vec::with_capacity(files.len());
    let mut processed = 0;
    let mut failed = 0;

    for file in &files {
        let started = Instant::now();
        let outcome = process_file(bucket_dir, file, ingestor);
        let elapsed = started.elapsed();
        let bytes = fs::metadata(file).map(|m| m.len()).unwrap_or(0);
        let item = file.display().to_string();

        if let Some(tracker) = tracker.as_deref_mut() {
            tracker.record_processing(&bucket, &item, elapsed, bytes, outcome.is_ok())?;
        }

        match outcome {
            Ok(size) => {
                processed += 1;
                results.push(FileResult {
                    file: file.clone(),
                    status: FileStatus::Success,
                    size: Some(size),
                    error: None,
                });
            }
            Err(e) => {
                failed += 1;
                warn!(file = %item, error = %e, "processing failed");
                results.push(FileResult {
                    file: file.clone(),
                    status: FileStatus::Failed,
                    size: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    if from_queue {
        mark_all_processed(bucket_dir)?;
    }

    let final_stats = graph_stats(bucket_dir);
    info!(bucket = %bucket, processed, failed, "batch processing complete");

    Ok(BatchReport {
        bucket,
        total_files: files.len(),
        processed,
        failed,
        results,
        final_stats,
        timestamp: Utc::now().to_rfc3339(),
    })
}
