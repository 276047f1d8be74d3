//! Processing queue (processing_queue.json)
//!
//! Files dropped into a bucket wait here until a batch run hands them to
//! the ingestion pipeline. Queued content is stored under `queued/`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use crate::drivers::{read_json_opt, write_json_atomic, FileLock};
use crate::errors::{LizzyError, Result};
use crate::knowledge::documents::PREVIEW_CHARS;

pub const QUEUE_FILE: &str = "processing_queue.json";

/// Directory inside a bucket holding queued files
pub const QUEUED_DIR: &str = "queued";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    PendingProcessing,
    Processed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItem {
    pub filename: String,
    #[serde(default)]
    pub content_preview: String,
    pub timestamp: String,
    pub status: QueueStatus,
    #[serde(default)]
    pub content_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
}

fn queue_path(bucket_dir: &Path) -> PathBuf {
    bucket_dir.join(QUEUE_FILE)
}

fn load_queue(bucket_dir: &Path) -> Result<Vec<QueueItem>> {
    Ok(read_json_opt(&queue_path(bucket_dir))?.unwrap_or_default())
}

/// Store `content` as `queued/<filename>` and queue it for processing
pub fn enqueue(bucket_dir: &Path, filename: &str, content: &str) -> Result<QueueItem> {
    if filename.is_empty() || filename.contains(['/', '\\']) || filename.starts_with('.') {
        return Err(LizzyError::ValidationError(format!(
            "Invalid queued file name '{}'",
            filename
        )));
    }

    let _lock = FileLock::acquire(bucket_dir)?;

    let queued_dir = bucket_dir.join(QUEUED_DIR);
    fs::create_dir_all(&queued_dir)?;
    fs::write(queued_dir.join(filename), content)?;

    let mut content_preview: String = content.chars().take(PREVIEW_CHARS).collect();
    let content_length = content.chars().count();
    if content_length > PREVIEW_CHARS {
        content_preview.push_str("...");
    }

    let item = QueueItem {
        filename: filename.to_string(),
        content_preview,
        timestamp: Utc::now().to_rfc3339(),
        status: QueueStatus::PendingProcessing,
        content_length,
        processed_at: None,
    };

    let mut queue = load_queue(bucket_dir)?;
    queue.push(item.clone());
    write_json_atomic(&queue_path(bucket_dir), &queue)?;

    info!(bucket = %bucket_dir.display(), file = %filename, "queued file for processing");
    Ok(item)
}

/// Items still waiting to be processed
pub fn pending(bucket_dir: &Path) -> Result<Vec<QueueItem>> {
    Ok(load_queue(bucket_dir)?
        .into_iter()
        .filter(|item| item.status == QueueStatus::PendingProcessing)
        .collect())
}

/// Locate the files of pending items
///
/// Looks in `queued/` first, then anywhere in the bucket (older queues
/// stored files next to the LightRAG data). Items whose file cannot be
/// found are returned separately.
pub fn pending_files(bucket_dir: &Path) -> Result<(Vec<PathBuf>, Vec<String>)> {
    let mut found = Vec::new();
    let mut missing = Vec::new();

    for item in pending(bucket_dir)? {
        let queued = bucket_dir.join(QUEUED_DIR).join(&item.filename);
        if queued.is_file() {
            found.push(queued);
            continue;
        }

        let matches: Vec<PathBuf> = WalkDir::new(bucket_dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name() == item.filename.as_str())
            .map(|e| e.into_path())
            .collect();

        if matches.is_empty() {
            missing.push(item.filename);
        } else {
            found.extend(matches);
        }
    }

    Ok((found, missing))
}

/// Mark every pending item processed; returns how many changed
pub fn mark_all_processed(bucket_dir: &Path) -> Result<usize> {
    let _lock = FileLock::acquire(bucket_dir)?;

    let mut queue = load_queue(bucket_dir)?;
    let now = Utc::now().to_rfc3339();
    let mut changed = 0;
    for item in queue.iter_mut().filter(|i| i.status == QueueStatus::PendingProcessing) {
        item.status = QueueStatus::Processed;
        item.processed_at = Some(now.clone());
        changed += 1;
    }

    if changed > 0 {
        write_json_atomic(&queue_path(bucket_dir), &queue)?;
    }
    Ok(changed)
}
