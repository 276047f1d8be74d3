//! Document ledger (documents.json)
//!
//! One entry per document handed to a bucket, newest last.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::drivers::{read_json_opt, write_json_atomic, FileLock};
use crate::errors::Result;

pub const DOCUMENTS_FILE: &str = "documents.json";

/// Characters kept in `content_preview`
pub const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    pub timestamp: String,
    pub content_preview: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Length of the full content in characters
    pub length: usize,
}

impl DocumentRecord {
    pub fn new(content: &str, metadata: Map<String, Value>) -> Self {
        DocumentRecord {
            timestamp: Utc::now().to_rfc3339(),
            content_preview: content.chars().take(PREVIEW_CHARS).collect(),
            metadata,
            length: content.chars().count(),
        }
    }
}

fn ledger_path(bucket_dir: &Path) -> PathBuf {
    bucket_dir.join(DOCUMENTS_FILE)
}

/// Append a document to the bucket's ledger
pub fn record_document(bucket_dir: &Path, content: &str, metadata: Map<String, Value>) -> Result<DocumentRecord> {
    let _lock = FileLock::acquire(bucket_dir)?;

    let path = ledger_path(bucket_dir);
    let mut ledger: Vec<DocumentRecord> = read_json_opt(&path)?.unwrap_or_default();
    let record = DocumentRecord::new(content, metadata);
    ledger.push(record.clone());
    write_json_atomic(&path, &ledger)?;

    Ok(record)
}

/// Every document recorded for the bucket, oldest first
pub fn documents(bucket_dir: &Path) -> Result<Vec<DocumentRecord>> {
    Ok(read_json_opt(&ledger_path(bucket_dir))?.unwrap_or_default())
}
