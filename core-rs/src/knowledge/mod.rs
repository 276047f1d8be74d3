//! Knowledge manager
//!
//! Bookkeeping around LightRAG bucket directories: graph statistics, the
//! document ledger, the processing queue and batch ingestion. Embedding
//! and extraction happen in the external LightRAG pipeline.

pub mod documents;
pub mod ingest;
pub mod queue;
pub mod stats;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

use crate::drivers::read_json_opt;
use crate::errors::Result;
use crate::library::BUCKET_METADATA_FILE;

pub use documents::{documents, record_document, DocumentRecord, DOCUMENTS_FILE};
pub use ingest::{
    batch_process, collect_files, BatchReport, FileResult, FileStatus, Ingestor, StagingIngestor,
    DEFAULT_EXTENSIONS, INPUTS_DIR,
};
pub use queue::{enqueue, mark_all_processed, pending, QueueItem, QueueStatus, QUEUE_FILE};
pub use stats::{graph_stats, GraphStats, LEGACY_GRAPH_FILE};

/// Everything known about a bucket, in one document
#[derive(Debug, Clone, Serialize)]
pub struct BucketExport {
    pub bucket_name: String,
    pub metadata: Value,
    pub documents: Vec<DocumentRecord>,
    pub graph: Value,
    pub export_date: String,
}

/// Collect metadata, the document ledger and the legacy graph of a bucket
pub fn export_bucket_data(bucket_dir: &Path) -> Result<BucketExport> {
    let bucket_name = bucket_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let metadata = read_json_opt::<Value>(&bucket_dir.join(BUCKET_METADATA_FILE))?
        .unwrap_or_else(|| Value::Object(Default::default()));
    let graph = read_json_opt::<Value>(&bucket_dir.join(LEGACY_GRAPH_FILE))?
        .unwrap_or_else(|| Value::Object(Default::default()));

    Ok(BucketExport {
        bucket_name,
        metadata,
        documents: documents(bucket_dir)?,
        graph,
        export_date: Utc::now().to_rfc3339(),
    })
}
