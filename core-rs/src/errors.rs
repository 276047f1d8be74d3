//! Error types for the LIZZY bucket library

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LizzyError {
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("Local bucket not found: {0}")]
    LocalBucketNotFound(String),

    #[error("Local bucket already exists: {0}")]
    LocalBucketExists(String),

    #[error("Bucket {bucket_id} is shared with other projects: {projects}")]
    BucketInUse { bucket_id: String, projects: String },

    #[error("Path conflict: {0}")]
    PathConflict(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Ingest error: {0}")]
    Ingest(String),
}

pub type Result<T> = std::result::Result<T, LizzyError>;
