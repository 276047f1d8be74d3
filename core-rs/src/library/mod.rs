//! Shared bucket library
//!
//! A directory tree of LightRAG buckets that any number of projects can
//! import. See `registry` for the on-disk layout.

mod bucket_id;
pub mod metadata;
pub mod registry;

pub use bucket_id::{
    generate_bucket_id, looks_like_bucket_id, name_from_bucket_id, validate_bucket_id, validate_name,
    MAX_BUCKET_ID_LEN, MAX_NAME_LEN,
};
pub use metadata::{
    BucketInfo, BucketMetadata, BucketStats, CreatedBucket, LibraryConfig, LibraryProject,
    LibraryStats, StorageInfo, BUCKET_METADATA_FILE, LIBRARY_FORMAT_VERSION,
};
pub use registry::{BucketLibrary, ImportOutcome, DEFAULT_LIBRARY_DIR, LIBRARY_ENV};
