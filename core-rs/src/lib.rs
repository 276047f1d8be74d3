//! # LIZZY Core - shared LightRAG bucket library
//!
//! LIZZY projects keep their retrieval knowledge in "buckets": LightRAG
//! working directories. This crate manages where those directories live
//! and who can see them.
//!
//! ## Core Principle
//!
//! **The directory tree IS the registry**: every record is a JSON file next
//! to the data it describes, so every tool that reads the library operates
//! on the same library without any shared service.
//!
//! ## Key Features
//!
//! - Shared bucket library with per-project imports (symlink, copy fallback)
//! - Local buckets and promotion into the library with crash recovery
//! - Advisory locking and atomic JSON writes for every registry file
//! - Knowledge-graph statistics, document ledger, processing queue
//! - Query/processing performance tracking and JSON reports
//!
//! ## Layout
//!
//! ```text
//! ~/lightrag_library/                 <project>/lightrag_working_dir/
//! ├── library_config.json             ├── project_lightrag.json
//! ├── buckets/<id>/                   ├── imported/<id>  ──► library bucket
//! │   └── bucket_metadata.json        ├── local/<name>/
//! └── projects/<project>.json         └── analytics.json
//! ```

pub mod analytics;
pub mod drivers;
pub mod errors;
pub mod knowledge;
pub mod library;
pub mod project;
pub mod settings;
pub mod workspace;

pub use analytics::{PerformanceTracker, ReportGenerator};
pub use errors::{LizzyError, Result};
pub use knowledge::{batch_process, graph_stats, GraphStats, Ingestor, StagingIngestor};
pub use library::{BucketLibrary, BucketMetadata, BucketStats, LibraryStats};
pub use project::{ProjectBucketConfig, ProjectBuckets, Recovery};
pub use settings::{Settings, SettingsOverrides};
pub use workspace::{Scope, Workspace};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library format version written into new libraries
pub const LIBRARY_FORMAT_VERSION: &str = library::LIBRARY_FORMAT_VERSION;
