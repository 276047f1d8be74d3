/**
 * project module
 * Per-project bucket view: imports, local buckets, promotion
 */

pub mod config;
pub mod manager;
pub mod promotion;

pub use config::{lightrag_dir, ProjectBucketConfig, IMPORTED_DIR, LIGHTRAG_DIR, LOCAL_DIR, PROJECT_CONFIG_FILE};
pub use manager::{LocalBucketMetadata, ProjectBuckets, ProjectListing, PromotionOutcome};
pub use promotion::{PromotionJournal, PromotionStage, Recovery, PROMOTION_JOURNAL_FILE};
