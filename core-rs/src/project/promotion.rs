//! Promotion journal (promotion.json)
//!
//! Promoting a local bucket spans two registries and several filesystem
//! steps. The journal records how far a promotion got so that a crash can
//! be repaired the next time the project is opened:
//!
//! - `copying`: the shared bucket may be partial. Roll back by discarding
//!   it; the local bucket is still intact.
//! - `linked`: the shared bucket is complete and imported. Roll forward by
//!   removing the local directory.
//! - `done`: nothing left to do besides clearing the journal.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::drivers::{read_json_opt, write_json_atomic};
use crate::errors::Result;

/// Journal file name inside lightrag_working_dir
pub const PROMOTION_JOURNAL_FILE: &str = "promotion.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromotionStage {
    Copying,
    Linked,
    Done,
}

impl std::fmt::Display for PromotionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PromotionStage::Copying => "copying",
            PromotionStage::Linked => "linked",
            PromotionStage::Done => "done",
        };
        write!(f, "{}", s)
    }
}

/// In-flight promotion of one local bucket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromotionJournal {
    pub local_name: String,
    /// Id reserved for the shared bucket before it is created
    pub bucket_id: String,
    pub stage: PromotionStage,
    pub started_at: String,
}

impl PromotionJournal {
    pub fn begin(local_name: &str, bucket_id: &str) -> Self {
        PromotionJournal {
            local_name: local_name.to_string(),
            bucket_id: bucket_id.to_string(),
            stage: PromotionStage::Copying,
            started_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn path(lightrag_dir: &Path) -> PathBuf {
        lightrag_dir.join(PROMOTION_JOURNAL_FILE)
    }

    pub fn load(lightrag_dir: &Path) -> Result<Option<Self>> {
        read_json_opt(&Self::path(lightrag_dir))
    }

    pub fn save(&self, lightrag_dir: &Path) -> Result<()> {
        write_json_atomic(&Self::path(lightrag_dir), self)
    }

    /// Advance to `stage` and persist
    pub fn advance(&mut self, lightrag_dir: &Path, stage: PromotionStage) -> Result<()> {
        self.stage = stage;
        self.save(lightrag_dir)
    }

    pub fn clear(lightrag_dir: &Path) -> Result<()> {
        let path = Self::path(lightrag_dir);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// What recovery did with a leftover journal
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Recovery {
    RolledBack {
        local_name: String,
        bucket_id: String,
    },
    RolledForward {
        local_name: String,
        bucket_id: String,
    },
    Cleared {
        local_name: String,
    },
}
