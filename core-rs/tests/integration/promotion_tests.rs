//! Integration tests for local bucket promotion
//!
//! Covers the normal promotion path and recovery from a journal left
//! behind at each stage of an interrupted promotion.

use lizzy_core::library::BUCKET_METADATA_FILE;
use lizzy_core::project::{
    PromotionJournal, PromotionStage, Recovery, IMPORTED_DIR, LOCAL_DIR, PROMOTION_JOURNAL_FILE,
};
use lizzy_core::workspace::{Scope, Workspace};
use lizzy_core::LizzyError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn open(temp: &TempDir, project: &str) -> Workspace {
    let project_dir = temp.path().join(project);
    fs::create_dir_all(&project_dir).unwrap();
    Workspace::open(&temp.path().join("library"), &project_dir, Some(project)).unwrap()
}

fn local_dir(workspace: &Workspace, name: &str) -> PathBuf {
    workspace.project().lightrag_dir().join(LOCAL_DIR).join(name)
}

fn imported_dir(workspace: &Workspace, bucket_id: &str) -> PathBuf {
    workspace.project().lightrag_dir().join(IMPORTED_DIR).join(bucket_id)
}

/// Local bucket "drafts" holding one chapter, marked active
fn setup_drafts(workspace: &Workspace) -> PathBuf {
    let dir = workspace
        .create_bucket("drafts", "Chapter drafts", Scope::Local)
        .unwrap()
        .path;
    fs::write(dir.join("chapter1.txt"), "It was a dark and stormy night.").unwrap();
    workspace.project().activate_bucket("drafts").unwrap();
    dir
}

/// Reproduce the on-disk state of a promotion interrupted at `stage`
fn interrupted_promotion(workspace: &Workspace, stage: PromotionStage) -> String {
    let project = workspace.project();
    let created = workspace
        .library()
        .create_bucket("drafts", project.project_name(), "Chapter drafts")
        .unwrap();
    let mut journal = PromotionJournal::begin("drafts", &created.bucket_id);
    journal.save(project.lightrag_dir()).unwrap();

    fs::copy(
        local_dir(workspace, "drafts").join("chapter1.txt"),
        created.path.join("chapter1.txt"),
    )
    .unwrap();
    project.import_from_library(&created.bucket_id).unwrap();

    if stage != PromotionStage::Copying {
        journal.advance(project.lightrag_dir(), stage).unwrap();
    }
    created.bucket_id
}

fn journal_path(workspace: &Workspace) -> PathBuf {
    workspace.project().lightrag_dir().join(PROMOTION_JOURNAL_FILE)
}

#[test]
fn test_promote_local_bucket() {
    let temp = TempDir::new().unwrap();
    let alpha = open(&temp, "alpha");
    let local = setup_drafts(&alpha);

    let outcome = alpha.promote_local_bucket("drafts", "").unwrap();

    assert!(outcome.bucket_id.starts_with("drafts_"));
    assert_eq!(outcome.local_name, "drafts");
    assert_eq!(outcome.bytes_copied, "It was a dark and stormy night.".len() as u64);
    assert!(!local.exists());
    assert!(!journal_path(&alpha).exists());

    // Shared bucket carries the local description and the content
    let metadata = alpha.library().load_bucket(&outcome.bucket_id).unwrap();
    assert_eq!(metadata.description, "Chapter drafts");
    assert_eq!(metadata.owning_project, "alpha");
    let shared_dir = alpha.library().bucket_path(&outcome.bucket_id);
    assert!(shared_dir.join("chapter1.txt").exists());

    // Visible through the project's import link
    assert_eq!(outcome.link_path, imported_dir(&alpha, &outcome.bucket_id));
    assert!(outcome.link_path.join("chapter1.txt").exists());

    let config = alpha.project().config().unwrap();
    assert!(!config.local_buckets.contains("drafts"));
    assert!(config.imported_buckets.contains(&outcome.bucket_id));
    assert_eq!(alpha.project().active_buckets().unwrap(), vec![outcome.bucket_id.clone()]);

    // Other projects can import it like any library bucket
    let beta = open(&temp, "beta");
    alpha.share_bucket_with_project(&outcome.bucket_id, "beta").unwrap();
    beta.project().import_from_library(&outcome.bucket_id).unwrap();
    assert_eq!(beta.project().list_all_buckets().unwrap().imported.len(), 1);
}

#[test]
fn test_promote_explicit_description() {
    let temp = TempDir::new().unwrap();
    let alpha = open(&temp, "alpha");
    setup_drafts(&alpha);

    let outcome = alpha.promote_local_bucket("drafts", "Final manuscript").unwrap();
    let metadata = alpha.library().load_bucket(&outcome.bucket_id).unwrap();
    assert_eq!(metadata.description, "Final manuscript");
}

#[test]
fn test_promote_missing_local_bucket() {
    let temp = TempDir::new().unwrap();
    let alpha = open(&temp, "alpha");

    let result = alpha.promote_local_bucket("nothing", "");
    assert!(matches!(result, Err(LizzyError::LocalBucketNotFound(_))));
    assert!(alpha.library().list_library_buckets().unwrap().is_empty());
}

#[test]
fn test_recover_rolls_back_copying_stage() {
    let temp = TempDir::new().unwrap();
    let alpha = open(&temp, "alpha");
    let local = setup_drafts(&alpha);
    let bucket_id = interrupted_promotion(&alpha, PromotionStage::Copying);

    let recovery = alpha.project().recover_promotion().unwrap();
    assert_eq!(
        recovery,
        Some(Recovery::RolledBack {
            local_name: "drafts".to_string(),
            bucket_id: bucket_id.clone(),
        })
    );

    // The half-made shared bucket is gone, the local bucket untouched
    assert!(!alpha.library().contains(&bucket_id));
    assert!(!alpha.library().bucket_path(&bucket_id).exists());
    assert!(!imported_dir(&alpha, &bucket_id).exists());
    assert!(local.join("chapter1.txt").exists());
    assert!(local.join(BUCKET_METADATA_FILE).exists());

    let config = alpha.project().config().unwrap();
    assert!(config.local_buckets.contains("drafts"));
    assert!(!config.imported_buckets.contains(&bucket_id));
    assert_eq!(alpha.project().active_buckets().unwrap(), vec!["drafts".to_string()]);
    assert!(!journal_path(&alpha).exists());

    // Nothing left to do on a second pass
    assert_eq!(alpha.project().recover_promotion().unwrap(), None);
}

#[test]
fn test_recover_rolls_forward_linked_stage() {
    let temp = TempDir::new().unwrap();
    let alpha = open(&temp, "alpha");
    let local = setup_drafts(&alpha);
    let bucket_id = interrupted_promotion(&alpha, PromotionStage::Linked);

    let recovery = alpha.project().recover_promotion().unwrap();
    assert_eq!(
        recovery,
        Some(Recovery::RolledForward {
            local_name: "drafts".to_string(),
            bucket_id: bucket_id.clone(),
        })
    );

    assert!(!local.exists());
    assert!(alpha.library().contains(&bucket_id));
    assert!(imported_dir(&alpha, &bucket_id).join("chapter1.txt").exists());

    let config = alpha.project().config().unwrap();
    assert!(!config.local_buckets.contains("drafts"));
    assert!(config.imported_buckets.contains(&bucket_id));
    assert_eq!(alpha.project().active_buckets().unwrap(), vec![bucket_id]);
}

#[test]
fn test_recover_clears_done_stage() {
    let temp = TempDir::new().unwrap();
    let alpha = open(&temp, "alpha");
    setup_drafts(&alpha);
    let bucket_id = interrupted_promotion(&alpha, PromotionStage::Done);

    let recovery = alpha.project().recover_promotion().unwrap();
    assert_eq!(
        recovery,
        Some(Recovery::Cleared {
            local_name: "drafts".to_string(),
        })
    );
    assert!(alpha.library().contains(&bucket_id));
    assert!(!journal_path(&alpha).exists());
}

#[test]
fn test_reopen_runs_recovery() {
    let temp = TempDir::new().unwrap();
    let bucket_id = {
        let alpha = open(&temp, "alpha");
        setup_drafts(&alpha);
        interrupted_promotion(&alpha, PromotionStage::Copying)
    };

    // Next process start
    let alpha = open(&temp, "alpha");
    assert!(!journal_path(&alpha).exists());
    assert!(!alpha.library().contains(&bucket_id));
    assert!(local_dir(&alpha, "drafts").is_dir());
    assert_eq!(alpha.library().config().unwrap().bucket_count, 0);
}

#[test]
fn test_pending_journal_blocks_new_promotion() {
    let temp = TempDir::new().unwrap();
    let alpha = open(&temp, "alpha");
    setup_drafts(&alpha);

    PromotionJournal::begin("drafts", "drafts_0badf00d")
        .save(alpha.project().lightrag_dir())
        .unwrap();

    let result = alpha.promote_local_bucket("drafts", "");
    assert!(matches!(result, Err(LizzyError::ValidationError(_))));
    assert!(local_dir(&alpha, "drafts").join("chapter1.txt").exists());
}

#[test]
fn test_journal_survives_on_disk_between_stages() {
    let temp = TempDir::new().unwrap();
    let alpha = open(&temp, "alpha");
    let lightrag: &Path = alpha.project().lightrag_dir();

    let mut journal = PromotionJournal::begin("drafts", "drafts_12345678");
    journal.save(lightrag).unwrap();
    journal.advance(lightrag, PromotionStage::Linked).unwrap();

    let loaded = PromotionJournal::load(lightrag).unwrap().unwrap();
    assert_eq!(loaded.stage, PromotionStage::Linked);
    assert_eq!(loaded.bucket_id, "drafts_12345678");

    PromotionJournal::clear(lightrag).unwrap();
    assert!(PromotionJournal::load(lightrag).unwrap().is_none());
}
