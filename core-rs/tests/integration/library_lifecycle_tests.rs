//! Integration tests for the shared bucket lifecycle
//!
//! Tests the full path of a bucket through the library:
//! - Creation and import into the owning project
//! - Sharing with and import into a second project
//! - Statistics refresh, export and archive round trip
//! - Removal and deletion rules

use lizzy_core::knowledge::stats::{VDB_CHUNKS_FILE, VDB_ENTITIES_FILE, VDB_RELATIONSHIPS_FILE};
use lizzy_core::library::{looks_like_bucket_id, BucketLibrary};
use lizzy_core::project::{lightrag_dir, ProjectBucketConfig, IMPORTED_DIR};
use lizzy_core::workspace::{Scope, Workspace, MIGRATED_MARKER};
use lizzy_core::LizzyError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Fixture {
    temp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Fixture {
            temp: TempDir::new().unwrap(),
        }
    }

    fn library_path(&self) -> PathBuf {
        self.temp.path().join("library")
    }

    fn project_dir(&self, name: &str) -> PathBuf {
        let dir = self.temp.path().join("projects").join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn workspace(&self, name: &str) -> Workspace {
        Workspace::open(&self.library_path(), &self.project_dir(name), Some(name)).unwrap()
    }
}

fn write_vdb(bucket_dir: &Path, file: &str, rows: usize) {
    let data: Vec<serde_json::Value> = (0..rows).map(|i| serde_json::json!({ "id": i })).collect();
    fs::write(
        bucket_dir.join(file),
        serde_json::to_string(&serde_json::json!({ "data": data })).unwrap(),
    )
    .unwrap();
}

#[test]
fn test_complete_bucket_lifecycle() {
    let fixture = Fixture::new();
    let alpha = fixture.workspace("alpha");
    let beta = fixture.workspace("beta");

    // 1. Create in the library from alpha
    let created = alpha
        .create_bucket("characters", "Cast of the novel", Scope::Library)
        .unwrap();
    let bucket_id = created.identifier.clone();
    assert!(looks_like_bucket_id(&bucket_id));
    assert!(bucket_id.starts_with("characters_"));
    assert!(created.path.ends_with(Path::new(IMPORTED_DIR).join(&bucket_id)));
    assert!(created.path.exists());

    // 2. Share with beta and import there
    let shared = alpha.share_bucket_with_project(&bucket_id, "beta").unwrap();
    assert!(shared.shared_with.contains("beta"));
    assert_eq!(shared.owning_project, "alpha");

    let import = beta.project().import_from_library(&bucket_id).unwrap();
    assert!(import.link_path.exists());

    // 3. Both projects see the same bucket contents
    let library_dir = alpha.library().bucket_path(&bucket_id);
    fs::write(library_dir.join("notes.txt"), "shared").unwrap();
    assert_eq!(
        fs::read_to_string(import.link_path.join("notes.txt")).unwrap(),
        "shared"
    );

    let beta_config = ProjectBucketConfig::load(beta.project().lightrag_dir())
        .unwrap()
        .unwrap();
    assert!(beta_config.imported_buckets.contains(&bucket_id));

    // 4. Sync refreshes cached graph statistics
    write_vdb(&library_dir, VDB_ENTITIES_FILE, 4);
    write_vdb(&library_dir, VDB_RELATIONSHIPS_FILE, 3);
    write_vdb(&library_dir, VDB_CHUNKS_FILE, 2);
    let sync = alpha.synchronize_bucket(&bucket_id).unwrap();
    assert_eq!(sync.stats.entity_count, 4);
    assert_eq!(sync.stats.relationship_count, 3);
    assert_eq!(sync.stats.document_count, 2);

    // 5. Deleting while beta uses it is refused
    let err = alpha.library().delete_bucket(&bucket_id, false).unwrap_err();
    match err {
        LizzyError::BucketInUse { projects, .. } => assert_eq!(projects, "beta"),
        other => panic!("expected BucketInUse, got {:?}", other),
    }

    // 6. Beta drops its import; the bucket stays in the library
    beta.project().remove_import(&bucket_id).unwrap();
    assert!(!import.link_path.exists());
    let metadata = alpha.library().load_bucket(&bucket_id).unwrap();
    assert!(!metadata.shared_with.contains("beta"));

    // 7. Now deletion succeeds and the project files forget the bucket
    alpha.library().delete_bucket(&bucket_id, false).unwrap();
    assert!(!alpha.library().contains(&bucket_id));
    assert!(alpha.library().list_project_buckets("alpha").unwrap().is_empty());
    assert_eq!(alpha.library().config().unwrap().bucket_count, 0);
}

#[test]
fn test_force_delete_shared_bucket() {
    let fixture = Fixture::new();
    let alpha = fixture.workspace("alpha");
    let _beta = fixture.workspace("beta");

    let bucket_id = alpha
        .create_bucket("world", "", Scope::Library)
        .unwrap()
        .identifier;
    alpha.share_bucket_with_project(&bucket_id, "beta").unwrap();

    let deleted = alpha.library().delete_bucket(&bucket_id, true).unwrap();
    assert_eq!(deleted.id, bucket_id);
    assert!(alpha.library().get_bucket_info(&bucket_id).unwrap().is_none());
    assert!(alpha.library().get_project("beta").unwrap().unwrap().buckets.is_empty());
}

#[test]
fn test_archive_round_trip_between_libraries() {
    let fixture = Fixture::new();
    let alpha = fixture.workspace("alpha");

    let bucket_id = alpha
        .create_bucket("research", "Period research", Scope::Library)
        .unwrap()
        .identifier;
    fs::write(alpha.library().bucket_path(&bucket_id).join("source.md"), "# Sources").unwrap();

    let exports = fixture.temp.path().join("exports");
    let archive = alpha.library().export_bucket_archive(&bucket_id, &exports).unwrap();
    assert!(archive.ends_with(format!("{}.tar.gz", bucket_id)));

    // A second library on another machine
    let other = BucketLibrary::open(fixture.temp.path().join("other-library")).unwrap();
    let restored = other.import_bucket_archive(&archive, "gamma").unwrap();

    assert_eq!(restored.id, bucket_id);
    assert_eq!(restored.description, "Period research");
    assert!(restored.shared_with.contains("alpha"));
    assert!(restored.shared_with.contains("gamma"));
    assert_eq!(
        fs::read_to_string(other.bucket_path(&bucket_id).join("source.md")).unwrap(),
        "# Sources"
    );
    assert_eq!(other.list_project_buckets("gamma").unwrap().len(), 1);

    // Restoring the same archive twice clashes
    let again = other.import_bucket_archive(&archive, "gamma");
    assert!(matches!(again, Err(LizzyError::BucketAlreadyExists(_))));
}

#[test]
fn test_directory_export() {
    let fixture = Fixture::new();
    let alpha = fixture.workspace("alpha");
    let bucket_id = alpha.create_bucket("plot", "", Scope::Library).unwrap().identifier;

    let dest = fixture.temp.path().join("backup");
    let exported = alpha.export_bucket(&bucket_id, &dest).unwrap();
    assert_eq!(exported, dest.join(&bucket_id));
    assert!(exported.join("bucket_metadata.json").exists());

    let again = alpha.export_bucket(&bucket_id, &dest);
    assert!(matches!(again, Err(LizzyError::PathConflict(_))));
}

#[test]
fn test_search_and_dashboard() {
    let fixture = Fixture::new();
    let alpha = fixture.workspace("alpha");
    let beta = fixture.workspace("beta");

    let characters = alpha
        .create_bucket("characters", "Protagonists and villains", Scope::Library)
        .unwrap()
        .identifier;
    alpha.create_bucket("places", "Maps and towns", Scope::Library).unwrap();
    beta.create_bucket("drafts", "", Scope::Local).unwrap();

    let found = alpha.search_library("VILLAIN").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, characters);

    alpha.share_bucket_with_project(&characters, "beta").unwrap();
    let dashboard = alpha.get_library_dashboard().unwrap();
    assert_eq!(dashboard.library_stats.total_buckets, 2);
    assert_eq!(dashboard.library_stats.total_projects, 2);
    assert_eq!(dashboard.library_stats.most_shared_buckets[0].id, characters);
    assert_eq!(dashboard.project_buckets.imported.len(), 2);
    assert_eq!(dashboard.project_name, "alpha");

    // Beta sees both library buckets as importable plus its local one
    let available = beta.list_available_buckets().unwrap();
    assert_eq!(available.project.local.len(), 1);
    assert_eq!(available.library.available.len(), 2);
    assert_eq!(available.library.total, 2);
}

#[test]
fn test_batch_import_collects_failures() {
    let fixture = Fixture::new();
    let alpha = fixture.workspace("alpha");
    let beta = fixture.workspace("beta");

    let first = alpha.create_bucket("one", "", Scope::Library).unwrap().identifier;
    let second = alpha.create_bucket("two", "", Scope::Library).unwrap().identifier;

    let ids = vec![first.clone(), "missing_00000000".to_string(), second.clone()];
    let report = beta.batch_import_buckets(&ids);

    assert_eq!(report.imported, vec![first, second]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].bucket, "missing_00000000");
}

#[test]
fn test_migrate_legacy_layout_once() {
    let fixture = Fixture::new();
    let project_dir = fixture.project_dir("legacy");

    // Flat layout from before the library existed
    let old = lightrag_dir(&project_dir).join("scenes");
    fs::create_dir_all(&old).unwrap();
    fs::write(old.join("kv_store_full_docs.json"), "{}").unwrap();
    fs::create_dir_all(lightrag_dir(&project_dir).join("bad name")).unwrap();

    let workspace = Workspace::open(&fixture.library_path(), &project_dir, None).unwrap();
    assert_eq!(workspace.project_name(), "legacy");

    let report = workspace.migrate_existing_buckets().unwrap();
    assert_eq!(report.migrated.len(), 1);
    assert_eq!(report.migrated[0].original, "scenes");
    assert!(report.failed.is_empty());
    assert!(report.skipped.iter().any(|s| s.bucket == "bad name"));

    let bucket_id = &report.migrated[0].bucket_id;
    let bucket_dir = workspace.library().bucket_path(bucket_id);
    assert!(bucket_dir.join("kv_store_full_docs.json").exists());
    assert!(!bucket_dir.join(MIGRATED_MARKER).exists());
    assert!(old.join(MIGRATED_MARKER).exists());

    let second = workspace.migrate_existing_buckets().unwrap();
    assert!(second.migrated.is_empty());
    assert!(second
        .skipped
        .iter()
        .any(|s| s.bucket == "scenes" && s.reason == "already migrated"));
    assert_eq!(workspace.library().list_library_buckets().unwrap().len(), 1);
}

#[test]
fn test_activation_follows_known_buckets() {
    let fixture = Fixture::new();
    let alpha = fixture.workspace("alpha");
    let bucket_id = alpha.create_bucket("lore", "", Scope::Library).unwrap().identifier;
    alpha.create_bucket("scratch", "", Scope::Local).unwrap();

    assert!(alpha.project().activate_bucket(&bucket_id).unwrap());
    assert!(alpha.project().activate_bucket("scratch").unwrap());
    assert!(!alpha.project().activate_bucket("scratch").unwrap());
    assert!(matches!(
        alpha.project().activate_bucket("nothing"),
        Err(LizzyError::BucketNotFound(_))
    ));

    let mut expected = vec![bucket_id.clone(), "scratch".to_string()];
    expected.sort();
    assert_eq!(alpha.project().active_buckets().unwrap(), expected);

    // Removing an import also deactivates it
    alpha.project().remove_import(&bucket_id).unwrap();
    assert_eq!(alpha.project().active_buckets().unwrap(), vec!["scratch".to_string()]);
}
