// Bucket Namespace Contract Tests
//
// These tests pin the on-disk names and identifier rules of the library.
// Other LIZZY tools read and write the same files.

use lizzy_core::library::{
    generate_bucket_id, looks_like_bucket_id, name_from_bucket_id, validate_bucket_id, validate_name,
    BucketLibrary, BUCKET_METADATA_FILE, MAX_BUCKET_ID_LEN, MAX_NAME_LEN,
};
use lizzy_core::project::{lightrag_dir, PROJECT_CONFIG_FILE};
use lizzy_core::workspace::{Scope, Workspace};
use lizzy_core::LizzyError;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use tempfile::TempDir;

/// CONTRACT: a bucket id is `<bucket name>_<8 lowercase hex digits>`
/// BREAKS: name_from_bucket_id and every stored id if the shape changes
#[test]
fn bucket_id_is_name_plus_hex_suffix() {
    let id = generate_bucket_id("characters", "alpha");

    assert!(looks_like_bucket_id(&id));
    assert_eq!(id.len(), "characters".len() + 9);
    assert_eq!(name_from_bucket_id(&id), "characters");

    let suffix = &id[id.len() - 8..];
    assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

/// CONTRACT: ids generated for the same name and project never repeat
/// BREAKS: a second bucket would land in the first one's directory
#[test]
fn bucket_ids_do_not_collide() {
    let ids: HashSet<String> = (0..500).map(|_| generate_bucket_id("lore", "alpha")).collect();
    assert_eq!(ids.len(), 500);
}

/// CONTRACT: names that could escape or hide inside a directory are refused
/// BREAKS: path traversal out of buckets/ or projects/
#[test]
fn unsafe_names_are_rejected() {
    let too_long = "a".repeat(MAX_NAME_LEN + 1);
    for bad in ["", "..", "../escape", "a/b", "a\\b", ".hidden", "with space", too_long.as_str()] {
        assert!(
            matches!(validate_name("bucket", bad), Err(LizzyError::InvalidName(_))),
            "'{}' must be rejected",
            bad
        );
    }

    let longest = "b".repeat(MAX_NAME_LEN);
    for good in ["lore", "Act-1", "v2.draft", "snake_case", longest.as_str()] {
        assert!(validate_name("bucket", good).is_ok(), "'{}' must be accepted", good);
    }
}

/// CONTRACT: every accepted bucket name yields an id that is itself accepted
/// BREAKS: buckets with long names could be created but never removed or imported
#[test]
fn longest_name_yields_usable_id() {
    let name = "c".repeat(MAX_NAME_LEN);
    let id = generate_bucket_id(&name, "alpha");
    assert_eq!(id.len(), MAX_BUCKET_ID_LEN);
    assert!(validate_bucket_id(&id).is_ok());
    assert!(looks_like_bucket_id(&id));

    let temp = TempDir::new().unwrap();
    let library = BucketLibrary::open(temp.path().join("library")).unwrap();
    let created = library.create_bucket(&name, "alpha", "").unwrap();
    library.import_bucket_to_project(&created.bucket_id, "alpha", &temp.path().join("alpha")).unwrap();
    assert!(library.contains(&created.bucket_id));
}

/// CONTRACT: lookups with path-like ids report BucketNotFound, never touch disk
#[test]
fn path_like_ids_are_not_found() {
    let temp = TempDir::new().unwrap();
    let library = BucketLibrary::open(temp.path().join("library")).unwrap();

    for id in ["../library_config.json", ".", "a/b"] {
        assert!(matches!(library.load_bucket(id), Err(LizzyError::BucketNotFound(_))));
    }
}

/// CONTRACT: bucket_metadata.json keeps the field names of existing libraries
/// BREAKS: libraries created by earlier LIZZY releases become unreadable
#[test]
fn bucket_metadata_field_names() {
    let temp = TempDir::new().unwrap();
    let library = BucketLibrary::open(temp.path().join("library")).unwrap();
    let created = library.create_bucket("lore", "alpha", "World lore").unwrap();

    let raw: Value = serde_json::from_str(
        &fs::read_to_string(created.path.join(BUCKET_METADATA_FILE)).unwrap(),
    )
    .unwrap();

    assert_eq!(raw["id"], created.bucket_id.as_str());
    assert_eq!(raw["name"], "lore");
    assert_eq!(raw["description"], "World lore");
    assert_eq!(raw["created_by_project"], "alpha");
    assert_eq!(raw["projects"], serde_json::json!(["alpha"]));
    assert!(raw["created_at"].is_string());
    assert!(raw["stats"].is_object());
}

/// CONTRACT: library layout is buckets/, projects/<name>.json, library_config.json
#[test]
fn library_layout() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("library");
    let library = BucketLibrary::open(&root).unwrap();
    let created = library.create_bucket("lore", "alpha", "").unwrap();

    assert_eq!(created.path, root.join("buckets").join(&created.bucket_id));
    assert!(root.join("projects").join("alpha.json").is_file());

    let config: Value =
        serde_json::from_str(&fs::read_to_string(root.join("library_config.json")).unwrap()).unwrap();
    assert_eq!(config["version"], "1.0.0");
    assert_eq!(config["bucket_count"], 1);
    assert_eq!(config["project_count"], 1);
}

/// CONTRACT: project_lightrag.json holds the three bucket lists as arrays
#[test]
fn project_config_field_names() {
    let temp = TempDir::new().unwrap();
    let project_dir = temp.path().join("alpha");
    fs::create_dir_all(&project_dir).unwrap();
    let workspace = Workspace::open(&temp.path().join("library"), &project_dir, None).unwrap();

    let id = workspace.create_bucket("lore", "", Scope::Library).unwrap().identifier;
    workspace.create_bucket("drafts", "", Scope::Local).unwrap();
    workspace.project().activate_bucket("drafts").unwrap();

    let raw: Value = serde_json::from_str(
        &fs::read_to_string(lightrag_dir(&project_dir).join(PROJECT_CONFIG_FILE)).unwrap(),
    )
    .unwrap();

    assert_eq!(raw["project_name"], "alpha");
    assert_eq!(raw["imported_buckets"], serde_json::json!([id]));
    assert_eq!(raw["local_buckets"], serde_json::json!(["drafts"]));
    assert_eq!(raw["active_buckets"], serde_json::json!(["drafts"]));
}

/// CONTRACT: the owning project stays in the share list whatever happens
/// BREAKS: the owner's own import would be treated as borrowed
#[test]
fn owner_is_never_unshared() {
    let temp = TempDir::new().unwrap();
    let library = BucketLibrary::open(temp.path().join("library")).unwrap();
    let created = library.create_bucket("lore", "alpha", "").unwrap();

    library.unshare_bucket(&created.bucket_id, "alpha").unwrap();
    let metadata = library.load_bucket(&created.bucket_id).unwrap();
    assert!(metadata.shared_with.contains("alpha"));
    assert!(metadata.borrowers().is_empty());
}

/// CONTRACT: an import never replaces a real directory in imported/
/// BREAKS: silent loss of a project's data
#[test]
fn import_never_clobbers_directories() {
    let temp = TempDir::new().unwrap();
    let library = BucketLibrary::open(temp.path().join("library")).unwrap();
    let created = library.create_bucket("lore", "alpha", "").unwrap();

    let project_dir = temp.path().join("beta");
    let occupied = lightrag_dir(&project_dir).join("imported").join(&created.bucket_id);
    fs::create_dir_all(&occupied).unwrap();
    fs::write(occupied.join("precious.txt"), "keep").unwrap();

    let result = library.import_bucket_to_project(&created.bucket_id, "beta", &project_dir);
    assert!(matches!(result, Err(LizzyError::PathConflict(_))));
    assert_eq!(fs::read_to_string(occupied.join("precious.txt")).unwrap(), "keep");
}
