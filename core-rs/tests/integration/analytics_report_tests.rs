//! Integration tests for ingestion, tracking and reports
//!
//! Runs files through a project's buckets with a tracker attached, then
//! generates each report kind and checks what lands on disk.

use lizzy_core::analytics::{
    BucketSource, PerformanceTracker, ReportGenerator, ANALYTICS_FILE, REPORTS_DIR,
};
use lizzy_core::knowledge::stats::{VDB_CHUNKS_FILE, VDB_ENTITIES_FILE, VDB_RELATIONSHIPS_FILE};
use lizzy_core::knowledge::{
    batch_process, collect_files, documents, enqueue, export_bucket_data, pending, StagingIngestor,
    INPUTS_DIR,
};
use lizzy_core::workspace::{Scope, Workspace};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn write_vdb(bucket_dir: &Path, file: &str, rows: usize) {
    let data: Vec<Value> = (0..rows).map(|i| serde_json::json!({ "id": i })).collect();
    fs::write(
        bucket_dir.join(file),
        serde_json::to_string(&serde_json::json!({ "data": data })).unwrap(),
    )
    .unwrap();
}

fn read_report(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

struct Project {
    _temp: TempDir,
    workspace: Workspace,
    sources: TempDir,
}

/// Project "novel" with a library bucket and a local bucket
fn setup() -> (Project, String) {
    let temp = TempDir::new().unwrap();
    let project_dir = temp.path().join("novel");
    fs::create_dir_all(&project_dir).unwrap();
    let workspace = Workspace::open(&temp.path().join("library"), &project_dir, None).unwrap();

    let shared = workspace
        .create_bucket("characters", "", Scope::Library)
        .unwrap()
        .identifier;
    workspace.create_bucket("scratch", "", Scope::Local).unwrap();

    let sources = TempDir::new().unwrap();
    fs::create_dir_all(sources.path().join("act1")).unwrap();
    fs::write(sources.path().join("act1/hero.md"), "The hero leaves home.").unwrap();
    fs::write(sources.path().join("villain.txt"), "The villain waits.").unwrap();
    fs::write(sources.path().join("cover.png"), "not text").unwrap();

    (
        Project {
            _temp: temp,
            workspace,
            sources,
        },
        shared,
    )
}

#[test]
fn test_ingest_directory_with_tracking() {
    let (project, shared) = setup();
    let bucket_dir = project.workspace.project().resolve_bucket_path(&shared).unwrap();
    let analytics = project.workspace.project().lightrag_dir().join(ANALYTICS_FILE);

    let files = collect_files(project.sources.path(), &[".md", ".txt"]).unwrap();
    assert_eq!(files.len(), 2);

    {
        let mut tracker = PerformanceTracker::open(&analytics, 100).unwrap();
        let report =
            batch_process(&bucket_dir, Some(files), &mut StagingIngestor, Some(&mut tracker)).unwrap();

        assert_eq!(report.bucket, shared);
        assert_eq!(report.total_files, 2);
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(tracker.unflushed(), 2);
        // Dropping the tracker flushes the pending events
    }

    // Staged through the import link into the library bucket
    let library_dir = project.workspace.library().bucket_path(&shared);
    assert!(library_dir.join(INPUTS_DIR).join("hero.md").exists());
    assert_eq!(documents(&library_dir).unwrap().len(), 2);

    let tracker = PerformanceTracker::open(&analytics, 100).unwrap();
    let perf = tracker.bucket_performance(&shared);
    assert_eq!(perf.total_processed, 2);
    assert!(perf.last_activity.is_some());
    assert_eq!(tracker.tracked_buckets(), vec![shared]);
}

#[test]
fn test_ingest_from_queue() {
    let (project, _) = setup();
    let bucket_dir = project.workspace.project().resolve_bucket_path("scratch").unwrap();

    enqueue(&bucket_dir, "note1.txt", "First idea").unwrap();
    enqueue(&bucket_dir, "note2.txt", "Second idea").unwrap();
    assert_eq!(pending(&bucket_dir).unwrap().len(), 2);

    let report = batch_process(&bucket_dir, None, &mut StagingIngestor, None).unwrap();
    assert_eq!(report.bucket, "scratch");
    assert_eq!(report.processed, 2);
    assert!(pending(&bucket_dir).unwrap().is_empty());

    // A drained queue has nothing left to run
    assert!(batch_process(&bucket_dir, None, &mut StagingIngestor, None).is_err());

    let export = export_bucket_data(&bucket_dir).unwrap();
    assert_eq!(export.bucket_name, "scratch");
    assert_eq!(export.documents.len(), 2);
}

#[test]
fn test_comprehensive_report() {
    let (project, shared) = setup();
    let lightrag = project.workspace.project().lightrag_dir().to_path_buf();
    let library_dir = project.workspace.library().bucket_path(&shared);
    write_vdb(&library_dir, VDB_ENTITIES_FILE, 60);
    write_vdb(&library_dir, VDB_RELATIONSHIPS_FILE, 90);
    write_vdb(&library_dir, VDB_CHUNKS_FILE, 10);

    let mut tracker = PerformanceTracker::open(lightrag.join(ANALYTICS_FILE), 100).unwrap();
    tracker.record_query(&shared, "hybrid", Duration::from_millis(300), true).unwrap();
    tracker.record_query(&shared, "hybrid", Duration::from_millis(500), true).unwrap();
    tracker.record_query(&shared, "local", Duration::from_millis(100), false).unwrap();

    let sources = project
        .workspace
        .project()
        .bucket_dirs()
        .unwrap()
        .into_iter()
        .map(|(name, path)| BucketSource::new(name, path))
        .collect();
    let generator = ReportGenerator::new(&lightrag, sources, &tracker);

    let path = generator.generate_comprehensive().unwrap();
    assert!(path.starts_with(lightrag.join(REPORTS_DIR)));
    let file_name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("lizzy_comprehensive_report_"));

    let report = read_report(&path);
    assert_eq!(report["report_metadata"]["report_version"], "1.0");
    assert_eq!(report["overview"]["total_queries"], 3);
    assert_eq!(report["performance_summary"]["failed_queries"], 1);
    assert_eq!(report["performance_summary"]["most_used_bucket"], shared.as_str());
    assert_eq!(report["performance_summary"]["most_used_query_mode"], "hybrid");
    assert_eq!(report["recent_activity"].as_array().unwrap().len(), 3);

    let analysis = &report["bucket_analysis"];
    assert_eq!(analysis[shared.as_str()]["entities"], 60);
    assert_eq!(analysis[shared.as_str()]["relationships"], 90);
    assert_eq!(analysis[shared.as_str()]["performance"]["total_queries"], 3);
    assert_eq!(analysis["scratch"]["entities"], 0);

    let recommendations: Vec<String> = report["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r.as_str().unwrap().to_string())
        .collect();
    assert!(recommendations.iter().any(|r| r.contains("scratch")));
    assert!(recommendations.iter().any(|r| r.contains("underutilized")));
    assert!(!recommendations.iter().any(|r| r.contains("query performance")));
}

#[test]
fn test_comparison_report() {
    let (project, shared) = setup();
    let lightrag = project.workspace.project().lightrag_dir().to_path_buf();
    let library_dir = project.workspace.library().bucket_path(&shared);
    write_vdb(&library_dir, VDB_ENTITIES_FILE, 40);
    write_vdb(&library_dir, VDB_RELATIONSHIPS_FILE, 10);
    write_vdb(&library_dir, VDB_CHUNKS_FILE, 5);

    let tracker = PerformanceTracker::open(lightrag.join(ANALYTICS_FILE), 100).unwrap();
    let sources = project
        .workspace
        .project()
        .bucket_dirs()
        .unwrap()
        .into_iter()
        .map(|(name, path)| BucketSource::new(name, path))
        .collect();
    let generator = ReportGenerator::new(&lightrag, sources, &tracker);

    let names = vec![shared.clone(), "scratch".to_string()];
    let path = generator.generate_comparison(&names).unwrap();
    let file_name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with(&format!("bucket_comparison_{}-scratch_", shared)));

    let report = read_report(&path);
    assert_eq!(report["report_metadata"]["comparison_type"], "detailed");

    // Only buckets with entities get metrics
    let metrics = report["comparison_metrics"].as_object().unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[shared.as_str()]["entity_relationship_ratio"], 0.25);
    assert_eq!(metrics[shared.as_str()]["density_score"], 10.0);

    let advice = report["recommendations"][shared.as_str()].as_array().unwrap();
    assert_eq!(advice.len(), 3);
    assert_eq!(
        report["recommendations"]["scratch"][0],
        "Add documents to build knowledge graph"
    );
}

#[test]
fn test_timeline_report() {
    let (project, shared) = setup();
    let lightrag = project.workspace.project().lightrag_dir().to_path_buf();

    let mut tracker = PerformanceTracker::open(lightrag.join(ANALYTICS_FILE), 100).unwrap();
    tracker.record_query("scratch", "naive", Duration::from_millis(50), true).unwrap();
    tracker
        .record_processing("scratch", "note.txt", Duration::from_millis(20), 128, true)
        .unwrap();
    tracker.record_query(&shared, "hybrid", Duration::from_millis(80), true).unwrap();

    let sources = project
        .workspace
        .project()
        .bucket_dirs()
        .unwrap()
        .into_iter()
        .map(|(name, path)| BucketSource::new(name, path))
        .collect();
    let generator = ReportGenerator::new(&lightrag, sources, &tracker);

    let timeline = generator.build_timeline(7);
    assert_eq!(timeline.report_metadata.timeline_period_days, 7);
    assert_eq!(timeline.bucket_trends["scratch"].total_activity, 2);
    assert_eq!(timeline.bucket_trends[&shared].total_activity, 1);
    assert_eq!(timeline.bucket_trends["scratch"].daily.len(), 7);
    assert_eq!(
        timeline.performance_insights.most_active_bucket.as_deref(),
        Some("scratch")
    );

    let path = generator.generate_timeline(7).unwrap();
    let file_name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("performance_timeline_7d_"));
    assert_eq!(read_report(&path)["report_metadata"]["report_type"], "performance_timeline");
}
