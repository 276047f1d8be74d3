//! lizzy - LIZZY bucket library CLI
//!
//! Command-line interface over the shared bucket library and the current
//! project's buckets

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lizzy_core::analytics::{BucketSource, PerformanceTracker, ReportGenerator, MAX_TREND_DAYS};
use lizzy_core::knowledge::{self, batch_process, collect_files, graph_stats, StagingIngestor};
use lizzy_core::library::BucketMetadata;
use lizzy_core::project::{ProjectListing, Recovery};
use lizzy_core::settings::{Settings, SettingsOverrides};
use lizzy_core::workspace::{Scope, Workspace};

#[derive(Parser)]
#[command(name = "lizzy")]
#[command(version)]
#[command(about = "LIZZY bucket library - shared LightRAG knowledge bases", long_about = None)]
struct Cli {
    /// Settings file (default: <project-dir>/lizzy.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Bucket library directory
    #[arg(long, global = true)]
    library: Option<PathBuf>,
    /// Project directory
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,
    /// Project name (default: project directory name)
    #[arg(long, global = true)]
    project: Option<String>,
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a bucket in the library (imported into this project) or locally
    Create {
        name: String,
        #[arg(long, short, default_value = "")]
        description: String,
        /// library or local
        #[arg(long, default_value = "library")]
        scope: Scope,
    },
    /// List project buckets and importable library buckets
    List,
    /// Import a library bucket into this project
    Import { bucket_id: String },
    /// Import several library buckets
    BatchImport {
        #[arg(required = true)]
        bucket_ids: Vec<String>,
    },
    /// Import a bucket archive (.tar.gz) into the library and this project
    ImportArchive { archive: PathBuf },
    /// Promote a local bucket into the shared library
    Promote {
        name: String,
        #[arg(long, short, default_value = "")]
        description: String,
    },
    /// Share a library bucket with another project
    Share { bucket_id: String, target_project: String },
    /// Export a library bucket to a directory
    Export {
        bucket_id: String,
        destination: PathBuf,
        /// Write a .tar.gz archive instead of a directory copy
        #[arg(long)]
        archive: bool,
    },
    /// Search library buckets by name or description
    Search { query: String },
    /// Library statistics and project dashboard
    Stats,
    /// Move legacy buckets from lightrag_working_dir/ into the library
    Migrate,
    /// Show bucket metadata and storage
    Info { bucket_id: String },
    /// Re-import a bucket and refresh its graph statistics
    Sync { bucket_id: String },
    /// Remove an imported bucket from this project
    RemoveImport { bucket_id: String },
    /// Delete a bucket from the library
    Delete {
        bucket_id: String,
        /// Delete even if other projects still use it
        #[arg(long)]
        force: bool,
    },
    /// Enable a bucket for queries
    Activate { bucket: String },
    /// Disable a bucket for queries
    Deactivate { bucket: String },
    /// Queue a file for processing in a bucket
    Enqueue { bucket: String, file: PathBuf },
    /// Process files (or the queue) into a bucket
    Ingest {
        bucket: String,
        /// Directory to collect files from
        #[arg(long, conflicts_with = "files")]
        dir: Option<PathBuf>,
        /// Explicit files
        #[arg(long, num_args = 1..)]
        files: Vec<PathBuf>,
    },
    /// Knowledge-graph statistics of a bucket
    GraphStats { bucket: String },
    /// Generate an analytics report under lightrag_working_dir/_reports
    Report {
        /// Compare the named buckets
        #[arg(long, num_args = 1.., conflicts_with = "timeline")]
        compare: Vec<String>,
        /// Timeline over the last N days
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_TREND_DAYS)))]
        timeline: Option<u32>,
    },
    /// Finish or roll back an interrupted promotion
    Recover,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::resolve(SettingsOverrides {
        config: cli.config,
        library_path: cli.library,
        project_dir: cli.project_dir,
        project_name: cli.project,
    })
    .context("Failed to resolve settings")?;

    let workspace = Workspace::from_settings(&settings).with_context(|| {
        format!("Failed to open library at {}", settings.library_path.display())
    })?;
    let json = cli.json;

    match cli.command {
        Commands::Create { name, description, scope } => {
            let created = workspace.create_bucket(&name, &description, scope)?;
            emit(json, &created, || {
                ok(&format!("Created {:?} bucket {}", created.scope, created.identifier.bold()));
                println!("  Location: {}", created.path.display());
            })
        }

        Commands::List => {
            let available = workspace.list_available_buckets()?;
            emit(json, &available, || {
                print_listing(&available.project);
                println!("\n{} ({})", "Available in library".bold(), available.library.available.len());
                print_buckets(&available.library.available);
            })
        }

        Commands::Import { bucket_id } => {
            let outcome = workspace.project().import_from_library(&bucket_id)?;
            emit(json, &outcome, || {
                let how = if outcome.copied { "copied" } else { "linked" };
                ok(&format!("Imported {} ({})", outcome.bucket_id.bold(), how));
                println!("  Location: {}", outcome.link_path.display());
            })
        }

        Commands::BatchImport { bucket_ids } => {
            let report = workspace.batch_import_buckets(&bucket_ids);
            emit(json, &report, || {
                for id in &report.imported {
                    ok(&format!("Imported {}", id));
                }
                for failure in &report.failed {
                    fail(&format!("{}: {}", failure.bucket, failure.error));
                }
            })?;
            if !report.failed.is_empty() {
                bail!("{} of {} imports failed", report.failed.len(), bucket_ids.len());
            }
            Ok(())
        }

        Commands::ImportArchive { archive } => {
            let metadata = workspace
                .library()
                .import_bucket_archive(&archive, workspace.project_name())?;
            let outcome = workspace.project().import_from_library(&metadata.id)?;
            emit(json, &metadata, || {
                ok(&format!("Imported archive as {}", metadata.id.bold()));
                println!("  Location: {}", outcome.link_path.display());
            })
        }

        Commands::Promote { name, description } => {
            let outcome = workspace.promote_local_bucket(&name, &description)?;
            emit(json, &outcome, || {
                ok(&format!("Promoted {} to {}", outcome.local_name, outcome.bucket_id.bold()));
                println!("  Copied: {:.2} MB", lizzy_core::drivers::bytes_to_mb(outcome.bytes_copied));
                println!("  Link: {}", outcome.link_path.display());
            })
        }

        Commands::Share { bucket_id, target_project } => {
            let metadata = workspace.share_bucket_with_project(&bucket_id, &target_project)?;
            emit(json, &metadata, || {
                ok(&format!("Shared {} with {}", bucket_id.bold(), target_project));
                println!("  Projects: {}", join(metadata.shared_with.iter()));
            })
        }

        Commands::Export { bucket_id, destination, archive } => {
            let path = if archive {
                workspace.library().export_bucket_archive(&bucket_id, &destination)?
            } else {
                workspace.export_bucket(&bucket_id, &destination)?
            };
            emit(json, &path, || ok(&format!("Exported {} to {}", bucket_id.bold(), path.display())))
        }

        Commands::Search { query } => {
            let found = workspace.search_library(&query)?;
            emit(json, &found, || {
                println!("{} matching '{}'", found.len(), query);
                print_buckets(&found);
            })
        }

        Commands::Stats => {
            let dashboard = workspace.get_library_dashboard()?;
            emit(json, &dashboard, || {
                let stats = &dashboard.library_stats;
                println!("{}", "Library".bold());
                println!("  Path:     {}", stats.library_path.display());
                println!("  Buckets:  {}", stats.total_buckets);
                println!("  Projects: {}", stats.total_projects);
                println!(
                    "  Size:     {:.2} MB (avg {:.2} MB)",
                    stats.total_size_mb, stats.average_bucket_size_mb
                );
                if !stats.most_shared_buckets.is_empty() {
                    println!("\n{}", "Most shared".bold());
                    for bucket in &stats.most_shared_buckets {
                        println!("  {:<40} {} projects", bucket.id, bucket.shared_with.len());
                    }
                }
                println!(
                    "\n{} {} ({})",
                    "Project".bold(),
                    dashboard.project_name,
                    dashboard.project_dir.display()
                );
                print_listing(&dashboard.project_buckets);
                println!("  Active: {}", join(dashboard.active_buckets.iter()));
            })
        }

        Commands::Migrate => {
            let report = workspace.migrate_existing_buckets()?;
            emit(json, &report, || {
                for item in &report.migrated {
                    ok(&format!("{} -> {}", item.original, item.bucket_id));
                }
                for item in &report.skipped {
                    println!("{} {} ({})", "-".yellow(), item.bucket, item.reason);
                }
                for item in &report.failed {
                    fail(&format!("{}: {}", item.bucket, item.error));
                }
                if report.migrated.is_empty() && report.failed.is_empty() {
                    println!("Nothing to migrate");
                }
            })
        }

        Commands::Info { bucket_id } => {
            let info = workspace
                .library()
                .get_bucket_info(&bucket_id)?
                .with_context(|| format!("Bucket not found: {}", bucket_id))?;
            emit(json, &info, || {
                let m = &info.metadata;
                println!("{}", m.id.bold());
                println!("  Name:        {}", m.name);
                println!("  Description: {}", m.description);
                println!("  Owner:       {}", m.owning_project);
                println!("  Projects:    {}", join(m.shared_with.iter()));
                println!("  Created:     {}", m.created_at);
                println!(
                    "  Graph:       {} documents, {} entities, {} relationships",
                    m.stats.document_count, m.stats.entity_count, m.stats.relationship_count
                );
                println!("  Storage:     {} ({:.2} MB)", info.storage.path.display(), info.storage.size_mb);
            })
        }

        Commands::Sync { bucket_id } => {
            let report = workspace.synchronize_bucket(&bucket_id)?;
            emit(json, &report, || {
                ok(&format!("Synchronized {}", bucket_id.bold()));
                println!(
                    "  {} documents, {} entities, {} relationships",
                    report.stats.document_count, report.stats.entity_count, report.stats.relationship_count
                );
            })
        }

        Commands::RemoveImport { bucket_id } => {
            workspace.project().remove_import(&bucket_id)?;
            emit(json, &bucket_id, || ok(&format!("Removed {} from {}", bucket_id, workspace.project_name())))
        }

        Commands::Delete { bucket_id, force } => {
            let metadata = workspace.library().delete_bucket(&bucket_id, force)?;
            emit(json, &metadata, || ok(&format!("Deleted {}", metadata.id.bold())))
        }

        Commands::Activate { bucket } => {
            let changed = workspace.project().activate_bucket(&bucket)?;
            emit(json, &changed, || {
                if changed {
                    ok(&format!("Activated {}", bucket));
                } else {
                    println!("{} already active", bucket);
                }
            })
        }

        Commands::Deactivate { bucket } => {
            let changed = workspace.project().deactivate_bucket(&bucket)?;
            emit(json, &changed, || {
                if changed {
                    ok(&format!("Deactivated {}", bucket));
                } else {
                    println!("{} was not active", bucket);
                }
            })
        }

        Commands::Enqueue { bucket, file } => {
            let bucket_dir = workspace.project().resolve_bucket_path(&bucket)?;
            let content = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .with_context(|| format!("Not a file: {}", file.display()))?;
            let item = knowledge::enqueue(&bucket_dir, &filename, &content)?;
            emit(json, &item, || ok(&format!("Queued {} in {}", item.filename, bucket)))
        }

        Commands::Ingest { bucket, dir, files } => {
            let bucket_dir = workspace.project().resolve_bucket_path(&bucket)?;
            let files = match dir {
                Some(dir) => Some(collect_files(&dir, &settings.ingest.extensions)?),
                None if !files.is_empty() => Some(files),
                None => None,
            };

            let mut tracker = PerformanceTracker::open(settings.analytics_path(), settings.analytics.flush_every)?
                .with_max_events(settings.analytics.max_events);
            let mut ingestor = StagingIngestor;
            let report = batch_process(&bucket_dir, files, &mut ingestor, Some(&mut tracker))?;
            tracker.flush()?;

            emit(json, &report, || {
                for result in &report.results {
                    match &result.error {
                        None => ok(&result.file.display().to_string()),
                        Some(e) => fail(&format!("{}: {}", result.file.display(), e)),
                    }
                }
                println!(
                    "\n{}/{} processed, {} failed",
                    report.processed, report.total_files, report.failed
                );
            })
        }

        Commands::GraphStats { bucket } => {
            let bucket_dir = workspace.project().resolve_bucket_path(&bucket)?;
            let stats = graph_stats(&bucket_dir);
            emit(json, &stats, || {
                println!("{}", bucket.bold());
                println!("  Entities:      {}", stats.entities);
                println!("  Relationships: {}", stats.relationships);
                println!("  Documents:     {}", stats.documents);
            })
        }

        Commands::Report { compare, timeline } => {
            let tracker = PerformanceTracker::open(settings.analytics_path(), settings.analytics.flush_every)?
                .with_max_events(settings.analytics.max_events);
            let sources = workspace
                .project()
                .bucket_dirs()?
                .into_iter()
                .map(|(name, path)| BucketSource::new(name, path))
                .collect();
            let generator = ReportGenerator::new(workspace.project().lightrag_dir(), sources, &tracker);

            let path = if let Some(days) = timeline {
                generator.generate_timeline(days)?
            } else if !compare.is_empty() {
                generator.generate_comparison(&compare)?
            } else {
                generator.generate_comprehensive()?
            };
            emit(json, &path, || ok(&format!("Report written to {}", path.display())))
        }

        Commands::Recover => {
            let recovery = workspace.project().recover_promotion()?;
            emit(json, &recovery, || match &recovery {
                None => println!("No interrupted promotion"),
                Some(Recovery::RolledBack { local_name, bucket_id }) => {
                    ok(&format!("Rolled back promotion of {} ({} discarded)", local_name, bucket_id))
                }
                Some(Recovery::RolledForward { local_name, bucket_id }) => {
                    ok(&format!("Completed promotion of {} as {}", local_name, bucket_id))
                }
                Some(Recovery::Cleared { local_name }) => {
                    ok(&format!("Cleared finished promotion of {}", local_name))
                }
            })
        }
    }
}

/// Print `value` as JSON, or run the human-readable printer
fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce()) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human();
    }
    Ok(())
}

fn ok(message: &str) {
    println!("{} {}", "✓".green(), message);
}

fn fail(message: &str) {
    println!("{} {}", "✗".red(), message);
}

fn join<'a, I: Iterator<Item = &'a String>>(items: I) -> String {
    let joined = items.map(String::as_str).collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "(none)".to_string()
    } else {
        joined
    }
}

fn print_buckets(buckets: &[BucketMetadata]) {
    for bucket in buckets {
        println!(
            "  {:<40} {:<20} {}",
            bucket.id,
            bucket.owning_project,
            bucket.description.dimmed()
        );
    }
}

fn print_listing(listing: &ProjectListing) {
    println!("{} ({})", "Imported".bold(), listing.imported.len());
    for info in &listing.imported {
        println!(
            "  {:<40} {:>8.2} MB  {}",
            info.metadata.id,
            info.storage.size_mb,
            info.metadata.description.dimmed()
        );
    }
    println!("{} ({})", "Local".bold(), listing.local.len());
    for local in &listing.local {
        println!("  {:<40} {}", local.name, local.description.dimmed());
    }
}
