/**
 * report.rs
 * Analytics reports written as JSON into <dir>/_reports/
 *
 * - comprehensive: tracker summary, per-bucket analysis, recommendations
 * - comparison: density metrics and advice for selected buckets
 * - timeline: per-bucket usage over N days
 */

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::System;
use tracing::info;

use super::tracker::{
    AnalyticsSummary, BucketPerformance, PerformanceTracker, UsageTrends, MAX_TREND_DAYS,
};
use crate::drivers::{bytes_to_mb, dir_size, write_json_atomic};
use crate::errors::Result;
use crate::knowledge::{graph_stats, GraphStats};
use crate::library::validate_bucket_id;

/// Subdirectory receiving generated reports
pub const REPORTS_DIR: &str = "_reports";

pub const REPORT_VERSION: &str = "1.0";

/// Trend window used in per-bucket analysis
pub const ANALYSIS_TREND_DAYS: u32 = 30;

const SLOW_QUERY_SECS: f64 = 2.0;
const STORAGE_WARNING_MB: f64 = 1000.0;
const UNDERUSED_QUERY_COUNT: u64 = 10;
const SMALL_GRAPH_ENTITIES: u64 = 50;
const LOW_RELATIONSHIP_RATIO: f64 = 0.5;

/// A bucket directory to report on
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSource {
    pub name: String,
    pub path: PathBuf,
}

impl BucketSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        BucketSource {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub cpu_count: usize,
    pub total_memory_mb: f64,
    pub used_memory_mb: f64,
    pub process_memory_mb: Option<f64>,
}

impl SystemMetrics {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_processes(sysinfo::ProcessesToUpdate::All);

        let process_memory_mb = sys
            .process(sysinfo::Pid::from_u32(std::process::id()))
            .map(|p| bytes_to_mb(p.memory()));

        SystemMetrics {
            hostname: System::host_name(),
            os: System::long_os_version(),
            cpu_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            total_memory_mb: bytes_to_mb(sys.total_memory()),
            used_memory_mb: bytes_to_mb(sys.used_memory()),
            process_memory_mb,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub generated_at: String,
    pub report_version: String,
    pub system: SystemMetrics,
    pub report_period: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketAnalysis {
    #[serde(flatten)]
    pub graph: GraphStats,
    pub performance: BucketPerformance,
    pub storage_size_mb: f64,
    pub trends: UsageTrends,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComprehensiveReport {
    pub report_metadata: ReportMetadata,
    #[serde(flatten)]
    pub analytics: AnalyticsSummary,
    pub bucket_analysis: BTreeMap<String, BucketAnalysis>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonMetadata {
    pub generated_at: String,
    pub buckets_compared: Vec<String>,
    pub comparison_type: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ComparisonMetrics {
    pub entity_relationship_ratio: f64,
    pub density_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub report_metadata: ComparisonMetadata,
    pub buckets: BTreeMap<String, BucketAnalysis>,
    pub comparison_metrics: BTreeMap<String, ComparisonMetrics>,
    pub recommendations: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineMetadata {
    pub generated_at: String,
    pub timeline_period_days: u32,
    pub report_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceInsights {
    pub most_active_bucket: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineReport {
    pub report_metadata: TimelineMetadata,
    pub bucket_trends: BTreeMap<String, UsageTrends>,
    pub performance_insights: PerformanceInsights,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn report_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Builds reports over a set of buckets and a tracker
pub struct ReportGenerator<'a> {
    report_dir: PathBuf,
    buckets: Vec<BucketSource>,
    tracker: &'a PerformanceTracker,
}

impl<'a> ReportGenerator<'a> {
    /// Reports go to `<base_dir>/_reports`, created on demand
    pub fn new(base_dir: &Path, buckets: Vec<BucketSource>, tracker: &'a PerformanceTracker) -> Self {
        ReportGenerator {
            report_dir: base_dir.join(REPORTS_DIR),
            buckets,
            tracker,
        }
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    fn analyze(&self, source: &BucketSource) -> BucketAnalysis {
        let resolved = fs::canonicalize(&source.path).unwrap_or_else(|_| source.path.clone());
        BucketAnalysis {
            graph: graph_stats(&resolved),
            performance: self.tracker.bucket_performance(&source.name),
            storage_size_mb: bytes_to_mb(dir_size(&resolved)),
            trends: self.tracker.usage_trends(&source.name, ANALYSIS_TREND_DAYS),
        }
    }

    fn write<T: Serialize>(&self, file_name: String, report: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.report_dir)?;
        let path = self.report_dir.join(file_name);
        write_json_atomic(&path, report)?;
        info!(report = %path.display(), "wrote analytics report");
        Ok(path)
    }

    pub fn build_comprehensive(&self) -> ComprehensiveReport {
        let analytics = self.tracker.summary();
        let bucket_analysis: BTreeMap<String, BucketAnalysis> = self
            .buckets
            .iter()
            .map(|source| (source.name.clone(), self.analyze(source)))
            .collect();
        let recommendations = recommendations(&analytics, &bucket_analysis);

        ComprehensiveReport {
            report_metadata: ReportMetadata {
                generated_at: Utc::now().to_rfc3339(),
                report_version: REPORT_VERSION.to_string(),
                system: SystemMetrics::collect(),
                report_period: "All time".to_string(),
            },
            analytics,
            bucket_analysis,
            recommendations,
        }
    }

    pub fn generate_comprehensive(&self) -> Result<PathBuf> {
        let report = self.build_comprehensive();
        self.write(format!("lizzy_comprehensive_report_{}.json", report_timestamp()), &report)
    }

    /// Compare the named buckets; names not in the generator are ignored
    pub fn build_comparison(&self, names: &[String]) -> ComparisonReport {
        let buckets: BTreeMap<String, BucketAnalysis> = self
            .buckets
            .iter()
            .filter(|source| names.contains(&source.name))
            .map(|source| (source.name.clone(), self.analyze(source)))
            .collect();

        ComparisonReport {
            report_metadata: ComparisonMetadata {
                generated_at: Utc::now().to_rfc3339(),
                buckets_compared: names.to_vec(),
                comparison_type: "detailed".to_string(),
            },
            comparison_metrics: comparison_metrics(&buckets),
            recommendations: bucket_recommendations(&buckets),
            buckets,
        }
    }

    /// Write a comparison report; every name must be a valid bucket name or id
    pub fn generate_comparison(&self, names: &[String]) -> Result<PathBuf> {
        for name in names {
            validate_bucket_id(name)?;
        }
        let report = self.build_comparison(names);
        self.write(
            format!("bucket_comparison_{}_{}.json", names.join("-"), report_timestamp()),
            &report,
        )
    }

    pub fn build_timeline(&self, days: u32) -> TimelineReport {
        let days = days.clamp(1, MAX_TREND_DAYS);
        let bucket_trends: BTreeMap<String, UsageTrends> = self
            .buckets
            .iter()
            .map(|source| (source.name.clone(), self.tracker.usage_trends(&source.name, days)))
            .collect();

        // First bucket with the highest activity wins ties
        let mut most_active: Option<(&String, u64)> = None;
        for (name, trends) in &bucket_trends {
            if most_active.map_or(true, |(_, best)| trends.total_activity > best) {
                most_active = Some((name, trends.total_activity));
            }
        }

        TimelineReport {
            report_metadata: TimelineMetadata {
                generated_at: Utc::now().to_rfc3339(),
                timeline_period_days: days,
                report_type: "performance_timeline".to_string(),
            },
            performance_insights: PerformanceInsights {
                most_active_bucket: most_active.map(|(name, _)| name.clone()),
            },
            bucket_trends,
        }
    }

    pub fn generate_timeline(&self, days: u32) -> Result<PathBuf> {
        let report = self.build_timeline(days);
        let days = report.report_metadata.timeline_period_days;
        self.write(format!("performance_timeline_{}d_{}.json", days, report_timestamp()), &report)
    }
}

/// System-wide advice for the comprehensive report
pub fn recommendations(
    analytics: &AnalyticsSummary,
    bucket_analysis: &BTreeMap<String, BucketAnalysis>,
) -> Vec<String> {
    let mut out = Vec::new();

    if analytics.performance_summary.avg_query_time > SLOW_QUERY_SECS {
        out.push("Consider optimizing query performance: average response time is above 2 seconds".to_string());
    }

    let total_storage: f64 = bucket_analysis.values().map(|b| b.storage_size_mb).sum();
    if total_storage > STORAGE_WARNING_MB {
        out.push("Monitor storage usage: total size exceeds 1GB".to_string());
    }

    let empty: Vec<&str> = bucket_analysis
        .iter()
        .filter(|(_, b)| b.graph.entities == 0)
        .map(|(name, _)| name.as_str())
        .collect();
    if !empty.is_empty() {
        out.push(format!("Consider populating empty buckets: {}", empty.join(", ")));
    }

    if analytics.overview.total_queries < UNDERUSED_QUERY_COUNT {
        out.push("System appears underutilized: consider increasing query activity".to_string());
    }

    out
}

/// Ratio and density for every bucket that has entities
pub fn comparison_metrics(buckets: &BTreeMap<String, BucketAnalysis>) -> BTreeMap<String, ComparisonMetrics> {
    buckets
        .iter()
        .filter(|(_, b)| b.graph.entities > 0)
        .map(|(name, b)| {
            let entities = b.graph.entities as f64;
            let relationships = b.graph.relationships as f64;
            let documents = b.graph.documents.max(1) as f64;
            (
                name.clone(),
                ComparisonMetrics {
                    entity_relationship_ratio: round2(relationships / entities),
                    density_score: round2((entities + relationships) / documents),
                },
            )
        })
        .collect()
}

/// Advice for each compared bucket
pub fn bucket_recommendations(buckets: &BTreeMap<String, BucketAnalysis>) -> BTreeMap<String, Vec<String>> {
    buckets
        .iter()
        .map(|(name, b)| {
            let mut recs = Vec::new();
            let entities = b.graph.entities;
            let relationships = b.graph.relationships;

            if entities == 0 {
                recs.push("Add documents to build knowledge graph".to_string());
            } else if entities < SMALL_GRAPH_ENTITIES {
                recs.push("Consider adding more content for richer knowledge graph".to_string());
            }

            if relationships > 0 && entities > 0 {
                let ratio = relationships as f64 / entities as f64;
                if ratio < LOW_RELATIONSHIP_RATIO {
                    recs.push(
                        "Low relationship density: consider documents with more interconnected concepts"
                            .to_string(),
                    );
                }
            }

            if b.performance.total_queries == 0 {
                recs.push("Bucket has not been queried: consider testing with sample queries".to_string());
            }

            (name.clone(), recs)
        })
        .collect()
}
