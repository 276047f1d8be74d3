//! Analytics: performance tracking and reports

pub mod report;
pub mod tracker;

pub use report::{
    BucketAnalysis, BucketSource, ComparisonMetrics, ComparisonReport, ComprehensiveReport,
    ReportGenerator, SystemMetrics, TimelineReport, REPORTS_DIR,
};
pub use tracker::{
    AnalyticsSummary, BucketPerformance, DailyUsage, Event, PerformanceTracker, UsageTrends,
    ANALYTICS_FILE, DEFAULT_FLUSH_EVERY, DEFAULT_MAX_EVENTS, MAX_TREND_DAYS,
};
