/**
 * tracker.rs
 * Query and processing performance tracker (analytics.json)
 *
 * Events are kept in memory and written back to disk every `flush_every`
 * events, on an explicit flush, and when the tracker is dropped. The
 * event log is capped (oldest first out); per-bucket counters keep
 * counting past the cap.
 */

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::drivers::{read_json_opt, write_json_atomic};
use crate::errors::Result;

/// Default analytics file name inside a working directory
pub const ANALYTICS_FILE: &str = "analytics.json";

pub const DEFAULT_FLUSH_EVERY: usize = 20;
pub const DEFAULT_MAX_EVENTS: usize = 5000;

/// Longest window `usage_trends` reports on
pub const MAX_TREND_DAYS: u32 = 3650;

/// Entries returned in `recent_activity`
const RECENT_ACTIVITY: usize = 10;

/// A single tracked operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Query {
        bucket: String,
        mode: String,
        duration_secs: f64,
        success: bool,
        timestamp: DateTime<Utc>,
    },
    Processing {
        bucket: String,
        item: String,
        duration_secs: f64,
        bytes: u64,
        success: bool,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn bucket(&self) -> &str {
        match self {
            Event::Query { bucket, .. } | Event::Processing { bucket, .. } => bucket,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Query { timestamp, .. } | Event::Processing { timestamp, .. } => *timestamp,
        }
    }
}

/// Running totals for one bucket
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BucketCounters {
    pub total_queries: u64,
    pub failed_queries: u64,
    pub total_query_time: f64,
    #[serde(default)]
    pub query_modes: BTreeMap<String, u64>,
    pub total_processed: u64,
    pub failed_processing: u64,
    pub total_processing_time: f64,
    pub bytes_processed: u64,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
}

impl BucketCounters {
    fn apply(&mut self, event: &Event) {
        match event {
            Event::Query { mode, duration_secs, success, timestamp, .. } => {
                self.total_queries += 1;
                self.total_query_time += duration_secs;
                if !success {
                    self.failed_queries += 1;
                }
                *self.query_modes.entry(mode.clone()).or_insert(0) += 1;
                self.touch(*timestamp);
            }
            Event::Processing { duration_secs, bytes, success, timestamp, .. } => {
                self.total_processed += 1;
                self.total_processing_time += duration_secs;
                self.bytes_processed += bytes;
                if !success {
                    self.failed_processing += 1;
                }
                self.touch(*timestamp);
            }
        }
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        if self.last_activity.map_or(true, |last| at > last) {
            self.last_activity = Some(at);
        }
    }
}

/// On-disk form of the tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnalyticsData {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    buckets: BTreeMap<String, BucketCounters>,
    #[serde(default)]
    events: VecDeque<Event>,
}

impl AnalyticsData {
    fn new() -> Self {
        let now = Utc::now();
        AnalyticsData {
            created_at: now,
            updated_at: now,
            buckets: BTreeMap::new(),
            events: VecDeque::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Overview {
    pub total_queries: u64,
    pub total_documents_processed: u64,
    pub buckets_tracked: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSummary {
    pub avg_query_time: f64,
    pub avg_processing_time: f64,
    pub failed_queries: u64,
    pub failed_processing: u64,
    pub most_used_bucket: Option<String>,
    pub most_used_query_mode: Option<String>,
}

/// Tracker-wide summary (comprehensive analytics)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub overview: Overview,
    pub performance_summary: PerformanceSummary,
    pub recent_activity: Vec<Event>,
}

/// Per-bucket performance figures
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BucketPerformance {
    pub total_queries: u64,
    pub avg_query_time: f64,
    pub total_processed: u64,
    pub avg_processing_time: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub queries: u64,
    pub processed: u64,
}

/// Day-by-day activity of a bucket, oldest day first
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageTrends {
    pub bucket: String,
    pub days: u32,
    pub daily: Vec<DailyUsage>,
    pub total_activity: u64,
}

fn average(total: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

/// Performance tracker backed by a JSON file
#[derive(Debug)]
pub struct PerformanceTracker {
    path: PathBuf,
    data: AnalyticsData,
    flush_every: usize,
    max_events: usize,
    unflushed: usize,
}

impl PerformanceTracker {
    /// Open the tracker at `path`, loading existing analytics if present
    pub fn open<P: AsRef<Path>>(path: P, flush_every: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match read_json_opt::<AnalyticsData>(&path)? {
            Some(data) => {
                debug!(path = %path.display(), events = data.events.len(), "loaded analytics");
                data
            }
            None => AnalyticsData::new(),
        };

        Ok(PerformanceTracker {
            path,
            data,
            flush_every: flush_every.max(1),
            max_events: DEFAULT_MAX_EVENTS,
            unflushed: 0,
        })
    }

    /// Cap the in-memory and on-disk event log
    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events.max(1);
        self.trim_events();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Events not yet written to disk
    pub fn unflushed(&self) -> usize {
        self.unflushed
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.data.events.iter()
    }

    /// Names of every bucket with recorded activity
    pub fn tracked_buckets(&self) -> Vec<String> {
        self.data.buckets.keys().cloned().collect()
    }

    pub fn record_query(&mut self, bucket: &str, mode: &str, duration: Duration, success: bool) -> Result<()> {
        self.record(Event::Query {
            bucket: bucket.to_string(),
            mode: mode.to_string(),
            duration_secs: duration.as_secs_f64(),
            success,
            timestamp: Utc::now(),
        })
    }

    pub fn record_processing(
        &mut self,
        bucket: &str,
        item: &str,
        duration: Duration,
        bytes: u64,
        success: bool,
    ) -> Result<()> {
        self.record(Event::Processing {
            bucket: bucket.to_string(),
            item: item.to_string(),
            duration_secs: duration.as_secs_f64(),
            bytes,
            success,
            timestamp: Utc::now(),
        })
    }

    /// Record an event, flushing once `flush_every` events are pending
    pub fn record(&mut self, event: Event) -> Result<()> {
        self.data
            .buckets
            .entry(event.bucket().to_string())
            .or_default()
            .apply(&event);
        self.data.events.push_back(event);
        self.trim_events();

        self.unflushed += 1;
        if self.unflushed >= self.flush_every {
            self.flush()?;
        }
        Ok(())
    }

    fn trim_events(&mut self) {
        while self.data.events.len() > self.max_events {
            self.data.events.pop_front();
        }
    }

    /// Write analytics to disk
    pub fn flush(&mut self) -> Result<()> {
        self.data.updated_at = Utc::now();
        write_json_atomic(&self.path, &self.data)?;
        debug!(path = %self.path.display(), events = self.unflushed, "flushed analytics");
        self.unflushed = 0;
        Ok(())
    }

    pub fn summary(&self) -> AnalyticsSummary {
        let buckets = &self.data.buckets;

        let total_queries: u64 = buckets.values().map(|c| c.total_queries).sum();
        let total_processed: u64 = buckets.values().map(|c| c.total_processed).sum();
        let query_time: f64 = buckets.values().map(|c| c.total_query_time).sum();
        let processing_time: f64 = buckets.values().map(|c| c.total_processing_time).sum();

        let most_used_bucket = buckets
            .iter()
            .filter(|(_, c)| c.total_queries > 0)
            .max_by_key(|(_, c)| c.total_queries)
            .map(|(name, _)| name.clone());

        let mut modes: BTreeMap<&str, u64> = BTreeMap::new();
        for counters in buckets.values() {
            for (mode, count) in &counters.query_modes {
                *modes.entry(mode.as_str()).or_insert(0) += count;
            }
        }
        let most_used_query_mode = modes
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(mode, _)| mode.to_string());

        let skip = self.data.events.len().saturating_sub(RECENT_ACTIVITY);

        AnalyticsSummary {
            overview: Overview {
                total_queries,
                total_documents_processed: total_processed,
                buckets_tracked: buckets.len(),
            },
            performance_summary: PerformanceSummary {
                avg_query_time: average(query_time, total_queries),
                avg_processing_time: average(processing_time, total_processed),
                failed_queries: buckets.values().map(|c| c.failed_queries).sum(),
                failed_processing: buckets.values().map(|c| c.failed_processing).sum(),
                most_used_bucket,
                most_used_query_mode,
            },
            recent_activity: self.data.events.iter().skip(skip).cloned().collect(),
        }
    }

    /// Figures for one bucket (zeros when it was never used)
    pub fn bucket_performance(&self, bucket: &str) -> BucketPerformance {
        match self.data.buckets.get(bucket) {
            Some(c) => BucketPerformance {
                total_queries: c.total_queries,
                avg_query_time: average(c.total_query_time, c.total_queries),
                total_processed: c.total_processed,
                avg_processing_time: average(c.total_processing_time, c.total_processed),
                last_activity: c.last_activity,
            },
            None => BucketPerformance::default(),
        }
    }

    /// Activity per day over the last `days` days, today included
    ///
    /// `days` is clamped to `1..=MAX_TREND_DAYS`.
    pub fn usage_trends(&self, bucket: &str, days: u32) -> UsageTrends {
        let days = days.clamp(1, MAX_TREND_DAYS);
        let today = Utc::now().date_naive();
        let first_day = today - ChronoDuration::days(i64::from(days) - 1);

        let mut daily: Vec<DailyUsage> = (0..days)
            .map(|offset| DailyUsage {
                date: first_day + ChronoDuration::days(i64::from(offset)),
                queries: 0,
                processed: 0,
            })
            .collect();

        for event in self.data.events.iter().filter(|e| e.bucket() == bucket) {
            let day = event.timestamp().date_naive();
            if day < first_day || day > today {
                continue;
            }
            let index = (day - first_day).num_days() as usize;
            match event {
                Event::Query { .. } => daily[index].queries += 1,
                Event::Processing { .. } => daily[index].processed += 1,
            }
        }

        let total_activity = daily.iter().map(|d| d.queries + d.processed).sum();
        UsageTrends {
            bucket: bucket.to_string(),
            days,
            daily,
            total_activity,
        }
    }
}

impl Drop for PerformanceTracker {
    fn drop(&mut self) {
        if self.unflushed > 0 {
            if let Err(e) = self.flush() {
                warn!(path = %self.path.display(), error = %e, "failed to flush analytics on drop");
            }
        }
    }
}
