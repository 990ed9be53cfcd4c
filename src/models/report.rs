//! Run report structures.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How processing of one source URL ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "message")]
pub enum SourceStatus {
    /// Snapshot filtered and emitted (possibly cut short by the cap)
    Completed,
    /// First page was entirely already seen
    EarlyStopped,
    /// Navigation or snapshot failed
    Failed(String),
    /// The global cap was reached before this URL was visited
    NotReached,
}

/// Counters for one source URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub url: String,
    #[serde(flatten)]
    pub status: SourceStatus,
    pub first_snapshot: usize,
    pub full_snapshot: usize,
    pub skipped_seen: usize,
    pub emitted: usize,
    pub detail_failures: usize,
    pub scroll_rounds: usize,
}

impl SourceReport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: SourceStatus::Completed,
            first_snapshot: 0,
            full_snapshot: 0,
            skipped_seen: 0,
            emitted: 0,
            detail_failures: 0,
            scroll_rounds: 0,
        }
    }
}

/// Summary of a whole crawl run.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub emitted: usize,
    pub cap_reached: bool,
}

impl CrawlReport {
    pub fn start() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            sources: Vec::new(),
            emitted: 0,
            cap_reached: false,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    /// Source URLs that failed outright.
    pub fn failures(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.status, SourceStatus::Failed(_)))
            .count()
    }

    pub fn detail_failures(&self) -> usize {
        self.sources.iter().map(|s| s.detail_failures).sum()
    }
}
