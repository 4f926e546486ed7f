//! Pipeline counters.
//!
//! Counts outcomes only. No user identifiers or sensor values are kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running totals for the prediction and scan pipelines.
#[derive(Debug)]
pub struct PipelineStats {
    /// Predictions returned to callers
    predictions_served: AtomicU64,
    /// Requests rejected by the data quality gate
    precondition_rejections: AtomicU64,
    /// Requests that failed with an internal error
    internal_failures: AtomicU64,
    users_scanned: AtomicU64,
    anomalies_raised: AtomicU64,
    notifications_delivered: AtomicU64,
    tokens_removed: AtomicU64,
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            predictions_served: AtomicU64::new(0),
            precondition_rejections: AtomicU64::new(0),
            internal_failures: AtomicU64::new(0),
            users_scanned: AtomicU64::new(0),
            anomalies_raised: AtomicU64::new(0),
            notifications_delivered: AtomicU64::new(0),
            tokens_removed: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that resume from, and save to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous pipeline stats: {e}");
        }

        stats
    }

    pub fn record_prediction_served(&self) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_precondition_rejection(&self) {
        self.precondition_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_internal_failure(&self) {
        self.internal_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_users_scanned(&self, count: u64) {
        self.users_scanned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_anomaly(&self) {
        self.anomalies_raised.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification_delivered(&self) {
        self.notifications_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_token_removed(&self) {
        self.tokens_removed.fetch_add(1, Ordering::Relaxed);
    }

    /// Current totals.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            predictions_served: self.predictions_served.load(Ordering::Relaxed),
            precondition_rejections: self.precondition_rejections.load(Ordering::Relaxed),
            internal_failures: self.internal_failures.load(Ordering::Relaxed),
            users_scanned: self.users_scanned.load(Ordering::Relaxed),
            anomalies_raised: self.anomalies_raised.load(Ordering::Relaxed),
            notifications_delivered: self.notifications_delivered.load(Ordering::Relaxed),
            tokens_removed: self.tokens_removed.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Pipeline Statistics:\n\
             - Predictions served: {}\n\
             - Precondition rejections: {}\n\
             - Internal failures: {}\n\
             - Users scanned: {}\n\
             - Anomalies raised: {}\n\
             - Notifications delivered: {}\n\
             - Push tokens removed: {}\n\
             - Uptime: {} seconds",
            s.predictions_served,
            s.precondition_rejections,
            s.internal_failures,
            s.users_scanned,
            s.anomalies_raised,
            s.notifications_delivered,
            s.tokens_removed,
            s.uptime_secs
        )
    }

    /// Save totals to disk when persistence is enabled.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let s = self.snapshot();
        let persisted = PersistedStats {
            predictions_served: s.predictions_served,
            precondition_rejections: s.precondition_rejections,
            internal_failures: s.internal_failures,
            users_scanned: s.users_scanned,
            anomalies_raised: s.anomalies_raised,
            notifications_delivered: s.notifications_delivered,
            tokens_removed: s.tokens_removed,
            last_updated: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        let p: PersistedStats = serde_json::from_str(&content).map_err(std::io::Error::other)?;

        self.predictions_served
            .store(p.predictions_served, Ordering::Relaxed);
        self.precondition_rejections
            .store(p.precondition_rejections, Ordering::Relaxed);
        self.internal_failures
            .store(p.internal_failures, Ordering::Relaxed);
        self.users_scanned.store(p.users_scanned, Ordering::Relaxed);
        self.anomalies_raised
            .store(p.anomalies_raised, Ordering::Relaxed);
        self.notifications_delivered
            .store(p.notifications_delivered, Ordering::Relaxed);
        self.tokens_removed.store(p.tokens_removed, Ordering::Relaxed);
        Ok(())
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub predictions_served: u64,
    pub precondition_rejections: u64,
    pub internal_failures: u64,
    pub users_scanned: u64,
    pub anomalies_raised: u64,
    pub notifications_delivered: u64,
    pub tokens_removed: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    predictions_served: u64,
    precondition_rejections: u64,
    internal_failures: u64,
    users_scanned: u64,
    anomalies_raised: u64,
    notifications_delivered: u64,
    tokens_removed: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared stats.
pub type SharedPipelineStats = Arc<PipelineStats>;

pub fn create_shared_stats() -> SharedPipelineStats {
    Arc::new(PipelineStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedPipelineStats {
    Arc::new(PipelineStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = PipelineStats::new();
        stats.record_prediction_served();
        stats.record_prediction_served();
        stats.record_precondition_rejection();
        stats.record_users_scanned(7);

        let s = stats.snapshot();
        assert_eq!(s.predictions_served, 2);
        assert_eq!(s.precondition_rejections, 1);
        assert_eq!(s.users_scanned, 7);
        assert_eq!(s.anomalies_raised, 0);
    }

    #[test]
    fn test_summary_format() {
        let summary = PipelineStats::new().summary();
        assert!(summary.contains("Predictions served"));
        assert!(summary.contains("Push tokens removed"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");

        let stats = PipelineStats::with_persistence(path.clone());
        stats.record_anomaly();
        stats.record_token_removed();
        stats.save().unwrap();

        let resumed = PipelineStats::with_persistence(path.clone());
        assert_eq!(resumed.snapshot().anomalies_raised, 1);
        assert_eq!(resumed.snapshot().tokens_removed, 1);
    }
}
