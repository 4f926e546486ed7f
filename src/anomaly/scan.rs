//! Scheduled anomaly scan over active users.

use crate::anomaly::dispatch::{AlertDispatcher, DispatchReport};
use crate::anomaly::rules::{evaluate, AnomalyVerdict};
use crate::config::AnomalyConfig;
use crate::error::{ScanError, StoreError};
use crate::store::{RecordStore, UserDirectory};
use crate::telemetry::SharedPipelineStats;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Length of the window each user is scanned over.
pub const SCAN_WINDOW_HOURS: i64 = 24;

/// The scan window is bounded by time only; every reading in it counts.
const SCAN_RECORD_LIMIT: usize = usize::MAX;

/// An anomalous user found during a run.
#[derive(Debug, Clone, Serialize)]
pub struct UserAnomaly {
    pub user_id: String,
    pub verdict: AnomalyVerdict,
    pub dispatch: Option<DispatchReport>,
}

/// Summary of one scan run.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub users_scanned: usize,
    pub anomalies: Vec<UserAnomaly>,
    pub failures: usize,
}

/// Scans users for anomalies and dispatches alerts for the ones it finds.
pub struct AnomalyScanService {
    records: Arc<dyn RecordStore>,
    users: Arc<dyn UserDirectory>,
    dispatcher: Arc<AlertDispatcher>,
    tz: Tz,
    config: AnomalyConfig,
    stats: SharedPipelineStats,
}

impl AnomalyScanService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        users: Arc<dyn UserDirectory>,
        dispatcher: Arc<AlertDispatcher>,
        tz: Tz,
        config: AnomalyConfig,
        stats: SharedPipelineStats,
    ) -> Self {
        Self {
            records,
            users,
            dispatcher,
            tz,
            config,
            stats,
        }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Evaluate the last 24 hours of `user_id`'s records.
    pub async fn scan_user(&self, user_id: &str) -> Result<AnomalyVerdict, ScanError> {
        let cutoff = Utc::now() - Duration::hours(SCAN_WINDOW_HOURS);
        let records = self
            .records
            .records_since(user_id, cutoff, SCAN_RECORD_LIMIT)
            .await
            .map_err(|source| ScanError::Records {
                user_id: user_id.to_string(),
                source,
            })?;

        Ok(evaluate(&records, &self.tz))
    }

    /// Scan one user and dispatch an alert if the verdict is anomalous.
    async fn process_user(&self, user_id: &str) -> Result<Option<UserAnomaly>, ScanError> {
        let verdict = self.scan_user(user_id).await?;
        if !verdict.is_anomalous {
            tracing::debug!(user_id, "{}", verdict.description);
            return Ok(None);
        }

        tracing::warn!(
            user_id,
            anomaly_type = verdict.anomaly_type.map(|t| t.as_str()),
            "{}",
            verdict.description
        );
        let dispatch = self
            .dispatcher
            .dispatch(user_id, &verdict)
            .await
            .map_err(|source| ScanError::Alert {
                user_id: user_id.to_string(),
                source,
            })?;

        Ok(Some(UserAnomaly {
            user_id: user_id.to_string(),
            verdict,
            dispatch,
        }))
    }

    /// Scan up to `max_users_per_run` active users with at most
    /// `concurrency` scans in flight.
    ///
    /// A failure for one user is logged and counted without affecting the
    /// others. Only failing to list users fails the run.
    pub async fn run_scan(self: &Arc<Self>) -> Result<ScanReport, StoreError> {
        let started_at = Utc::now();
        let users = self.users.active_users(self.config.max_users_per_run).await?;
        tracing::info!(users = users.len(), "Starting anomaly scan");

        let mut report = ScanReport {
            started_at,
            finished_at: started_at,
            users_scanned: 0,
            anomalies: Vec::new(),
            failures: 0,
        };

        let concurrency = self.config.concurrency.max(1);
        let mut pending = users.into_iter();
        let mut tasks = JoinSet::new();
        loop {
            while tasks.len() < concurrency {
                let Some(user_id) = pending.next() else {
                    break;
                };
                let service = Arc::clone(self);
                tasks.spawn(async move {
                    let outcome = service.process_user(&user_id).await;
                    (user_id, outcome)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            match joined {
                Ok((_, Ok(anomaly))) => {
                    report.users_scanned += 1;
                    report.anomalies.extend(anomaly);
                }
                Ok((user_id, Err(e))) => {
                    report.failures += 1;
                    tracing::warn!(user_id = %user_id, "Anomaly scan failed: {e}");
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::error!("Anomaly scan task panicked: {e}");
                }
            }
        }

        report.anomalies.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        report.finished_at = Utc::now();
        self.stats.record_users_scanned(report.users_scanned as u64);

        tracing::info!(
            users_scanned = report.users_scanned,
            anomalies = report.anomalies.len(),
            failures = report.failures,
            "Anomaly scan complete"
        );
        Ok(report)
    }
}
