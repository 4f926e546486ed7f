//! Alert persistence and recipient notification.

use crate::anomaly::rules::{AnomalyType, AnomalyVerdict, Severity};
use crate::error::{PushError, StoreError};
use crate::gateway::{token_suffix, Notification, NotificationData, SharedPushGateway};
use crate::store::{AlertStore, RecipientDirectory};
use crate::telemetry::SharedPipelineStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Alert document type for anomaly alerts.
pub const ALERT_TYPE_ANOMALY: &str = "anomaly";

/// Alert extra data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertData {
    pub anomaly_type: AnomalyType,
}

/// A persisted alert. Created unread and unacknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub data: AlertData,
    pub read: bool,
    pub acknowledged: bool,
    pub timestamp: DateTime<Utc>,
}

impl AlertRecord {
    /// Build the alert for an anomalous verdict, `None` otherwise.
    pub fn from_verdict(
        user_id: &str,
        verdict: &AnomalyVerdict,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if !verdict.is_anomalous {
            return None;
        }
        let anomaly_type = verdict.anomaly_type?;
        Some(Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind: ALERT_TYPE_ANOMALY.to_string(),
            severity: verdict.severity.unwrap_or(Severity::Medium),
            title: anomaly_type.title().to_string(),
            message: verdict.description.clone(),
            data: AlertData { anomaly_type },
            read: false,
            acknowledged: false,
            timestamp: now,
        })
    }

    pub fn notification(&self) -> Notification {
        Notification {
            title: self.title.clone(),
            body: self.message.clone(),
            data: NotificationData {
                alert_id: self.id.clone(),
                user_id: self.user_id.clone(),
                kind: self.kind.clone(),
            },
        }
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub alert_id: String,
    pub delivered: usize,
    pub failed: usize,
    pub tokens_removed: usize,
    /// Active recipients without a push token
    pub skipped: usize,
}

/// Persists alerts and pushes them to linked recipients.
pub struct AlertDispatcher {
    alerts: Arc<dyn AlertStore>,
    recipients: Arc<dyn RecipientDirectory>,
    gateway: SharedPushGateway,
    stats: SharedPipelineStats,
}

impl AlertDispatcher {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        recipients: Arc<dyn RecipientDirectory>,
        gateway: SharedPushGateway,
        stats: SharedPipelineStats,
    ) -> Self {
        Self {
            alerts,
            recipients,
            gateway,
            stats,
        }
    }

    /// Persist an alert for `verdict` and notify every recipient with a
    /// token.
    ///
    /// Only failing to persist the alert is an error. Notification failures
    /// are counted in the report and never stop delivery to the remaining
    /// recipients. A non-anomalous verdict does nothing.
    pub async fn dispatch(
        &self,
        user_id: &str,
        verdict: &AnomalyVerdict,
    ) -> Result<Option<DispatchReport>, StoreError> {
        let Some(alert) = AlertRecord::from_verdict(user_id, verdict, Utc::now()) else {
            return Ok(None);
        };

        self.alerts.insert_alert(&alert).await?;
        self.stats.record_anomaly();

        let mut report = DispatchReport {
            alert_id: alert.id.clone(),
            ..DispatchReport::default()
        };

        let recipients = match self.recipients.active_recipients(user_id).await {
            Ok(recipients) => recipients,
            Err(e) => {
                tracing::warn!(user_id, alert_id = %alert.id, "Could not resolve recipients: {e}");
                return Ok(Some(report));
            }
        };

        let notification = alert.notification();
        for recipient in recipients {
            let Some(token) = recipient.push_token.as_deref() else {
                report.skipped += 1;
                continue;
            };

            match self.gateway.send(token, &notification).await {
                Ok(()) => {
                    report.delivered += 1;
                    self.stats.record_notification_delivered();
                }
                Err(PushError::InvalidToken(reason)) => {
                    report.failed += 1;
                    tracing::warn!(
                        recipient_id = %recipient.id,
                        token_suffix = token_suffix(token),
                        "Removing invalid push token: {reason}"
                    );
                    match self.recipients.remove_push_token(&recipient.id).await {
                        Ok(()) => {
                            report.tokens_removed += 1;
                            self.stats.record_token_removed();
                        }
                        Err(e) => tracing::warn!(
                            recipient_id = %recipient.id,
                            "Failed to remove push token: {e}"
                        ),
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(recipient_id = %recipient.id, "Push delivery failed: {e}");
                }
            }
        }

        tracing::info!(
            user_id,
            alert_id = %report.alert_id,
            delivered = report.delivered,
            failed = report.failed,
            tokens_removed = report.tokens_removed,
            "Dispatched anomaly alert"
        );
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::RecordingPushGateway;
    use crate::store::{MemoryStore, Recipient};
    use crate::telemetry::PipelineStats;

    fn recipient(id: &str, token: Option<&str>) -> Recipient {
        Recipient {
            id: id.to_string(),
            name: format!("Carer {id}"),
            push_token: token.map(str::to_string),
            active: true,
        }
    }

    fn inactive_verdict() -> AnomalyVerdict {
        AnomalyVerdict::anomaly(
            AnomalyType::ExtendedInactivity,
            Severity::High,
            "No motion detected",
        )
    }

    fn setup() -> (Arc<MemoryStore>, Arc<RecordingPushGateway>, AlertDispatcher) {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingPushGateway::new());
        let dispatcher = AlertDispatcher::new(
            store.clone(),
            store.clone(),
            gateway.clone(),
            Arc::new(PipelineStats::new()),
        );
        (store, gateway, dispatcher)
    }

    #[tokio::test]
    async fn test_alert_persisted_and_delivered() {
        let (store, gateway, dispatcher) = setup();
        store.add_recipient("u1", recipient("r1", Some("token-1")));
        store.add_recipient("u1", recipient("r2", None));

        let report = dispatcher
            .dispatch("u1", &inactive_verdict())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 1);

        let alerts = store.alerts();
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.kind, "anomaly");
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.title, "No activity detected");
        assert!(!alert.read && !alert.acknowledged);
        assert_eq!(alert.id, report.alert_id);

        let sent = gateway.sent();
        assert_eq!(sent[0].1.data.alert_id, alert.id);
        assert_eq!(sent[0].1.data.user_id, "u1");
    }

    #[tokio::test]
    async fn test_invalid_token_removed_others_delivered() {
        let (store, gateway, dispatcher) = setup();
        store.add_recipient("u1", recipient("r1", Some("stale")));
        store.add_recipient("u1", recipient("r2", Some("flaky")));
        store.add_recipient("u1", recipient("r3", Some("good")));
        gateway.reject_token("stale");
        gateway.fail_token("flaky");

        let report = dispatcher
            .dispatch("u1", &inactive_verdict())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.tokens_removed, 1);

        assert_eq!(store.recipient("r1").unwrap().push_token, None);
        // Transport failures keep the token
        assert_eq!(
            store.recipient("r2").unwrap().push_token.as_deref(),
            Some("flaky")
        );
    }

    #[tokio::test]
    async fn test_normal_verdict_is_noop() {
        let (store, _, dispatcher) = setup();
        let report = dispatcher
            .dispatch("u1", &AnomalyVerdict::normal("fine"))
            .await
            .unwrap();
        assert!(report.is_none());
        assert!(store.alerts().is_empty());
    }

    #[tokio::test]
    async fn test_alert_write_failure_is_error() {
        let (store, gateway, dispatcher) = setup();
        store.add_recipient("u1", recipient("r1", Some("token-1")));
        store.set_fail_writes(true);

        assert!(dispatcher.dispatch("u1", &inactive_verdict()).await.is_err());
        assert!(gateway.sent().is_empty());
    }

    #[test]
    fn test_alert_wire_format() {
        let alert = AlertRecord::from_verdict("u1", &inactive_verdict(), Utc::now()).unwrap();
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "anomaly");
        assert_eq!(json["data"]["anomalyType"], "extended_inactivity");
        assert_eq!(json["read"], false);
        assert_eq!(json["userId"], "u1");
    }
}
