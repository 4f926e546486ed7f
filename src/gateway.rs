//! Push notification gateway.
//!
//! Alerts reach recipients through a [`PushGateway`]. The HTTP client posts
//! one message per device token to a configured relay endpoint and tells
//! unregistered tokens apart from transient failures, so the dispatcher can
//! prune the former.

use crate::error::PushError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Notification payload sent to a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: NotificationData,
}

/// Data block attached to every alert notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub alert_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Delivers notifications to device tokens.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, token: &str, notification: &Notification) -> Result<(), PushError>;
}

/// Thread-safe shared gateway.
pub type SharedPushGateway = Arc<dyn PushGateway>;

/// Gateway that only logs, used when no endpoint is configured.
#[derive(Debug, Default)]
pub struct LogPushGateway;

#[async_trait]
impl PushGateway for LogPushGateway {
    async fn send(&self, token: &str, notification: &Notification) -> Result<(), PushError> {
        tracing::info!(
            alert_id = %notification.data.alert_id,
            token_suffix = token_suffix(token),
            "Push (log only): {}",
            notification.title
        );
        Ok(())
    }
}

/// Gateway that records what it was asked to send and can be told to
/// reject specific tokens.
#[derive(Debug, Default)]
pub struct RecordingPushGateway {
    sent: Mutex<Vec<(String, Notification)>>,
    invalid: Mutex<Vec<String>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingPushGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `token` as unregistered.
    pub fn reject_token(&self, token: impl Into<String>) {
        lock(&self.invalid).push(token.into());
    }

    /// Fail deliveries to `token` with a transport error.
    pub fn fail_token(&self, token: impl Into<String>) {
        lock(&self.failing).push(token.into());
    }

    pub fn sent(&self) -> Vec<(String, Notification)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl PushGateway for RecordingPushGateway {
    async fn send(&self, token: &str, notification: &Notification) -> Result<(), PushError> {
        if lock(&self.invalid).iter().any(|t| t == token) {
            return Err(PushError::InvalidToken(token_suffix(token).to_string()));
        }
        if lock(&self.failing).iter().any(|t| t == token) {
            return Err(PushError::Transport("connection reset".to_string()));
        }
        lock(&self.sent).push((token.to_string(), notification.clone()));
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Last few characters of a token, safe to log.
pub fn token_suffix(token: &str) -> &str {
    let start = token
        .char_indices()
        .rev()
        .nth(5)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &token[start..]
}

/// Error codes a relay uses for tokens that will never be deliverable.
const UNREGISTERED_CODES: &[&str] = &[
    "DeviceNotRegistered",
    "NotRegistered",
    "InvalidRegistration",
    "registration-token-not-registered",
    "invalid-registration-token",
];

/// Relay error body.
#[derive(Debug, Deserialize)]
struct RelayError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Map a relay failure to a [`PushError`].
///
/// 404 and 410 always mean the token is gone; otherwise the body's error
/// code decides.
pub fn classify_failure(status: u16, body: &str) -> PushError {
    if status == 404 || status == 410 {
        return PushError::InvalidToken(format!("relay returned {status}"));
    }

    let code = serde_json::from_str::<RelayError>(body)
        .ok()
        .and_then(|e| e.code.or(e.error));
    match code {
        Some(code) if UNREGISTERED_CODES.contains(&code.as_str()) => PushError::InvalidToken(code),
        Some(code) => PushError::Transport(format!("relay returned {status}: {code}")),
        None => PushError::Transport(format!("relay returned {status}")),
    }
}

/// Push relay configuration.
#[cfg(feature = "gateway")]
#[derive(Debug, Clone)]
pub struct HttpPushConfig {
    /// Relay endpoint accepting `POST` of one message
    pub endpoint: String,
    /// Bearer key, when the relay requires one
    pub api_key: Option<String>,
    pub timeout: std::time::Duration,
}

#[cfg(feature = "gateway")]
impl HttpPushConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout: std::time::Duration::from_secs(10),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Message body posted to the relay.
#[cfg(feature = "gateway")]
#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// Push gateway backed by an HTTP relay.
#[cfg(feature = "gateway")]
pub struct HttpPushGateway {
    config: HttpPushConfig,
    client: reqwest::Client,
}

#[cfg(feature = "gateway")]
impl HttpPushGateway {
    pub fn new(config: HttpPushConfig) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PushError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[cfg(feature = "gateway")]
#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn send(&self, token: &str, notification: &Notification) -> Result<(), PushError> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&RelayMessage {
                to: token,
                notification,
            });
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status.as_u16(), &body))
    }
}

/// Gateway for the configured push section: HTTP when an endpoint is set and
/// the `gateway` feature is enabled, log-only otherwise.
pub fn from_config(config: &crate::config::PushConfig) -> Result<SharedPushGateway, PushError> {
    #[cfg(feature = "gateway")]
    {
        if let Some(endpoint) = &config.endpoint {
            let mut http = HttpPushConfig::new(endpoint.clone());
            if let Some(key) = &config.api_key {
                http = http.with_api_key(key.clone());
            }
            return Ok(Arc::new(HttpPushGateway::new(http)?));
        }
    }

    if config.endpoint.is_some() {
        tracing::warn!("Push endpoint configured but the gateway feature is disabled; logging only");
    }
    Ok(Arc::new(LogPushGateway))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> Notification {
        Notification {
            title: "No activity detected".to_string(),
            body: "No motion".to_string(),
            data: NotificationData {
                alert_id: "a1".to_string(),
                user_id: "u1".to_string(),
                kind: "anomaly".to_string(),
            },
        }
    }

    #[test]
    fn test_classify_failure() {
        assert!(classify_failure(410, "").is_invalid_token());
        assert!(classify_failure(404, "").is_invalid_token());
        assert!(classify_failure(400, r#"{"error":"DeviceNotRegistered"}"#).is_invalid_token());
        assert!(classify_failure(400, r#"{"code":"invalid-registration-token"}"#)
            .is_invalid_token());
        assert!(!classify_failure(500, "oops").is_invalid_token());
        assert!(!classify_failure(429, r#"{"error":"RateLimited"}"#).is_invalid_token());
    }

    #[test]
    fn test_token_suffix() {
        assert_eq!(token_suffix("abcdefghij"), "efghij");
        assert_eq!(token_suffix("abc"), "abc");
    }

    #[test]
    fn test_notification_wire_format() {
        let json = serde_json::to_value(notification()).unwrap();
        assert_eq!(json["data"]["alertId"], "a1");
        assert_eq!(json["data"]["userId"], "u1");
        assert_eq!(json["data"]["type"], "anomaly");
    }

    #[tokio::test]
    async fn test_recording_gateway() {
        let gateway = RecordingPushGateway::new();
        gateway.reject_token("bad");
        gateway.fail_token("flaky");

        assert!(gateway.send("good", &notification()).await.is_ok());
        assert!(gateway
            .send("bad", &notification())
            .await
            .unwrap_err()
            .is_invalid_token());
        assert!(matches!(
            gateway.send("flaky", &notification()).await,
            Err(PushError::Transport(_))
        ));
        assert_eq!(gateway.sent().len(), 1);
    }

    #[test]
    fn test_from_config_without_endpoint_logs() {
        let config = crate::config::PushConfig::default();
        assert!(from_config(&config).is_ok());
    }
}
