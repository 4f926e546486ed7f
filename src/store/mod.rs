//! Document store seams.
//!
//! The pipeline reads sensor records and writes predictions and alerts
//! through these traits. [`memory::MemoryStore`] implements all of them.

pub mod memory;

use crate::anomaly::AlertRecord;
use crate::error::StoreError;
use crate::inference::StoredPrediction;
use crate::records::SensorRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::{MemoryStore, StoreSnapshot};

/// Read-only access to the append-only sensor log.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records for `user_id` with `timestamp >= cutoff`, ascending, keeping
    /// at most the `limit` most recent.
    async fn records_since(
        &self,
        user_id: &str,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SensorRecord>, StoreError>;
}

/// Append-only prediction history.
#[async_trait]
pub trait SuggestionStore: Send + Sync {
    async fn append_predictions(&self, predictions: &[StoredPrediction])
        -> Result<(), StoreError>;
}

/// Alert persistence.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert_alert(&self, alert: &AlertRecord) -> Result<(), StoreError>;
}

/// Someone notified about a monitored user's alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub push_token: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Links monitored users to their alert recipients.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Active recipients linked to `user_id`.
    async fn active_recipients(&self, user_id: &str) -> Result<Vec<Recipient>, StoreError>;

    /// Clear a push token the gateway no longer accepts.
    async fn remove_push_token(&self, recipient_id: &str) -> Result<(), StoreError>;
}

/// Source of users for the scheduled scan.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn active_users(&self, limit: usize) -> Result<Vec<String>, StoreError>;
}
