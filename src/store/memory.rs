//! In-memory document store with JSON snapshot persistence.
//!
//! Sensor documents are kept in their raw form and checked against the
//! record schema on every read, the same way a remote document store would
//! be read. Malformed documents are skipped with a warning.

use crate::anomaly::AlertRecord;
use crate::error::StoreError;
use crate::inference::StoredPrediction;
use crate::records::{RawSensorDocument, SensorRecord};
use crate::store::{
    AlertStore, Recipient, RecipientDirectory, RecordStore, SuggestionStore, UserDirectory,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Everything the store holds, in its persisted form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub records: Vec<RawSensorDocument>,
    /// Users eligible for scans; derived from records when empty
    #[serde(default)]
    pub users: Vec<String>,
    /// Recipients keyed by monitored user
    #[serde(default)]
    pub recipients: HashMap<String, Vec<Recipient>>,
    #[serde(default)]
    pub predictions: Vec<StoredPrediction>,
    #[serde(default)]
    pub alerts: Vec<AlertRecord>,
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<StoreSnapshot>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            data: RwLock::new(snapshot),
            ..Self::default()
        }
    }

    /// Load a snapshot file; a missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", path.display())))?;
        let snapshot: StoreSnapshot = serde_json::from_str(&content)
            .map_err(|e| StoreError::Malformed(format!("{}: {e}", path.display())))?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current contents to a snapshot file.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Write(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| StoreError::Write(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| StoreError::Write(e.to_string()))
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.read().clone()
    }

    /// Append sensor records as written by the device bridge.
    pub fn insert_records(&self, records: impl IntoIterator<Item = SensorRecord>) {
        let mut data = self.write();
        data.records.extend(records.into_iter().map(|r| RawSensorDocument {
            timestamp: Some(r.timestamp),
            user_id: Some(r.user_id),
            device_id: Some(r.device_id),
            temperature: r.temperature,
            humidity: r.humidity,
            motion_detected: r.motion_detected,
            fan_speed: r.fan_speed.map(f64::from),
            led_brightness: r.led_brightness.map(f64::from),
            distance: r.distance,
        }));
    }

    pub fn insert_raw(&self, doc: RawSensorDocument) {
        self.write().records.push(doc);
    }

    pub fn add_user(&self, user_id: impl Into<String>) {
        self.write().users.push(user_id.into());
    }

    pub fn add_recipient(&self, user_id: impl Into<String>, recipient: Recipient) {
        self.write()
            .recipients
            .entry(user_id.into())
            .or_default()
            .push(recipient);
    }

    pub fn predictions(&self) -> Vec<StoredPrediction> {
        self.read().predictions.clone()
    }

    pub fn alerts(&self) -> Vec<AlertRecord> {
        self.read().alerts.clone()
    }

    /// Look up a recipient by id across all users.
    pub fn recipient(&self, recipient_id: &str) -> Option<Recipient> {
        self.read()
            .recipients
            .values()
            .flatten()
            .find(|r| r.id == recipient_id)
            .cloned()
    }

    /// Make every write fail, to exercise error paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every read fail, to exercise error paths.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write("store is read-only".to_string()));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreSnapshot> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreSnapshot> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn records_since(
        &self,
        user_id: &str,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SensorRecord>, StoreError> {
        self.check_read()?;

        let mut records: Vec<SensorRecord> = {
            let data = self.read();
            data.records
                .iter()
                .filter(|doc| doc.user_id.as_deref() == Some(user_id))
                .filter_map(|doc| match SensorRecord::try_from(doc.clone()) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!(user_id, "Skipping malformed sensor document: {e}");
                        None
                    }
                })
                .filter(|record| record.timestamp >= cutoff)
                .collect()
        };

        records.sort_by_key(|r| r.timestamp);
        let excess = records.len().saturating_sub(limit);
        records.drain(..excess);
        Ok(records)
    }
}

#[async_trait]
impl SuggestionStore for MemoryStore {
    async fn append_predictions(
        &self,
        predictions: &[StoredPrediction],
    ) -> Result<(), StoreError> {
        self.check_write()?;
        self.write().predictions.extend_from_slice(predictions);
        Ok(())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn insert_alert(&self, alert: &AlertRecord) -> Result<(), StoreError> {
        self.check_write()?;
        self.write().alerts.push(alert.clone());
        Ok(())
    }
}

#[async_trait]
impl RecipientDirectory for MemoryStore {
    async fn active_recipients(&self, user_id: &str) -> Result<Vec<Recipient>, StoreError> {
        self.check_read()?;
        Ok(self
            .read()
            .recipients
            .get(user_id)
            .map(|list| list.iter().filter(|r| r.active).cloned().collect())
            .unwrap_or_default())
    }

    async fn remove_push_token(&self, recipient_id: &str) -> Result<(), StoreError> {
        self.check_write()?;
        let mut data = self.write();
        for recipient in data.recipients.values_mut().flatten() {
            if recipient.id == recipient_id {
                recipient.push_token = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn active_users(&self, limit: usize) -> Result<Vec<String>, StoreError> {
        self.check_read()?;
        let data = self.read();
        let users: Vec<String> = if data.users.is_empty() {
            data.records
                .iter()
                .filter_map(|doc| doc.user_id.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        } else {
            data.users.clone()
        };
        Ok(users.into_iter().take(limit).collect())
    }
}
