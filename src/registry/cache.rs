//! Time-bounded cache shared by the model and scaler registries.
//!
//! Entries are published whole: a loaded value is wrapped in an `Arc` and
//! swapped into the map under a short write lock, so readers see either the
//! previous value or the new one. Concurrent misses may load twice; the last
//! writer wins.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic expiry.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Thread-safe shared clock.
pub type SharedClock = Arc<dyn Clock>;

/// A loaded value and when it was loaded.
#[derive(Debug)]
pub struct CachedResource<T: ?Sized> {
    pub value: Arc<T>,
    pub loaded_at: DateTime<Utc>,
}

impl<T: ?Sized> Clone for CachedResource<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            loaded_at: self.loaded_at,
        }
    }
}

impl<T: ?Sized> CachedResource<T> {
    /// Fresh while `now - loaded_at <= ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.loaded_at <= ttl
    }
}

/// Name-keyed cache with a single TTL.
pub struct RegistryCache<T: ?Sized> {
    entries: RwLock<HashMap<String, CachedResource<T>>>,
    ttl: Duration,
    clock: SharedClock,
}

impl<T: ?Sized> RegistryCache<T> {
    pub fn new(ttl: std::time::Duration, clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(365 * 100)),
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The cached value if it has not expired.
    pub fn get_fresh(&self, name: &str) -> Option<Arc<T>> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(name)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Replace the entry for `name`, stamped with the current time.
    pub fn publish(&self, name: &str, value: Arc<T>) {
        let entry = CachedResource {
            value,
            loaded_at: self.clock.now(),
        };
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(name.to_string(), entry);
    }

    /// Return the fresh value or run `load` and publish its result.
    ///
    /// Nothing is published when `load` fails; a stale entry stays in place
    /// but is not returned.
    pub async fn get_or_load<F, Fut, E>(&self, name: &str, load: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>, E>>,
    {
        if let Some(value) = self.get_fresh(name) {
            return Ok(value);
        }

        let value = load().await?;
        self.publish(name, Arc::clone(&value));
        Ok(value)
    }

    /// Drop the entry for `name`.
    pub fn invalidate(&self, name: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(name);
    }

    /// Snapshot of an entry, fresh or not.
    pub fn entry(&self, name: &str) -> Option<CachedResource<T>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
