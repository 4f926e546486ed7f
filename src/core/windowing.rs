//! Validated sensor windows.
//!
//! A [`SensorWindow`] can only be produced by the data quality gate, so
//! holding one proves the readings are complete, ordered and dense enough to
//! be encoded.

use crate::records::Reading;
use chrono::{DateTime, Duration, Utc};

/// An ascending, gap-checked sequence of complete readings.
#[derive(Debug, Clone)]
pub struct SensorWindow {
    readings: Vec<Reading>,
}

impl SensorWindow {
    /// Readings must already be complete and sorted ascending.
    pub(crate) fn from_sorted(readings: Vec<Reading>) -> Self {
        debug_assert!(readings
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp));
        Self { readings }
    }

    /// All readings, oldest first.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// The most recent `n` readings, oldest first.
    pub fn recent(&self, n: usize) -> &[Reading] {
        let start = self.readings.len().saturating_sub(n);
        &self.readings[start..]
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Timestamp of the first reading.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.readings.first().map(|r| r.timestamp)
    }

    /// Timestamp of the last reading.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.readings.last().map(|r| r.timestamp)
    }

    /// Time covered by the window.
    pub fn span(&self) -> Duration {
        match (self.start(), self.end()) {
            (Some(start), Some(end)) => end - start,
            _ => Duration::zero(),
        }
    }
}
