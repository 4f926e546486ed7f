//! Data quality gate.
//!
//! The schedule model was trained on dense, well-formed week-long windows.
//! A window that fails any rule here is rejected outright; nothing is
//! interpolated or defaulted.

use crate::core::windowing::SensorWindow;
use crate::error::PredictionError;
use crate::records::{Reading, SensorRecord};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Number of hourly records a prediction window must contain.
pub const REQUIRED_WINDOW: usize = 168;

/// Widest first-to-last span accepted, in days.
pub const MAX_SPAN_DAYS: i64 = 10;

/// Largest gap accepted between consecutive records, in hours.
pub const MAX_GAP_HOURS: i64 = 2;

/// Plausible indoor temperature range in °C.
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 10.0..=45.0;

/// Physical humidity range in %.
pub const HUMIDITY_RANGE: RangeInclusive<f64> = 0.0..=100.0;

/// Share of out-of-range records tolerated as sensor noise.
pub const MAX_OUT_OF_RANGE_FRACTION: f64 = 0.10;

/// Outcome of validating a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Thresholds applied by the gate.
#[derive(Debug, Clone)]
pub struct DataQualityGate {
    pub required_window: usize,
    pub max_span: Duration,
    pub max_gap: Duration,
    pub max_out_of_range_fraction: f64,
}

impl Default for DataQualityGate {
    fn default() -> Self {
        Self {
            required_window: REQUIRED_WINDOW,
            max_span: Duration::days(MAX_SPAN_DAYS),
            max_gap: Duration::hours(MAX_GAP_HOURS),
            max_out_of_range_fraction: MAX_OUT_OF_RANGE_FRACTION,
        }
    }
}

impl DataQualityGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the rules in order; the first failure wins.
    ///
    /// 1. volume
    /// 2. first-to-last span
    /// 3. gaps between consecutive records
    /// 4. share of out-of-range temperature/humidity values
    /// 5. completeness of every record
    pub fn validate(&self, records: &[SensorRecord]) -> ValidationResult {
        if records.len() < self.required_window {
            return ValidationResult::invalid(format!(
                "Insufficient data: {} records available, {} required",
                records.len(),
                self.required_window
            ));
        }

        let mut sorted: Vec<&SensorRecord> = records.iter().collect();
        sorted.sort_by_key(|r| r.timestamp);

        if let (Some(first), Some(last)) = (sorted.first(), sorted.last()) {
            let span = last.timestamp - first.timestamp;
            if span > self.max_span {
                return ValidationResult::invalid(format!(
                    "Data span too wide: {:.1} days exceeds the {} day maximum",
                    hours(span) / 24.0,
                    self.max_span.num_days()
                ));
            }
        }

        for pair in sorted.windows(2) {
            let gap = pair[1].timestamp - pair[0].timestamp;
            if gap > self.max_gap {
                return ValidationResult::invalid(format!(
                    "Data gap of {:.1} hours after {} exceeds the {} hour maximum",
                    hours(gap),
                    pair[0].timestamp.to_rfc3339(),
                    self.max_gap.num_hours()
                ));
            }
        }

        let out_of_range = sorted.iter().filter(|r| is_out_of_range(r)).count();
        let fraction = out_of_range as f64 / sorted.len() as f64;
        if fraction > self.max_out_of_range_fraction {
            return ValidationResult::invalid(format!(
                "Too many out-of-range readings: {} of {} ({:.1}%) exceed the {:.0}% tolerance",
                out_of_range,
                sorted.len(),
                fraction * 100.0,
                self.max_out_of_range_fraction * 100.0
            ));
        }

        for record in &sorted {
            if let Some(field) = record.missing_field() {
                return ValidationResult::invalid(format!(
                    "Incomplete record at {}: missing {}",
                    record.timestamp.to_rfc3339(),
                    field
                ));
            }
        }

        ValidationResult::ok()
    }

    /// Validate and, on success, produce the typed window for encoding.
    pub fn admit(&self, records: &[SensorRecord]) -> Result<SensorWindow, PredictionError> {
        let result = self.validate(records);
        if !result.valid {
            let reason = result
                .reason
                .unwrap_or_else(|| "Sensor history failed validation".to_string());
            return Err(PredictionError::FailedPrecondition(reason));
        }

        let mut readings: Vec<Reading> = records.iter().filter_map(|r| r.to_reading()).collect();
        readings.sort_by_key(|r| r.timestamp);
        Ok(SensorWindow::from_sorted(readings))
    }
}

/// Validate with the default thresholds.
pub fn validate(records: &[SensorRecord]) -> ValidationResult {
    DataQualityGate::default().validate(records)
}

fn is_out_of_range(record: &SensorRecord) -> bool {
    let temperature_bad = record
        .temperature
        .is_some_and(|t| !TEMPERATURE_RANGE.contains(&t));
    let humidity_bad = record
        .humidity
        .is_some_and(|h| !HUMIDITY_RANGE.contains(&h));
    temperature_bad || humidity_bad
}

fn hours(d: Duration) -> f64 {
    d.num_seconds() as f64 / 3600.0
}
