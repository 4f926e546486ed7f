//! Heuristic anomaly rules over a 24-hour window.
//!
//! Rules are checked in priority order and the first match wins, so a user
//! who is both inactive and in an extreme temperature is reported as
//! inactive. No trained model is involved.

use crate::core::features::is_night_hour;
use crate::records::SensorRecord;
use chrono::Timelike;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::ops::RangeInclusive;

/// Minimum records in the window before any rule is applied.
pub const MIN_SCAN_RECORDS: usize = 24;

/// Comfortable mean temperature range in °C.
pub const COMFORT_RANGE: RangeInclusive<f64> = 18.0..=30.0;

/// Night motion share above which activity is flagged.
pub const NIGHT_ACTIVITY_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    ExtendedInactivity,
    TemperatureExtreme,
    ExcessiveNightActivity,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::ExtendedInactivity => "extended_inactivity",
            AnomalyType::TemperatureExtreme => "temperature_extreme",
            AnomalyType::ExcessiveNightActivity => "excessive_night_activity",
        }
    }

    /// Short human-readable title for alerts.
    pub fn title(&self) -> &'static str {
        match self {
            AnomalyType::ExtendedInactivity => "No activity detected",
            AnomalyType::TemperatureExtreme => "Unusual room temperature",
            AnomalyType::ExcessiveNightActivity => "Restless night detected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Result of scanning one user's window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyVerdict {
    pub is_anomalous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_type: Option<AnomalyType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub description: String,
}

impl AnomalyVerdict {
    pub fn normal(description: impl Into<String>) -> Self {
        Self {
            is_anomalous: false,
            anomaly_type: None,
            severity: None,
            description: description.into(),
        }
    }

    pub fn anomaly(
        anomaly_type: AnomalyType,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            is_anomalous: true,
            anomaly_type: Some(anomaly_type),
            severity: Some(severity),
            description: description.into(),
        }
    }
}

/// Apply the rules to a window of records.
///
/// Records without a motion flag count as no motion. Records without a
/// temperature are left out of the mean.
pub fn evaluate(records: &[SensorRecord], tz: &Tz) -> AnomalyVerdict {
    if records.len() < MIN_SCAN_RECORDS {
        return AnomalyVerdict::normal(format!(
            "Insufficient data: {} records in the last 24 hours",
            records.len()
        ));
    }

    let moved = |r: &SensorRecord| r.motion_detected.unwrap_or(false);

    let motion_events = records.iter().filter(|r| moved(r)).count();
    if motion_events == 0 {
        return AnomalyVerdict::anomaly(
            AnomalyType::ExtendedInactivity,
            Severity::High,
            format!(
                "No motion detected in {} readings over the last 24 hours",
                records.len()
            ),
        );
    }

    let temperatures: Vec<f64> = records.iter().filter_map(|r| r.temperature).collect();
    if !temperatures.is_empty() {
        let mean = temperatures.iter().mean();
        if !COMFORT_RANGE.contains(&mean) {
            return AnomalyVerdict::anomaly(
                AnomalyType::TemperatureExtreme,
                Severity::Medium,
                format!(
                    "Average temperature {:.1}°C is outside the {:.0}-{:.0}°C comfort range",
                    mean,
                    COMFORT_RANGE.start(),
                    COMFORT_RANGE.end()
                ),
            );
        }
    }

    let night: Vec<&SensorRecord> = records
        .iter()
        .filter(|r| is_night_hour(r.timestamp.with_timezone(tz).hour()))
        .collect();
    if !night.is_empty() {
        let night_motion = night.iter().filter(|r| moved(r)).count();
        let share = night_motion as f64 / night.len() as f64;
        if share > NIGHT_ACTIVITY_THRESHOLD {
            return AnomalyVerdict::anomaly(
                AnomalyType::ExcessiveNightActivity,
                Severity::Medium,
                format!(
                    "Motion in {} of {} night readings ({:.0}%)",
                    night_motion,
                    night.len(),
                    share * 100.0
                ),
            );
        }
    }

    AnomalyVerdict::normal("No anomalies detected")
}
