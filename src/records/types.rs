//! Sensor record types read from the record store.
//!
//! Documents arrive loosely typed. They are checked once at the store
//! boundary ([`RawSensorDocument`] → [`SensorRecord`]) so that everything
//! downstream works with well-typed values. Measurement fields stay optional:
//! a missing reading is a data quality problem, not a schema problem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single periodic reading from one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorRecord {
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
    /// Owner of the device
    pub user_id: String,
    /// Reporting device
    pub device_id: String,
    /// Temperature in °C
    pub temperature: Option<f64>,
    /// Relative humidity in %
    pub humidity: Option<f64>,
    /// Whether the PIR sensor fired during the period
    pub motion_detected: Option<bool>,
    /// Fan PWM value (0-255)
    pub fan_speed: Option<u8>,
    /// LED PWM value (0-255)
    pub led_brightness: Option<u8>,
    /// Ultrasonic distance in cm
    pub distance: Option<f64>,
}

impl SensorRecord {
    /// Create a record with no measurements.
    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            user_id: user_id.into(),
            device_id: device_id.into(),
            temperature: None,
            humidity: None,
            motion_detected: None,
            fan_speed: None,
            led_brightness: None,
            distance: None,
        }
    }

    pub fn with_climate(mut self, temperature: f64, humidity: f64) -> Self {
        self.temperature = Some(temperature);
        self.humidity = Some(humidity);
        self
    }

    pub fn with_motion(mut self, motion_detected: bool) -> Self {
        self.motion_detected = Some(motion_detected);
        self
    }

    pub fn with_actuators(mut self, fan_speed: u8, led_brightness: u8) -> Self {
        self.fan_speed = Some(fan_speed);
        self.led_brightness = Some(led_brightness);
        self
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }

    /// Name of the first required measurement that is absent, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.temperature.is_none() {
            Some("temperature")
        } else if self.humidity.is_none() {
            Some("humidity")
        } else if self.motion_detected.is_none() {
            Some("motionDetected")
        } else if self.fan_speed.is_none() {
            Some("fanSpeed")
        } else if self.led_brightness.is_none() {
            Some("ledBrightness")
        } else {
            None
        }
    }

    /// Convert into a [`Reading`] when every required measurement is present.
    pub fn to_reading(&self) -> Option<Reading> {
        Some(Reading {
            timestamp: self.timestamp,
            temperature: self.temperature?,
            humidity: self.humidity?,
            motion_detected: self.motion_detected?,
            fan_speed: self.fan_speed?,
            led_brightness: self.led_brightness?,
            distance: self.distance,
        })
    }
}

/// A record with every required measurement present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub motion_detected: bool,
    pub fan_speed: u8,
    pub led_brightness: u8,
    pub distance: Option<f64>,
}

/// Loosely typed document as written by the device bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSensorDocument {
    pub timestamp: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub motion_detected: Option<bool>,
    pub fan_speed: Option<f64>,
    pub led_brightness: Option<f64>,
    pub distance: Option<f64>,
}

/// Schema violations found at the store boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' is not a finite number")]
    NotFinite { field: &'static str },

    #[error("field '{field}' value {value} is outside 0-255")]
    PwmOutOfRange { field: &'static str, value: f64 },
}

impl TryFrom<RawSensorDocument> for SensorRecord {
    type Error = RecordError;

    fn try_from(doc: RawSensorDocument) -> Result<Self, Self::Error> {
        let timestamp = doc.timestamp.ok_or(RecordError::MissingField("timestamp"))?;
        let user_id = doc
            .user_id
            .filter(|s| !s.is_empty())
            .ok_or(RecordError::MissingField("userId"))?;
        let device_id = doc
            .device_id
            .filter(|s| !s.is_empty())
            .ok_or(RecordError::MissingField("deviceId"))?;

        Ok(Self {
            timestamp,
            user_id,
            device_id,
            temperature: finite("temperature", doc.temperature)?,
            humidity: finite("humidity", doc.humidity)?,
            motion_detected: doc.motion_detected,
            fan_speed: pwm("fanSpeed", doc.fan_speed)?,
            led_brightness: pwm("ledBrightness", doc.led_brightness)?,
            // Distance is advisory; a bad echo is treated as no echo.
            distance: doc.distance.filter(|d| d.is_finite() && *d >= 0.0),
        })
    }
}

fn finite(field: &'static str, value: Option<f64>) -> Result<Option<f64>, RecordError> {
    match value {
        Some(v) if !v.is_finite() => Err(RecordError::NotFinite { field }),
        other => Ok(other),
    }
}

fn pwm(field: &'static str, value: Option<f64>) -> Result<Option<u8>, RecordError> {
    match value {
        None => Ok(None),
        Some(v) if !v.is_finite() => Err(RecordError::NotFinite { field }),
        Some(v) if !(0.0..=255.0).contains(&v) => {
            Err(RecordError::PwmOutOfRange { field, value: v })
        }
        Some(v) => Ok(Some(v.round() as u8)),
    }
}
