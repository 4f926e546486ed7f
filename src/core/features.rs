//! Feature encoding for the schedule model.
//!
//! Each reading becomes a fixed-order vector of 13 values that mirrors the
//! column order the scaler was fitted on. Time-of-day and day-of-week are
//! encoded cyclically so that 23:00 sits next to 00:00 and Sunday next to
//! Monday.

use crate::core::tensor::{SharedTensorTracker, ShapeError, Tensor};
use crate::core::windowing::SensorWindow;
use crate::core::quality::REQUIRED_WINDOW;
use crate::records::Reading;
use crate::registry::ScalerParams;
use chrono::{Datelike, Timelike};
use chrono_tz::Tz;
use std::f64::consts::PI;

/// Number of features per time step.
pub const FEATURE_COUNT: usize = 13;

/// Column names in encoding order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "temperature_mean",
    "temperature_max",
    "temperature_min",
    "humidity_mean",
    "motionDetected_sum",
    "distance_mean",
    "hour_sin",
    "hour_cos",
    "day_sin",
    "day_cos",
    "is_weekend",
    "is_night",
    "manual_actions",
];

/// Distance used when the ultrasonic sensor reported nothing (cm).
pub const DEFAULT_DISTANCE_CM: f64 = 200.0;

/// One encoded time step.
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Encode a single reading. `tz` decides the local hour and weekday.
pub fn feature_vector(reading: &Reading, tz: &Tz) -> FeatureVector {
    let local = reading.timestamp.with_timezone(tz);
    let hour = local.hour();
    let weekday = local.weekday().num_days_from_monday();

    let hour_angle = 2.0 * PI * hour as f64 / 24.0;
    let day_angle = 2.0 * PI * weekday as f64 / 7.0;

    [
        // Hourly aggregates collapse to the single reading
        reading.temperature,
        reading.temperature,
        reading.temperature,
        reading.humidity,
        flag(reading.motion_detected),
        reading.distance.unwrap_or(DEFAULT_DISTANCE_CM),
        hour_angle.sin(),
        hour_angle.cos(),
        day_angle.sin(),
        day_angle.cos(),
        flag(weekday >= 5),
        flag(is_night_hour(hour)),
        // Reserved for manual override counts
        0.0,
    ]
}

/// Night covers 22:00 through 06:59.
pub fn is_night_hour(hour: u32) -> bool {
    hour >= 22 || hour <= 6
}

/// Standard-score each feature with the training statistics.
pub fn normalize(raw: &FeatureVector, scaler: &ScalerParams) -> FeatureVector {
    let mut out = [0.0; FEATURE_COUNT];
    for (i, value) in raw.iter().enumerate() {
        out[i] = (value - scaler.mean[i]) / scaler.scale[i];
    }
    out
}

/// Inverse of [`normalize`].
pub fn denormalize(normalized: &FeatureVector, scaler: &ScalerParams) -> FeatureVector {
    let mut out = [0.0; FEATURE_COUNT];
    for (i, value) in normalized.iter().enumerate() {
        out[i] = value * scaler.scale[i] + scaler.mean[i];
    }
    out
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Builds `[1, window, 13]` model inputs from validated windows.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    tz: Tz,
    window: usize,
    tracker: SharedTensorTracker,
}

impl FeatureBuilder {
    pub fn new(tz: Tz, tracker: SharedTensorTracker) -> Self {
        Self {
            tz,
            window: REQUIRED_WINDOW,
            tracker,
        }
    }

    /// Input shape produced by [`FeatureBuilder::build`].
    pub fn input_shape(&self) -> [usize; 3] {
        [1, self.window, FEATURE_COUNT]
    }

    /// Encode the most recent readings of `window` into a tracked tensor.
    ///
    /// The window must already have passed the data quality gate. Only the
    /// last `REQUIRED_WINDOW` readings are used, so the shape never varies.
    pub fn build(&self, window: &SensorWindow, scaler: &ScalerParams) -> Result<Tensor, ShapeError> {
        if window.len() < self.window {
            return Err(ShapeError {
                expected: self.input_shape().to_vec(),
                actual: vec![1, window.len(), FEATURE_COUNT],
            });
        }

        let mut data = Vec::with_capacity(self.window * FEATURE_COUNT);
        for reading in window.recent(self.window) {
            let normalized = normalize(&feature_vector(reading, &self.tz), scaler);
            data.extend(normalized.iter().map(|&v| v as f32));
        }

        Tensor::from_vec(&self.input_shape(), data, &self.tracker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quality::DataQualityGate;
    use crate::core::tensor::TensorTracker;
    use crate::records::SensorRecord;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn reading_at(timestamp: DateTime<Utc>) -> Reading {
        Reading {
            timestamp,
            temperature: 23.5,
            humidity: 51.0,
            motion_detected: true,
            fan_speed: 200,
            led_brightness: 10,
            distance: None,
        }
    }

    fn identity_scaler() -> ScalerParams {
        ScalerParams::new(vec![0.0; FEATURE_COUNT], vec![1.0; FEATURE_COUNT]).unwrap()
    }

    #[test]
    fn test_feature_order() {
        // Saturday 2024-03-09 23:00 UTC
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 23, 0, 0).unwrap();
        let v = feature_vector(&reading_at(ts), &chrono_tz::UTC);

        assert_eq!(&v[0..4], &[23.5, 23.5, 23.5, 51.0]);
        assert_eq!(v[4], 1.0);
        assert_eq!(v[5], DEFAULT_DISTANCE_CM);
        assert!((v[6] - (2.0 * PI * 23.0 / 24.0).sin()).abs() < 1e-12);
        assert!((v[7] - (2.0 * PI * 23.0 / 24.0).cos()).abs() < 1e-12);
        assert!((v[8] - (2.0 * PI * 5.0 / 7.0).sin()).abs() < 1e-12);
        assert_eq!(v[10], 1.0);
        assert_eq!(v[11], 1.0);
        assert_eq!(v[12], 0.0);
    }

    #[test]
    fn test_time_zone_shifts_hour_and_day() {
        // Monday 03:00 UTC is Sunday evening in Los Angeles
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 3, 0, 0).unwrap();
        let utc = feature_vector(&reading_at(ts), &chrono_tz::UTC);
        let la = feature_vector(&reading_at(ts), &chrono_tz::America::Los_Angeles);

        assert_eq!(utc[10], 0.0);
        assert_eq!(utc[11], 1.0);
        assert_eq!(la[10], 1.0);
        assert_eq!(la[11], 0.0);
    }

    #[test]
    fn test_night_boundaries() {
        assert!(is_night_hour(22));
        assert!(is_night_hour(0));
        assert!(is_night_hour(6));
        assert!(!is_night_hour(7));
        assert!(!is_night_hour(21));
    }

    #[test]
    fn test_distance_passthrough() {
        let mut reading = reading_at(Utc::now());
        reading.distance = Some(35.0);
        assert_eq!(feature_vector(&reading, &chrono_tz::UTC)[5], 35.0);
    }

    #[test]
    fn test_build_shape_uses_latest_readings() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let records: Vec<SensorRecord> = (0..200)
            .map(|i| {
                SensorRecord::new("u", "d", start + Duration::hours(i))
                    .with_climate(i as f64 / 10.0 + 15.0, 40.0)
                    .with_motion(false)
                    .with_actuators(0, 0)
            })
            .collect();
        let window = DataQualityGate::default().admit(&records).unwrap();

        let tracker = Arc::new(TensorTracker::new());
        let builder = FeatureBuilder::new(chrono_tz::UTC, Arc::clone(&tracker));
        let tensor = builder.build(&window, &identity_scaler()).unwrap();

        assert_eq!(tensor.shape(), &[1, 168, 13]);
        // First step is record 32 (200 - 168)
        assert!((tensor.data()[0] - 18.2).abs() < 1e-5);
        assert_eq!(tracker.live(), 1);
        drop(tensor);
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn test_normalization_applied() {
        let mut mean = vec![0.0; FEATURE_COUNT];
        let mut scale = vec![1.0; FEATURE_COUNT];
        mean[0] = 20.0;
        scale[0] = 2.0;
        let scaler = ScalerParams::new(mean, scale).unwrap();

        let v = feature_vector(&reading_at(Utc::now()), &chrono_tz::UTC);
        let n = normalize(&v, &scaler);
        assert!((n[0] - 1.75).abs() < 1e-12);
        assert_eq!(n[3], v[3]);
    }

    proptest! {
        #[test]
        fn prop_normalize_round_trip(
            raw in prop::array::uniform13(-1000.0f64..1000.0),
            mean in prop::collection::vec(-100.0f64..100.0, FEATURE_COUNT),
            scale in prop::collection::vec(0.01f64..100.0, FEATURE_COUNT),
        ) {
            let scaler = ScalerParams::new(mean, scale).unwrap();
            let back = denormalize(&normalize(&raw, &scaler), &scaler);
            for (a, b) in raw.iter().zip(back.iter()) {
                prop_assert!((a - b).abs() <= 1e-9 * a.abs().max(1.0));
            }
        }
    }
}
