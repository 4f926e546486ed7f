//! Schedule suggestions produced from model output.
//!
//! Suggestions are never enabled on creation; an occupant has to opt in.

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Confidence attached to fan suggestions.
pub const FAN_CONFIDENCE: f64 = 0.85;

/// Confidence attached to LED suggestions.
pub const LED_CONFIDENCE: f64 = 0.82;

/// Tag stored with every persisted schedule prediction.
pub const PREDICTION_TYPE_SCHEDULE: &str = "schedule";

/// Actuator a suggestion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Fan,
    Led,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Fan => "fan",
            DeviceType::Led => "led",
        }
    }
}

/// How a schedule came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionMode {
    Suggested,
}

/// A not-yet-active schedule recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSuggestion {
    pub name: String,
    pub device_type: DeviceType,
    /// Target level in percent (0-100)
    pub value: u8,
    /// Local hour (0-23)
    pub hour: u32,
    pub minute: u32,
    /// Weekday indices, Monday = 0
    pub days: Vec<u8>,
    pub enabled: bool,
    pub mode: SuggestionMode,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// A suggestion as persisted in the prediction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPrediction {
    pub id: String,
    pub user_id: String,
    pub prediction_type: String,
    pub model_version: String,
    pub suggestion: ScheduleSuggestion,
    pub created_at: DateTime<Utc>,
}

impl StoredPrediction {
    pub fn schedule(
        user_id: impl Into<String>,
        model_version: impl Into<String>,
        suggestion: ScheduleSuggestion,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            prediction_type: PREDICTION_TYPE_SCHEDULE.to_string(),
            model_version: model_version.into(),
            created_at: suggestion.created_at,
            suggestion,
        }
    }
}

/// Scale a `[0, 1]` fraction to a whole percentage, clamped to `[0, 100]`.
pub fn to_percentage(fraction: f32) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Start of the next full local hour after `now`.
pub fn next_hour_boundary(now: DateTime<Utc>, tz: &Tz) -> DateTime<Tz> {
    let local = now.with_timezone(tz);
    let truncated = local
        - Duration::minutes(local.minute() as i64)
        - Duration::seconds(local.second() as i64)
        - Duration::nanoseconds(local.nanosecond() as i64);
    truncated + Duration::hours(1)
}

/// Turn `[fan_fraction, led_fraction]` into the two suggestions.
pub fn suggestions_from_output(
    output: &[f32],
    now: DateTime<Utc>,
    tz: &Tz,
) -> Result<Vec<ScheduleSuggestion>, String> {
    let [fan, led] = match output {
        [fan, led, ..] => [*fan, *led],
        _ => {
            return Err(format!(
                "model produced {} outputs, expected 2",
                output.len()
            ))
        }
    };

    let target = next_hour_boundary(now, tz);
    let hour = target.hour();
    let every_day: Vec<u8> = (0..7).collect();

    let make = |device_type: DeviceType, fraction: f32, confidence: f64| {
        let label = match device_type {
            DeviceType::Fan => "Fan",
            DeviceType::Led => "Lights",
        };
        ScheduleSuggestion {
            name: format!("Suggested {label} {hour:02}:00"),
            device_type,
            value: to_percentage(fraction),
            hour,
            minute: 0,
            days: every_day.clone(),
            enabled: false,
            mode: SuggestionMode::Suggested,
            confidence,
            created_at: now,
        }
    };

    Ok(vec![
        make(DeviceType::Fan, fan, FAN_CONFIDENCE),
        make(DeviceType::Led, led, LED_CONFIDENCE),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_percentage_clamps() {
        assert_eq!(to_percentage(0.0), 0);
        assert_eq!(to_percentage(0.504), 50);
        assert_eq!(to_percentage(0.506), 51);
        assert_eq!(to_percentage(1.0), 100);
        assert_eq!(to_percentage(1.7), 100);
        assert_eq!(to_percentage(-0.2), 0);
        assert_eq!(to_percentage(f32::NAN), 0);
    }

    #[test]
    fn test_next_hour_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 14, 37, 12).unwrap();
        let next = next_hour_boundary(now, &chrono_tz::UTC);
        assert_eq!(next.hour(), 15);
        assert_eq!(next.minute(), 0);
        assert_eq!(next.second(), 0);

        let on_the_hour = Utc.with_ymd_and_hms(2024, 3, 4, 23, 0, 0).unwrap();
        assert_eq!(next_hour_boundary(on_the_hour, &chrono_tz::UTC).hour(), 0);
    }

    #[test]
    fn test_boundary_in_half_hour_zone() {
        // 14:37 UTC is 20:07 in Kolkata (+05:30)
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 14, 37, 0).unwrap();
        let next = next_hour_boundary(now, &chrono_tz::Asia::Kolkata);
        assert_eq!(next.hour(), 21);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn test_two_disabled_suggestions() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 8, 15, 0).unwrap();
        let suggestions = suggestions_from_output(&[0.42, 0.9], now, &chrono_tz::UTC).unwrap();

        assert_eq!(suggestions.len(), 2);
        let fan = &suggestions[0];
        assert_eq!(fan.device_type, DeviceType::Fan);
        assert_eq!(fan.value, 42);
        assert_eq!(fan.hour, 9);
        assert_eq!(fan.days, vec![0, 1, 2, 3, 4, 5, 6]);
        assert!(!fan.enabled);
        assert_eq!(fan.mode, SuggestionMode::Suggested);
        assert_eq!(fan.confidence, FAN_CONFIDENCE);

        let led = &suggestions[1];
        assert_eq!(led.device_type, DeviceType::Led);
        assert_eq!(led.value, 90);
        assert_eq!(led.confidence, LED_CONFIDENCE);
    }

    #[test]
    fn test_short_output_rejected() {
        assert!(suggestions_from_output(&[0.5], Utc::now(), &chrono_tz::UTC).is_err());
    }

    #[test]
    fn test_wire_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 8, 15, 0).unwrap();
        let suggestion = suggestions_from_output(&[0.1, 0.2], now, &chrono_tz::UTC)
            .unwrap()
            .remove(0);
        let stored = StoredPrediction::schedule("u1", "v1", suggestion);
        let json = serde_json::to_value(&stored).unwrap();

        assert_eq!(json["predictionType"], "schedule");
        assert_eq!(json["suggestion"]["deviceType"], "fan");
        assert_eq!(json["suggestion"]["mode"], "suggested");
        assert_eq!(json["suggestion"]["enabled"], false);
    }
}
