//! Schedule prediction.

pub mod service;
pub mod suggestion;

pub use service::{ScheduleInferenceService, DEFAULT_INFERENCE_TIMEOUT};
pub use suggestion::{
    suggestions_from_output, to_percentage, DeviceType, ScheduleSuggestion, StoredPrediction,
    SuggestionMode,
};
