//! Core preprocessing for the schedule model.
//!
//! This module contains:
//! - The data quality gate that admits or rejects a sensor history
//! - Validated sensor windows
//! - Feature encoding and normalization
//! - Tracked tensors with deterministic release

pub mod features;
pub mod quality;
pub mod tensor;
pub mod windowing;

// Re-export commonly used types
pub use features::{
    denormalize, feature_vector, normalize, FeatureBuilder, FeatureVector, FEATURE_COUNT,
    FEATURE_NAMES,
};
pub use quality::{validate, DataQualityGate, ValidationResult, REQUIRED_WINDOW};
pub use tensor::{SharedTensorTracker, ShapeError, Tensor, TensorTracker};
pub use windowing::SensorWindow;
