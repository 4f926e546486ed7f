//! Sensor records consumed by the pipeline.
//!
//! Records are owned by the external record store; this crate only reads
//! them. See [`types`] for the store-boundary schema checks.

pub mod types;

pub use types::{RawSensorDocument, Reading, RecordError, SensorRecord};
