//! SmartSync inference core: schedule prediction and anomaly alerting for a
//! home-monitoring system.
//!
//! Sensor records from room devices are read from the record store. Two
//! pipelines run over them:
//!
//! - **Schedule inference** (request-triggered): a week of hourly readings is
//!   checked by the data quality gate, encoded into a `[1, 168, 13]` tensor,
//!   scored by the deployed sequence model, and turned into disabled fan and
//!   light schedule suggestions.
//! - **Anomaly scan** (timer-triggered): the last day of readings for each
//!   active user is checked against inactivity, temperature and night
//!   activity rules; anomalies become alerts pushed to linked recipients.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │ RecordStore │──▶│ Quality Gate│──▶│  Features   │──┐          │
//! │  └─────────────┘   └─────────────┘   └─────────────┘  │          │
//! │         │                                             ▼          │
//! │         │          ┌─────────────┐   ┌─────────────────────┐     │
//! │         │          │  Registries │──▶│ Inference Service   │     │
//! │         │          │ (TTL cache) │   │ → Suggestions       │     │
//! │         │          └─────────────┘   └─────────────────────┘     │
//! │         ▼                                                        │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │ Anomaly Scan│──▶│ Dispatcher  │──▶│ PushGateway │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use smartsync_inference::{Config, Pipeline};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let pipeline = Pipeline::from_config(Config::load()?)?;
//! let suggestions = pipeline.inference.predict("user-123").await?;
//! println!("{} suggestions", suggestions.len());
//! # Ok(())
//! # }
//! ```

pub mod anomaly;
pub mod config;
pub mod core;
pub mod error;
pub mod gateway;
pub mod inference;
pub mod pipeline;
pub mod records;
pub mod registry;
pub mod store;
pub mod telemetry;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use anomaly::{AlertDispatcher, AnomalyScanService, AnomalyVerdict, ScanReport};
pub use config::Config;
pub use core::{DataQualityGate, FeatureBuilder, SensorWindow, ValidationResult};
pub use error::{PredictionError, PushError, RegistryError, ScanError, StoreError};
pub use gateway::{Notification, PushGateway};
pub use inference::{ScheduleInferenceService, ScheduleSuggestion};
pub use pipeline::Pipeline;
pub use records::SensorRecord;
pub use registry::{ModelRegistry, ScalerRegistry};
pub use store::MemoryStore;
pub use telemetry::{PipelineStats, SharedPipelineStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
