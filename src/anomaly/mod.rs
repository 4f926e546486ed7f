//! Anomaly detection and alerting.
//!
//! - `rules`: heuristic checks over a 24-hour window
//! - `dispatch`: alert persistence and push delivery
//! - `scan`: timer-driven scan across users

pub mod dispatch;
pub mod rules;
pub mod scan;

pub use dispatch::{AlertData, AlertDispatcher, AlertRecord, DispatchReport};
pub use rules::{evaluate, AnomalyType, AnomalyVerdict, Severity};
pub use scan::{AnomalyScanService, ScanReport, UserAnomaly};
