//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use smartsync_inference::config::{Config, DEFAULT_MODEL_NAME};
use smartsync_inference::gateway::RecordingPushGateway;
use smartsync_inference::registry::{
    FileArtifactFetcher, ManualClock, ModelEntry, PooledSequenceModel,
};
use smartsync_inference::store::MemoryStore;
use smartsync_inference::{Pipeline, SensorRecord};
use std::path::Path;
use std::sync::Arc;

pub use tempfile::{tempdir, TempDir};

pub fn model() -> PooledSequenceModel {
    let mut last_step = vec![vec![0.0; 13]; 2];
    // Warmer rooms push the fan up
    last_step[0][0] = 0.4;
    PooledSequenceModel {
        name: DEFAULT_MODEL_NAME.to_string(),
        version: "2024-03-01".to_string(),
        window: 168,
        features: 13,
        outputs: vec!["fan_speed".to_string(), "led_brightness".to_string()],
        last_step_weights: last_step,
        pooled_weights: vec![vec![0.0; 13]; 2],
        bias: vec![-0.2, 0.6],
        decay: 0.97,
    }
}

/// Write model and scaler artifacts and return the configuration entry.
pub fn write_artifacts(dir: &Path) -> ModelEntry {
    let model_path = dir.join("model.json");
    let scaler_path = dir.join("scaler.json");

    std::fs::write(&model_path, serde_json::to_vec(&model()).unwrap()).unwrap();
    let scaler = serde_json::json!({
        "mean": [22.5, 22.5, 22.5, 50.0, 0.3, 200.0, 0.0, 0.0, 0.0, 0.0, 0.28, 0.38, 0.0],
        "scale": [2.0, 2.0, 2.0, 10.0, 0.45, 50.0, 0.7, 0.7, 0.7, 0.7, 0.45, 0.48, 1.0],
        "var": [4.0, 4.0, 4.0, 100.0, 0.2, 2500.0, 0.5, 0.5, 0.5, 0.5, 0.2, 0.23, 1.0],
        "n_features": 13
    });
    std::fs::write(&scaler_path, serde_json::to_vec(&scaler).unwrap()).unwrap();

    ModelEntry {
        current_version: "2024-03-01".to_string(),
        format: "json".to_string(),
        model_url: format!("file://{}", model_path.display()),
        scaler_url: scaler_path.display().to_string(),
        deployed: true,
    }
}

/// `count` hourly records ending just before now, temperatures in [20, 25].
pub fn hourly(user: &str, count: i64, motion: impl Fn(i64) -> bool) -> Vec<SensorRecord> {
    let now = Utc::now();
    (0..count)
        .rev()
        .map(|i| {
            SensorRecord::new(user, "room-1", now - Duration::minutes(20) - Duration::hours(i))
                .with_climate(20.0 + (i % 6) as f64, 40.0 + (i % 10) as f64)
                .with_motion(motion(i))
                .with_actuators(((i * 7) % 256) as u8, ((i * 13) % 256) as u8)
                .with_distance(120.0)
        })
        .collect()
}

/// Configuration rooted in `dir`, with artifacts written there.
pub fn config_for(dir: &TempDir) -> Config {
    let entry = write_artifacts(dir.path());
    let mut config = Config {
        data_path: dir.path().join("data"),
        dataset_path: dir.path().join("data").join("dataset.json"),
        ..Config::default()
    };
    config.models.clear();
    config.models.insert(DEFAULT_MODEL_NAME.to_string(), entry);
    config
}

pub fn assemble(config: Config, store: Arc<MemoryStore>, push: Arc<RecordingPushGateway>) -> Pipeline {
    Pipeline::assemble(
        config,
        store,
        Arc::new(FileArtifactFetcher::new()),
        push,
        Arc::new(ManualClock::new(Utc::now())),
    )
    .unwrap()
}

pub fn pipeline(dir: &TempDir, store: Arc<MemoryStore>, push: Arc<RecordingPushGateway>) -> Pipeline {
    assemble(config_for(dir), store, push)
}
