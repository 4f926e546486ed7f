//! Schedule inference for one user.
//!
//! Flow: fetch the last week of records, run the data quality gate, resolve
//! the model and scaler, encode, run the forward pass on the blocking pool,
//! turn the output into suggestions and append them to the history.

use crate::config::DEFAULT_MODEL_NAME;
use crate::core::features::FeatureBuilder;
use crate::core::quality::{DataQualityGate, ValidationResult, REQUIRED_WINDOW};
use crate::core::tensor::SharedTensorTracker;
use crate::error::{PredictionError, StoreError};
use crate::inference::suggestion::{suggestions_from_output, ScheduleSuggestion, StoredPrediction};
use crate::registry::{InferenceError, ModelRegistry, ScalerRegistry};
use crate::store::{RecordStore, SuggestionStore};
use crate::telemetry::SharedPipelineStats;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

/// Default end-to-end bound on a single prediction.
pub const DEFAULT_INFERENCE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// Serves schedule suggestions.
pub struct ScheduleInferenceService {
    records: Arc<dyn RecordStore>,
    suggestions: Arc<dyn SuggestionStore>,
    models: Arc<ModelRegistry>,
    scalers: Arc<ScalerRegistry>,
    gate: DataQualityGate,
    builder: FeatureBuilder,
    tz: Tz,
    model_name: String,
    timeout: std::time::Duration,
    stats: SharedPipelineStats,
}

impl ScheduleInferenceService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        suggestions: Arc<dyn SuggestionStore>,
        models: Arc<ModelRegistry>,
        scalers: Arc<ScalerRegistry>,
        tz: Tz,
        tracker: SharedTensorTracker,
        stats: SharedPipelineStats,
    ) -> Self {
        Self {
            records,
            suggestions,
            models,
            scalers,
            gate: DataQualityGate::default(),
            builder: FeatureBuilder::new(tz, tracker),
            tz,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            timeout: DEFAULT_INFERENCE_TIMEOUT,
            stats,
        }
    }

    /// Use a different logical model (and scaler) name.
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Produce and persist schedule suggestions for `user_id`.
    ///
    /// An empty `user_id` is treated as an unauthenticated caller. Gate
    /// failures surface as `FailedPrecondition` with the gate's reason;
    /// everything else, including the timeout, is `Internal`.
    pub async fn predict(&self, user_id: &str) -> Result<Vec<ScheduleSuggestion>, PredictionError> {
        if user_id.trim().is_empty() {
            return Err(PredictionError::Unauthenticated);
        }

        let result = match tokio::time::timeout(self.timeout, self.run(user_id, Utc::now())).await
        {
            Ok(result) => result,
            Err(_) => Err(PredictionError::Internal(format!(
                "prediction timed out after {}s",
                self.timeout.as_secs()
            ))),
        };

        match &result {
            Ok(suggestions) => {
                self.stats.record_prediction_served();
                tracing::info!(user_id, count = suggestions.len(), "Schedule suggestions created");
            }
            Err(PredictionError::FailedPrecondition(reason)) => {
                self.stats.record_precondition_rejection();
                tracing::warn!(user_id, "Prediction rejected: {reason}");
            }
            Err(e) => {
                self.stats.record_internal_failure();
                tracing::error!(user_id, "Prediction failed: {e}");
            }
        }
        result
    }

    /// Run only the data quality gate over the user's current window.
    pub async fn validate_user(&self, user_id: &str) -> Result<ValidationResult, StoreError> {
        let records = self.fetch_window(user_id, Utc::now()).await?;
        Ok(self.gate.validate(&records))
    }

    async fn fetch_window(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<crate::records::SensorRecord>, StoreError> {
        let cutoff = now - Duration::hours(REQUIRED_WINDOW as i64);
        self.records
            .records_since(user_id, cutoff, REQUIRED_WINDOW)
            .await
    }

    async fn run(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduleSuggestion>, PredictionError> {
        let records = self.fetch_window(user_id, now).await?;
        let window = self.gate.admit(&records)?;

        let (model, scaler) = tokio::try_join!(
            self.models.resolve(&self.model_name),
            self.scalers.resolve(&self.model_name)
        )?;

        let input = self
            .builder
            .build(&window, &scaler)
            .map_err(|e| PredictionError::Internal(format!("feature encoding failed: {e}")))?;

        // Input and output tensors are owned by the closure and released
        // when it returns, whichever way it returns.
        let forward_model = Arc::clone(&model);
        let output = tokio::task::spawn_blocking(move || {
            forward_model.forward(&input).map(|t| t.into_vec())
        })
        .await
        .map_err(|e| InferenceError::Runtime(e.to_string()))
        .and_then(|result| result)
        .map_err(|e| PredictionError::Internal(format!("inference failed: {e}")))?;

        let suggestions =
            suggestions_from_output(&output, now, &self.tz).map_err(PredictionError::Internal)?;

        let history: Vec<StoredPrediction> = suggestions
            .iter()
            .cloned()
            .map(|s| StoredPrediction::schedule(user_id, model.version(), s))
            .collect();
        self.suggestions
            .append_predictions(&history)
            .await
            .map_err(|e| PredictionError::Internal(format!("failed to persist suggestions: {e}")))?;

        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::TensorTracker;
    use crate::records::SensorRecord;
    use crate::registry::model::tests::constant_model;
    use crate::registry::{
        ArtifactFetcher, ManualClock, ModelEntry, PooledSequenceModel, ScalerParams,
        StaticModelConfig,
    };
    use crate::store::MemoryStore;
    use crate::telemetry::PipelineStats;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Serves fixed artifacts from memory.
    struct FixedFetcher(HashMap<String, Vec<u8>>);

    #[async_trait]
    impl ArtifactFetcher for FixedFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| format!("not found: {url}"))
        }
    }

    /// Record store that never answers in time.
    struct SlowStore;

    #[async_trait]
    impl RecordStore for SlowStore {
        async fn records_since(
            &self,
            _user_id: &str,
            _cutoff: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<SensorRecord>, StoreError> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    fn fetcher(model: &PooledSequenceModel) -> Arc<FixedFetcher> {
        let scaler = serde_json::json!({
            "mean": vec![0.0; 13],
            "scale": vec![1.0; 13],
        });
        let mut artifacts = HashMap::new();
        artifacts.insert(
            "mem://model".to_string(),
            serde_json::to_vec(model).unwrap(),
        );
        artifacts.insert("mem://scaler".to_string(), serde_json::to_vec(&scaler).unwrap());
        Arc::new(FixedFetcher(artifacts))
    }

    fn service(
        records: Arc<dyn RecordStore>,
        store: Arc<MemoryStore>,
        tracker: SharedTensorTracker,
    ) -> ScheduleInferenceService {
        service_with_model(records, store, tracker, &constant_model([0.0, 2.0]))
    }

    fn service_with_model(
        records: Arc<dyn RecordStore>,
        store: Arc<MemoryStore>,
        tracker: SharedTensorTracker,
        model: &PooledSequenceModel,
    ) -> ScheduleInferenceService {
        let source = Arc::new(StaticModelConfig::missing().with_entry(
            DEFAULT_MODEL_NAME,
            ModelEntry {
                current_version: "v7".to_string(),
                format: "json".to_string(),
                model_url: "mem://model".to_string(),
                scaler_url: "mem://scaler".to_string(),
                deployed: true,
            },
        ));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ttl = std::time::Duration::from_secs(3600);
        let fetcher = fetcher(model);
        let models = Arc::new(ModelRegistry::new(
            source.clone(),
            fetcher.clone(),
            ttl,
            clock.clone(),
            tracker.clone(),
        ));
        let scalers = Arc::new(ScalerRegistry::new(source, fetcher, ttl, clock));
        ScheduleInferenceService::new(
            records,
            store,
            models,
            scalers,
            chrono_tz::UTC,
            tracker,
            Arc::new(PipelineStats::new()),
        )
    }

    fn week(user: &str) -> Vec<SensorRecord> {
        let now = Utc::now();
        (0..168)
            .map(|i| {
                SensorRecord::new(user, "d", now - Duration::minutes(30) - Duration::hours(i))
                    .with_climate(22.0, 45.0)
                    .with_motion(i % 3 == 0)
                    .with_actuators(128, 64)
                    .with_distance(150.0)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_predict_persists_suggestions() {
        let store = Arc::new(MemoryStore::new());
        store.insert_records(week("u1"));
        let tracker = Arc::new(TensorTracker::new());
        let svc = service(store.clone(), store.clone(), tracker.clone());

        let suggestions = svc.predict("u1").await.unwrap();
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].value, 50);
        assert_eq!(suggestions[1].value, 88);

        let history = store.predictions();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|p| p.model_version == "v1"));
        assert!(history.iter().all(|p| p.prediction_type == "schedule"));

        // Warm-up and request tensors are all released
        assert_eq!(tracker.live(), 0);
        assert!(tracker.allocated() >= 4);
    }

    #[tokio::test]
    async fn test_predictions_append() {
        let store = Arc::new(MemoryStore::new());
        store.insert_records(week("u1"));
        let svc = service(store.clone(), store.clone(), Arc::new(TensorTracker::new()));

        svc.predict("u1").await.unwrap();
        svc.predict("u1").await.unwrap();
        assert_eq!(store.predictions().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_user_is_unauthenticated() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), store, Arc::new(TensorTracker::new()));
        assert_eq!(svc.predict("  ").await, Err(PredictionError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_gate_failure_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.insert_records(week("u1").into_iter().take(100));
        let tracker = Arc::new(TensorTracker::new());
        let svc = service(store.clone(), store.clone(), tracker.clone());

        let err = svc.predict("u1").await.unwrap_err();
        assert_eq!(err.code(), "failed-precondition");
        assert!(store.predictions().is_empty());
        assert_eq!(tracker.allocated(), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_internal() {
        let store = Arc::new(MemoryStore::new());
        store.insert_records(week("u1"));
        store.set_fail_writes(true);
        let tracker = Arc::new(TensorTracker::new());
        let svc = service(store.clone(), store, tracker.clone());

        let err = svc.predict("u1").await.unwrap_err();
        assert_eq!(err.code(), "internal");
        assert_eq!(tracker.live(), 0);
    }

    #[tokio::test]
    async fn test_forward_failure_is_internal_and_releases_tensors() {
        // Zero input warms up fine; real readings overflow to inf - inf.
        let mut model = constant_model([0.0, 0.0]);
        model.last_step_weights[0][0] = f32::MAX;
        model.last_step_weights[0][3] = -f32::MAX;

        let store = Arc::new(MemoryStore::new());
        store.insert_records(week("u1"));
        let tracker = Arc::new(TensorTracker::new());
        let svc = service_with_model(store.clone(), store.clone(), tracker.clone(), &model);

        let err = svc.predict("u1").await.unwrap_err();
        assert_eq!(err.code(), "internal");
        assert!(err.to_string().contains("non-finite"), "{err}");
        assert!(store.predictions().is_empty());
        assert!(tracker.allocated() > 0);
        assert_eq!(tracker.live(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_internal() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(Arc::new(SlowStore), store, Arc::new(TensorTracker::new()))
            .with_timeout(std::time::Duration::from_millis(50));

        let err = svc.predict("u1").await.unwrap_err();
        assert_eq!(err.code(), "internal");
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_validate_user_reports_reason() {
        let store = Arc::new(MemoryStore::new());
        store.insert_records(week("u1").into_iter().take(90));
        let svc = service(store.clone(), store, Arc::new(TensorTracker::new()));

        let result = svc.validate_user("u1").await.unwrap();
        assert!(!result.valid);
        let reason = result.reason.unwrap();
        assert!(reason.contains("90") && reason.contains("168"));
    }

    #[test]
    fn test_scaler_fixture_is_valid() {
        assert!(ScalerParams::new(vec![0.0; 13], vec![1.0; 13]).is_ok());
    }
}
