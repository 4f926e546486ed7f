//! Schedule models and the model registry.
//!
//! A model consumes a `[1, window, features]` tensor and produces a
//! `[1, outputs]` tensor of fractions in `[0, 1]`. The registry loads models
//! by logical name, warms them up once, and caches them for the TTL.

use crate::core::features::FEATURE_COUNT;
use crate::core::quality::REQUIRED_WINDOW;
use crate::core::tensor::{SharedTensorTracker, ShapeError, Tensor};
use crate::error::RegistryError;
use crate::registry::artifacts::{ModelConfigSource, SharedFetcher};
use crate::registry::cache::{RegistryCache, SharedClock};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Forward pass failures.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("model produced a non-finite output at index {0}")]
    NonFinite(usize),

    #[error("inference task failed: {0}")]
    Runtime(String),
}

/// A loaded, scorable sequence model.
///
/// `forward` is synchronous CPU work; callers run it on the blocking pool.
pub trait ScheduleModel: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Expected input shape, `[1, window, features]`.
    fn input_shape(&self) -> [usize; 3];

    fn output_size(&self) -> usize;

    /// Run one forward pass. The output tensor shares the input's tracker.
    fn forward(&self, input: &Tensor) -> Result<Tensor, InferenceError>;
}

/// Sequence model artifact in JSON form.
///
/// Each output is `sigmoid(bias + w_last · x[T-1] + w_pool · pool(x))`,
/// where `pool` is a recency-weighted mean over time steps with weight
/// `decay^(T-1-t)`. A decay of 1.0 is a plain mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PooledSequenceModel {
    pub name: String,
    pub version: String,
    pub window: usize,
    pub features: usize,
    pub outputs: Vec<String>,
    pub last_step_weights: Vec<Vec<f32>>,
    pub pooled_weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    #[serde(default = "default_decay")]
    pub decay: f32,
}

fn default_decay() -> f32 {
    1.0
}

impl PooledSequenceModel {
    pub fn from_json(bytes: &[u8]) -> Result<Self, String> {
        let model: Self =
            serde_json::from_slice(bytes).map_err(|e| format!("invalid model JSON: {e}"))?;
        model.check()?;
        Ok(model)
    }

    fn check(&self) -> Result<(), String> {
        if self.window != REQUIRED_WINDOW || self.features != FEATURE_COUNT {
            return Err(format!(
                "model input [{}, {}] does not match [{REQUIRED_WINDOW}, {FEATURE_COUNT}]",
                self.window, self.features
            ));
        }

        let outputs = self.outputs.len();
        if outputs == 0 {
            return Err("model declares no outputs".to_string());
        }
        if self.last_step_weights.len() != outputs
            || self.pooled_weights.len() != outputs
            || self.bias.len() != outputs
        {
            return Err(format!("weight rows do not match {outputs} outputs"));
        }

        let rows = self.last_step_weights.iter().chain(&self.pooled_weights);
        for row in rows {
            if row.len() != self.features {
                return Err(format!(
                    "weight row has {} columns, expected {}",
                    row.len(),
                    self.features
                ));
            }
        }

        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return Err(format!("decay {} outside (0, 1]", self.decay));
        }

        Ok(())
    }
}

impl ScheduleModel for PooledSequenceModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn input_shape(&self) -> [usize; 3] {
        [1, self.window, self.features]
    }

    fn output_size(&self) -> usize {
        self.outputs.len()
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor, InferenceError> {
        input.expect_shape(&self.input_shape())?;
        let x = input.data();
        let f = self.features;

        let mut pooled = vec![0.0f32; f];
        let mut weight = 1.0f32;
        let mut total = 0.0f32;
        for step in x.chunks_exact(f).rev() {
            for (acc, v) in pooled.iter_mut().zip(step) {
                *acc += weight * v;
            }
            total += weight;
            weight *= self.decay;
        }
        for acc in pooled.iter_mut() {
            *acc /= total;
        }

        let last = &x[(self.window - 1) * f..];
        let mut out = Vec::with_capacity(self.outputs.len());
        for o in 0..self.outputs.len() {
            let z = self.bias[o]
                + dot(&self.last_step_weights[o], last)
                + dot(&self.pooled_weights[o], &pooled);
            let y = sigmoid(z);
            if !y.is_finite() {
                return Err(InferenceError::NonFinite(o));
            }
            out.push(y);
        }

        Ok(Tensor::from_vec(&[1, out.len()], out, input.tracker())?)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

/// Deserialize a model artifact of the given format.
pub fn load_model(format: &str, bytes: &[u8]) -> Result<Arc<dyn ScheduleModel>, String> {
    match format {
        "json" | "pooled-sequence" => Ok(Arc::new(PooledSequenceModel::from_json(bytes)?)),
        other => Err(format!("unsupported model format '{other}'")),
    }
}

/// Resolves, warms up and caches models by logical name.
pub struct ModelRegistry {
    source: Arc<dyn ModelConfigSource>,
    fetcher: SharedFetcher,
    cache: RegistryCache<dyn ScheduleModel>,
    tracker: SharedTensorTracker,
}

impl ModelRegistry {
    pub fn new(
        source: Arc<dyn ModelConfigSource>,
        fetcher: SharedFetcher,
        ttl: std::time::Duration,
        clock: SharedClock,
        tracker: SharedTensorTracker,
    ) -> Self {
        Self {
            source,
            fetcher,
            cache: RegistryCache::new(ttl, clock),
            tracker,
        }
    }

    /// Model for `name`, from cache while fresh.
    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn ScheduleModel>, RegistryError> {
        self.cache.get_or_load(name, || self.load(name)).await
    }

    async fn load(&self, name: &str) -> Result<Arc<dyn ScheduleModel>, RegistryError> {
        let entry = self.source.model_entry(name).await?;

        let bytes = self
            .fetcher
            .fetch(&entry.model_url)
            .await
            .map_err(|e| RegistryError::load(name, e))?;
        let model = load_model(&entry.format, &bytes).map_err(|e| RegistryError::load(name, e))?;

        self.warm_up(name, &model).await?;

        tracing::info!(
            model = name,
            version = model.version(),
            "Loaded and warmed up schedule model"
        );
        Ok(model)
    }

    /// Pay lazy initialization costs now rather than on the first request.
    async fn warm_up(
        &self,
        name: &str,
        model: &Arc<dyn ScheduleModel>,
    ) -> Result<(), RegistryError> {
        let model = Arc::clone(model);
        let tracker = Arc::clone(&self.tracker);

        tokio::task::spawn_blocking(move || {
            let input = Tensor::zeros(&model.input_shape(), &tracker);
            model.forward(&input).map(drop)
        })
        .await
        .map_err(|e| RegistryError::load(name, format!("warm-up task failed: {e}")))?
        .map_err(|e| RegistryError::load(name, format!("warm-up failed: {e}")))
    }

    pub fn cache(&self) -> &RegistryCache<dyn ScheduleModel> {
        &self.cache
    }
}
