//! Normalization parameters and their registry.

use crate::core::features::{FEATURE_COUNT, FEATURE_NAMES};
use crate::error::RegistryError;
use crate::registry::artifacts::{ModelConfigSource, SharedFetcher};
use crate::registry::cache::{RegistryCache, SharedClock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-feature mean and scale captured when the model was trained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalerParams {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    pub feature_names: Vec<String>,
}

impl ScalerParams {
    /// Parameters for the standard feature order.
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, String> {
        let names = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        Self::with_names(mean, scale, names)
    }

    pub fn with_names(
        mean: Vec<f64>,
        scale: Vec<f64>,
        feature_names: Vec<String>,
    ) -> Result<Self, String> {
        let params = Self {
            mean,
            scale,
            feature_names,
        };
        params.check()?;
        Ok(params)
    }

    /// Parse a scaler artifact.
    pub fn from_json(bytes: &[u8]) -> Result<Self, String> {
        let artifact: ScalerArtifact =
            serde_json::from_slice(bytes).map_err(|e| format!("invalid scaler JSON: {e}"))?;

        if let Some(n) = artifact.n_features {
            if n != FEATURE_COUNT {
                return Err(format!(
                    "scaler declares {n} features, expected {FEATURE_COUNT}"
                ));
            }
        }

        let names = artifact
            .feature_names
            .unwrap_or_else(|| FEATURE_NAMES.iter().map(|s| s.to_string()).collect());
        Self::with_names(artifact.mean, artifact.scale, names)
    }

    fn check(&self) -> Result<(), String> {
        if self.mean.len() != FEATURE_COUNT
            || self.scale.len() != FEATURE_COUNT
            || self.feature_names.len() != FEATURE_COUNT
        {
            return Err(format!(
                "scaler lengths mean={} scale={} names={} do not all equal {FEATURE_COUNT}",
                self.mean.len(),
                self.scale.len(),
                self.feature_names.len()
            ));
        }

        if let Some(i) = self.mean.iter().position(|m| !m.is_finite()) {
            return Err(format!("mean[{i}] is not finite"));
        }
        if let Some(i) = self
            .scale
            .iter()
            .position(|s| !s.is_finite() || *s == 0.0)
        {
            return Err(format!("scale[{i}] must be finite and non-zero"));
        }

        for (i, (got, want)) in self.feature_names.iter().zip(FEATURE_NAMES).enumerate() {
            if got != want {
                return Err(format!(
                    "feature {i} is '{got}', encoder produces '{want}'"
                ));
            }
        }

        Ok(())
    }
}

/// On-disk scaler format written by the training pipeline.
#[derive(Debug, Deserialize)]
struct ScalerArtifact {
    mean: Vec<f64>,
    scale: Vec<f64>,
    #[serde(default)]
    n_features: Option<usize>,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
}

/// Resolves and caches scaler parameters by logical model name.
pub struct ScalerRegistry {
    source: Arc<dyn ModelConfigSource>,
    fetcher: SharedFetcher,
    cache: RegistryCache<ScalerParams>,
}

impl ScalerRegistry {
    pub fn new(
        source: Arc<dyn ModelConfigSource>,
        fetcher: SharedFetcher,
        ttl: std::time::Duration,
        clock: SharedClock,
    ) -> Self {
        Self {
            source,
            fetcher,
            cache: RegistryCache::new(ttl, clock),
        }
    }

    /// Scaler for `name`, from cache while fresh.
    pub async fn resolve(&self, name: &str) -> Result<Arc<ScalerParams>, RegistryError> {
        self.cache.get_or_load(name, || self.load(name)).await
    }

    async fn load(&self, name: &str) -> Result<Arc<ScalerParams>, RegistryError> {
        let entry = self.source.model_entry(name).await?;

        let bytes = self
            .fetcher
            .fetch(&entry.scaler_url)
            .await
            .map_err(|e| RegistryError::load(name, e))?;
        let params = ScalerParams::from_json(&bytes).map_err(|e| RegistryError::load(name, e))?;

        tracing::info!(
            scaler = name,
            version = %entry.current_version,
            "Loaded scaler parameters"
        );
        Ok(Arc::new(params))
    }

    pub fn cache(&self) -> &RegistryCache<ScalerParams> {
        &self.cache
    }
}
