//! Artifact resolution: logical model names to artifact bytes.
//!
//! The training pipeline publishes a configuration document mapping each
//! logical model name to a model URL and a scaler URL. Resolving a name
//! consults that document; fetching reads the bytes behind a URL.

use crate::error::RegistryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// One entry of the model configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    /// Version tag published with the artifacts
    pub current_version: String,
    /// Serialization format of the model artifact
    pub format: String,
    /// Location of the model artifact
    pub model_url: String,
    /// Location of the normalization parameters
    pub scaler_url: String,
    /// Whether the entry may be served
    #[serde(default = "default_deployed")]
    pub deployed: bool,
}

fn default_deployed() -> bool {
    true
}

/// Source of the model configuration document.
#[async_trait]
pub trait ModelConfigSource: Send + Sync {
    /// Look up `name`. Absence of the document or the entry is a
    /// [`RegistryError::Resolution`].
    async fn model_entry(&self, name: &str) -> Result<ModelEntry, RegistryError>;
}

/// Configuration document held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticModelConfig {
    models: Option<HashMap<String, ModelEntry>>,
}

impl StaticModelConfig {
    pub fn new(models: HashMap<String, ModelEntry>) -> Self {
        Self {
            models: Some(models),
        }
    }

    /// A source whose configuration document does not exist.
    pub fn missing() -> Self {
        Self { models: None }
    }

    pub fn with_entry(mut self, name: impl Into<String>, entry: ModelEntry) -> Self {
        self.models
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), entry);
        self
    }
}

#[async_trait]
impl ModelConfigSource for StaticModelConfig {
    async fn model_entry(&self, name: &str) -> Result<ModelEntry, RegistryError> {
        let models = self
            .models
            .as_ref()
            .ok_or_else(|| RegistryError::resolution(name, "model configuration not found"))?;

        let entry = models
            .get(name)
            .ok_or_else(|| RegistryError::resolution(name, "no entry in model configuration"))?;

        if !entry.deployed {
            return Err(RegistryError::resolution(name, "model is not deployed"));
        }

        Ok(entry.clone())
    }
}

/// Reads artifact bytes from a URL.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// Thread-safe shared fetcher.
pub type SharedFetcher = Arc<dyn ArtifactFetcher>;

/// Fetches `file://` URLs and plain paths from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileArtifactFetcher {
    base_dir: Option<PathBuf>,
}

impl FileArtifactFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }
}

#[async_trait]
impl ArtifactFetcher for FileArtifactFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let path = self.resolve(url);
        tokio::fs::read(&path)
            .await
            .map_err(|e| format!("failed to read {}: {e}", path.display()))
    }
}

/// Fetches `http(s)://` URLs with reqwest and everything else from disk.
#[cfg(feature = "gateway")]
pub struct HttpArtifactFetcher {
    client: reqwest::Client,
    files: FileArtifactFetcher,
}

#[cfg(feature = "gateway")]
impl HttpArtifactFetcher {
    pub fn new() -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| format!("failed to create HTTP client: {e}"))?;
        Ok(Self {
            client,
            files: FileArtifactFetcher::new(),
        })
    }
}

#[cfg(feature = "gateway")]
#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return self.files.fetch(url).await;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request to {url} failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("{url} returned {status}"));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("failed to read body of {url}: {e}"))?;
        Ok(bytes.to_vec())
    }
}

/// Fetcher for the enabled transport features.
pub fn default_fetcher() -> SharedFetcher {
    #[cfg(feature = "gateway")]
    {
        match HttpArtifactFetcher::new() {
            Ok(fetcher) => return Arc::new(fetcher),
            Err(e) => tracing::warn!("HTTP artifact fetcher unavailable, using files only: {e}"),
        }
    }
    Arc::new(FileArtifactFetcher::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ModelEntry {
        ModelEntry {
            current_version: "v1".to_string(),
            format: "json".to_string(),
            model_url: "models/model.json".to_string(),
            scaler_url: "models/scaler.json".to_string(),
            deployed: true,
        }
    }

    #[tokio::test]
    async fn test_missing_document() {
        let err = StaticModelConfig::missing()
            .model_entry("schedule_predictor")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Resolution { .. }));
    }

    #[tokio::test]
    async fn test_missing_entry() {
        let source = StaticModelConfig::default().with_entry("other", entry());
        assert!(matches!(
            source.model_entry("schedule_predictor").await,
            Err(RegistryError::Resolution { .. })
        ));
        assert_eq!(source.model_entry("other").await.unwrap(), entry());
    }

    #[tokio::test]
    async fn test_undeployed_entry() {
        let mut e = entry();
        e.deployed = false;
        let source = StaticModelConfig::default().with_entry("m", e);
        assert!(source.model_entry("m").await.is_err());
    }

    #[test]
    fn test_entry_wire_format() {
        let json = serde_json::json!({
            "currentVersion": "v1",
            "format": "json",
            "modelUrl": "a",
            "scalerUrl": "b"
        });
        let e: ModelEntry = serde_json::from_value(json).unwrap();
        assert!(e.deployed);
        assert_eq!(e.scaler_url, "b");
    }

    #[tokio::test]
    async fn test_file_fetcher() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        std::fs::write(dir.join("a.json"), b"{}").unwrap();

        let fetcher = FileArtifactFetcher::with_base_dir(dir);
        assert_eq!(fetcher.fetch("a.json").await.unwrap(), b"{}");
        assert_eq!(
            fetcher
                .fetch(&format!("file://{}", dir.join("a.json").display()))
                .await
                .unwrap(),
            b"{}"
        );
        assert!(fetcher.fetch("missing.json").await.is_err());
    }
}
