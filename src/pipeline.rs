//! Wiring of the services from a [`Config`].

use crate::anomaly::{AlertDispatcher, AnomalyScanService};
use crate::config::Config;
use crate::core::tensor::{SharedTensorTracker, TensorTracker};
use crate::gateway::{self, SharedPushGateway};
use crate::inference::ScheduleInferenceService;
use crate::registry::{
    default_fetcher, ModelRegistry, ScalerRegistry, SharedClock, SharedFetcher,
    StaticModelConfig, SystemClock,
};
use crate::store::MemoryStore;
use crate::telemetry::{create_shared_stats_with_persistence, SharedPipelineStats};
use anyhow::Context;
use std::sync::Arc;

/// File name of the persisted pipeline counters under the data path.
pub const STATS_FILE: &str = "pipeline_stats.json";

/// Fully wired services sharing one store, tracker and stats instance.
pub struct Pipeline {
    pub config: Config,
    pub store: Arc<MemoryStore>,
    pub inference: Arc<ScheduleInferenceService>,
    pub scans: Arc<AnomalyScanService>,
    pub stats: SharedPipelineStats,
    pub tracker: SharedTensorTracker,
}

impl Pipeline {
    /// Build against the configured dataset, artifact sources and gateway.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(
            MemoryStore::load(&config.dataset_path)
                .with_context(|| format!("loading dataset {}", config.dataset_path.display()))?,
        );
        let push = gateway::from_config(&config.push).context("creating push gateway")?;
        Self::assemble(
            config,
            store,
            default_fetcher(),
            push,
            Arc::new(SystemClock),
        )
    }

    /// Build with explicit collaborators.
    pub fn assemble(
        config: Config,
        store: Arc<MemoryStore>,
        fetcher: SharedFetcher,
        push: SharedPushGateway,
        clock: SharedClock,
    ) -> anyhow::Result<Self> {
        let tz = config.time_zone()?;
        let stats = create_shared_stats_with_persistence(config.data_path.join(STATS_FILE));
        let tracker: SharedTensorTracker = Arc::new(TensorTracker::new());
        let source = Arc::new(StaticModelConfig::new(config.models.clone()));

        let models = Arc::new(ModelRegistry::new(
            source.clone(),
            fetcher.clone(),
            config.cache_ttl,
            clock.clone(),
            tracker.clone(),
        ));
        let scalers = Arc::new(ScalerRegistry::new(source, fetcher, config.cache_ttl, clock));

        let inference = Arc::new(
            ScheduleInferenceService::new(
                store.clone(),
                store.clone(),
                models,
                scalers,
                tz,
                tracker.clone(),
                stats.clone(),
            )
            .with_model_name(config.model_name.clone())
            .with_timeout(config.inference_timeout),
        );

        let dispatcher = Arc::new(AlertDispatcher::new(
            store.clone(),
            store.clone(),
            push,
            stats.clone(),
        ));
        let scans = Arc::new(AnomalyScanService::new(
            store.clone(),
            store.clone(),
            dispatcher,
            tz,
            config.anomaly.clone(),
            stats.clone(),
        ));

        Ok(Self {
            config,
            store,
            inference,
            scans,
            stats,
            tracker,
        })
    }

    /// Write the dataset and counters back to disk.
    pub fn persist(&self) -> anyhow::Result<()> {
        self.store
            .save(&self.config.dataset_path)
            .with_context(|| format!("saving dataset {}", self.config.dataset_path.display()))?;
        self.stats.save().context("saving pipeline stats")?;
        Ok(())
    }
}
