//! Model and scaler registries.
//!
//! Both registries resolve a logical model name through the model
//! configuration document, fetch the artifact, and keep the loaded value in
//! a [`RegistryCache`] for one TTL. A model and its scaler are always
//! resolved under the same name.

pub mod artifacts;
pub mod cache;
pub mod model;
pub mod scaler;

pub use artifacts::{
    default_fetcher, ArtifactFetcher, FileArtifactFetcher, ModelConfigSource, ModelEntry,
    SharedFetcher, StaticModelConfig,
};
pub use cache::{CachedResource, Clock, ManualClock, RegistryCache, SharedClock, SystemClock};
pub use model::{load_model, InferenceError, ModelRegistry, PooledSequenceModel, ScheduleModel};
pub use scaler::{ScalerParams, ScalerRegistry};

#[cfg(feature = "gateway")]
pub use artifacts::HttpArtifactFetcher;
