//! Outcome counters for the pipelines.

pub mod stats;

pub use stats::{
    create_shared_stats, create_shared_stats_with_persistence, PipelineStats,
    SharedPipelineStats, StatsSnapshot,
};
