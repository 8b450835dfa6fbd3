//! ClickFlow - clickout feature extraction for ranking models
//!
//! Replays a chronologically ordered interaction log through a registry of
//! stateful accumulators and emits one feature record per candidate item of
//! every clickout event. State lives purely in memory and is rebuilt from
//! scratch each run.

pub mod config;
pub mod event_reader;
pub mod feature_core;
pub mod feature_writer;
pub mod providers;
pub mod types;

pub use config::Config;
pub use event_reader::JsonlEventReader;
pub use feature_core::{default_accumulators, shard_accumulators, AccumulatorRegistry, FeatureAssembler};
pub use feature_writer::{BackendType, FeatureSink, JsonlFeatureWriter, SqliteFeatureWriter};
pub use providers::{
    JaccardSimilarity, PricePointSimilarity, PriorTable, ProviderSet, SimilarityProvider,
};
pub use types::{ActionType, Candidate, Event, FeatureRecord, FeatureRow, FeatureValue};
