//! Feature Core - Online Feature Extraction Engine
//!
//! This module provides the infrastructure for turning a time-ordered
//! interaction log into per-candidate training rows for a ranking model.
//!
//! # Architecture
//!
//! ```text
//! Event stream (JSONL) → FeatureAssembler
//!     ↓
//! AccumulatorRegistry (dispatch by ActionType)
//!     ↓
//! Accumulators (counters, session, timing, click prob, covisit, similarity)
//!     ↓
//! FeatureRecord per (clickout, candidate) → FeatureSink (JSONL or SQLite)
//! ```
//!
//! Processing is single-threaded and deterministic: every accumulator is
//! queried for a clickout's candidates before the event is folded into any
//! accumulator's state, so features only ever reflect strictly earlier
//! events.

pub mod accumulator;
pub mod assembler;
pub mod click_prob;
pub mod counters;
pub mod covisit;
pub mod registry;
pub mod session;
pub mod similarity;
pub mod timing;

#[cfg(test)]
pub(crate) mod test_util;

pub use accumulator::Accumulator;
pub use assembler::FeatureAssembler;
pub use click_prob::ClickOffsetProbability;
pub use counters::{DistinctInteractions, ItemCtr, ItemCtrByPlatform};
pub use covisit::{
    MostSimilarUserItemInteraction, SimilarUsersItemInteraction, TopKSimilarUsers,
};
pub use registry::{default_accumulators, shard_accumulators, AccumulatorRegistry};
pub use session::{ClickSequenceEncoder, LastClickoutStatsInSession};
pub use similarity::{PoiFeatures, PriceFeatures, PriceSimilarity, ProviderSimilarity};
pub use timing::GlobalTimestampPerItem;
