//! External similarity providers and the click-probability prior table
//!
//! All three providers are loaded once at construction time. A load failure
//! here means a misconfigured deployment, not a data anomaly, so it is
//! surfaced as a hard error instead of a query-time default.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
pub enum ProviderError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Malformed(String),
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        ProviderError::Io(err)
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Parse(err)
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Io(e) => write!(f, "IO error: {}", e),
            ProviderError::Parse(e) => write!(f, "Parse error: {}", e),
            ProviderError::Malformed(msg) => write!(f, "Malformed provider data: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Item-keyed similarity lookup used by the provider-backed accumulators
pub trait SimilarityProvider: Send + Sync {
    /// Similarity of two items; missing items resolve to the provider's
    /// neutral default, never an error
    fn pairwise(&self, a: i64, b: i64) -> f64;

    /// Mean similarity of `item` to every member of `items`; empty lists
    /// resolve to the neutral default
    fn aggregate(&self, items: &[i64], item: i64) -> f64;

    /// Number of attributes known for `item` (0 when unknown)
    fn attribute_count(&self, item: i64) -> i64;
}

/// Jaccard similarity over per-item attribute sets (content metadata, POIs)
pub struct JaccardSimilarity {
    attributes: HashMap<i64, HashSet<String>>,
}

impl JaccardSimilarity {
    /// Load from a JSON object mapping item id to a list of attribute labels
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let file = File::open(path.as_ref())?;
        let raw: HashMap<String, Vec<String>> = serde_json::from_reader(BufReader::new(file))?;

        let mut attributes = HashMap::with_capacity(raw.len());
        for (key, values) in raw {
            let item: i64 = key
                .parse()
                .map_err(|_| ProviderError::Malformed(format!("non-integer item id: {}", key)))?;
            attributes.insert(item, values.into_iter().collect());
        }

        Ok(Self { attributes })
    }

    pub fn from_map(attributes: HashMap<i64, HashSet<String>>) -> Self {
        Self { attributes }
    }
}

impl SimilarityProvider for JaccardSimilarity {
    fn pairwise(&self, a: i64, b: i64) -> f64 {
        let (sa, sb) = match (self.attributes.get(&a), self.attributes.get(&b)) {
            (Some(sa), Some(sb)) => (sa, sb),
            _ => return 0.0,
        };
        let union = sa.union(sb).count();
        if union == 0 {
            return 0.0;
        }
        let intersection = sa.intersection(sb).count();
        intersection as f64 / union as f64
    }

    fn aggregate(&self, items: &[i64], item: i64) -> f64 {
        if items.is_empty() {
            return 0.0;
        }
        let total: f64 = items.iter().map(|&other| self.pairwise(other, item)).sum();
        total / items.len() as f64
    }

    fn attribute_count(&self, item: i64) -> i64 {
        self.attributes.get(&item).map_or(0, |s| s.len() as i64)
    }
}

/// Sentinel for "no meaningful price signal"
pub const NO_PRICE_SIGNAL: f64 = 1000.0;

/// Price-distance similarity over per-item reference prices.
///
/// "Similarity" here is an absolute distance, so smaller is closer; unknown
/// items and empty lists resolve to the NO_PRICE_SIGNAL sentinel.
pub struct PricePointSimilarity {
    prices: HashMap<i64, f64>,
}

impl PricePointSimilarity {
    /// Load from a JSON object mapping item id to its reference price
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let file = File::open(path.as_ref())?;
        let raw: HashMap<String, f64> = serde_json::from_reader(BufReader::new(file))?;

        let mut prices = HashMap::with_capacity(raw.len());
        for (key, value) in raw {
            let item: i64 = key
                .parse()
                .map_err(|_| ProviderError::Malformed(format!("non-integer item id: {}", key)))?;
            prices.insert(item, value);
        }

        Ok(Self { prices })
    }

    pub fn from_map(prices: HashMap<i64, f64>) -> Self {
        Self { prices }
    }
}

impl SimilarityProvider for PricePointSimilarity {
    fn pairwise(&self, a: i64, b: i64) -> f64 {
        match (self.prices.get(&a), self.prices.get(&b)) {
            (Some(pa), Some(pb)) => (pa - pb).abs(),
            _ => NO_PRICE_SIGNAL,
        }
    }

    fn aggregate(&self, items: &[i64], item: i64) -> f64 {
        if items.is_empty() {
            return NO_PRICE_SIGNAL;
        }
        let total: f64 = items.iter().map(|&other| self.pairwise(other, item)).sum();
        total / items.len() as f64
    }

    fn attribute_count(&self, _item: i64) -> i64 {
        0
    }
}

/// Prior click probabilities keyed by (click offset, time bucket).
///
/// File format: a JSON object whose keys are "<click_offset>|<time_bucket>".
pub struct PriorTable {
    probs: HashMap<(i64, i64), f64>,
}

impl PriorTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let file = File::open(path.as_ref())?;
        let raw: HashMap<String, f64> = serde_json::from_reader(BufReader::new(file))?;

        let mut probs = HashMap::with_capacity(raw.len());
        for (key, value) in raw {
            let (offset, bucket) = key
                .split_once('|')
                .ok_or_else(|| ProviderError::Malformed(format!("bad prior key: {}", key)))?;
            let offset: i64 = offset
                .parse()
                .map_err(|_| ProviderError::Malformed(format!("bad click offset: {}", key)))?;
            let bucket: i64 = bucket
                .parse()
                .map_err(|_| ProviderError::Malformed(format!("bad time bucket: {}", key)))?;
            probs.insert((offset, bucket), value);
        }

        Ok(Self { probs })
    }

    pub fn from_map(probs: HashMap<(i64, i64), f64>) -> Self {
        Self { probs }
    }

    pub fn get(&self, click_offset: i64, time_bucket: i64) -> Option<f64> {
        self.probs.get(&(click_offset, time_bucket)).copied()
    }
}

/// The full provider bundle required to build the default accumulator set
pub struct ProviderSet {
    pub metadata: Arc<JaccardSimilarity>,
    pub poi: Arc<JaccardSimilarity>,
    pub price: Arc<PricePointSimilarity>,
    pub click_prior: Arc<PriorTable>,
}

impl ProviderSet {
    pub fn load(
        metadata_path: impl AsRef<Path>,
        poi_path: impl AsRef<Path>,
        price_path: impl AsRef<Path>,
        prior_path: impl AsRef<Path>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            metadata: Arc::new(JaccardSimilarity::load(metadata_path)?),
            poi: Arc::new(JaccardSimilarity::load(poi_path)?),
            price: Arc::new(PricePointSimilarity::load(price_path)?),
            click_prior: Arc::new(PriorTable::load(prior_path)?),
        })
    }

    /// Empty providers for tests and provider-free shards
    pub fn empty() -> Self {
        Self {
            metadata: Arc::new(JaccardSimilarity::from_map(HashMap::new())),
            poi: Arc::new(JaccardSimilarity::from_map(HashMap::new())),
            price: Arc::new(PricePointSimilarity::from_map(HashMap::new())),
            click_prior: Arc::new(PriorTable::from_map(HashMap::new())),
        }
    }
}
