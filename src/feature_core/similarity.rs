//! Provider-backed similarity accumulators and local price features

use super::accumulator::{put, Accumulator, CLICKOUT_ACTIONS, ITEM_REFERENCE_ACTIONS};
use crate::providers::{SimilarityProvider, NO_PRICE_SIGNAL};
use crate::types::{try_int, ActionType, Candidate, Event, FeatureRow, FeatureValue};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Which locally tracked item set the provider is evaluated against
#[derive(Debug, Clone, Copy)]
pub enum SimilarityMode {
    /// Pairwise similarity to the user's last clicked item
    LastClicked,
    /// Mean similarity to everything the user interacted with
    AllInteracted,
    /// Mean similarity to this session's interacted items
    SessionInteracted,
    /// Size of the candidate's attribute set (no local state consulted)
    AttributeCount,
}

/// One similarity feature: an external provider combined with locally
/// tracked last-clicked / interacted / session-interacted item sets
pub struct ProviderSimilarity {
    name: &'static str,
    mode: SimilarityMode,
    provider: Arc<dyn SimilarityProvider>,
    last_clickout: HashMap<String, i64>,
    interacted: HashMap<String, BTreeSet<i64>>,
    session_interacted: HashMap<(String, String), BTreeSet<i64>>,
}

impl ProviderSimilarity {
    pub fn new(
        name: &'static str,
        mode: SimilarityMode,
        provider: Arc<dyn SimilarityProvider>,
    ) -> Self {
        Self {
            name,
            mode,
            provider,
            last_clickout: HashMap::new(),
            interacted: HashMap::new(),
            session_interacted: HashMap::new(),
        }
    }
}

impl Accumulator for ProviderSimilarity {
    fn action_types(&self) -> &[ActionType] {
        ITEM_REFERENCE_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        let item = try_int(&event.reference);
        if event.action_type == ActionType::ClickoutItem {
            self.last_clickout.insert(event.user_id.clone(), item);
        }
        self.interacted
            .entry(event.user_id.clone())
            .or_default()
            .insert(item);
        self.session_interacted
            .entry((event.user_id.clone(), event.session_id.clone()))
            .or_default()
            .insert(item);
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let item = try_int(&candidate.item_id);
        let value = match self.mode {
            SimilarityMode::LastClicked => {
                let last = self
                    .last_clickout
                    .get(&event.user_id)
                    .copied()
                    .unwrap_or(0);
                FeatureValue::Float(self.provider.pairwise(last, item))
            }
            SimilarityMode::AllInteracted => {
                let items: Vec<i64> = self
                    .interacted
                    .get(&event.user_id)
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default();
                FeatureValue::Float(self.provider.aggregate(&items, item))
            }
            SimilarityMode::SessionInteracted => {
                let key = (event.user_id.clone(), event.session_id.clone());
                let items: Vec<i64> = self
                    .session_interacted
                    .get(&key)
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default();
                FeatureValue::Float(self.provider.aggregate(&items, item))
            }
            SimilarityMode::AttributeCount => {
                FeatureValue::Int(self.provider.attribute_count(item))
            }
        };
        row.insert(self.name.to_string(), value);
    }
}

/// POI-conditioned click statistics: what does this user's last POI search
/// say about the candidate?
pub struct PoiFeatures {
    last_poi: HashMap<String, String>,
    clicks: HashMap<(String, String), i64>,
    impressions: HashMap<(String, String), i64>,
}

impl PoiFeatures {
    pub fn new() -> Self {
        Self {
            last_poi: HashMap::new(),
            clicks: HashMap::new(),
            impressions: HashMap::new(),
        }
    }

    fn poi_of(&self, user_id: &str) -> &str {
        self.last_poi.get(user_id).map_or("UNK", String::as_str)
    }
}

impl Accumulator for PoiFeatures {
    fn action_types(&self) -> &[ActionType] {
        &[ActionType::SearchForPoi, ActionType::ClickoutItem]
    }

    fn update(&mut self, event: &Event) {
        match event.action_type {
            ActionType::SearchForPoi => {
                self.last_poi
                    .insert(event.user_id.clone(), event.reference.clone());
            }
            ActionType::ClickoutItem => {
                let poi = self.poi_of(&event.user_id).to_string();
                *self
                    .clicks
                    .entry((poi.clone(), event.reference.clone()))
                    .or_insert(0) += 1;
                for item_id in &event.impression_list {
                    *self
                        .impressions
                        .entry((poi.clone(), item_id.clone()))
                        .or_insert(0) += 1;
                }
            }
            _ => {}
        }
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let poi = self.poi_of(&event.user_id).to_string();
        let clicks = self
            .clicks
            .get(&(poi.clone(), candidate.item_id.clone()))
            .copied()
            .unwrap_or(0);
        let impressions = self
            .impressions
            .get(&(poi.clone(), candidate.item_id.clone()))
            .copied()
            .unwrap_or(0);

        put(row, "last_poi", poi);
        put(row, "last_poi_item_clicks", clicks);
        put(row, "last_poi_item_impressions", impressions);
        put(
            row,
            "last_poi_ctr",
            clicks as f64 / (impressions as f64 + 1.0),
        );
    }
}

/// Price distance between the candidate and the user's clicked-price history
pub struct PriceSimilarity {
    last_prices: HashMap<String, Vec<i64>>,
}

impl PriceSimilarity {
    pub fn new() -> Self {
        Self {
            last_prices: HashMap::new(),
        }
    }
}

impl Accumulator for PriceSimilarity {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        self.last_prices
            .entry(event.user_id.clone())
            .or_default()
            .push(event.price_clicked);
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        match self.last_prices.get(&event.user_id) {
            Some(prices) if !prices.is_empty() => {
                let distinct: BTreeSet<i64> = prices.iter().copied().collect();
                let total: i64 = distinct.iter().map(|p| (p - candidate.price).abs()).sum();
                let avg = total as f64 / distinct.len() as f64;
                let last_diff = prices[prices.len() - 1] - candidate.price;
                put(row, "avg_price_similarity", avg);
                put(row, "last_price_diff", last_diff);
            }
            _ => {
                put(row, "avg_price_similarity", NO_PRICE_SIGNAL);
                put(row, "last_price_diff", NO_PRICE_SIGNAL as i64);
            }
        }
    }
}

/// Stateless price position within the current impression list
pub struct PriceFeatures;

impl PriceFeatures {
    pub fn new() -> Self {
        Self
    }
}

impl Accumulator for PriceFeatures {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, _event: &Event) {}

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        if event.price_list.is_empty() {
            put(row, "price_vs_max_price", 0);
            put(row, "price_vs_mean_price", 0.0);
            return;
        }
        let max_price = event.price_list.iter().copied().max().unwrap_or(0);
        let mean_price =
            event.price_list.iter().sum::<i64>() as f64 / event.price_list.len() as f64;
        put(row, "price_vs_max_price", max_price - candidate.price);
        put(
            row,
            "price_vs_mean_price",
            candidate.price as f64 / mean_price,
        );
    }
}
