//! Core event and feature types shared across the engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Interaction event kinds, serialized with the raw log labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "change of sort order")]
    ChangeOfSortOrder,
    #[serde(rename = "clickout item")]
    ClickoutItem,
    #[serde(rename = "filter selection")]
    FilterSelection,
    #[serde(rename = "interaction item deals")]
    InteractionItemDeals,
    #[serde(rename = "interaction item rating")]
    InteractionItemRating,
    #[serde(rename = "interaction item image")]
    InteractionItemImage,
    #[serde(rename = "interaction item info")]
    InteractionItemInfo,
    #[serde(rename = "search for destination")]
    SearchForDestination,
    #[serde(rename = "search for item")]
    SearchForItem,
    #[serde(rename = "search for poi")]
    SearchForPoi,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::ChangeOfSortOrder => "change of sort order",
            ActionType::ClickoutItem => "clickout item",
            ActionType::FilterSelection => "filter selection",
            ActionType::InteractionItemDeals => "interaction item deals",
            ActionType::InteractionItemRating => "interaction item rating",
            ActionType::InteractionItemImage => "interaction item image",
            ActionType::InteractionItemInfo => "interaction item info",
            ActionType::SearchForDestination => "search for destination",
            ActionType::SearchForItem => "search for item",
            ActionType::SearchForPoi => "search for poi",
        }
    }

    /// Underscored variant of the label, used in feature names
    pub fn snake_name(&self) -> String {
        self.as_str().replace(' ', "_")
    }

    /// One-letter code used by the action-trail encoder
    pub fn short_code(&self) -> char {
        match self {
            ActionType::ChangeOfSortOrder => 'a',
            ActionType::ClickoutItem => 'b',
            ActionType::FilterSelection => 'c',
            ActionType::InteractionItemDeals => 'd',
            ActionType::InteractionItemImage => 'e',
            ActionType::InteractionItemInfo => 'f',
            ActionType::SearchForDestination => 'g',
            ActionType::SearchForItem => 'h',
            ActionType::SearchForPoi => 'i',
            ActionType::InteractionItemRating => 'j',
        }
    }

    pub fn all() -> [ActionType; 10] {
        [
            ActionType::ChangeOfSortOrder,
            ActionType::ClickoutItem,
            ActionType::FilterSelection,
            ActionType::InteractionItemDeals,
            ActionType::InteractionItemRating,
            ActionType::InteractionItemImage,
            ActionType::InteractionItemInfo,
            ActionType::SearchForDestination,
            ActionType::SearchForItem,
            ActionType::SearchForPoi,
        ]
    }

    /// Actions whose `reference` field carries an item id
    pub fn item_reference_actions() -> [ActionType; 6] {
        [
            ActionType::SearchForItem,
            ActionType::InteractionItemInfo,
            ActionType::InteractionItemImage,
            ActionType::InteractionItemDeals,
            ActionType::InteractionItemRating,
            ActionType::ClickoutItem,
        ]
    }

    pub fn has_item_reference(&self) -> bool {
        matches!(
            self,
            ActionType::SearchForItem
                | ActionType::InteractionItemInfo
                | ActionType::InteractionItemImage
                | ActionType::InteractionItemDeals
                | ActionType::InteractionItemRating
                | ActionType::ClickoutItem
        )
    }
}

/// Rank sentinel when the reference is absent from the impression list
pub const NO_INDEX: i64 = -1000;

/// One row of the interaction log, as produced by the external loader.
///
/// The loader resolves timestamps to integer epochs but does NOT split the
/// pipe-delimited impression/price strings. The assembler performs the split
/// and fills in the `serde(skip)` fields before any accumulator sees the
/// event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub user_id: String,
    pub session_id: String,
    pub timestamp: i64,
    pub action_type: ActionType,
    #[serde(default)]
    pub reference: String,
    /// Pipe-delimited impressions, present only for clickout events
    #[serde(default)]
    pub impressions: Option<String>,
    /// Pipe-delimited prices, aligned index-for-index with impressions
    #[serde(default)]
    pub prices: Option<String>,
    /// Impressions visible during non-clickout item interactions,
    /// precomputed by the loader
    #[serde(default)]
    pub fake_impressions: Option<String>,
    #[serde(default)]
    pub current_filters: Option<String>,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub step: i64,
    #[serde(default)]
    pub step_from_end: i64,
    #[serde(default)]
    pub max_step: i64,
    /// Held-out flag: the event receives feature queries but must never
    /// mutate accumulator state. Loaders emit it as a bool or a 0/1 int.
    #[serde(default, deserialize_with = "bool_or_int")]
    pub is_test: bool,

    // Derived fields, computed once per event by FeatureAssembler::enrich
    #[serde(skip)]
    pub impression_list: Vec<String>,
    #[serde(skip)]
    pub price_list: Vec<i64>,
    #[serde(skip)]
    pub impressions_hash: String,
    #[serde(skip)]
    pub index_clicked: i64,
    #[serde(skip)]
    pub price_clicked: i64,
    #[serde(skip)]
    pub fake_impression_list: Vec<String>,
    #[serde(skip)]
    pub fake_index_interacted: i64,
}

impl Event {
    /// Parse an Event from a JSONL line
    pub fn from_jsonl(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn impressions_raw(&self) -> &str {
        self.impressions.as_deref().unwrap_or("")
    }

    pub fn fake_impressions_raw(&self) -> &str {
        self.fake_impressions.as_deref().unwrap_or("")
    }

    pub fn current_filters_raw(&self) -> &str {
        self.current_filters.as_deref().unwrap_or("")
    }
}

/// One (item, rank, price) triple from a clickout's impression list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub item_id: String,
    pub rank: i64,
    pub price: i64,
}

/// Scalar feature value; `Null` marks deliberately suppressed signals
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Int(v)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Int(v as i64)
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Text(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

/// Named feature values for one candidate; BTreeMap keeps serialization
/// order deterministic across runs
pub type FeatureRow = BTreeMap<String, FeatureValue>;

/// One output row: clickout context + candidate attributes + accumulator
/// features, with transient parsing fields already stripped
#[derive(Debug, Clone, Serialize)]
pub struct FeatureRecord {
    pub clickout_id: u64,
    pub user_id: String,
    pub session_id: String,
    pub timestamp: i64,
    pub platform: String,
    pub current_filters: String,
    pub step: i64,
    pub step_from_end: i64,
    pub max_step: i64,
    pub item_id: String,
    pub item_id_clicked: String,
    pub rank: i64,
    pub price: i64,
    pub was_clicked: i64,
    #[serde(flatten)]
    pub features: FeatureRow,
}

/// Safe integer parse: unparsable references resolve to -1, never an error
pub fn try_int(value: &str) -> i64 {
    value.parse::<i64>().unwrap_or(-1)
}

fn bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrInt {
        Bool(bool),
        Int(i64),
    }

    Ok(match BoolOrInt::deserialize(deserializer)? {
        BoolOrInt::Bool(b) => b,
        BoolOrInt::Int(n) => n != 0,
    })
}
