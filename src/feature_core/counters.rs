//! CTR-style and keyed interaction counters
//!
//! All counters resolve absent keys to 0 and smooth ratios by adding 1 to
//! the denominator, so a query can never divide by zero or fail.

use super::accumulator::{put, Accumulator, CLICKOUT_ACTIONS, ITEM_REFERENCE_ACTIONS};
use crate::types::{ActionType, Candidate, Event, FeatureRow};
use std::collections::{HashMap, HashSet};

/// Global per-item click and impression counts with a smoothed ratio
pub struct ItemCtr {
    clicks: HashMap<String, i64>,
    impressions: HashMap<String, i64>,
}

impl ItemCtr {
    pub fn new() -> Self {
        Self {
            clicks: HashMap::new(),
            impressions: HashMap::new(),
        }
    }
}

impl Accumulator for ItemCtr {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        *self.clicks.entry(event.reference.clone()).or_insert(0) += 1;
        for item_id in &event.impression_list {
            *self.impressions.entry(item_id.clone()).or_insert(0) += 1;
        }
    }

    fn query(&self, _event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let clicks = self.clicks.get(&candidate.item_id).copied().unwrap_or(0);
        let impressions = self
            .impressions
            .get(&candidate.item_id)
            .copied()
            .unwrap_or(0);
        put(row, "clickout_item_clicks", clicks);
        put(row, "clickout_item_impressions", impressions);
        put(
            row,
            "clickout_item_ctr",
            clicks as f64 / (impressions as f64 + 1.0),
        );
    }
}

/// Per-(item, platform) click and impression counts with a smoothed ratio
pub struct ItemCtrByPlatform {
    clicks: HashMap<(String, String), i64>,
    impressions: HashMap<(String, String), i64>,
}

impl ItemCtrByPlatform {
    pub fn new() -> Self {
        Self {
            clicks: HashMap::new(),
            impressions: HashMap::new(),
        }
    }
}

impl Accumulator for ItemCtrByPlatform {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        *self
            .clicks
            .entry((event.reference.clone(), event.platform.clone()))
            .or_insert(0) += 1;
        for item_id in &event.impression_list {
            *self
                .impressions
                .entry((item_id.clone(), event.platform.clone()))
                .or_insert(0) += 1;
        }
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (candidate.item_id.clone(), event.platform.clone());
        let clicks = self.clicks.get(&key).copied().unwrap_or(0);
        let impressions = self.impressions.get(&key).copied().unwrap_or(0);
        put(row, "clickout_item_clicks_by_platform", clicks);
        put(row, "clickout_item_impressions_by_platform", impressions);
        put(
            row,
            "clickout_item_ctr_by_platform",
            clicks as f64 / (impressions as f64 + 1.0),
        );
    }
}

/// How many times this user clicked this exact item
pub struct UserItemClicks {
    counts: HashMap<(String, String), i64>,
}

impl UserItemClicks {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl Accumulator for UserItemClicks {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        *self
            .counts
            .entry((event.user_id.clone(), event.reference.clone()))
            .or_insert(0) += 1;
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (event.user_id.clone(), candidate.item_id.clone());
        put(
            row,
            "clickout_user_item_clicks",
            self.counts.get(&key).copied().unwrap_or(0),
        );
    }
}

/// How many times this user was shown this item in any impression list
pub struct UserItemImpressions {
    counts: HashMap<(String, String), i64>,
}

impl UserItemImpressions {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl Accumulator for UserItemImpressions {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        for item_id in &event.impression_list {
            *self
                .counts
                .entry((event.user_id.clone(), item_id.clone()))
                .or_insert(0) += 1;
        }
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (event.user_id.clone(), candidate.item_id.clone());
        put(
            row,
            "clickout_user_item_impressions",
            self.counts.get(&key).copied().unwrap_or(0),
        );
    }
}

/// Binary flag: was the user's most recent <action> aimed at this item?
pub struct InteractionFlag {
    actions: [ActionType; 1],
    name: &'static str,
    last_reference: HashMap<String, String>,
}

impl InteractionFlag {
    pub fn new(action: ActionType, name: &'static str) -> Self {
        Self {
            actions: [action],
            name,
            last_reference: HashMap::new(),
        }
    }
}

impl Accumulator for InteractionFlag {
    fn action_types(&self) -> &[ActionType] {
        &self.actions
    }

    fn update(&mut self, event: &Event) {
        self.last_reference
            .insert(event.user_id.clone(), event.reference.clone());
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let hit = self.last_reference.get(&event.user_id) == Some(&candidate.item_id);
        put(row, self.name, hit);
    }
}

/// Per-(user, item) frequency of one interaction kind
pub struct InteractionFreq {
    actions: [ActionType; 1],
    name: &'static str,
    counts: HashMap<(String, String), i64>,
}

impl InteractionFreq {
    pub fn new(action: ActionType, name: &'static str) -> Self {
        Self {
            actions: [action],
            name,
            counts: HashMap::new(),
        }
    }
}

impl Accumulator for InteractionFreq {
    fn action_types(&self) -> &[ActionType] {
        &self.actions
    }

    fn update(&mut self, event: &Event) {
        *self
            .counts
            .entry((event.user_id.clone(), event.reference.clone()))
            .or_insert(0) += 1;
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (event.user_id.clone(), candidate.item_id.clone());
        put(row, self.name, self.counts.get(&key).copied().unwrap_or(0));
    }
}

/// Which list positions does this user tend to click?
pub struct RankPreference {
    counts: HashMap<(String, i64), i64>,
}

impl RankPreference {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl Accumulator for RankPreference {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        *self
            .counts
            .entry((event.user_id.clone(), event.index_clicked))
            .or_insert(0) += 1;
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (event.user_id.clone(), candidate.rank);
        put(
            row,
            "user_rank_preference",
            self.counts.get(&key).copied().unwrap_or(0),
        );
    }
}

/// Rank preference over non-clickout item interactions (fake view positions)
pub struct FakeRankPreference {
    counts: HashMap<(String, i64), i64>,
}

impl FakeRankPreference {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl Accumulator for FakeRankPreference {
    fn action_types(&self) -> &[ActionType] {
        ITEM_REFERENCE_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        *self
            .counts
            .entry((event.user_id.clone(), event.fake_index_interacted))
            .or_insert(0) += 1;
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (event.user_id.clone(), candidate.rank);
        put(
            row,
            "user_fake_rank_preference",
            self.counts.get(&key).copied().unwrap_or(0),
        );
    }
}

/// Rank preference scoped to the current session
pub struct SessionRankPreference {
    counts: HashMap<(String, String, i64), i64>,
}

impl SessionRankPreference {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl Accumulator for SessionRankPreference {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        *self
            .counts
            .entry((
                event.user_id.clone(),
                event.session_id.clone(),
                event.index_clicked,
            ))
            .or_insert(0) += 1;
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (
            event.user_id.clone(),
            event.session_id.clone(),
            candidate.rank,
        );
        put(
            row,
            "user_session_rank_preference",
            self.counts.get(&key).copied().unwrap_or(0),
        );
    }
}

/// Rank preference scoped to one exact impression set
pub struct ImpressionRankPreference {
    counts: HashMap<(String, String, i64), i64>,
}

impl ImpressionRankPreference {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl Accumulator for ImpressionRankPreference {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        *self
            .counts
            .entry((
                event.user_id.clone(),
                event.impressions_hash.clone(),
                event.index_clicked,
            ))
            .or_insert(0) += 1;
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (
            event.user_id.clone(),
            event.impressions_hash.clone(),
            candidate.rank,
        );
        put(
            row,
            "user_impression_rank_preference",
            self.counts.get(&key).copied().unwrap_or(0),
        );
    }
}

/// Per-user count of one action kind
pub struct ActionCounter {
    actions: [ActionType; 1],
    name: String,
    counts: HashMap<String, i64>,
}

impl ActionCounter {
    pub fn new(action: ActionType) -> Self {
        Self {
            actions: [action],
            name: format!("{}_count", action.snake_name()),
            counts: HashMap::new(),
        }
    }
}

impl Accumulator for ActionCounter {
    fn action_types(&self) -> &[ActionType] {
        &self.actions
    }

    fn update(&mut self, event: &Event) {
        *self.counts.entry(event.user_id.clone()).or_insert(0) += 1;
    }

    fn query(&self, event: &Event, _candidate: &Candidate, row: &mut FeatureRow) {
        put(
            row,
            &self.name,
            self.counts.get(&event.user_id).copied().unwrap_or(0),
        );
    }
}

/// Secondary dimension tracked by DistinctInteractions
#[derive(Debug, Clone, Copy)]
pub enum DistinctBy {
    Timestamp,
    Session,
}

impl DistinctBy {
    fn as_str(&self) -> &'static str {
        match self {
            DistinctBy::Timestamp => "timestamp",
            DistinctBy::Session => "session_id",
        }
    }
}

/// Number of distinct timestamps/sessions in which this user interacted
/// with this item via one action kind
pub struct DistinctInteractions {
    actions: [ActionType; 1],
    by: DistinctBy,
    name: String,
    seen: HashMap<(String, String), HashSet<String>>,
}

impl DistinctInteractions {
    pub fn new(action: ActionType, by: DistinctBy) -> Self {
        Self {
            actions: [action],
            by,
            name: format!("{}_unique_num_by_{}", action.snake_name(), by.as_str()),
            seen: HashMap::new(),
        }
    }
}

impl Accumulator for DistinctInteractions {
    fn action_types(&self) -> &[ActionType] {
        &self.actions
    }

    fn update(&mut self, event: &Event) {
        let key = (event.user_id.clone(), event.reference.clone());
        let value = match self.by {
            DistinctBy::Timestamp => event.timestamp.to_string(),
            DistinctBy::Session => event.session_id.clone(),
        };
        self.seen.entry(key).or_default().insert(value);
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (event.user_id.clone(), candidate.item_id.clone());
        let distinct = self.seen.get(&key).map_or(0, |s| s.len() as i64);
        put(row, &self.name, distinct);
    }
}
