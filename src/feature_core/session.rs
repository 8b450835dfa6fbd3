//! Session and view-scoped accumulators: click sequences, last-seen context,
//! and position history relative to the current impression list

use super::accumulator::{put, Accumulator, ALL_ACTIONS, CLICKOUT_ACTIONS, ITEM_REFERENCE_ACTIONS};
use crate::types::{ActionType, Candidate, Event, FeatureRow, NO_INDEX};
use std::collections::HashMap;

type UserSession = (String, String);

/// Encodes clicked ranks as runs: a repeated impression set extends the
/// current run, a changed set starts a new one. The query returns the whole
/// accumulated run structure as a JSON sequence-of-sequences.
pub struct ClickSequenceEncoder {
    current_impression: HashMap<UserSession, String>,
    sequences: HashMap<UserSession, Vec<Vec<i64>>>,
}

impl ClickSequenceEncoder {
    pub fn new() -> Self {
        Self {
            current_impression: HashMap::new(),
            sequences: HashMap::new(),
        }
    }
}

impl Accumulator for ClickSequenceEncoder {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        let key = (event.user_id.clone(), event.session_id.clone());
        let same_view = self.current_impression.get(&key).map(String::as_str)
            == Some(event.impressions_raw());

        let runs = self.sequences.entry(key.clone()).or_default();
        if same_view && !runs.is_empty() {
            if let Some(last) = runs.last_mut() {
                last.push(event.index_clicked);
            }
        } else {
            runs.push(vec![event.index_clicked]);
        }
        self.current_impression
            .insert(key, event.impressions_raw().to_string());
    }

    fn query(&self, event: &Event, _candidate: &Candidate, row: &mut FeatureRow) {
        let key = (event.user_id.clone(), event.session_id.clone());
        let empty: Vec<Vec<i64>> = Vec::new();
        let runs = self.sequences.get(&key).unwrap_or(&empty);
        let encoded = serde_json::to_string(runs).unwrap_or_else(|_| "[]".to_string());
        put(row, "click_index_sequence", encoded);
    }
}

/// How many active sessions currently have this item as their most recent
/// clickout. Clicking a different item in a session moves that session's
/// vote from the old item to the new one, so the counter total is conserved.
pub struct LastClickoutStatsInSession {
    last_interaction: HashMap<UserSession, String>,
    counter: HashMap<String, i64>,
}

impl LastClickoutStatsInSession {
    pub fn new() -> Self {
        Self {
            last_interaction: HashMap::new(),
            counter: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn counter_total(&self) -> i64 {
        self.counter.values().sum()
    }
}

impl Accumulator for LastClickoutStatsInSession {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        let item_id = event.reference.clone();
        let key = (event.user_id.clone(), event.session_id.clone());

        match self.last_interaction.get(&key) {
            Some(old_item_id) => {
                let old_item_id = old_item_id.clone();
                self.last_interaction.insert(key, item_id.clone());
                if old_item_id != item_id {
                    *self.counter.entry(old_item_id).or_insert(0) -= 1;
                    *self.counter.entry(item_id).or_insert(0) += 1;
                }
            }
            None => {
                *self.counter.entry(item_id.clone()).or_insert(0) += 1;
                self.last_interaction.insert(key, item_id);
            }
        }
    }

    fn query(&self, _event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        put(
            row,
            "last_clickout_item_stats",
            self.counter.get(&candidate.item_id).copied().unwrap_or(0),
        );
    }
}

/// Letter-coded trail of everything the user has done so far
pub struct ActionTrail {
    trail: HashMap<String, String>,
}

impl ActionTrail {
    pub fn new() -> Self {
        Self {
            trail: HashMap::new(),
        }
    }
}

impl Accumulator for ActionTrail {
    fn action_types(&self) -> &[ActionType] {
        ALL_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        self.trail
            .entry(event.user_id.clone())
            .or_default()
            .push(event.action_type.short_code());
    }

    fn query(&self, event: &Event, _candidate: &Candidate, row: &mut FeatureRow) {
        let codes = self.trail.get(&event.user_id).map_or("", String::as_str);
        put(row, "last_10_actions", format!("q{}x", codes));
    }
}

/// Last sort order the user selected
pub struct LastSortOrder {
    last: HashMap<String, String>,
}

impl LastSortOrder {
    pub fn new() -> Self {
        Self {
            last: HashMap::new(),
        }
    }
}

impl Accumulator for LastSortOrder {
    fn action_types(&self) -> &[ActionType] {
        &[ActionType::ChangeOfSortOrder]
    }

    fn update(&mut self, event: &Event) {
        self.last
            .insert(event.user_id.clone(), event.reference.clone());
    }

    fn query(&self, event: &Event, _candidate: &Candidate, row: &mut FeatureRow) {
        let value = self.last.get(&event.user_id).map_or("UNK", String::as_str);
        put(row, "last_sort_order", value);
    }
}

/// Last filter value the user selected
pub struct LastFilterSelection {
    last: HashMap<String, String>,
}

impl LastFilterSelection {
    pub fn new() -> Self {
        Self {
            last: HashMap::new(),
        }
    }
}

impl Accumulator for LastFilterSelection {
    fn action_types(&self) -> &[ActionType] {
        &[ActionType::FilterSelection]
    }

    fn update(&mut self, event: &Event) {
        self.last
            .insert(event.user_id.clone(), event.reference.clone());
    }

    fn query(&self, event: &Event, _candidate: &Candidate, row: &mut FeatureRow) {
        let value = self.last.get(&event.user_id).map_or("UNK", String::as_str);
        put(row, "last_filter_selection", value);
    }
}

/// Active filter set at the user's last filter/destination/POI search
pub struct LastFilterContext {
    last: HashMap<String, String>,
}

impl LastFilterContext {
    pub fn new() -> Self {
        Self {
            last: HashMap::new(),
        }
    }
}

impl Accumulator for LastFilterContext {
    fn action_types(&self) -> &[ActionType] {
        &[
            ActionType::FilterSelection,
            ActionType::SearchForDestination,
            ActionType::SearchForPoi,
        ]
    }

    fn update(&mut self, event: &Event) {
        self.last.insert(
            event.user_id.clone(),
            event.current_filters_raw().to_string(),
        );
    }

    fn query(&self, event: &Event, _candidate: &Candidate, row: &mut FeatureRow) {
        let value = self.last.get(&event.user_id).map_or("", String::as_str);
        put(row, "last_filter", value);
    }
}

/// Item id of the user's most recent clickout
pub struct LastClickedItem {
    last: HashMap<String, String>,
}

impl LastClickedItem {
    pub fn new() -> Self {
        Self {
            last: HashMap::new(),
        }
    }
}

impl Accumulator for LastClickedItem {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        self.last
            .insert(event.user_id.clone(), event.reference.clone());
    }

    fn query(&self, event: &Event, _candidate: &Candidate, row: &mut FeatureRow) {
        let value = self.last.get(&event.user_id).map_or("0", String::as_str);
        put(row, "last_item_clickout", value);
    }
}

/// Is the user looking at the same impression set as their last clickout?
pub struct SameImpressionFlag {
    last_hash: HashMap<String, String>,
}

impl SameImpressionFlag {
    pub fn new() -> Self {
        Self {
            last_hash: HashMap::new(),
        }
    }
}

impl Accumulator for SameImpressionFlag {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        self.last_hash
            .insert(event.user_id.clone(), event.impressions_hash.clone());
    }

    fn query(&self, event: &Event, _candidate: &Candidate, row: &mut FeatureRow) {
        let same = self.last_hash.get(&event.user_id) == Some(&event.impressions_hash);
        put(row, "is_impression_the_same", same);
    }
}

/// Which impression-set key identifies a view for ImpressionSetClicks
#[derive(Debug, Clone, Copy)]
pub enum ImpressionKey {
    /// Order-insensitive (sorted) set hash
    Hash,
    /// Raw pipe-delimited list, order-sensitive
    Raw,
}

/// Click counts per (impression set, item): how often was this item clicked
/// when exactly this list was shown?
pub struct ImpressionSetClicks {
    name: &'static str,
    keyed_by: ImpressionKey,
    counts: HashMap<(String, String), i64>,
}

impl ImpressionSetClicks {
    pub fn new(name: &'static str, keyed_by: ImpressionKey) -> Self {
        Self {
            name,
            keyed_by,
            counts: HashMap::new(),
        }
    }

    fn view_key(&self, event: &Event) -> String {
        match self.keyed_by {
            ImpressionKey::Hash => event.impressions_hash.clone(),
            ImpressionKey::Raw => event.impressions_raw().to_string(),
        }
    }
}

impl Accumulator for ImpressionSetClicks {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        let key = (self.view_key(event), event.reference.clone());
        *self.counts.entry(key).or_insert(0) += 1;
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (self.view_key(event), candidate.item_id.clone());
        put(row, self.name, self.counts.get(&key).copied().unwrap_or(0));
    }
}

/// Which interaction stream feeds a position-history accumulator
#[derive(Debug, Clone, Copy)]
pub enum ViewKind {
    /// Real clickouts against the clickout impression list
    Clickout,
    /// Any item-reference interaction against the fake impression list
    FakeInteraction,
}

impl ViewKind {
    pub(crate) fn actions(&self) -> &'static [ActionType] {
        match self {
            ViewKind::Clickout => CLICKOUT_ACTIONS,
            ViewKind::FakeInteraction => ITEM_REFERENCE_ACTIONS,
        }
    }

    pub(crate) fn view_raw<'a>(&self, event: &'a Event) -> &'a str {
        match self {
            ViewKind::Clickout => event.impressions_raw(),
            ViewKind::FakeInteraction => event.fake_impressions_raw(),
        }
    }

    pub(crate) fn index(&self, event: &Event) -> i64 {
        match self {
            ViewKind::Clickout => event.index_clicked,
            ViewKind::FakeInteraction => event.fake_index_interacted,
        }
    }
}

const LAST_N: usize = 5;
const PAD_INDEX: i64 = -100;

/// Recency/index history per (user, impression set): the last N interacted
/// ranks, their offsets from the candidate's rank, and the length of the
/// run of consecutive most-recent interactions at the candidate's rank
pub struct IndicesFeatures {
    view: ViewKind,
    prefix: &'static str,
    last_indices: HashMap<(String, String), Vec<i64>>,
}

impl IndicesFeatures {
    pub fn new(view: ViewKind, prefix: &'static str) -> Self {
        Self {
            view,
            prefix,
            last_indices: HashMap::new(),
        }
    }

    fn consecutive_clicks(history: &[i64], rank: i64) -> i64 {
        let mut streak = 0;
        for index in history.iter().rev() {
            if *index == rank {
                streak += 1;
            } else {
                break;
            }
        }
        streak
    }
}

impl Accumulator for IndicesFeatures {
    fn action_types(&self) -> &[ActionType] {
        self.view.actions()
    }

    fn update(&mut self, event: &Event) {
        let index = self.view.index(event);
        if index >= 0 {
            let key = (
                event.user_id.clone(),
                self.view.view_raw(event).to_string(),
            );
            self.last_indices.entry(key).or_default().push(index);
        }
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (
            event.user_id.clone(),
            self.view.view_raw(event).to_string(),
        );
        let history = self.last_indices.get(&key).map_or(&[] as &[i64], Vec::as_slice);

        // Pad to a fixed window so the query shape never depends on history
        let mut padded = vec![PAD_INDEX; LAST_N];
        padded.extend_from_slice(history);
        let padded: Vec<i64> = padded[padded.len() - LAST_N..].to_vec();

        let mut with_rank = padded.clone();
        with_rank.push(candidate.rank);
        let diffs: Vec<i64> = with_rank.windows(2).map(|w| w[1] - w[0]).collect();

        for n in 1..=LAST_N {
            put(
                row,
                &format!("{}last_index_{}", self.prefix, n),
                padded[LAST_N - n],
            );
            put(
                row,
                &format!("{}last_index_diff_{}", self.prefix, n),
                diffs[LAST_N - n],
            );
        }
        put(
            row,
            &format!("{}n_consecutive_clicks", self.prefix),
            Self::consecutive_clicks(history, candidate.rank),
        );
        put(
            row,
            &format!("{}last_index_diff", self.prefix),
            padded[LAST_N - 1] - candidate.rank,
        );
    }
}

/// Offset of the candidate's rank from the user's last clicked rank
pub struct LastClickIndexDelta {
    indices: HashMap<String, Vec<i64>>,
}

impl LastClickIndexDelta {
    pub fn new() -> Self {
        Self {
            indices: HashMap::new(),
        }
    }
}

impl Accumulator for LastClickIndexDelta {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        self.indices
            .entry(event.user_id.clone())
            .or_default()
            .push(event.index_clicked);
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let value = self
            .indices
            .get(&event.user_id)
            .and_then(|v| v.last())
            .map_or(NO_INDEX, |last| last - candidate.rank);
        put(row, "last_item_index", value);
    }
}

/// Same offset computed from fake interaction positions
pub struct FakeLastIndexDelta {
    indices: HashMap<String, Vec<i64>>,
}

impl FakeLastIndexDelta {
    pub fn new() -> Self {
        Self {
            indices: HashMap::new(),
        }
    }
}

impl Accumulator for FakeLastIndexDelta {
    fn action_types(&self) -> &[ActionType] {
        ITEM_REFERENCE_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        self.indices
            .entry(event.user_id.clone())
            .or_default()
            .push(event.fake_index_interacted);
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let value = self
            .indices
            .get(&event.user_id)
            .and_then(|v| v.last())
            .map_or(NO_INDEX, |last| last - candidate.rank);
        put(row, "last_item_fake_index", value);
    }
}

/// Candidate rank minus the last clicked rank within the same exact view
pub struct SameViewClickPosition {
    last: HashMap<(String, String), i64>,
}

impl SameViewClickPosition {
    pub fn new() -> Self {
        Self {
            last: HashMap::new(),
        }
    }
}

impl Accumulator for SameViewClickPosition {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        let key = (event.user_id.clone(), event.impressions_raw().to_string());
        self.last.insert(key, event.index_clicked);
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (event.user_id.clone(), event.impressions_raw().to_string());
        let last = self.last.get(&key).copied().unwrap_or(NO_INDEX);
        put(
            row,
            "last_clicked_item_position_same_view",
            candidate.rank - last,
        );
    }
}

/// Last clicked rank minus candidate rank, scoped to the same exact view
pub struct SameViewIndexDelta {
    lists: HashMap<(String, String), Vec<i64>>,
}

impl SameViewIndexDelta {
    pub fn new() -> Self {
        Self {
            lists: HashMap::new(),
        }
    }
}

impl Accumulator for SameViewIndexDelta {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        let key = (event.user_id.clone(), event.impressions_raw().to_string());
        self.lists.entry(key).or_default().push(event.index_clicked);
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (event.user_id.clone(), event.impressions_raw().to_string());
        let value = self
            .lists
            .get(&key)
            .and_then(|v| v.last())
            .map_or(NO_INDEX, |last| last - candidate.rank);
        put(row, "last_item_index_same_view", value);
    }
}

/// Same-view index delta computed over the fake interaction stream
pub struct SameFakeViewIndexDelta {
    lists: HashMap<(String, String), Vec<i64>>,
}

impl SameFakeViewIndexDelta {
    pub fn new() -> Self {
        Self {
            lists: HashMap::new(),
        }
    }
}

impl Accumulator for SameFakeViewIndexDelta {
    fn action_types(&self) -> &[ActionType] {
        ITEM_REFERENCE_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        let key = (
            event.user_id.clone(),
            event.fake_impressions_raw().to_string(),
        );
        self.lists
            .entry(key)
            .or_default()
            .push(event.fake_index_interacted);
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (
            event.user_id.clone(),
            event.fake_impressions_raw().to_string(),
        );
        let value = self
            .lists
            .get(&key)
            .and_then(|v| v.last())
            .map_or(NO_INDEX, |last| last - candidate.rank);
        put(row, "last_item_index_same_fake_view", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_core::test_util::{candidate, clickout};
    use crate::types::FeatureValue;

    #[test]
    fn test_click_sequence_runs() {
        let mut encoder = ClickSequenceEncoder::new();

        // Same impression set twice -> one run of two clicks
        encoder.update(&clickout("u1", "s1", 100, "2", &["1", "2", "3"], &[10, 20, 30]));
        encoder.update(&clickout("u1", "s1", 110, "3", &["1", "2", "3"], &[10, 20, 30]));
        // Changed set -> new run
        encoder.update(&clickout("u1", "s1", 120, "5", &["5", "6"], &[10, 20]));

        let query = clickout("u1", "s1", 130, "5", &["5", "6"], &[10, 20]);
        let mut row = FeatureRow::new();
        encoder.query(&query, &candidate("5", 0, 10), &mut row);
        assert_eq!(
            row["click_index_sequence"],
            FeatureValue::Text("[[1,2],[0]]".to_string())
        );
    }

    #[test]
    fn test_click_sequence_empty_default() {
        let encoder = ClickSequenceEncoder::new();
        let query = clickout("u9", "s9", 100, "1", &["1"], &[10]);
        let mut row = FeatureRow::new();
        encoder.query(&query, &candidate("1", 0, 10), &mut row);
        assert_eq!(row["click_index_sequence"], FeatureValue::Text("[]".to_string()));
    }

    #[test]
    fn test_last_clickout_counter_toggles_and_conserves() {
        let mut acc = LastClickoutStatsInSession::new();

        acc.update(&clickout("u1", "s1", 100, "X", &["X", "Y"], &[10, 20]));
        assert_eq!(acc.counter_total(), 1);

        // Same session clicks Y: X loses its vote, Y gains it
        acc.update(&clickout("u1", "s1", 110, "Y", &["X", "Y"], &[10, 20]));
        assert_eq!(acc.counter_total(), 1);

        let query = clickout("u2", "s2", 120, "X", &["X", "Y"], &[10, 20]);
        let mut row = FeatureRow::new();
        acc.query(&query, &candidate("X", 0, 10), &mut row);
        assert_eq!(row["last_clickout_item_stats"], FeatureValue::Int(0));

        let mut row = FeatureRow::new();
        acc.query(&query, &candidate("Y", 1, 20), &mut row);
        assert_eq!(row["last_clickout_item_stats"], FeatureValue::Int(1));

        // Second session clicking X brings the total to two active sessions
        acc.update(&clickout("u2", "s2", 120, "X", &["X", "Y"], &[10, 20]));
        assert_eq!(acc.counter_total(), 2);
    }

    #[test]
    fn test_action_trail_encoding() {
        use crate::feature_core::test_util::event;
        use crate::types::ActionType;

        let mut trail = ActionTrail::new();
        trail.update(&event(ActionType::SearchForPoi, "u1", "s1", 100, "poi"));
        trail.update(&event(ActionType::ClickoutItem, "u1", "s1", 110, "1"));

        let query = clickout("u1", "s1", 120, "1", &["1"], &[10]);
        let mut row = FeatureRow::new();
        trail.query(&query, &candidate("1", 0, 10), &mut row);
        assert_eq!(row["last_10_actions"], FeatureValue::Text("qibx".to_string()));
    }

    #[test]
    fn test_indices_features_padding_and_streak() {
        let acc = {
            let mut acc = IndicesFeatures::new(ViewKind::Clickout, "");
            acc.update(&clickout("u1", "s1", 100, "2", &["1", "2", "3"], &[1, 2, 3]));
            acc.update(&clickout("u1", "s1", 110, "2", &["1", "2", "3"], &[1, 2, 3]));
            acc
        };

        let query = clickout("u1", "s1", 120, "2", &["1", "2", "3"], &[1, 2, 3]);
        let mut row = FeatureRow::new();
        acc.query(&query, &candidate("2", 1, 2), &mut row);

        // Two real entries (rank 1 twice), three pads
        assert_eq!(row["last_index_1"], FeatureValue::Int(1));
        assert_eq!(row["last_index_2"], FeatureValue::Int(1));
        assert_eq!(row["last_index_3"], FeatureValue::Int(PAD_INDEX));
        assert_eq!(row["n_consecutive_clicks"], FeatureValue::Int(2));
        assert_eq!(row["last_index_diff"], FeatureValue::Int(0));
        // diff_1 is candidate rank minus most recent rank
        assert_eq!(row["last_index_diff_1"], FeatureValue::Int(0));
    }

    #[test]
    fn test_indices_features_empty_defaults() {
        let acc = IndicesFeatures::new(ViewKind::Clickout, "");
        let query = clickout("u1", "s1", 100, "1", &["1"], &[10]);
        let mut row = FeatureRow::new();
        acc.query(&query, &candidate("1", 0, 10), &mut row);

        assert_eq!(row["last_index_1"], FeatureValue::Int(PAD_INDEX));
        assert_eq!(row["n_consecutive_clicks"], FeatureValue::Int(0));
        assert_eq!(row["last_index_diff"], FeatureValue::Int(PAD_INDEX));
    }

    #[test]
    fn test_same_view_click_position_sentinel() {
        let acc = SameViewClickPosition::new();
        let query = clickout("u1", "s1", 100, "1", &["1", "2"], &[10, 20]);
        let mut row = FeatureRow::new();
        acc.query(&query, &candidate("2", 1, 20), &mut row);
        // rank - (-1000)
        assert_eq!(
            row["last_clicked_item_position_same_view"],
            FeatureValue::Int(1001)
        );
    }

    #[test]
    fn test_last_click_index_delta() {
        let mut acc = LastClickIndexDelta::new();
        acc.update(&clickout("u1", "s1", 100, "3", &["1", "2", "3"], &[1, 2, 3]));

        let query = clickout("u1", "s1", 110, "1", &["1", "2", "3"], &[1, 2, 3]);
        let mut row = FeatureRow::new();
        acc.query(&query, &candidate("1", 0, 1), &mut row);
        assert_eq!(row["last_item_index"], FeatureValue::Int(2));
    }
}
