//! Timestamp-based accumulators: recency of actions, items, and views

use super::accumulator::{put, Accumulator, ALL_ACTIONS, CLICKOUT_ACTIONS};
use crate::types::{ActionType, Candidate, Event, FeatureRow, FeatureValue};
use std::collections::{BTreeMap, HashMap};

/// Cap for "time since last seen" when there is no meaningful signal
pub const NO_TIME_SIGNAL: i64 = 1_000_000;

/// Per-user last timestamp of every action kind, queried as a JSON map of
/// elapsed times keyed by the action's short code
pub struct LastEventTimes {
    last: HashMap<String, BTreeMap<char, i64>>,
}

impl LastEventTimes {
    pub fn new() -> Self {
        Self {
            last: HashMap::new(),
        }
    }
}

impl Accumulator for LastEventTimes {
    fn action_types(&self) -> &[ActionType] {
        ALL_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        self.last
            .entry(event.user_id.clone())
            .or_default()
            .insert(event.action_type.short_code(), event.timestamp);
    }

    fn query(&self, event: &Event, _candidate: &Candidate, row: &mut FeatureRow) {
        // BTreeMap keeps the encoding stable across runs
        let mut diffs: BTreeMap<String, i64> = BTreeMap::new();
        if let Some(times) = self.last.get(&event.user_id) {
            for (code, ts) in times {
                diffs.insert(code.to_string(), event.timestamp - ts);
            }
        }
        let encoded = serde_json::to_string(&diffs).unwrap_or_else(|_| "{}".to_string());
        put(row, "last_event_ts", encoded);
    }
}

/// Elapsed time since this user last aimed one action kind at this item,
/// capped at NO_TIME_SIGNAL
pub struct UserItemActionLastSeen {
    actions: [ActionType; 1],
    name: &'static str,
    last: HashMap<(String, String), i64>,
}

impl UserItemActionLastSeen {
    pub fn new(action: ActionType, name: &'static str) -> Self {
        Self {
            actions: [action],
            name,
            last: HashMap::new(),
        }
    }
}

impl Accumulator for UserItemActionLastSeen {
    fn action_types(&self) -> &[ActionType] {
        &self.actions
    }

    fn update(&mut self, event: &Event) {
        self.last.insert(
            (event.user_id.clone(), event.reference.clone()),
            event.timestamp,
        );
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (event.user_id.clone(), candidate.item_id.clone());
        let last_seen = self.last.get(&key).copied().unwrap_or(0);
        let elapsed = (event.timestamp - last_seen).min(NO_TIME_SIGNAL);
        put(row, self.name, elapsed);
    }
}

/// Signed offset (stored minus current, so zero or negative) of the user's
/// last interaction of one kind with this item; 0 when never seen
pub struct ActionTsDelta {
    actions: [ActionType; 1],
    name: &'static str,
    last: HashMap<(String, String), i64>,
}

impl ActionTsDelta {
    pub fn new(action: ActionType, name: &'static str) -> Self {
        Self {
            actions: [action],
            name,
            last: HashMap::new(),
        }
    }
}

impl Accumulator for ActionTsDelta {
    fn action_types(&self) -> &[ActionType] {
        &self.actions
    }

    fn update(&mut self, event: &Event) {
        self.last.insert(
            (event.user_id.clone(), event.reference.clone()),
            event.timestamp,
        );
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let key = (event.user_id.clone(), candidate.item_id.clone());
        let stored = self.last.get(&key).copied().unwrap_or(event.timestamp);
        put(row, self.name, stored - event.timestamp);
    }
}

/// Mean dwell time attributed to an item: when a session moves on to a
/// different item, the elapsed time is credited to the one left behind
pub struct ItemAttentionSpan {
    current_item: HashMap<(String, String), String>,
    current_ts: HashMap<(String, String), i64>,
    dwell_sum: HashMap<String, i64>,
    dwell_count: HashMap<String, i64>,
}

impl ItemAttentionSpan {
    pub fn new() -> Self {
        Self {
            current_item: HashMap::new(),
            current_ts: HashMap::new(),
            dwell_sum: HashMap::new(),
            dwell_count: HashMap::new(),
        }
    }
}

impl Accumulator for ItemAttentionSpan {
    fn action_types(&self) -> &[ActionType] {
        super::accumulator::ITEM_REFERENCE_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        let key = (event.user_id.clone(), event.session_id.clone());
        if let (Some(old_item), Some(old_ts)) =
            (self.current_item.get(&key), self.current_ts.get(&key))
        {
            if *old_item != event.reference {
                *self.dwell_sum.entry(old_item.clone()).or_insert(0) +=
                    event.timestamp - old_ts;
                *self.dwell_count.entry(old_item.clone()).or_insert(0) += 1;
            }
        }
        self.current_item.insert(key.clone(), event.reference.clone());
        self.current_ts.insert(key, event.timestamp);
    }

    fn query(&self, _event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let sum = self.dwell_sum.get(&candidate.item_id).copied().unwrap_or(0);
        let count = self
            .dwell_count
            .get(&candidate.item_id)
            .copied()
            .unwrap_or(0);
        put(
            row,
            "average_item_attention",
            sum as f64 / (count as f64 + 1.0),
        );
    }
}

/// Elapsed time since the user's last clickout on this exact view
pub struct ViewLastClickoutTime {
    last: HashMap<(String, String), i64>,
}

impl ViewLastClickoutTime {
    pub fn new() -> Self {
        Self {
            last: HashMap::new(),
        }
    }
}

impl Accumulator for ViewLastClickoutTime {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        let key = (event.user_id.clone(), event.impressions_raw().to_string());
        self.last.insert(key, event.timestamp);
    }

    fn query(&self, event: &Event, _candidate: &Candidate, row: &mut FeatureRow) {
        let key = (event.user_id.clone(), event.impressions_raw().to_string());
        let last = self.last.get(&key).copied().unwrap_or(0);
        put(row, "last_timestamp_clickout", event.timestamp - last);
    }
}

/// Global per-item recency: when was this item last clicked by anyone, and
/// by whom. The elapsed-time signal is suppressed (Null) when the querying
/// user is the same as the last-clicking user.
pub struct GlobalTimestampPerItem {
    timestamp: HashMap<String, i64>,
    last_user: HashMap<String, String>,
}

impl GlobalTimestampPerItem {
    pub fn new() -> Self {
        Self {
            timestamp: HashMap::new(),
            last_user: HashMap::new(),
        }
    }
}

impl Accumulator for GlobalTimestampPerItem {
    fn action_types(&self) -> &[ActionType] {
        CLICKOUT_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        self.timestamp
            .insert(event.reference.clone(), event.timestamp);
        self.last_user
            .insert(event.reference.clone(), event.user_id.clone());
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let mut time_diff = FeatureValue::Null;
        let mut same_user_diff = FeatureValue::Null;
        let mut last_user = FeatureValue::Null;

        if let Some(ts) = self.timestamp.get(&candidate.item_id) {
            let diff = event.timestamp - ts;
            time_diff = FeatureValue::Int(diff);
            if let Some(user) = self.last_user.get(&candidate.item_id) {
                last_user = FeatureValue::Text(user.clone());
                if *user != event.user_id {
                    same_user_diff = FeatureValue::Int(diff);
                }
            }
        }

        row.insert("last_item_time_diff".to_string(), time_diff);
        row.insert("last_item_time_diff_same_user".to_string(), same_user_diff);
        row.insert("last_item_last_user_id".to_string(), last_user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_core::test_util::{candidate, clickout, event};

    #[test]
    fn test_last_event_times_json() {
        let mut acc = LastEventTimes::new();
        acc.update(&event(ActionType::SearchForPoi, "u1", "s1", 100, "poi"));
        acc.update(&event(ActionType::ClickoutItem, "u1", "s1", 130, "1"));

        let query = clickout("u1", "s1", 150, "1", &["1"], &[10]);
        let mut row = FeatureRow::new();
        acc.query(&query, &candidate("1", 0, 10), &mut row);

        // b = clickout, i = search for poi; sorted by code
        assert_eq!(
            row["last_event_ts"],
            FeatureValue::Text("{\"b\":20,\"i\":50}".to_string())
        );
    }

    #[test]
    fn test_user_item_last_seen_cap() {
        let acc = UserItemActionLastSeen::new(
            ActionType::ClickoutItem,
            "clickout_item_item_last_timestamp",
        );
        let query = clickout("u1", "s1", 500, "1", &["1"], &[10]);
        let mut row = FeatureRow::new();
        acc.query(&query, &candidate("1", 0, 10), &mut row);

        // Unseen item resolves against epoch 0 and is capped
        assert_eq!(
            row["clickout_item_item_last_timestamp"],
            FeatureValue::Int(500)
        );

        let far_future = clickout("u1", "s1", 2_000_000, "1", &["1"], &[10]);
        let mut row = FeatureRow::new();
        acc.query(&far_future, &candidate("1", 0, 10), &mut row);
        assert_eq!(
            row["clickout_item_item_last_timestamp"],
            FeatureValue::Int(NO_TIME_SIGNAL)
        );
    }

    #[test]
    fn test_global_timestamp_same_user_suppression() {
        let mut acc = GlobalTimestampPerItem::new();
        acc.update(&clickout("alice", "s1", 100, "42", &["42"], &[10]));

        // Different user sees the elapsed time
        let other = clickout("bob", "s2", 160, "42", &["42"], &[10]);
        let mut row = FeatureRow::new();
        acc.query(&other, &candidate("42", 0, 10), &mut row);
        assert_eq!(row["last_item_time_diff"], FeatureValue::Int(60));
        assert_eq!(row["last_item_time_diff_same_user"], FeatureValue::Int(60));
        assert_eq!(
            row["last_item_last_user_id"],
            FeatureValue::Text("alice".to_string())
        );

        // Same user gets the suppressed variant
        let same = clickout("alice", "s1", 160, "42", &["42"], &[10]);
        let mut row = FeatureRow::new();
        acc.query(&same, &candidate("42", 0, 10), &mut row);
        assert_eq!(row["last_item_time_diff"], FeatureValue::Int(60));
        assert_eq!(row["last_item_time_diff_same_user"], FeatureValue::Null);
    }

    #[test]
    fn test_action_ts_delta_is_zero_or_negative() {
        let mut acc = ActionTsDelta::new(ActionType::InteractionItemImage, "interaction_img_diff_ts");
        let mut seen = event(ActionType::InteractionItemImage, "u1", "s1", 100, "7");
        seen.reference = "7".to_string();
        acc.update(&seen);

        let query = clickout("u1", "s1", 150, "7", &["7", "8"], &[10, 20]);
        let mut row = FeatureRow::new();
        acc.query(&query, &candidate("7", 0, 10), &mut row);
        assert_eq!(row["interaction_img_diff_ts"], FeatureValue::Int(-50));

        let mut row = FeatureRow::new();
        acc.query(&query, &candidate("8", 1, 20), &mut row);
        assert_eq!(row["interaction_img_diff_ts"], FeatureValue::Int(0));
    }

    #[test]
    fn test_item_attention_span_credits_previous_item() {
        let mut acc = ItemAttentionSpan::new();
        acc.update(&event(ActionType::InteractionItemImage, "u1", "s1", 100, "A"));
        acc.update(&event(ActionType::InteractionItemImage, "u1", "s1", 130, "B"));

        let query = clickout("u1", "s1", 140, "A", &["A", "B"], &[10, 20]);
        let mut row = FeatureRow::new();
        acc.query(&query, &candidate("A", 0, 10), &mut row);
        // 30s of dwell over (1 visit + 1) smoothing
        assert_eq!(row["average_item_attention"], FeatureValue::Float(15.0));
    }

    #[test]
    fn test_global_timestamp_unseen_item_nulls() {
        let acc = GlobalTimestampPerItem::new();
        let query = clickout("u1", "s1", 100, "1", &["1"], &[10]);
        let mut row = FeatureRow::new();
        acc.query(&query, &candidate("1", 0, 10), &mut row);

        assert_eq!(row["last_item_time_diff"], FeatureValue::Null);
        assert_eq!(row["last_item_time_diff_same_user"], FeatureValue::Null);
        assert_eq!(row["last_item_last_user_id"], FeatureValue::Null);
    }
}
