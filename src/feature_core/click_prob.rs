//! Position/time-offset click probability backed by an external prior table

use super::accumulator::{put, Accumulator, CLICKOUT_ACTIONS, ITEM_REFERENCE_ACTIONS};
use super::session::ViewKind;
use crate::providers::PriorTable;
use crate::types::{ActionType, Candidate, Event, FeatureRow};
use std::collections::HashMap;
use std::sync::Arc;

/// Bucket a time delta onto the prior table's grid. Finer buckets near zero,
/// coarser further out, capped at 1800s.
pub(crate) fn time_bucket(delta: i64) -> i64 {
    let delta = delta.max(0);
    if delta <= 10 {
        delta
    } else if delta <= 60 {
        delta / 5 * 5
    } else if delta <= 300 {
        delta / 15 * 15
    } else if delta <= 1800 {
        delta / 60 * 60
    } else {
        1800
    }
}

/// Retry bucket used when the exact time bucket has no prior
const FALLBACK_TIME_BUCKET: i64 = 120;

/// Static per-rank fallback when the prior table has no usable entry
fn default_click_prob(rank: i64) -> f64 {
    match rank {
        0 => 0.30,
        1 => 0.20,
        2 => 0.10,
        3 => 0.07,
        4 => 0.05,
        5 => 0.03,
        _ => 0.03,
    }
}

/// Looks up the prior probability of a click at the candidate's position
/// given the offset from the user's previous click on the same view and the
/// bucketed time elapsed since it. Falls back to the 120s bucket, then to
/// the static rank table; a changed impression set skips the temporal
/// lookup entirely.
pub struct ClickOffsetProbability {
    name: &'static str,
    view: ViewKind,
    current_impression: HashMap<String, String>,
    last_timestamp: HashMap<(String, String), i64>,
    last_position: HashMap<(String, String), i64>,
    prior: Arc<PriorTable>,
}

impl ClickOffsetProbability {
    pub fn new(name: &'static str, view: ViewKind, prior: Arc<PriorTable>) -> Self {
        Self {
            name,
            view,
            current_impression: HashMap::new(),
            last_timestamp: HashMap::new(),
            last_position: HashMap::new(),
            prior,
        }
    }
}

impl Accumulator for ClickOffsetProbability {
    fn action_types(&self) -> &[ActionType] {
        match self.view {
            ViewKind::Clickout => CLICKOUT_ACTIONS,
            ViewKind::FakeInteraction => ITEM_REFERENCE_ACTIONS,
        }
    }

    fn update(&mut self, event: &Event) {
        let raw = self.view.view_raw(event).to_string();
        self.current_impression
            .insert(event.user_id.clone(), raw.clone());
        let key = (event.user_id.clone(), raw);
        self.last_timestamp.insert(key.clone(), event.timestamp);
        self.last_position.insert(key, self.view.index(event));
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let raw = self.view.view_raw(event);
        let tracked = self
            .current_impression
            .get(&event.user_id)
            .map(String::as_str);

        let prob = if tracked == Some(raw) {
            let key = (event.user_id.clone(), raw.to_string());
            match (self.last_timestamp.get(&key), self.last_position.get(&key)) {
                (Some(t1), Some(c1)) => {
                    let bucket = time_bucket(event.timestamp - t1);
                    let click_offset = candidate.rank - c1;
                    self.prior
                        .get(click_offset, bucket)
                        .or_else(|| self.prior.get(click_offset, FALLBACK_TIME_BUCKET))
                        .unwrap_or_else(|| default_click_prob(candidate.rank))
                }
                _ => default_click_prob(candidate.rank),
            }
        } else {
            // No temporal signal for this view
            default_click_prob(candidate.rank)
        };

        put(row, self.name, prob);
    }
}
