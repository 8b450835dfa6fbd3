//! Co-interaction accumulators: users related through shared items
//!
//! All three graph accumulators recompute a full per-item count table per
//! clickout, which is expensive, so the result is memoized in a single-slot
//! cache keyed by (user, timestamp). Queries for the candidates of one
//! clickout arrive back-to-back with the same key, so each table is computed
//! exactly once per clickout.
//!
//! BTreeMap/BTreeSet keep iteration order stable so that tie-breaking (and
//! therefore the emitted feature table) is identical across runs.

use super::accumulator::{put, Accumulator, ITEM_REFERENCE_ACTIONS};
use crate::types::{try_int, ActionType, Candidate, Event, FeatureRow};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};

type CacheKey = (String, i64);
type ItemCounts = HashMap<String, i64>;

/// Bipartite user <-> item relation built from reference-bearing interactions
struct CoInteractionGraph {
    items_users: BTreeMap<String, BTreeSet<String>>,
    users_items: BTreeMap<String, BTreeSet<String>>,
}

impl CoInteractionGraph {
    fn new() -> Self {
        Self {
            items_users: BTreeMap::new(),
            users_items: BTreeMap::new(),
        }
    }

    fn record(&mut self, user_id: &str, item_id: &str) {
        self.items_users
            .entry(item_id.to_string())
            .or_default()
            .insert(user_id.to_string());
        self.users_items
            .entry(user_id.to_string())
            .or_default()
            .insert(item_id.to_string());
    }

    fn items_of(&self, user_id: &str) -> Option<&BTreeSet<String>> {
        self.users_items.get(user_id)
    }

    fn users_of(&self, item_id: &str) -> Option<&BTreeSet<String>> {
        self.items_users.get(item_id)
    }
}

/// Single-slot memo: recompute only when the (user, timestamp) key moves on
struct CountTableCache {
    slot: RefCell<Option<(CacheKey, ItemCounts)>>,
    recomputes: Cell<u64>,
}

impl CountTableCache {
    fn new() -> Self {
        Self {
            slot: RefCell::new(None),
            recomputes: Cell::new(0),
        }
    }

    fn lookup(&self, event: &Event, item_id: &str, compute: impl FnOnce() -> ItemCounts) -> i64 {
        let key = (event.user_id.clone(), event.timestamp);
        let mut slot = self.slot.borrow_mut();
        let stale = !matches!(slot.as_ref(), Some((cached, _)) if *cached == key);
        if stale {
            self.recomputes.set(self.recomputes.get() + 1);
            *slot = Some((key, compute()));
        }
        match slot.as_ref() {
            Some((_, counts)) => counts.get(item_id).copied().unwrap_or(0),
            None => 0,
        }
    }
}

/// For every item, how often it was touched by users who share at least one
/// item with the current user
pub struct SimilarUsersItemInteraction {
    graph: CoInteractionGraph,
    cache: CountTableCache,
}

impl SimilarUsersItemInteraction {
    pub fn new() -> Self {
        Self {
            graph: CoInteractionGraph::new(),
            cache: CountTableCache::new(),
        }
    }

    /// Number of full count-table recomputations (cache instrumentation)
    pub fn recompute_count(&self) -> u64 {
        self.cache.recomputes.get()
    }

    fn count_table(&self, event: &Event) -> ItemCounts {
        let mut counts = ItemCounts::new();
        let own_items = match self.graph.items_of(&event.user_id) {
            Some(items) => items,
            None => return counts,
        };
        for item_id in own_items {
            if let Some(users) = self.graph.users_of(item_id) {
                for other in users {
                    if other == &event.user_id {
                        continue;
                    }
                    if let Some(their_items) = self.graph.items_of(other) {
                        for theirs in their_items {
                            *counts.entry(theirs.clone()).or_insert(0) += 1;
                        }
                    }
                }
            }
        }
        counts
    }
}

impl Accumulator for SimilarUsersItemInteraction {
    fn action_types(&self) -> &[ActionType] {
        ITEM_REFERENCE_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        self.graph.record(&event.user_id, &event.reference);
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let value = self
            .cache
            .lookup(event, &candidate.item_id, || self.count_table(event));
        put(row, "similar_users_item_interaction", value);
    }
}

/// Binary indicator: does the single most similar user's item set contain
/// the candidate? "Most similar" is scored by the size of the union of the
/// two users' item sets (preserved as-is from the reference behavior; see
/// DESIGN.md), ties resolved by iteration order.
pub struct MostSimilarUserItemInteraction {
    graph: CoInteractionGraph,
    cache: CountTableCache,
}

impl MostSimilarUserItemInteraction {
    pub fn new() -> Self {
        Self {
            graph: CoInteractionGraph::new(),
            cache: CountTableCache::new(),
        }
    }

    pub fn recompute_count(&self) -> u64 {
        self.cache.recomputes.get()
    }

    fn count_table(&self, event: &Event) -> ItemCounts {
        let mut counts = ItemCounts::new();
        let own_items = match self.graph.items_of(&event.user_id) {
            Some(items) => items,
            None => return counts,
        };

        let mut best_user: Option<&String> = None;
        let mut best_score = 0usize;
        for item_id in own_items {
            if let Some(users) = self.graph.users_of(item_id) {
                for other in users {
                    if other == &event.user_id {
                        continue;
                    }
                    let score = match self.graph.items_of(other) {
                        Some(their_items) => their_items.union(own_items).count(),
                        None => 0,
                    };
                    if score > best_score {
                        best_user = Some(other);
                        best_score = score;
                    }
                }
            }
        }

        if let Some(best) = best_user {
            if let Some(items) = self.graph.items_of(best) {
                for item_id in items {
                    counts.insert(item_id.clone(), 1);
                }
            }
        }
        counts
    }
}

impl Accumulator for MostSimilarUserItemInteraction {
    fn action_types(&self) -> &[ActionType] {
        ITEM_REFERENCE_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        self.graph.record(&event.user_id, &event.reference);
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let value = self
            .cache
            .lookup(event, &candidate.item_id, || self.count_table(event));
        put(row, "most_similar_item_interaction", value);
    }
}

/// Generalization of MostSimilarUserItemInteraction to the k best users by
/// the same union-size score: 1 if the candidate appears in the union of
/// their item sets
pub struct TopKSimilarUsers {
    k: usize,
    name: String,
    graph: CoInteractionGraph,
    cache: CountTableCache,
}

impl TopKSimilarUsers {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            name: format!("most_similar_item_interaction_k_{}", k),
            graph: CoInteractionGraph::new(),
            cache: CountTableCache::new(),
        }
    }

    pub fn recompute_count(&self) -> u64 {
        self.cache.recomputes.get()
    }

    fn count_table(&self, event: &Event) -> ItemCounts {
        let mut counts = ItemCounts::new();
        let own_items = match self.graph.items_of(&event.user_id) {
            Some(items) => items,
            None => return counts,
        };

        let mut scored: Vec<(&String, usize)> = Vec::new();
        for item_id in own_items {
            if let Some(users) = self.graph.users_of(item_id) {
                for other in users {
                    if other == &event.user_id {
                        continue;
                    }
                    let score = match self.graph.items_of(other) {
                        Some(their_items) => their_items.union(own_items).count(),
                        None => 0,
                    };
                    scored.push((other, score));
                }
            }
        }

        // Stable sort keeps encounter order for equal scores
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        for (user, _) in scored.into_iter().take(self.k) {
            if let Some(items) = self.graph.items_of(user) {
                for item_id in items {
                    counts.insert(item_id.clone(), 1);
                }
            }
        }
        counts
    }
}

impl Accumulator for TopKSimilarUsers {
    fn action_types(&self) -> &[ActionType] {
        ITEM_REFERENCE_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        self.graph.record(&event.user_id, &event.reference);
    }

    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        let value = self
            .cache
            .lookup(event, &candidate.item_id, || self.count_table(event));
        put(row, &self.name, value);
    }
}

/// Scope of an interaction-set emitter
#[derive(Debug, Clone, Copy)]
pub enum InteractionScope {
    User,
    Session,
}

/// Emits the user's (or session's) interacted-item set as a JSON array.
/// References are coerced through the safe integer parse; the sets are kept
/// sorted so the encoding is stable.
pub struct UserItemInteractionsList {
    scope: InteractionScope,
    name: &'static str,
    items: HashMap<(String, String), BTreeSet<i64>>,
}

impl UserItemInteractionsList {
    pub fn new(scope: InteractionScope, name: &'static str) -> Self {
        Self {
            scope,
            name,
            items: HashMap::new(),
        }
    }

    fn key(&self, event: &Event) -> (String, String) {
        match self.scope {
            InteractionScope::User => (event.user_id.clone(), String::new()),
            InteractionScope::Session => (event.user_id.clone(), event.session_id.clone()),
        }
    }
}

impl Accumulator for UserItemInteractionsList {
    fn action_types(&self) -> &[ActionType] {
        ITEM_REFERENCE_ACTIONS
    }

    fn update(&mut self, event: &Event) {
        let key = self.key(event);
        self.items
            .entry(key)
            .or_default()
            .insert(try_int(&event.reference));
    }

    fn query(&self, event: &Event, _candidate: &Candidate, row: &mut FeatureRow) {
        let empty = BTreeSet::new();
        let items = self.items.get(&self.key(event)).unwrap_or(&empty);
        let list: Vec<i64> = items.iter().copied().collect();
        let encoded = serde_json::to_string(&list).unwrap_or_else(|_| "[]".to_string());
        put(row, self.name, encoded);
    }
}
