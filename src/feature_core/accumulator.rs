//! Accumulator contract and shared action-type sets

use crate::types::{ActionType, Candidate, Event, FeatureRow, FeatureValue};

/// Clickout-only interest set
pub const CLICKOUT_ACTIONS: &[ActionType] = &[ActionType::ClickoutItem];

/// Actions whose `reference` carries an item id
pub const ITEM_REFERENCE_ACTIONS: &[ActionType] = &[
    ActionType::SearchForItem,
    ActionType::InteractionItemInfo,
    ActionType::InteractionItemImage,
    ActionType::InteractionItemDeals,
    ActionType::InteractionItemRating,
    ActionType::ClickoutItem,
];

/// Every action type
pub const ALL_ACTIONS: &[ActionType] = &[
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
];

/// A stateful aggregate over the event stream, queryable per candidate.
///
/// Accumulators are constructed empty before processing starts, mutated only
/// through their own `update`, and discarded at process end. At the moment an
/// accumulator is queried for event E, its state reflects only events
/// strictly earlier than E.
pub trait Accumulator {
    /// Static declaration of the action types this accumulator is updated
    /// for; used by the registry for dispatch
    fn action_types(&self) -> &[ActionType];

    /// Fold one event into internal state. Never called for uninteresting
    /// action types or held-out events.
    fn update(&mut self, event: &Event);

    /// Write this accumulator's features for one candidate into `row`.
    /// Must never fail: absent keys resolve to documented defaults.
    fn query(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow);
}

/// Insert helper keeping call sites terse
pub(crate) fn put(row: &mut FeatureRow, name: &str, value: impl Into<FeatureValue>) {
    row.insert(name.to_string(), value.into());
}
