//! Accumulator registry: ownership, dispatch by action type, and sharding

use super::accumulator::Accumulator;
use super::click_prob::ClickOffsetProbability;
use super::counters::{
    ActionCounter, DistinctBy, DistinctInteractions, FakeRankPreference, ImpressionRankPreference,
    InteractionFlag, InteractionFreq, ItemCtr, ItemCtrByPlatform, RankPreference,
    SessionRankPreference, UserItemClicks, UserItemImpressions,
};
use super::covisit::{
    InteractionScope, MostSimilarUserItemInteraction, SimilarUsersItemInteraction,
    TopKSimilarUsers, UserItemInteractionsList,
};
use super::session::{
    ActionTrail, ClickSequenceEncoder, FakeLastIndexDelta, ImpressionKey, ImpressionSetClicks,
    IndicesFeatures, LastClickIndexDelta, LastClickedItem, LastClickoutStatsInSession,
    LastFilterContext, LastFilterSelection, LastSortOrder, SameFakeViewIndexDelta,
    SameImpressionFlag, SameViewClickPosition, SameViewIndexDelta, ViewKind,
};
use super::similarity::{
    PoiFeatures, PriceFeatures, PriceSimilarity, ProviderSimilarity, SimilarityMode,
};
use super::timing::{
    ActionTsDelta, GlobalTimestampPerItem, ItemAttentionSpan, LastEventTimes,
    UserItemActionLastSeen, ViewLastClickoutTime,
};
use crate::providers::ProviderSet;
use crate::types::{ActionType, Candidate, Event, FeatureRow};
use std::collections::HashMap;

/// Owns the accumulator set and dispatches updates by interested action type
pub struct AccumulatorRegistry {
    accumulators: Vec<Box<dyn Accumulator>>,
    by_action: HashMap<ActionType, Vec<usize>>,
}

impl AccumulatorRegistry {
    pub fn new(accumulators: Vec<Box<dyn Accumulator>>) -> Self {
        let mut by_action: HashMap<ActionType, Vec<usize>> = HashMap::new();
        for (index, acc) in accumulators.iter().enumerate() {
            for action in acc.action_types() {
                by_action.entry(*action).or_default().push(index);
            }
        }
        Self {
            accumulators,
            by_action,
        }
    }

    pub fn len(&self) -> usize {
        self.accumulators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulators.is_empty()
    }

    /// Query every accumulator for one candidate, merging into `row`
    pub fn query_all(&self, event: &Event, candidate: &Candidate, row: &mut FeatureRow) {
        for acc in &self.accumulators {
            acc.query(event, candidate, row);
        }
    }

    /// Fold the event into every accumulator interested in its action type
    pub fn update_interested(&mut self, event: &Event) {
        if let Some(indices) = self.by_action.get(&event.action_type) {
            // clone releases the map borrow before mutating accumulators
            let indices = indices.clone();
            for index in indices {
                self.accumulators[index].update(event);
            }
        }
    }
}

/// The full production accumulator set, in a fixed order so that positional
/// shard assignment is reproducible
pub fn default_accumulators(providers: &ProviderSet) -> Vec<Box<dyn Accumulator>> {
    let mut accumulators: Vec<Box<dyn Accumulator>> = vec![
        Box::new(ImpressionSetClicks::new(
            "identical_impressions_item_clicks",
            ImpressionKey::Hash,
        )),
        Box::new(ImpressionSetClicks::new(
            "identical_impressions_item_clicks2",
            ImpressionKey::Raw,
        )),
        Box::new(SameImpressionFlag::new()),
        Box::new(ActionTrail::new()),
        Box::new(LastSortOrder::new()),
        Box::new(LastFilterSelection::new()),
        Box::new(LastClickIndexDelta::new()),
        Box::new(FakeLastIndexDelta::new()),
        Box::new(SameViewClickPosition::new()),
        Box::new(SameViewIndexDelta::new()),
        Box::new(SameFakeViewIndexDelta::new()),
        Box::new(LastEventTimes::new()),
        Box::new(LastClickedItem::new()),
        Box::new(ItemCtr::new()),
        Box::new(ItemCtrByPlatform::new()),
        Box::new(UserItemClicks::new()),
        Box::new(UserItemImpressions::new()),
        Box::new(InteractionFlag::new(
            ActionType::InteractionItemImage,
            "was_interaction_img",
        )),
        Box::new(ActionTsDelta::new(
            ActionType::InteractionItemImage,
            "interaction_img_diff_ts",
        )),
        Box::new(InteractionFreq::new(
            ActionType::InteractionItemImage,
            "interaction_img_freq",
        )),
        Box::new(InteractionFlag::new(
            ActionType::InteractionItemDeals,
            "was_interaction_deal",
        )),
        Box::new(InteractionFreq::new(
            ActionType::InteractionItemDeals,
            "interaction_deal_freq",
        )),
        Box::new(InteractionFlag::new(
            ActionType::InteractionItemRating,
            "was_interaction_rating",
        )),
        Box::new(InteractionFreq::new(
            ActionType::InteractionItemRating,
            "interaction_rating_freq",
        )),
        Box::new(InteractionFlag::new(
            ActionType::InteractionItemInfo,
            "was_interaction_info",
        )),
        Box::new(InteractionFreq::new(
            ActionType::InteractionItemInfo,
            "interaction_info_freq",
        )),
        Box::new(InteractionFlag::new(
            ActionType::SearchForItem,
            "was_item_searched",
        )),
        Box::new(LastFilterContext::new()),
        Box::new(UserItemInteractionsList::new(
            InteractionScope::User,
            "user_item_interactions_list",
        )),
        Box::new(UserItemInteractionsList::new(
            InteractionScope::Session,
            "user_item_session_interactions_list",
        )),
        Box::new(RankPreference::new()),
        Box::new(FakeRankPreference::new()),
        Box::new(SessionRankPreference::new()),
        Box::new(ImpressionRankPreference::new()),
        Box::new(UserItemActionLastSeen::new(
            ActionType::InteractionItemImage,
            "interaction_item_image_item_last_timestamp",
        )),
        Box::new(UserItemActionLastSeen::new(
            ActionType::ClickoutItem,
            "clickout_item_item_last_timestamp",
        )),
        Box::new(ViewLastClickoutTime::new()),
        Box::new(ClickOffsetProbability::new(
            "clickout_prob_time_position_offset",
            ViewKind::Clickout,
            providers.click_prior.clone(),
        )),
        Box::new(ClickOffsetProbability::new(
            "fake_clickout_prob_time_position_offset",
            ViewKind::FakeInteraction,
            providers.click_prior.clone(),
        )),
        Box::new(ProviderSimilarity::new(
            "item_similarity_to_last_clicked_item",
            SimilarityMode::LastClicked,
            providers.metadata.clone(),
        )),
        Box::new(ProviderSimilarity::new(
            "avg_similarity_to_interacted_items",
            SimilarityMode::AllInteracted,
            providers.metadata.clone(),
        )),
        Box::new(ProviderSimilarity::new(
            "avg_similarity_to_interacted_session_items",
            SimilarityMode::SessionInteracted,
            providers.metadata.clone(),
        )),
        Box::new(ProviderSimilarity::new(
            "poi_item_similarity_to_last_clicked_item",
            SimilarityMode::LastClicked,
            providers.poi.clone(),
        )),
        Box::new(ProviderSimilarity::new(
            "poi_avg_similarity_to_interacted_items",
            SimilarityMode::AllInteracted,
            providers.poi.clone(),
        )),
        Box::new(ProviderSimilarity::new(
            "num_pois",
            SimilarityMode::AttributeCount,
            providers.poi.clone(),
        )),
        Box::new(ProviderSimilarity::new(
            "avg_price_similarity_to_interacted_items",
            SimilarityMode::AllInteracted,
            providers.price.clone(),
        )),
        Box::new(ProviderSimilarity::new(
            "avg_price_similarity_to_interacted_session_items",
            SimilarityMode::SessionInteracted,
            providers.price.clone(),
        )),
        Box::new(PoiFeatures::new()),
        Box::new(LastClickoutStatsInSession::new()),
        Box::new(ItemAttentionSpan::new()),
        Box::new(IndicesFeatures::new(ViewKind::Clickout, "")),
        Box::new(IndicesFeatures::new(ViewKind::FakeInteraction, "fake_")),
        Box::new(PriceFeatures::new()),
        Box::new(PriceSimilarity::new()),
        Box::new(SimilarUsersItemInteraction::new()),
        Box::new(MostSimilarUserItemInteraction::new()),
        Box::new(TopKSimilarUsers::new(5)),
        Box::new(GlobalTimestampPerItem::new()),
        Box::new(ClickSequenceEncoder::new()),
        Box::new(ActionCounter::new(ActionType::FilterSelection)),
    ];

    for action in ActionType::item_reference_actions() {
        accumulators.push(Box::new(DistinctInteractions::new(
            action,
            DistinctBy::Timestamp,
        )));
    }
    for action in ActionType::item_reference_actions() {
        accumulators.push(Box::new(DistinctInteractions::new(
            action,
            DistinctBy::Session,
        )));
    }

    accumulators
}

/// Keep only the accumulators assigned to one shard by positional modulo.
///
/// Every shard replays the identical event stream and emits a disjoint
/// feature-column subset; outputs are merged by clickout id. The assignment
/// is workload-oblivious: expensive accumulators are not isolated.
pub fn shard_accumulators(
    accumulators: Vec<Box<dyn Accumulator>>,
    shard_count: usize,
    shard_index: usize,
) -> Vec<Box<dyn Accumulator>> {
    if shard_count <= 1 {
        return accumulators;
    }
    accumulators
        .into_iter()
        .enumerate()
        .filter(|(index, _)| index % shard_count == shard_index)
        .map(|(_, acc)| acc)
        .collect()
}
