//! Feature assembler: drives the event stream through the registry
//!
//! For each event in arrival order the assembler first enriches the raw row
//! (splits pipe-delimited lists, resolves clicked/interacted positions),
//! then, for clickout events, materializes one feature record per candidate
//! by querying every accumulator, and only afterwards folds the event into
//! the interested accumulators — held-out events are never folded in. This
//! ordering is what guarantees that features reflect strictly earlier
//! events only.

use super::registry::AccumulatorRegistry;
use crate::types::{ActionType, Candidate, Event, FeatureRecord, FeatureRow, NO_INDEX};

pub struct FeatureAssembler {
    registry: AccumulatorRegistry,
    /// Position of the current event in the stream; doubles as the clickout
    /// id so that shards replaying the same stream agree on row identity
    event_counter: u64,
}

impl FeatureAssembler {
    pub fn new(registry: AccumulatorRegistry) -> Self {
        Self {
            registry,
            event_counter: 0,
        }
    }

    pub fn registry(&self) -> &AccumulatorRegistry {
        &self.registry
    }

    /// Process one event, returning the feature records it produced (empty
    /// for non-clickout events and for clickouts with no impressions)
    pub fn process_event(&mut self, mut event: Event) -> Vec<FeatureRecord> {
        let clickout_id = self.event_counter;
        self.event_counter += 1;

        enrich(&mut event);

        let mut records = Vec::new();
        if event.action_type == ActionType::ClickoutItem && !event.impression_list.is_empty() {
            for (rank, item_id) in event.impression_list.iter().enumerate() {
                let candidate = Candidate {
                    item_id: item_id.clone(),
                    rank: rank as i64,
                    price: event.price_list.get(rank).copied().unwrap_or(0),
                };
                let mut row = FeatureRow::new();
                self.registry.query_all(&event, &candidate, &mut row);
                records.push(build_record(clickout_id, &event, &candidate, row));
            }
        }

        if !event.is_test {
            self.registry.update_interested(&event);
        }

        records
    }

    /// Drain a whole stream, concatenating all candidate records
    pub fn process_all(&mut self, events: impl IntoIterator<Item = Event>) -> Vec<FeatureRecord> {
        events
            .into_iter()
            .flat_map(|event| self.process_event(event))
            .collect()
    }
}

/// Split the raw pipe-delimited fields and resolve positions. Runs once per
/// event, for every event, so fake-view fields are available to accumulators
/// on non-clickout interactions as well.
fn enrich(event: &mut Event) {
    event.fake_impression_list = split_list(event.fake_impressions_raw());
    event.fake_index_interacted = position_of(&event.fake_impression_list, &event.reference);

    if event.action_type == ActionType::ClickoutItem {
        event.impression_list = split_list(event.impressions_raw());
        event.price_list = event
            .prices
            .as_deref()
            .unwrap_or("")
            .split('|')
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<i64>().unwrap_or(0))
            .collect();

        let mut sorted = event.impression_list.clone();
        sorted.sort_unstable();
        event.impressions_hash = sorted.join("|");

        event.index_clicked = position_of(&event.impression_list, &event.reference);
        event.price_clicked = if event.index_clicked >= 0 {
            event
                .price_list
                .get(event.index_clicked as usize)
                .copied()
                .unwrap_or(0)
        } else {
            0
        };
    } else {
        event.index_clicked = NO_INDEX;
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split('|')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn position_of(list: &[String], reference: &str) -> i64 {
    list.iter()
        .position(|item| item == reference)
        .map_or(NO_INDEX, |p| p as i64)
}

fn build_record(
    clickout_id: u64,
    event: &Event,
    candidate: &Candidate,
    features: FeatureRow,
) -> FeatureRecord {
    FeatureRecord {
        clickout_id,
        user_id: event.user_id.clone(),
        session_id: event.session_id.clone(),
        timestamp: event.timestamp,
        platform: event.platform.clone(),
        current_filters: event.current_filters_raw().to_string(),
        step: event.step,
        step_from_end: event.step_from_end,
        max_step: event.max_step,
        item_id: candidate.item_id.clone(),
        item_id_clicked: event.reference.clone(),
        rank: candidate.rank,
        price: candidate.price,
        was_clicked: (event.reference == candidate.item_id) as i64,
        features,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_core::registry::default_accumulators;
    use crate::providers::ProviderSet;
    use crate::types::FeatureValue;

    fn assembler() -> FeatureAssembler {
        let providers = ProviderSet::empty();
        FeatureAssembler::new(AccumulatorRegistry::new(default_accumulators(&providers)))
    }

    fn raw_clickout(user: &str, ts: i64, reference: &str, impressions: &str, prices: &str) -> Event {
        serde_json::from_str(&format!(
            r#"{{"user_id":"{}","session_id":"s1","timestamp":{},"action_type":"clickout item","reference":"{}","impressions":"{}","prices":"{}","platform":"US"}}"#,
            user, ts, reference, impressions, prices
        ))
        .unwrap()
    }

    #[test]
    fn test_one_record_per_candidate() {
        let mut assembler = assembler();
        let records = assembler.process_event(raw_clickout("u1", 100, "2", "1|2|3", "10|20|30"));

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].item_id, "1");
        assert_eq!(records[0].rank, 0);
        assert_eq!(records[0].price, 10);
        assert_eq!(records[0].was_clicked, 0);
        assert_eq!(records[1].was_clicked, 1);
        assert_eq!(records[1].item_id_clicked, "2");
    }

    #[test]
    fn test_clickout_ids_follow_stream_position() {
        let mut assembler = assembler();
        let poi: Event = serde_json::from_str(
            r#"{"user_id":"u1","session_id":"s1","timestamp":90,"action_type":"search for poi","reference":"beach","platform":"US"}"#,
        )
        .unwrap();

        assert!(assembler.process_event(poi).is_empty());
        let records = assembler.process_event(raw_clickout("u1", 100, "1", "1|2", "10|20"));
        assert_eq!(records[0].clickout_id, 1);
    }

    #[test]
    fn test_query_precedes_update() {
        let mut assembler = assembler();

        // First clickout: the CTR counters must not yet see this event
        let records = assembler.process_event(raw_clickout("u1", 100, "1", "1|2", "10|20"));
        assert_eq!(
            records[0].features["clickout_item_clicks"],
            FeatureValue::Int(0)
        );

        // Second clickout sees exactly the first one
        let records = assembler.process_event(raw_clickout("u2", 110, "2", "1|2", "10|20"));
        assert_eq!(
            records[0].features["clickout_item_clicks"],
            FeatureValue::Int(1)
        );
    }

    #[test]
    fn test_held_out_event_does_not_mutate() {
        let mut assembler = assembler();

        let mut held_out = raw_clickout("u1", 100, "1", "1|2", "10|20");
        held_out.is_test = true;
        let records = assembler.process_event(held_out);
        // Held-out events still produce fully shaped records
        assert_eq!(records.len(), 2);
        assert!(records[0].features.contains_key("clickout_item_clicks"));

        let records = assembler.process_event(raw_clickout("u2", 110, "1", "1|2", "10|20"));
        assert_eq!(
            records[0].features["clickout_item_clicks"],
            FeatureValue::Int(0)
        );
    }

    #[test]
    fn test_empty_impressions_produce_no_records() {
        let mut assembler = assembler();
        let mut event = raw_clickout("u1", 100, "1", "", "");
        event.impressions = Some(String::new());
        assert!(assembler.process_event(event).is_empty());
    }

    #[test]
    fn test_missing_reference_yields_unclicked_rows() {
        let mut assembler = assembler();
        let records = assembler.process_event(raw_clickout("u1", 100, "99", "1|2", "10|20"));
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.was_clicked == 0));
    }

    #[test]
    fn test_unparsable_price_degrades_to_zero() {
        let mut assembler = assembler();
        let records = assembler.process_event(raw_clickout("u1", 100, "1", "1|2", "10|oops"));
        assert_eq!(records[1].price, 0);
    }

    #[test]
    fn test_transient_fields_not_serialized() {
        let mut assembler = assembler();
        let records = assembler.process_event(raw_clickout("u1", 100, "1", "1|2", "10|20"));
        let json = serde_json::to_value(&records[0]).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert!(!keys.contains(&"impressions"));
        assert!(!keys.contains(&"impressions_hash"));
        assert!(!keys.contains(&"prices"));
        assert!(keys.contains(&"was_clicked"));
    }

    #[test]
    fn test_determinism_two_fresh_runs() {
        let stream = || {
            vec![
                raw_clickout("u1", 100, "1", "1|2|3", "10|20|30"),
                raw_clickout("u2", 110, "2", "1|2|3", "10|20|30"),
                raw_clickout("u1", 120, "3", "3|2|1", "30|20|10"),
            ]
        };

        let mut first = assembler();
        let mut second = assembler();
        let a = first.process_all(stream());
        let b = second.process_all(stream());

        let a_json = serde_json::to_string(&a).unwrap();
        let b_json = serde_json::to_string(&b).unwrap();
        assert_eq!(a_json, b_json);
    }
}
