//! Shared event fixtures for accumulator tests

use crate::types::{ActionType, Candidate, Event, NO_INDEX};

/// Bare event with no impression context (non-clickout interactions)
pub fn event(action: ActionType, user: &str, session: &str, ts: i64, reference: &str) -> Event {
    Event {
        user_id: user.to_string(),
        session_id: session.to_string(),
        timestamp: ts,
        action_type: action,
        reference: reference.to_string(),
        impressions: None,
        prices: None,
        fake_impressions: None,
        current_filters: None,
        platform: "US".to_string(),
        step: 1,
        step_from_end: 1,
        max_step: 1,
        is_test: false,
        impression_list: Vec::new(),
        price_list: Vec::new(),
        impressions_hash: String::new(),
        index_clicked: NO_INDEX,
        price_clicked: 0,
        fake_impression_list: Vec::new(),
        fake_index_interacted: NO_INDEX,
    }
}

/// Fully enriched clickout event, the way the assembler would present it
pub fn clickout(
    user: &str,
    session: &str,
    ts: i64,
    reference: &str,
    impressions: &[&str],
    prices: &[i64],
) -> Event {
    let mut ev = event(ActionType::ClickoutItem, user, session, ts, reference);
    ev.impressions = Some(impressions.join("|"));
    ev.prices = Some(
        prices
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("|"),
    );
    ev.impression_list = impressions.iter().map(|s| s.to_string()).collect();
    ev.price_list = prices.to_vec();

    let mut sorted: Vec<&str> = impressions.to_vec();
    sorted.sort_unstable();
    ev.impressions_hash = sorted.join("|");

    ev.index_clicked = impressions
        .iter()
        .position(|i| *i == reference)
        .map_or(NO_INDEX, |p| p as i64);
    ev.price_clicked = if ev.index_clicked >= 0 {
        prices.get(ev.index_clicked as usize).copied().unwrap_or(0)
    } else {
        0
    };

    // Non-clickout interactions share the same visible list in fixtures
    ev.fake_impressions = ev.impressions.clone();
    ev.fake_impression_list = ev.impression_list.clone();
    ev.fake_index_interacted = ev.index_clicked;
    ev
}

pub fn candidate(item_id: &str, rank: i64, price: i64) -> Candidate {
    Candidate {
        item_id: item_id.to_string(),
        rank,
        price,
    }
}
