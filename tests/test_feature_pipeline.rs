//! Integration tests for the full feature extraction pipeline
//!
//! Tests verify the end-to-end flow: JSONL events -> assembler -> accumulator
//! registry -> feature records -> sink backends.
//!
//! Key properties tested:
//! - Deterministic replay (byte-identical feature tables)
//! - Causal ordering (state unaffected by later events)
//! - Held-out events producing rows without mutating state
//! - Shard outputs agreeing on clickout identity

use clickflow::event_reader::JsonlEventReader;
use clickflow::feature_core::{
    default_accumulators, shard_accumulators, AccumulatorRegistry, FeatureAssembler,
};
use clickflow::feature_writer::{FeatureSink, JsonlFeatureWriter, SqliteFeatureWriter};
use clickflow::providers::{JaccardSimilarity, PricePointSimilarity, PriorTable, ProviderSet};
use clickflow::types::{Event, FeatureValue};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tempfile::tempdir;

fn test_providers() -> ProviderSet {
    let mut attrs: HashMap<i64, std::collections::HashSet<String>> = HashMap::new();
    attrs.insert(1, ["wifi", "pool"].iter().map(|s| s.to_string()).collect());
    attrs.insert(2, ["wifi"].iter().map(|s| s.to_string()).collect());
    attrs.insert(3, ["spa"].iter().map(|s| s.to_string()).collect());

    let mut prices = HashMap::new();
    prices.insert(1, 100.0);
    prices.insert(2, 120.0);
    prices.insert(3, 80.0);

    let mut prior = HashMap::new();
    prior.insert((0, 10), 0.5);
    prior.insert((1, 120), 0.25);

    ProviderSet {
        metadata: Arc::new(JaccardSimilarity::from_map(attrs.clone())),
        poi: Arc::new(JaccardSimilarity::from_map(attrs)),
        price: Arc::new(PricePointSimilarity::from_map(prices)),
        click_prior: Arc::new(PriorTable::from_map(prior)),
    }
}

fn event_line(
    user: &str,
    session: &str,
    ts: i64,
    action: &str,
    reference: &str,
    impressions: Option<&str>,
    prices: Option<&str>,
    is_test: bool,
) -> String {
    let mut obj = serde_json::json!({
        "user_id": user,
        "session_id": session,
        "timestamp": ts,
        "action_type": action,
        "reference": reference,
        "platform": "US",
        "is_test": is_test,
    });
    if let Some(imp) = impressions {
        obj["impressions"] = serde_json::json!(imp);
        obj["fake_impressions"] = serde_json::json!(imp);
    }
    if let Some(p) = prices {
        obj["prices"] = serde_json::json!(p);
    }
    obj.to_string()
}

fn sample_stream() -> Vec<String> {
    vec![
        event_line("u1", "s1", 100, "search for poi", "beach", None, None, false),
        event_line("u1", "s1", 110, "interaction item image", "2", Some("1|2|3"), None, false),
        event_line("u1", "s1", 120, "clickout item", "2", Some("1|2|3"), Some("100|120|80"), false),
        event_line("u2", "s2", 130, "clickout item", "1", Some("1|2|3"), Some("100|120|80"), false),
        event_line("u1", "s1", 140, "clickout item", "3", Some("1|2|3"), Some("100|120|80"), false),
        event_line("u2", "s2", 150, "clickout item", "2", Some("2|3"), Some("120|80"), true),
        event_line("u2", "s2", 160, "clickout item", "3", Some("2|3"), Some("120|80"), false),
    ]
}

fn events(lines: &[String]) -> Vec<Event> {
    lines
        .iter()
        .map(|line| Event::from_jsonl(line).unwrap())
        .collect()
}

fn run_stream(lines: &[String]) -> Vec<clickflow::types::FeatureRecord> {
    let providers = test_providers();
    let registry = AccumulatorRegistry::new(default_accumulators(&providers));
    let mut assembler = FeatureAssembler::new(registry);
    assembler.process_all(events(lines))
}

#[test]
fn test_deterministic_replay() {
    let lines = sample_stream();
    let first = serde_json::to_string(&run_stream(&lines)).unwrap();
    let second = serde_json::to_string(&run_stream(&lines)).unwrap();
    assert_eq!(first, second, "replay must be byte-identical");
}

#[test]
fn test_record_shape_and_labels() {
    let lines = sample_stream();
    let records = run_stream(&lines);

    // 3 + 3 + 3 + 2 + 2 candidates across the five clickouts
    assert_eq!(records.len(), 13);

    // The clicked candidate carries the label, everyone else does not
    let first_clickout: Vec<_> = records.iter().filter(|r| r.clickout_id == 2).collect();
    assert_eq!(first_clickout.len(), 3);
    let clicked: Vec<_> = first_clickout.iter().filter(|r| r.was_clicked == 1).collect();
    assert_eq!(clicked.len(), 1);
    assert_eq!(clicked[0].item_id, "2");
    assert_eq!(clicked[0].rank, 1);
    assert_eq!(clicked[0].price, 120);
}

#[test]
fn test_causality_truncated_stream_agrees() {
    let lines = sample_stream();

    // Records produced for the clickout at position 3 must be identical
    // whether or not later events exist in the stream
    let full = run_stream(&lines);
    let truncated = run_stream(&lines[..4]);

    let full_prefix: Vec<_> = full.iter().filter(|r| r.clickout_id <= 3).collect();
    let truncated_all: Vec<_> = truncated.iter().collect();

    assert_eq!(
        serde_json::to_string(&full_prefix).unwrap(),
        serde_json::to_string(&truncated_all).unwrap(),
        "later events must not influence earlier records"
    );
}

#[test]
fn test_held_out_event_emits_but_does_not_mutate() {
    let lines = sample_stream();
    let records = run_stream(&lines);

    // The held-out clickout (stream position 5) still produced rows
    let held_out: Vec<_> = records.iter().filter(|r| r.clickout_id == 5).collect();
    assert_eq!(held_out.len(), 2);

    // Drop the held-out event entirely: the final clickout's features must
    // be unchanged, because held-out events never update state. Stream
    // positions shift, so rows are matched by timestamp instead of id.
    let mut without: Vec<String> = lines.clone();
    without.remove(5);
    let records_without = run_stream(&without);

    let last_with: Vec<_> = records
        .iter()
        .filter(|r| r.timestamp == 160)
        .map(|r| (&r.item_id, r.was_clicked, &r.features))
        .collect();
    let last_without: Vec<_> = records_without
        .iter()
        .filter(|r| r.timestamp == 160)
        .map(|r| (&r.item_id, r.was_clicked, &r.features))
        .collect();
    assert_eq!(last_with, last_without);
}

#[test]
fn test_ctr_smoothing_exact() {
    let lines = sample_stream();
    let records = run_stream(&lines);

    // Before the final clickout, item 2 was clicked once (the held-out
    // click does not count) and shown in three non-held-out lists.
    let last: Vec<_> = records.iter().filter(|r| r.clickout_id == 6).collect();
    let item2 = last.iter().find(|r| r.item_id == "2").unwrap();
    assert_eq!(item2.features["clickout_item_clicks"], FeatureValue::Int(1));
    assert_eq!(item2.features["clickout_item_impressions"], FeatureValue::Int(3));
    assert_eq!(
        item2.features["clickout_item_ctr"],
        FeatureValue::Float(1.0 / 4.0)
    );
}

#[test]
fn test_session_last_click_counter_conserved() {
    let lines = sample_stream();
    let records = run_stream(&lines);

    // At the final clickout two sessions exist; the sum of last-click
    // counters across the candidate items equals the number of sessions
    // whose last click landed on one of them
    let last: Vec<_> = records.iter().filter(|r| r.clickout_id == 6).collect();
    let total: i64 = last
        .iter()
        .map(|r| match r.features["last_clickout_item_stats"] {
            FeatureValue::Int(n) => n,
            _ => 0,
        })
        .sum();
    // s1's last click is item 3, s2's is item 1 (held-out click ignored);
    // candidates are {2, 3} so only s1's vote is visible
    assert_eq!(total, 1);
}

#[test]
fn test_shard_outputs_merge_by_clickout_id() {
    let lines = sample_stream();
    let full = run_stream(&lines);

    let shard_run = |count: usize, index: usize| {
        let providers = test_providers();
        let accumulators =
            shard_accumulators(default_accumulators(&providers), count, index);
        let mut assembler = FeatureAssembler::new(AccumulatorRegistry::new(accumulators));
        assembler.process_all(events(&lines))
    };

    let shard_a = shard_run(2, 0);
    let shard_b = shard_run(2, 1);

    // Same row identity on every shard
    assert_eq!(shard_a.len(), full.len());
    assert_eq!(shard_b.len(), full.len());
    for ((a, b), reference) in shard_a.iter().zip(&shard_b).zip(&full) {
        assert_eq!(a.clickout_id, reference.clickout_id);
        assert_eq!(b.clickout_id, reference.clickout_id);
        assert_eq!(a.item_id, reference.item_id);
        assert_eq!(b.item_id, reference.item_id);
    }

    // Disjoint feature columns that union to the full set
    for ((a, b), reference) in shard_a.iter().zip(&shard_b).zip(&full) {
        for key in a.features.keys() {
            assert!(!b.features.contains_key(key), "shards overlap on {}", key);
        }
        let merged = a.features.len() + b.features.len();
        assert_eq!(merged, reference.features.len());
        for (key, value) in a.features.iter().chain(b.features.iter()) {
            assert_eq!(reference.features.get(key), Some(value), "column {}", key);
        }
    }
}

#[tokio::test]
async fn test_end_to_end_jsonl_run() {
    let dir = tempdir().unwrap();
    let events_path = dir.path().join("events.jsonl");
    let output_path = dir.path().join("features.jsonl");

    let mut file = std::fs::File::create(&events_path).unwrap();
    for line in sample_stream() {
        writeln!(file, "{}", line).unwrap();
    }

    let providers = test_providers();
    let registry = AccumulatorRegistry::new(default_accumulators(&providers));
    let mut assembler = FeatureAssembler::new(registry);
    let mut sink = JsonlFeatureWriter::new(&output_path).unwrap();

    let mut record_count = 0;
    for event in JsonlEventReader::open(&events_path).unwrap() {
        for record in assembler.process_event(event) {
            sink.write_record(&record).await.unwrap();
            record_count += 1;
        }
    }
    sink.flush().await.unwrap();

    let contents = std::fs::read_to_string(&output_path).unwrap();
    assert_eq!(contents.lines().count(), record_count);

    // Rows are flat JSON objects with context and feature columns merged
    let first: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    assert_eq!(first["user_id"], "u1");
    assert!(first.get("clickout_item_ctr").is_some());
    assert!(first.get("similar_users_item_interaction").is_some());
    assert!(first.get("impressions").is_none());
}

#[tokio::test]
async fn test_end_to_end_sqlite_run() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("features.db");

    let providers = test_providers();
    let registry = AccumulatorRegistry::new(default_accumulators(&providers));
    let mut assembler = FeatureAssembler::new(registry);
    let mut sink = SqliteFeatureWriter::new(&db_path).unwrap();

    for event in events(&sample_stream()) {
        for record in assembler.process_event(event) {
            sink.write_record(&record).await.unwrap();
        }
    }
    sink.flush().await.unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM feature_records", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 13);

    let clicked: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM feature_records WHERE was_clicked = 1",
            [],
            |row| row.get(0),
        )
        .unwrap();
    // One clicked row per clickout whose reference was in the list
    assert_eq!(clicked, 5);
}
