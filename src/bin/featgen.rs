//! Feature Generation Runtime - Batch Feature Extraction
//!
//! Replays an interaction log through the accumulator registry and writes
//! one feature record per (clickout, candidate) pair.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin featgen -- --backend jsonl
//! ```
//!
//! ## Environment Variables
//!
//! - EVENTS_PATH - Path to the interaction log (JSONL, time-ordered)
//! - ITEM_METADATA_PATH - Item metadata attribute map (JSON)
//! - ITEM_POI_PATH - Item point-of-interest map (JSON)
//! - ITEM_PRICES_PATH - Item reference price map (JSON)
//! - CLICK_PRIOR_PATH - Click probability prior table (JSON)
//! - FEATURES_OUTPUT_PATH - JSONL output path (default: data/features.jsonl)
//! - FEATURES_DB_PATH - SQLite output path (default: data/features.db) - used when --backend sqlite
//! - SHARD_COUNT / SHARD_INDEX - Optional accumulator shard assignment
//! - RUST_LOG - Logging level (optional, default: info)

use chrono::Utc;
use clickflow::config::Config;
use clickflow::event_reader::JsonlEventReader;
use clickflow::feature_core::{default_accumulators, shard_accumulators, AccumulatorRegistry, FeatureAssembler};
use clickflow::feature_writer::{
    BackendType, FeatureSink, JsonlFeatureWriter, SqliteFeatureWriter,
};
use clickflow::providers::ProviderSet;
use std::env;

fn parse_backend_from_args() -> BackendType {
    let args: Vec<String> = env::args().collect();
    if let Some(idx) = args.iter().position(|x| x == "--backend") {
        match args.get(idx + 1).map(|s| s.as_str()) {
            Some("sqlite") => return BackendType::Sqlite,
            Some("jsonl") => return BackendType::Jsonl,
            _ => {}
        }
    }
    BackendType::Jsonl
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let started_at = Utc::now();
    let config = Config::from_env();
    let backend = parse_backend_from_args();

    log::info!("🚀 Starting feature generation...");
    log::info!("📊 Configuration:");
    log::info!("   EVENTS_PATH: {}", config.events_path);
    log::info!("   Backend: {:?}", backend);
    if config.shard_count > 1 {
        log::info!(
            "   Shard: {}/{} (positional modulo)",
            config.shard_index,
            config.shard_count
        );
    }

    // Provider load failures are fatal: a missing prior table or similarity
    // map means a misconfigured deployment
    let providers = ProviderSet::load(
        &config.metadata_path,
        &config.poi_path,
        &config.price_path,
        &config.prior_path,
    )?;
    log::info!("✅ Similarity providers and click prior loaded");

    let accumulators = shard_accumulators(
        default_accumulators(&providers),
        config.shard_count,
        config.shard_index,
    );
    log::info!("   Accumulators in this shard: {}", accumulators.len());

    let mut assembler = FeatureAssembler::new(AccumulatorRegistry::new(accumulators));

    let mut sink: Box<dyn FeatureSink> = match backend {
        BackendType::Jsonl => Box::new(JsonlFeatureWriter::new(&config.output_path)?),
        BackendType::Sqlite => Box::new(SqliteFeatureWriter::new(&config.db_path)?),
    };

    let reader = JsonlEventReader::open(&config.events_path)?;

    let mut event_count: u64 = 0;
    let mut record_count: u64 = 0;
    for event in reader {
        event_count += 1;
        for record in assembler.process_event(event) {
            sink.write_record(&record).await?;
            record_count += 1;
        }
        if event_count % 100_000 == 0 {
            log::info!("   {} events processed, {} records emitted", event_count, record_count);
        }
    }

    sink.flush().await?;

    let elapsed = Utc::now() - started_at;
    log::info!(
        "✅ Feature generation complete: {} events -> {} records in {}s ({} backend)",
        event_count,
        record_count,
        elapsed.num_seconds(),
        sink.backend_type()
    );

    Ok(())
}
