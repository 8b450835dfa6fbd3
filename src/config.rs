use std::env;

/// Configuration loaded from environment variables
pub struct Config {
    pub events_path: String,
    pub output_path: String,
    pub db_path: String,
    pub metadata_path: String,
    pub poi_path: String,
    pub price_path: String,
    pub prior_path: String,
    pub shard_count: usize,
    pub shard_index: usize,
    pub rust_log: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Provider paths are required: a missing similarity map or prior table
    /// is a deployment error, not something to default around.
    pub fn from_env() -> Self {
        let events_path = env::var("EVENTS_PATH").expect("EVENTS_PATH must be set in .env file");
        let metadata_path =
            env::var("ITEM_METADATA_PATH").expect("ITEM_METADATA_PATH must be set in .env file");
        let poi_path = env::var("ITEM_POI_PATH").expect("ITEM_POI_PATH must be set in .env file");
        let price_path =
            env::var("ITEM_PRICES_PATH").expect("ITEM_PRICES_PATH must be set in .env file");
        let prior_path =
            env::var("CLICK_PRIOR_PATH").expect("CLICK_PRIOR_PATH must be set in .env file");

        let output_path =
            env::var("FEATURES_OUTPUT_PATH").unwrap_or_else(|_| "data/features.jsonl".to_string());
        let db_path =
            env::var("FEATURES_DB_PATH").unwrap_or_else(|_| "data/features.db".to_string());

        // Optional accumulator sharding (full set when unset)
        let shard_count = env::var("SHARD_COUNT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        let shard_index = env::var("SHARD_INDEX")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let rust_log = env::var("RUST_LOG").ok();

        Self {
            events_path,
            output_path,
            db_path,
            metadata_path,
            poi_path,
            price_path,
            prior_path,
            shard_count,
            shard_index,
            rust_log,
        }
    }
}
