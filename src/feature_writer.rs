//! Feature table sinks
//!
//! Persistence of the output table is a boundary concern; the engine only
//! needs something that accepts records in emission order. Two backends are
//! provided: append-only JSONL and batched SQLite.

use crate::types::FeatureRecord;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Jsonl,
    Sqlite,
}

#[derive(Debug)]
pub enum FeatureSinkError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Database(String),
}

impl From<std::io::Error> for FeatureSinkError {
    fn from(err: std::io::Error) -> Self {
        FeatureSinkError::Io(err)
    }
}

impl From<serde_json::Error> for FeatureSinkError {
    fn from(err: serde_json::Error) -> Self {
        FeatureSinkError::Serialization(err)
    }
}

impl From<rusqlite::Error> for FeatureSinkError {
    fn from(err: rusqlite::Error) -> Self {
        FeatureSinkError::Database(err.to_string())
    }
}

impl std::fmt::Display for FeatureSinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureSinkError::Io(e) => write!(f, "IO error: {}", e),
            FeatureSinkError::Serialization(e) => write!(f, "Serialization error: {}", e),
            FeatureSinkError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for FeatureSinkError {}

/// Backend trait for writing feature records
#[async_trait]
pub trait FeatureSink: Send {
    /// Write a single feature record
    async fn write_record(&mut self, record: &FeatureRecord) -> Result<(), FeatureSinkError>;

    /// Flush pending writes to storage
    async fn flush(&mut self) -> Result<(), FeatureSinkError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

/// Append-only JSONL backend, one record per line
pub struct JsonlFeatureWriter {
    writer: BufWriter<std::fs::File>,
}

impl JsonlFeatureWriter {
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;

        log::info!("📝 Writing feature records to: {}", path.as_ref().display());
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn write_sync(&mut self, record: &FeatureRecord) -> Result<(), FeatureSinkError> {
        let json = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", json)?;
        Ok(())
    }
}

impl Drop for JsonlFeatureWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[async_trait]
impl FeatureSink for JsonlFeatureWriter {
    async fn write_record(&mut self, record: &FeatureRecord) -> Result<(), FeatureSinkError> {
        self.write_sync(record)
    }

    async fn flush(&mut self) -> Result<(), FeatureSinkError> {
        self.writer.flush()?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "JSONL"
    }
}

/// SQLite backend: flat context columns plus the feature map as JSON,
/// batched into transactions
pub struct SqliteFeatureWriter {
    conn: Connection,
    batch: Vec<FeatureRecord>,
    batch_size: usize,
}

impl SqliteFeatureWriter {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, FeatureSinkError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS feature_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                clickout_id INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                platform TEXT NOT NULL,
                current_filters TEXT NOT NULL,
                step INTEGER NOT NULL,
                step_from_end INTEGER NOT NULL,
                max_step INTEGER NOT NULL,
                item_id TEXT NOT NULL,
                item_id_clicked TEXT NOT NULL,
                rank INTEGER NOT NULL,
                price INTEGER NOT NULL,
                was_clicked INTEGER NOT NULL,
                features TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_clickout ON feature_records(clickout_id, rank)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_user_timestamp ON feature_records(user_id, timestamp)",
            [],
        )?;

        log::info!("✅ SQLite feature table initialized with WAL mode");

        Ok(Self {
            conn,
            batch: Vec::with_capacity(256),
            batch_size: 256,
        })
    }

    fn flush_batch(&mut self) -> Result<(), FeatureSinkError> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO feature_records (
                    clickout_id, user_id, session_id, timestamp, platform,
                    current_filters, step, step_from_end, max_step, item_id,
                    item_id_clicked, rank, price, was_clicked, features
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;
            for record in &self.batch {
                let features = serde_json::to_string(&record.features)?;
                stmt.execute(params![
                    record.clickout_id,
                    record.user_id,
                    record.session_id,
                    record.timestamp,
                    record.platform,
                    record.current_filters,
                    record.step,
                    record.step_from_end,
                    record.max_step,
                    record.item_id,
                    record.item_id_clicked,
                    record.rank,
                    record.price,
                    record.was_clicked,
                    features,
                ])?;
            }
        }
        tx.commit()?;

        self.batch.clear();
        Ok(())
    }
}

#[async_trait]
impl FeatureSink for SqliteFeatureWriter {
    async fn write_record(&mut self, record: &FeatureRecord) -> Result<(), FeatureSinkError> {
        self.batch.push(record.clone());
        if self.batch.len() >= self.batch_size {
            self.flush_batch()?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), FeatureSinkError> {
        self.flush_batch()
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
