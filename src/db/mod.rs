// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Database module for persistent storage
//!
//! Raw readings and anomalies are two independent append-only record sets.
//! Each set lives in its own database file with its own connection, so an
//! append to one never waits on the other's write lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::sensors::{AnomalyRecord, Reading, SensorType};

/// Row count returned by the historical queries
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Durable append-only storage for readings and anomalies
pub trait Sink: Send + Sync {
    fn append_reading(&self, reading: &Reading) -> Result<()>;

    fn append_anomaly(&self, anomaly: &AnomalyRecord) -> Result<()>;

    /// Most recent readings of one sensor type, newest first
    fn recent_readings(&self, sensor_type: SensorType, limit: usize) -> Result<Vec<StoredRecord>>;

    /// Most recent anomalies of one sensor type, newest first
    fn recent_anomalies(&self, sensor_type: SensorType, limit: usize) -> Result<Vec<StoredRecord>>;
}

/// Run a sink operation on the blocking thread pool.
///
/// SQLite calls may wait up to the busy timeout, which must not stall an
/// async worker thread.
pub async fn off_thread<T, F>(sink: &Arc<dyn Sink>, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn Sink) -> Result<T> + Send + 'static,
{
    let sink = Arc::clone(sink);
    tokio::task::spawn_blocking(move || op(sink.as_ref()))
        .await
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

/// One row of a historical query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

struct RecordSet {
    table: &'static str,
    conn: Mutex<Connection>,
}

impl RecordSet {
    fn open(config: &DatabaseConfig, table: &'static str) -> Result<Self> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            let conn = Connection::open(config.record_set_path(table))?;
            conn.execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                "#,
            )?;
            conn
        };
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sensor_type TEXT NOT NULL,
                value REAL NOT NULL,
                timestamp INTEGER NOT NULL
                    DEFAULT (CAST((julianday('now') - 2440587.5) * 86400000000.0 AS INTEGER))
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_sensor_time ON {table}(sensor_type, timestamp);
            "#,
            table = table
        ))?;

        Ok(Self {
            table,
            conn: Mutex::new(conn),
        })
    }

    /// Append a row; a missing timestamp is filled in by the database
    fn insert(&self, sensor_type: SensorType, value: f64, timestamp: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.conn.lock();

        match timestamp {
            Some(ts) => conn.execute(
                &format!(
                    "INSERT INTO {} (sensor_type, value, timestamp) VALUES (?1, ?2, ?3)",
                    self.table
                ),
                params![sensor_type.as_str(), value, ts.timestamp_micros()],
            )?,
            None => conn.execute(
                &format!("INSERT INTO {} (sensor_type, value) VALUES (?1, ?2)", self.table),
                params![sensor_type.as_str(), value],
            )?,
        };

        Ok(())
    }

    fn recent(&self, sensor_type: SensorType, limit: usize) -> Result<Vec<StoredRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare_cached(&format!(
            "SELECT value, timestamp FROM {} WHERE sensor_type = ?1
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
            self.table
        ))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![sensor_type.as_str(), limit], |row| {
            let micros: i64 = row.get(1)?;
            let timestamp = Utc
                .timestamp_micros(micros)
                .single()
                .ok_or(rusqlite::Error::IntegralValueOutOfRange(1, micros))?;
            Ok(StoredRecord {
                value: row.get(0)?,
                timestamp,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}

/// SQLite-backed [`Sink`]
pub struct Database {
    readings: RecordSet,
    anomalies: RecordSet,
}

impl Database {
    /// Open or create database
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if !config.is_in_memory() {
            std::fs::create_dir_all(&config.dir)?;
        }

        let db = Self {
            readings: RecordSet::open(config, "sensor_data")?,
            anomalies: RecordSet::open(config, "anomalies")?,
        };

        info!("Database opened at {:?}", config.dir);
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&DatabaseConfig::in_memory())
    }

    /// Append a raw reading value stamped by the database clock
    pub fn append_untimed_reading(&self, sensor_type: SensorType, value: f64) -> Result<()> {
        self.readings.insert(sensor_type, value, None)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DatabaseStats> {
        Ok(DatabaseStats {
            reading_count: self.readings.count()?,
            anomaly_count: self.anomalies.count()?,
        })
    }
}

impl Sink for Database {
    fn append_reading(&self, reading: &Reading) -> Result<()> {
        self.readings
            .insert(reading.sensor_type, reading.value, Some(reading.observed_at))
    }

    fn append_anomaly(&self, anomaly: &AnomalyRecord) -> Result<()> {
        self.anomalies
            .insert(anomaly.sensor_type, anomaly.value, Some(anomaly.observed_at))
    }

    fn recent_readings(&self, sensor_type: SensorType, limit: usize) -> Result<Vec<StoredRecord>> {
        self.readings.recent(sensor_type, limit)
    }

    fn recent_anomalies(&self, sensor_type: SensorType, limit: usize) -> Result<Vec<StoredRecord>> {
        self.anomalies.recent(sensor_type, limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub reading_count: usize,
    pub anomaly_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn anomaly_at(value: f64, offset_secs: i64) -> AnomalyRecord {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        AnomalyRecord {
            sensor_type: SensorType::Temperature,
            value,
            observed_at: base + ChronoDuration::seconds(offset_secs),
        }
    }

    #[test]
    fn test_recent_returns_all_when_fewer_than_limit() {
        let db = Database::open_in_memory().unwrap();
        db.append_anomaly(&anomaly_at(41.0, 0)).unwrap();
        db.append_anomaly(&anomaly_at(43.0, 20)).unwrap();
        db.append_anomaly(&anomaly_at(42.0, 10)).unwrap();

        let rows = db.recent_anomalies(SensorType::Temperature, DEFAULT_QUERY_LIMIT).unwrap();
        let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![43.0, 42.0, 41.0]);
        assert!(rows.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn test_recent_applies_limit_and_sensor_filter() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..150 {
            let reading = Reading::new(
                SensorType::Humidity,
                i as f64,
                Utc::now() + ChronoDuration::milliseconds(i),
            );
            db.append_reading(&reading).unwrap();
        }
        db.append_reading(&Reading::now(SensorType::Pressure, 12.0)).unwrap();

        let rows = db.recent_readings(SensorType::Humidity, DEFAULT_QUERY_LIMIT).unwrap();
        assert_eq!(rows.len(), 100);
        assert_eq!(rows[0].value, 149.0);
        assert_eq!(rows[99].value, 50.0);

        assert_eq!(db.recent_readings(SensorType::Pressure, 10).unwrap().len(), 1);
        assert!(db.recent_anomalies(SensorType::Humidity, 10).unwrap().is_empty());
    }

    #[test]
    fn test_timestamp_roundtrip_is_exact() {
        let db = Database::open_in_memory().unwrap();
        let reading = Reading::now(SensorType::Pressure, 33.33);
        db.append_reading(&reading).unwrap();

        let rows = db.recent_readings(SensorType::Pressure, 1).unwrap();
        assert_eq!(rows[0].timestamp, reading.observed_at);
    }

    #[test]
    fn test_missing_timestamp_is_generated() {
        let db = Database::open_in_memory().unwrap();
        let before = Utc::now() - ChronoDuration::seconds(5);
        db.append_untimed_reading(SensorType::Temperature, 5.0).unwrap();

        let rows = db.recent_readings(SensorType::Temperature, 1).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].timestamp > before);
    }

    #[test]
    fn test_file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            dir: dir.path().join("store"),
            ..DatabaseConfig::default()
        };

        {
            let db = Database::open(&config).unwrap();
            db.append_reading(&Reading::now(SensorType::Humidity, 55.5)).unwrap();
            db.append_anomaly(&anomaly_at(44.0, 0)).unwrap();
        }

        let db = Database::open(&config).unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.reading_count, 1);
        assert_eq!(stats.anomaly_count, 1);
        assert!(config.record_set_path("sensor_data").exists());
        assert!(config.record_set_path("anomalies").exists());
    }

    fn file_config(dir: &tempfile::TempDir) -> DatabaseConfig {
        DatabaseConfig {
            dir: dir.path().to_path_buf(),
            busy_timeout_ms: 300,
        }
    }

    #[test]
    fn test_reading_append_ignores_anomaly_write_lock() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(&dir);
        let db = Database::open(&config).unwrap();

        // another writer holds the anomalies lock for the whole test
        let holder = Connection::open(config.record_set_path("anomalies")).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE;").unwrap();

        let started = std::time::Instant::now();
        db.append_reading(&Reading::now(SensorType::Humidity, 50.0)).unwrap();
        assert!(started.elapsed() < Duration::from_millis(300));

        assert!(db.append_anomaly(&anomaly_at(44.0, 0)).is_err());
        holder.execute_batch("ROLLBACK;").unwrap();
        db.append_anomaly(&anomaly_at(44.0, 0)).unwrap();
    }

    #[test]
    fn test_concurrent_appends_to_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&file_config(&dir)).unwrap());

        let writer = {
            let db = db.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    db.append_reading(&Reading::now(SensorType::Pressure, i as f64)).unwrap();
                }
            })
        };
        for i in 0..100 {
            db.append_anomaly(&anomaly_at(i as f64, i)).unwrap();
        }
        writer.join().unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.reading_count, 100);
        assert_eq!(stats.anomaly_count, 100);
    }

    #[tokio::test]
    async fn test_off_thread_append() {
        let sink: Arc<dyn Sink> = Arc::new(Database::open_in_memory().unwrap());
        let reading = Reading::now(SensorType::Temperature, 12.0);

        off_thread(&sink, move |sink| sink.append_reading(&reading)).await.unwrap();
        let rows = off_thread(&sink, |sink| sink.recent_readings(SensorType::Temperature, 10))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_concurrent_appends_to_both_sets() {
        let db = Arc::new(Database::open_in_memory().unwrap());

        let readers = {
            let db = db.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    db.append_reading(&Reading::now(SensorType::Temperature, i as f64)).unwrap();
                }
            })
        };
        for i in 0..200 {
            db.append_anomaly(&anomaly_at(i as f64, i)).unwrap();
        }
        readers.join().unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.reading_count, 200);
        assert_eq!(stats.anomaly_count, 200);
    }
}
