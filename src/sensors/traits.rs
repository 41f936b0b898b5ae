// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Sensor types and the records that flow through the pipeline

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Sensor types supported by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Temperature,
    Humidity,
    Pressure,
}

impl SensorType {
    /// Every sensor type, in table order
    pub const ALL: [SensorType; 3] = [
        SensorType::Temperature,
        SensorType::Humidity,
        SensorType::Pressure,
    ];

    /// Number of sensor types
    pub const COUNT: usize = Self::ALL.len();

    /// Slot of this type in per-sensor tables
    pub const fn index(self) -> usize {
        match self {
            SensorType::Temperature => 0,
            SensorType::Humidity => 1,
            SensorType::Pressure => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SensorType::Temperature => "temperature",
            SensorType::Humidity => "humidity",
            SensorType::Pressure => "pressure",
        }
    }

    /// Pub/sub topic carrying readings of this type
    pub fn topic(self) -> String {
        format!("sensor_{}", self.as_str())
    }

    /// Inverse of [`SensorType::topic`]
    pub fn from_topic(topic: &str) -> Option<Self> {
        topic.strip_prefix("sensor_").and_then(|name| name.parse().ok())
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(SensorType::Temperature),
            "humidity" => Ok(SensorType::Humidity),
            "pressure" => Ok(SensorType::Pressure),
            other => Err(Error::Decode(format!("unknown sensor type '{}'", other))),
        }
    }
}

/// Truncate a timestamp to whole microseconds.
///
/// Readings are carried as float seconds on the wire and as integer
/// microseconds in storage; both represent microsecond instants exactly.
pub fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_micros(ts.timestamp_micros())
        .single()
        .unwrap_or(ts)
}

/// A single sensor observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_type: SensorType,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(sensor_type: SensorType, value: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            sensor_type,
            value,
            observed_at: truncate_micros(observed_at),
        }
    }

    /// Reading observed now
    pub fn now(sensor_type: SensorType, value: f64) -> Self {
        Self::new(sensor_type, value, Utc::now())
    }
}

/// A reading the scorer classified as anomalous
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub sensor_type: SensorType,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

impl From<&Reading> for AnomalyRecord {
    fn from(reading: &Reading) -> Self {
        Self {
            sensor_type: reading.sensor_type,
            value: reading.value,
            observed_at: reading.observed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_roundtrip() {
        for sensor in SensorType::ALL {
            assert_eq!(SensorType::from_topic(&sensor.topic()), Some(sensor));
        }
        assert_eq!(SensorType::Humidity.topic(), "sensor_humidity");
        assert_eq!(SensorType::from_topic("sensor_wind"), None);
        assert_eq!(SensorType::from_topic("temperature"), None);
    }

    #[test]
    fn test_table_indices_are_dense() {
        for (i, sensor) in SensorType::ALL.iter().enumerate() {
            assert_eq!(sensor.index(), i);
        }
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&SensorType::Pressure).unwrap();
        assert_eq!(json, "\"pressure\"");
        assert!("Pressure".parse::<SensorType>().is_err());
    }

    #[test]
    fn test_anomaly_mirrors_reading() {
        let reading = Reading::now(SensorType::Temperature, 42.0);
        let record = AnomalyRecord::from(&reading);
        assert_eq!(record.sensor_type, reading.sensor_type);
        assert_eq!(record.value, reading.value);
        assert_eq!(record.observed_at, reading.observed_at);
        assert_eq!(reading.observed_at.timestamp_subsec_nanos() % 1_000, 0);
    }
}
