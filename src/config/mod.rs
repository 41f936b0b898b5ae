// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Configuration module
//!
//! Everything here is fixed at startup; nothing is re-read while the
//! pipeline runs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result};
use crate::sensors::SensorType;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory
    pub data_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Reading source configuration
    pub source: SourceConfig,

    /// Per-sensor-type emission and model settings
    pub sensors: SensorsConfig,

    /// Event channel configuration
    pub channel: ChannelConfig,

    /// Anomaly scorer configuration
    pub scorer: ScorerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Live update configuration
    pub live: LiveConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            source: SourceConfig::default(),
            sensors: SensorsConfig::default(),
            channel: ChannelConfig::default(),
            scorer: ScorerConfig::default(),
            database: DatabaseConfig::default(),
            live: LiveConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("sensorwatch"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.source.tick_ms == 0 {
            return Err(Error::Config("source.tick_ms must be positive".into()));
        }
        if self.scorer.poll_timeout_ms == 0 {
            return Err(Error::Config("scorer.poll_timeout_ms must be positive".into()));
        }
        if self.scorer.partitioned && self.channel.backend == ChannelBackend::Mqtt {
            return Err(Error::Config(
                "scorer.partitioned needs the memory channel; the MQTT channel has one consumer".into(),
            ));
        }
        if self.live.observer_buffer == 0 {
            return Err(Error::Config("live.observer_buffer must be positive".into()));
        }
        for sensor in SensorType::ALL {
            self.sensors
                .get(sensor)
                .validate()
                .map_err(|msg| Error::Config(format!("sensors.{}: {}", sensor, msg)))?;
        }
        Ok(())
    }
}

/// Reading source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Emission cycle period in milliseconds
    pub tick_ms: u64,
}

impl SourceConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { tick_ms: 100 }
    }
}

/// Settings for one sensor type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSettings {
    /// Nominal emission interval in seconds
    pub interval_secs: f64,

    /// Lower bound of generated values
    pub min: f64,

    /// Upper bound of generated values
    pub max: f64,

    /// Per-tick probability of an out-of-cadence emission
    pub spike_probability: f64,

    /// Scoring model file. Unset means a range threshold over `min..=max`.
    pub model: Option<PathBuf>,
}

impl SensorSettings {
    pub fn new(interval_secs: f64, min: f64, max: f64) -> Self {
        Self {
            interval_secs,
            min,
            max,
            spike_probability: 0.1,
            model: None,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if !(self.interval_secs.is_finite() && self.interval_secs > 0.0) {
            return Err(format!("interval_secs must be positive, got {}", self.interval_secs));
        }
        if !(self.min.is_finite() && self.max.is_finite() && self.min < self.max) {
            return Err(format!("empty value range [{}, {}]", self.min, self.max));
        }
        if !(0.0..=1.0).contains(&self.spike_probability) {
            return Err(format!(
                "spike_probability must be within [0, 1], got {}",
                self.spike_probability
            ));
        }
        Ok(())
    }
}

/// Per-sensor-type settings table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorsConfig {
    pub temperature: SensorSettings,
    pub humidity: SensorSettings,
    pub pressure: SensorSettings,
}

impl SensorsConfig {
    pub fn get(&self, sensor: SensorType) -> &SensorSettings {
        match sensor {
            SensorType::Temperature => &self.temperature,
            SensorType::Humidity => &self.humidity,
            SensorType::Pressure => &self.pressure,
        }
    }

    pub fn get_mut(&mut self, sensor: SensorType) -> &mut SensorSettings {
        match sensor {
            SensorType::Temperature => &mut self.temperature,
            SensorType::Humidity => &mut self.humidity,
            SensorType::Pressure => &mut self.pressure,
        }
    }
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            temperature: SensorSettings::new(2.0, -45.0, 45.0),
            humidity: SensorSettings::new(3.0, 30.0, 90.0),
            pressure: SensorSettings::new(4.0, 10.0, 50.0),
        }
    }
}

/// Event channel backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelBackend {
    /// In-process queues
    Memory,
    /// MQTT broker
    Mqtt,
}

/// Event channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub backend: ChannelBackend,
    pub mqtt_broker: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_keep_alive_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            backend: ChannelBackend::Memory,
            mqtt_broker: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_client_id: "sensorwatch".to_string(),
            mqtt_username: None,
            mqtt_password: None,
            mqtt_keep_alive_secs: 30,
        }
    }
}

/// Anomaly scorer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Bounded wait per poll in milliseconds
    pub poll_timeout_ms: u64,

    /// Run one scorer per sensor-type topic instead of one over all topics
    pub partitioned: bool,
}

impl ScorerConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 1000,
            partitioned: false,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding one database file per record set, or `:memory:`
    pub dir: PathBuf,

    /// How long a writer waits on a locked database, in milliseconds
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            dir: PathBuf::from(":memory:"),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.dir.as_os_str() == ":memory:"
    }

    /// Database file of one record set
    pub fn record_set_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.db", table))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/db"),
            busy_timeout_ms: 5000,
        }
    }
}

/// Live update configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Enable WebSocket server
    pub websocket_enabled: bool,
    pub websocket_port: u16,
    pub max_clients: usize,

    /// Events queued per observer before it starts missing them
    pub observer_buffer: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            websocket_enabled: true,
            websocket_port: 5000,
            max_clients: 64,
            observer_buffer: 256,
        }
    }
}
