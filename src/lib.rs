// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Sensorwatch - streaming sensor anomaly detection
//!
//! Synthetic temperature, humidity and pressure readings are published on a
//! per-sensor-type event channel, scored against a per-type model, and
//! persisted and broadcast to live observers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Sensorwatch Pipeline                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐   ┌───────────────┐   ┌──────────────────────┐  │
//! │  │ Reading │ → │ Event Channel │ → │   Anomaly Scorer     │  │
//! │  │ Source  │   │ (memory/MQTT) │   │  (model registry)    │  │
//! │  └─────────┘   └───────────────┘   └──────────────────────┘  │
//! │       ↓                                     ↓                │
//! │  ┌──────────────────────────┐   ┌──────────────────────────┐ │
//! │  │  Database (readings,     │   │  Live Fan-out            │ │
//! │  │  anomalies)              │   │  (WebSocket observers)   │ │
//! │  └──────────────────────────┘   └──────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod analysis;
pub mod config;
pub mod core;
pub mod db;
pub mod detection;
pub mod error;
pub mod sensors;
pub mod streaming;

// Re-exports for convenience
pub use crate::core::{Pipeline, PipelineStats, StatsSnapshot};
pub use config::Config;
pub use db::{Database, Sink};
pub use detection::{AnomalyScorer, ModelRegistry};
pub use error::{Error, Result};
pub use sensors::{AnomalyRecord, Reading, SensorType};
pub use streaming::{LiveEvent, LiveFanout};

/// Sensorwatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sensorwatch name
pub const NAME: &str = "Sensorwatch";
