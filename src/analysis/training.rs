// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Default model training
//!
//! Fits a forest to values drawn uniformly over the configured sensor range,
//! the same distribution the reading source generates.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::Uniform;
use tracing::info;

use super::{ForestParams, IsolationForest};
use crate::config::SensorSettings;
use crate::error::Result;
use crate::sensors::SensorType;

/// Training values drawn per sensor type
pub const TRAINING_SAMPLES: usize = 500;

/// Conventional file name for a sensor type's model
pub fn model_file_name(sensor: SensorType) -> String {
    format!("model_{}.bin", sensor)
}

pub fn train_sensor_model(
    sensor: SensorType,
    settings: &SensorSettings,
    params: &ForestParams,
) -> Result<IsolationForest> {
    // distinct stream per sensor type from one seed
    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    rng.set_stream(sensor.index() as u64);

    let range = Uniform::new(settings.min, settings.max);
    let data: Vec<f64> = (0..TRAINING_SAMPLES).map(|_| rng.sample(range)).collect();

    info!("Training Isolation Forest model for {}...", sensor);
    let forest = IsolationForest::fit(&data, params)?;
    info!(
        "Model for {} trained ({} trees, threshold {:.4})",
        sensor,
        forest.tree_count(),
        forest.threshold()
    );

    Ok(forest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ScoringModel, Verdict};
    use crate::config::SensorsConfig;

    #[test]
    fn test_trained_model_accepts_typical_values() {
        let sensors = SensorsConfig::default();
        let forest = train_sensor_model(
            SensorType::Humidity,
            sensors.get(SensorType::Humidity),
            &ForestParams::default(),
        )
        .unwrap();

        assert_eq!(forest.score(60.0), Verdict::Normal);
        assert!(forest.anomaly_score(500.0) > forest.anomaly_score(60.0));
    }

    #[test]
    fn test_file_names() {
        assert_eq!(model_file_name(SensorType::Temperature), "model_temperature.bin");
    }
}
