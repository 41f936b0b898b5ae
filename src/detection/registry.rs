// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Fixed table of scoring models, one per sensor type

use std::sync::Arc;

use tracing::{info, warn};

use crate::analysis::{ModelFile, ScoringModel, ThresholdModel, Verdict};
use crate::config::SensorsConfig;
use crate::error::{Error, Result};
use crate::sensors::SensorType;

/// Scoring models indexed by sensor type.
///
/// A registry always holds a model for every sensor type; building one with
/// a gap fails with [`Error::MissingModel`].
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: [Arc<dyn ScoringModel>; SensorType::COUNT],
}

impl ModelRegistry {
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    /// Load the configured model for every sensor type.
    ///
    /// A sensor type without a `model` path gets a threshold over its
    /// configured value range. A configured path that does not exist is a
    /// missing model.
    pub fn load(sensors: &SensorsConfig) -> Result<Self> {
        let mut builder = Self::builder();

        for sensor in SensorType::ALL {
            let settings = sensors.get(sensor);
            let model = match &settings.model {
                Some(path) if !path.exists() => {
                    return Err(Error::MissingModel(sensor));
                }
                Some(path) => ModelFile::load(path)?.into_model(),
                None => {
                    warn!(
                        "No model file for {}, flagging values outside [{}, {}]",
                        sensor, settings.min, settings.max
                    );
                    Arc::new(ThresholdModel::outside(settings.min, settings.max))
                }
            };
            info!("Scoring {} with {} model", sensor, model.kind());
            builder = builder.with_shared(sensor, model);
        }

        builder.build()
    }

    pub fn model(&self, sensor: SensorType) -> &dyn ScoringModel {
        self.models[sensor.index()].as_ref()
    }

    pub fn score(&self, sensor: SensorType, value: f64) -> Verdict {
        self.model(sensor).score(value)
    }
}

#[derive(Default)]
pub struct ModelRegistryBuilder {
    slots: [Option<Arc<dyn ScoringModel>>; SensorType::COUNT],
}

impl ModelRegistryBuilder {
    pub fn with<M>(self, sensor: SensorType, model: M) -> Self
    where
        M: ScoringModel + 'static,
    {
        self.with_shared(sensor, Arc::new(model))
    }

    pub fn with_shared(mut self, sensor: SensorType, model: Arc<dyn ScoringModel>) -> Self {
        self.slots[sensor.index()] = Some(model);
        self
    }

    pub fn build(self) -> Result<ModelRegistry> {
        let [temperature, humidity, pressure] = self.slots;

        Ok(ModelRegistry {
            models: [
                temperature.ok_or(Error::MissingModel(SensorType::Temperature))?,
                humidity.ok_or(Error::MissingModel(SensorType::Humidity))?,
                pressure.ok_or(Error::MissingModel(SensorType::Pressure))?,
            ],
        })
    }
}
