//! Analysis module - scoring models and model files
//!
//! A scoring model maps a single reading value to a [`Verdict`]. Models are
//! loaded once and shared read-only between scorer tasks.

mod isolation_forest;
mod threshold;
mod training;

pub use isolation_forest::{ForestParams, IsolationForest};
pub use threshold::ThresholdModel;
pub use training::{model_file_name, train_sensor_model, TRAINING_SAMPLES};

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// Binary classification of one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Normal,
    Anomalous,
}

impl Verdict {
    pub fn is_anomalous(self) -> bool {
        self == Verdict::Anomalous
    }
}

/// Inference-time contract of a trained model.
///
/// Implementations must be deterministic: the same value always yields the
/// same verdict for a given loaded model.
pub trait ScoringModel: Send + Sync + Debug {
    fn score(&self, value: f64) -> Verdict;

    /// Short model family name for logs
    fn kind(&self) -> &'static str;
}

/// On-disk model representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelFile {
    Threshold(ThresholdModel),
    IsolationForest(IsolationForest),
}

impl ModelFile {
    /// Load a model file; `.json` files are JSON, anything else bincode
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let model = if is_json(path) {
            serde_json::from_slice(&bytes).map_err(|e| Error::Model(format!("{}: {}", path.display(), e)))?
        } else {
            bincode::deserialize(&bytes).map_err(|e| Error::Model(format!("{}: {}", path.display(), e)))?
        };
        info!("Loaded model from {:?}", path);
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = if is_json(path) {
            serde_json::to_vec_pretty(self).map_err(|e| Error::Model(e.to_string()))?
        } else {
            bincode::serialize(self)?
        };
        std::fs::write(path, bytes)?;
        info!("Saved model to {:?}", path);
        Ok(())
    }

    pub fn into_model(self) -> Arc<dyn ScoringModel> {
        match self {
            ModelFile::Threshold(model) => Arc::new(model),
            ModelFile::IsolationForest(model) => Arc::new(model),
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_file_formats() {
        let dir = tempfile::tempdir().unwrap();
        let model = ModelFile::Threshold(ThresholdModel::above(40.0));

        for name in ["model.bin", "model.json"] {
            let path = dir.path().join(name);
            model.save(&path).unwrap();
            let loaded = ModelFile::load(&path).unwrap().into_model();
            assert_eq!(loaded.kind(), "threshold");
            assert_eq!(loaded.score(42.0), Verdict::Anomalous);
            assert_eq!(loaded.score(20.0), Verdict::Normal);
        }
    }

    #[test]
    fn test_forest_survives_bincode() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<f64> = (0..300).map(|i| i as f64 / 10.0).collect();
        let forest = IsolationForest::fit(&data, &ForestParams::default()).unwrap();

        let path = dir.path().join("forest.bin");
        ModelFile::IsolationForest(forest.clone()).save(&path).unwrap();
        let loaded = ModelFile::load(&path).unwrap().into_model();

        for x in [-5.0, 0.0, 15.0, 29.9, 100.0] {
            assert_eq!(loaded.score(x), forest.score(x));
        }
    }

    #[test]
    fn test_corrupt_file_is_model_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{ nope").unwrap();
        let err = ModelFile::load(&path).unwrap_err();
        assert!(matches!(err, Error::Model(_)));
        assert!(err.is_fatal());
    }
}
