// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Error taxonomy for the pipeline
//!
//! Configuration and model errors stop the process at startup. Everything
//! else is reported by the running loops and swallowed.

use thiserror::Error;

use crate::sensors::SensorType;

/// Library error type
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// No scoring model registered for a sensor type
    #[error("no scoring model registered for sensor type '{0}'")]
    MissingModel(SensorType),

    /// A model file could not be loaded, saved or trained
    #[error("model error: {0}")]
    Model(String),

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Event channel failure (publish, subscribe, transport)
    #[error("channel error: {0}")]
    Channel(String),

    /// A stream message could not be decoded into a reading
    #[error("malformed message: {0}")]
    Decode(String),

    /// Filesystem or socket failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error must abort startup rather than be logged and skipped
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::MissingModel(_) | Error::Model(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Model(e.to_string())
    }
}

/// Library result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_categories() {
        assert!(Error::MissingModel(SensorType::Pressure).is_fatal());
        assert!(Error::Config("bad".into()).is_fatal());
        assert!(!Error::Channel("down".into()).is_fatal());
        assert!(!Error::Decode("junk".into()).is_fatal());
    }

    #[test]
    fn test_missing_model_message() {
        let e = Error::MissingModel(SensorType::Humidity);
        assert_eq!(e.to_string(), "no scoring model registered for sensor type 'humidity'");
    }
}
