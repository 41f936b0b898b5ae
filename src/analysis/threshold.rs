// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Fixed-bound scoring model

use serde::{Deserialize, Serialize};

use super::{ScoringModel, Verdict};

/// Flags values below `below` or above `above`. Either bound may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdModel {
    pub below: Option<f64>,
    pub above: Option<f64>,
}

impl ThresholdModel {
    /// Anomalous when strictly greater than `limit`
    pub fn above(limit: f64) -> Self {
        Self {
            below: None,
            above: Some(limit),
        }
    }

    /// Anomalous when strictly less than `limit`
    pub fn below(limit: f64) -> Self {
        Self {
            below: Some(limit),
            above: None,
        }
    }

    /// Anomalous outside `min..=max`
    pub fn outside(min: f64, max: f64) -> Self {
        Self {
            below: Some(min),
            above: Some(max),
        }
    }
}

impl ScoringModel for ThresholdModel {
    fn score(&self, value: f64) -> Verdict {
        let low = self.below.map_or(false, |limit| value < limit);
        let high = self.above.map_or(false, |limit| value > limit);

        if !value.is_finite() || low || high {
            Verdict::Anomalous
        } else {
            Verdict::Normal
        }
    }

    fn kind(&self) -> &'static str {
        "threshold"
    }
}
