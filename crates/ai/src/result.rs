use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Generic model output envelope.
///
/// This is *not* a persisted artifact on its own; the orchestrator derives risk scores
/// from it and stores it in the predictions log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Entity the prediction is about (supplier id, item id, ...).
    pub subject: String,

    /// Primary score in \[0, 1\]. NaN when the model was fed degenerate input.
    pub score: f64,

    /// Confidence in \[0, 1\].
    pub confidence: f64,

    /// Named feature values that contributed to the score.
    pub factors: BTreeMap<String, f64>,

    pub timestamp: DateTime<Utc>,
}

impl Prediction {
    pub fn new(subject: impl Into<String>, score: f64, confidence: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            subject: subject.into(),
            score,
            confidence,
            factors: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn with_factor(mut self, name: impl Into<String>, value: f64) -> Self {
        self.factors.insert(name.into(), value);
        self
    }

    pub fn factor(&self, name: &str) -> Option<f64> {
        self.factors.get(name).copied()
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AiError {
    #[error("invalid model input: {0}")]
    InvalidInput(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),
}
