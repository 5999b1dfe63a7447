//! Supplier performance prediction.
//!
//! Model:
//! - Average delivery and quality rates over the whole history (percent → 0..1).
//! - Response time scored against a 48h baseline.
//! - Least-squares trend of delivery and quality across the series.
//! - Consistency from the spread of overall ratings.
//!
//! The weighted sum of those features is the predicted performance in \[0, 1\].
//! Empty history is **not** rejected here: features become NaN and the NaN flows into
//! the score. Callers are expected to only evaluate suppliers with at least one record.

use chrono::{DateTime, Utc};

use supplysight_core::SupplierId;

use crate::result::Prediction;
use crate::snapshot::PerformanceRecord;
use crate::stats::{least_squares_slope, mean, std_dev_population};

/// Weights of the performance score. They sum to 1.05; the score is clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceWeights {
    pub delivery_history: f64,
    pub quality_metrics: f64,
    pub response_time: f64,
    pub delivery_trend: f64,
    pub quality_trend: f64,
    pub consistency: f64,
}

impl Default for PerformanceWeights {
    fn default() -> Self {
        Self {
            delivery_history: 0.30,
            quality_metrics: 0.25,
            response_time: 0.15,
            delivery_trend: 0.10,
            quality_trend: 0.10,
            consistency: 0.15,
        }
    }
}

/// Features extracted from a supplier's history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupplierFeatures {
    pub avg_delivery_rate: f64,
    pub avg_quality_rate: f64,
    pub response_time_score: f64,
    pub delivery_trend: f64,
    pub quality_trend: f64,
    pub consistency_score: f64,
    pub recent_performance: f64,
}

impl SupplierFeatures {
    pub const CONSISTENCY: &'static str = "consistency_score";

    fn named(&self) -> [(&'static str, f64); 7] {
        [
            ("avg_delivery_rate", self.avg_delivery_rate),
            ("avg_quality_rate", self.avg_quality_rate),
            ("response_time_score", self.response_time_score),
            ("delivery_trend", self.delivery_trend),
            ("quality_trend", self.quality_trend),
            (Self::CONSISTENCY, self.consistency_score),
            ("recent_performance", self.recent_performance),
        ]
    }

    /// Share of features that are usable numbers.
    pub fn quality(&self) -> f64 {
        let named = self.named();
        let valid = named.iter().filter(|(_, v)| !v.is_nan()).count();
        valid as f64 / named.len() as f64
    }
}

/// `history` is expected most-recent-first; `recent` is the latest metrics snapshot.
pub fn extract_features(history: &[PerformanceRecord], recent: Option<&PerformanceRecord>) -> SupplierFeatures {
    let delivery: Vec<f64> = history.iter().map(|p| p.on_time_delivery_rate).collect();
    let quality: Vec<f64> = history.iter().map(|p| p.quality_acceptance_rate).collect();
    let response: Vec<f64> = history.iter().map(|p| p.response_time_hours).collect();

    let avg_response = mean(&response);
    // NaN must survive here; f64::max would swallow it.
    let response_time_score = if avg_response.is_nan() {
        f64::NAN
    } else {
        (1.0 - avg_response / 48.0).max(0.0)
    };

    SupplierFeatures {
        avg_delivery_rate: mean(&delivery) / 100.0,
        avg_quality_rate: mean(&quality) / 100.0,
        response_time_score,
        delivery_trend: normalized_trend(&delivery),
        quality_trend: normalized_trend(&quality),
        consistency_score: consistency(history),
        recent_performance: recent.map(|r| r.overall_rating).unwrap_or(0.5),
    }
}

fn normalized_trend(values: &[f64]) -> f64 {
    (least_squares_slope(values) / 10.0).clamp(-1.0, 1.0)
}

fn consistency(history: &[PerformanceRecord]) -> f64 {
    if history.len() < 2 {
        return 1.0;
    }
    let ratings: Vec<f64> = history.iter().map(|h| h.overall_rating).collect();
    let std = std_dev_population(&ratings, mean(&ratings));
    (1.0 - std / 2.0).max(0.0)
}

/// Stateless predictor; holds only its weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupplierPerformancePredictor {
    weights: PerformanceWeights,
}

impl SupplierPerformancePredictor {
    pub fn new(weights: PerformanceWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, f: &SupplierFeatures) -> f64 {
        let w = &self.weights;
        let raw = f.avg_delivery_rate * w.delivery_history
            + f.avg_quality_rate * w.quality_metrics
            + f.response_time_score * w.response_time
            + f.delivery_trend * w.delivery_trend
            + f.quality_trend * w.quality_trend
            + f.consistency_score * w.consistency;
        // clamp keeps NaN as NaN
        raw.clamp(0.0, 1.0)
    }

    pub fn predict(
        &self,
        supplier_id: SupplierId,
        history: &[PerformanceRecord],
        recent: Option<&PerformanceRecord>,
        as_of: DateTime<Utc>,
    ) -> Prediction {
        let features = extract_features(history, recent);
        let data_size_score = (history.len() as f64 / 10.0).min(1.0);
        let confidence = data_size_score * 0.6 + features.quality() * 0.4;

        features.named().into_iter().fold(
            Prediction::new(supplier_id.to_string(), self.score(&features), confidence, as_of),
            |p, (name, value)| p.with_factor(name, value),
        )
    }
}
