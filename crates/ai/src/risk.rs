//! Supplier risk scoring.
//!
//! Turns a performance prediction plus the latest evaluation period into a 0..100 risk
//! score. Every factor is on a 0..100 scale where 100 means "as bad as it gets":
//!
//! | factor | saturates at |
//! |---|---|
//! | `delivery_reliability` | on-time rate 70% (the high-severity delivery line) |
//! | `quality_issues` | acceptance rate 80% (the high-severity quality line) |
//! | `communication_response` | 48h response time (24h is free) |
//! | `performance_outlook` | predicted performance 0 |
//! | `rating_volatility` | consistency score 0 |

use serde::{Deserialize, Serialize};

use supplysight_core::SupplierId;

use crate::result::Prediction;
use crate::snapshot::PerformanceRecord;
use crate::supplier_performance::SupplierFeatures;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub delivery_reliability: f64,
    pub quality_issues: f64,
    pub communication_response: f64,
    pub performance_outlook: f64,
    pub rating_volatility: f64,
}

impl RiskFactors {
    const WEIGHTS: [f64; 5] = [0.30, 0.25, 0.15, 0.20, 0.10];

    fn values(&self) -> [f64; 5] {
        [
            self.delivery_reliability,
            self.quality_issues,
            self.communication_response,
            self.performance_outlook,
            self.rating_volatility,
        ]
    }

    /// Weighted risk in \[0, 100\]. Non-finite factors contribute nothing.
    pub fn weighted(&self) -> f64 {
        let total: f64 = self
            .values()
            .iter()
            .zip(Self::WEIGHTS)
            .map(|(v, w)| if v.is_finite() { v * w } else { 0.0 })
            .sum();
        total.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskRecommendation {
    Maintain,
    Monitor,
    Review,
    Replace,
}

impl RiskRecommendation {
    pub fn for_score(risk_score: f64) -> Self {
        if risk_score > 70.0 {
            Self::Replace
        } else if risk_score > 50.0 {
            Self::Review
        } else if risk_score > 30.0 {
            Self::Monitor
        } else {
            Self::Maintain
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Maintain => "maintain",
            Self::Monitor => "monitor",
            Self::Review => "review",
            Self::Replace => "replace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub supplier_id: SupplierId,
    /// 0..=100, higher is riskier.
    pub risk_score: f64,
    pub risk_factors: RiskFactors,
    pub recommendation: RiskRecommendation,
    /// 0..=1, inherited from the prediction.
    pub confidence: f64,
}

fn saturate(deficit: f64, tolerance: f64) -> f64 {
    (deficit / tolerance * 100.0).clamp(0.0, 100.0)
}

/// `history` is most-recent-first; only its head is read.
pub fn score_supplier_risk(
    supplier_id: SupplierId,
    history: &[PerformanceRecord],
    prediction: &Prediction,
) -> RiskScore {
    let latest = history.first();

    let delivery_reliability = latest.map_or(0.0, |p| saturate(100.0 - p.on_time_delivery_rate, 30.0));
    let quality_issues = latest.map_or(0.0, |p| saturate(100.0 - p.quality_acceptance_rate, 20.0));
    let communication_response = latest.map_or(0.0, |p| saturate(p.response_time_hours - 24.0, 24.0));
    let consistency = prediction.factor(SupplierFeatures::CONSISTENCY).unwrap_or(1.0);

    let risk_factors = RiskFactors {
        delivery_reliability,
        quality_issues,
        communication_response,
        performance_outlook: ((1.0 - prediction.score) * 100.0).clamp(0.0, 100.0),
        rating_volatility: ((1.0 - consistency) * 100.0).clamp(0.0, 100.0),
    };

    let risk_score = risk_factors.weighted();
    let confidence = if prediction.confidence.is_nan() {
        0.0
    } else {
        prediction.confidence.clamp(0.0, 1.0)
    };

    RiskScore {
        supplier_id,
        risk_score,
        risk_factors,
        recommendation: RiskRecommendation::for_score(risk_score),
        confidence,
    }
}

/// Human-readable follow-ups for a scored supplier.
pub fn supplier_recommendations(supplier_name: &str, risk: &RiskScore, prediction: &Prediction) -> Vec<String> {
    let mut out = Vec::new();

    if risk.risk_score > 50.0 {
        out.push(format!("High risk supplier {supplier_name}: Consider diversifying orders"));
    }
    if risk.risk_factors.delivery_reliability > 20.0 {
        out.push(format!("{supplier_name}: Delivery performance needs improvement"));
    }
    if prediction.score < 0.7 {
        out.push(format!("{supplier_name}: Performance trend is declining"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supplier_performance::SupplierPerformancePredictor;
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap()
    }

    fn record(s: SupplierId, on_time: f64, quality: f64, response: f64, overall: f64, day: u32) -> PerformanceRecord {
        PerformanceRecord {
            supplier_id: s,
            on_time_delivery_rate: on_time,
            quality_acceptance_rate: quality,
            response_time_hours: response,
            overall_rating: overall,
            evaluation_date: at(day),
        }
    }

    fn score(history: &[PerformanceRecord]) -> RiskScore {
        let s = history.first().map(|p| p.supplier_id).unwrap_or_default();
        let prediction = SupplierPerformancePredictor::default().predict(s, history, history.first(), at(28));
        score_supplier_risk(s, history, &prediction)
    }

    #[test]
    fn deteriorating_supplier_needs_review_or_replacement() {
        let s = SupplierId::new();
        let history = vec![record(s, 60.0, 75.0, 50.0, 0.5, 20), record(s, 95.0, 98.0, 10.0, 0.9, 1)];

        let risk = score(&history);

        assert!(risk.risk_score > 50.0, "risk was {}", risk.risk_score);
        assert!(matches!(
            risk.recommendation,
            RiskRecommendation::Review | RiskRecommendation::Replace
        ));
        assert_eq!(risk.risk_factors.delivery_reliability, 100.0);
        assert_eq!(risk.risk_factors.quality_issues, 100.0);
        assert!((risk.confidence - 0.52).abs() < 1e-9);
    }

    #[test]
    fn reliable_supplier_is_maintained() {
        let s = SupplierId::new();
        let history: Vec<_> = (1..=10).map(|d| record(s, 98.0, 99.0, 6.0, 0.95, d)).collect();

        let risk = score(&history);

        assert_eq!(risk.recommendation, RiskRecommendation::Maintain);
        assert!(risk.risk_score < 30.0);
        assert_eq!(risk.risk_factors.communication_response, 0.0);
    }

    #[test]
    fn recommendation_thresholds_are_strict() {
        assert_eq!(RiskRecommendation::for_score(30.0), RiskRecommendation::Maintain);
        assert_eq!(RiskRecommendation::for_score(30.1), RiskRecommendation::Monitor);
        assert_eq!(RiskRecommendation::for_score(50.0), RiskRecommendation::Monitor);
        assert_eq!(RiskRecommendation::for_score(70.0), RiskRecommendation::Review);
        assert_eq!(RiskRecommendation::for_score(70.5), RiskRecommendation::Replace);
    }

    #[test]
    fn empty_history_stays_in_bounds() {
        let risk = score(&[]);
        assert!(risk.risk_score.is_finite());
        assert!((0.0..=100.0).contains(&risk.risk_score));
        assert!((0.0..=1.0).contains(&risk.confidence));
    }

    #[test]
    fn recommendations_mention_the_supplier() {
        let s = SupplierId::new();
        let history = vec![record(s, 60.0, 75.0, 50.0, 0.5, 20), record(s, 95.0, 98.0, 10.0, 0.9, 1)];
        let prediction = SupplierPerformancePredictor::default().predict(s, &history, history.first(), at(28));
        let risk = score_supplier_risk(s, &history, &prediction);

        let recs = supplier_recommendations("Acme", &risk, &prediction);

        assert!(recs.iter().any(|r| r.starts_with("High risk supplier Acme")));
        assert!(recs.iter().any(|r| r == "Acme: Delivery performance needs improvement"));
        // prediction is 0.84, so no declining-trend note
        assert_eq!(recs.len(), 2);
    }

    fn arb_record() -> impl Strategy<Value = (f64, f64, f64, f64)> {
        (0.0f64..=100.0, 0.0f64..=100.0, 0.0f64..=500.0, 0.0f64..=5.0)
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: risk score and confidence stay within their bounds for any history.
        #[test]
        fn risk_and_confidence_are_bounded(rows in prop::collection::vec(arb_record(), 0..20)) {
            let s = SupplierId::new();
            let history: Vec<_> = rows
                .iter()
                .enumerate()
                .map(|(i, (ot, q, r, o))| record(s, *ot, *q, *r, *o, (i as u32 % 28) + 1))
                .collect();

            let risk = score(&history);

            prop_assert!(risk.risk_score >= 0.0 && risk.risk_score <= 100.0);
            prop_assert!(risk.confidence >= 0.0 && risk.confidence <= 1.0);
        }
    }
}
