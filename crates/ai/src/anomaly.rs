//! Rule-based anomaly detection for suppliers and inventory.
//!
//! Rules:
//! - on-time delivery below 85% (high below 70%)
//! - quality acceptance below 90% (high below 80%)
//! - stock at or below the reorder point (high when empty)
//! - stock more than 20% above the maximum
//! - unit cost swinging more than 15% around its 30-day mean

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use supplysight_core::{AnomalyId, ItemId, SupplierId};

use crate::snapshot::{InventoryItemSnapshot, PerformanceRecord, StockMovement};
use crate::stats::mean;

const DELIVERY_THRESHOLD: f64 = 85.0;
const DELIVERY_HIGH: f64 = 70.0;
const QUALITY_THRESHOLD: f64 = 90.0;
const QUALITY_HIGH: f64 = 80.0;
const OVERSTOCK_FACTOR: f64 = 1.2;
const PRICE_DEVIATION: f64 = 0.15;
const PRICE_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Unknown values read as `Low`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyStatus {
    Active,
    Resolved,
}

impl AnomalyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
        }
    }
}

/// What an anomaly is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity_type", content = "entity_id", rename_all = "snake_case")]
pub enum AnomalySubject {
    Supplier(SupplierId),
    Item(ItemId),
    /// Free-form reference for anomalies raised outside this crate.
    System(Option<String>),
}

impl AnomalySubject {
    pub fn entity_type(&self) -> &'static str {
        match self {
            Self::Supplier(_) => "supplier",
            Self::Item(_) => "item",
            Self::System(_) => "system",
        }
    }

    pub fn entity_id(&self) -> Option<String> {
        match self {
            Self::Supplier(id) => Some(id.to_string()),
            Self::Item(id) => Some(id.to_string()),
            Self::System(reference) => reference.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnomalyType {
    DeliveryPerformance,
    QualityIssues,
    LowStock,
    Overstock,
    PriceVolatility,
    Other(String),
}

impl AnomalyType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DeliveryPerformance => "delivery_performance",
            Self::QualityIssues => "quality_issues",
            Self::LowStock => "low_stock",
            Self::Overstock => "overstock",
            Self::PriceVolatility => "price_volatility",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for AnomalyType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "delivery_performance" => Self::DeliveryPerformance,
            "quality_issues" => Self::QualityIssues,
            "low_stock" => Self::LowStock,
            "overstock" => Self::Overstock,
            "price_volatility" => Self::PriceVolatility,
            _ => Self::Other(s),
        }
    }
}

impl From<AnomalyType> for String {
    fn from(t: AnomalyType) -> Self {
        t.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: AnomalyId,
    pub subject: AnomalySubject,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub description: String,
    pub value: f64,
    pub threshold: Option<f64>,
    pub detected_at: DateTime<Utc>,
    pub status: AnomalyStatus,
}

impl Anomaly {
    pub fn new(
        subject: AnomalySubject,
        anomaly_type: AnomalyType,
        severity: Severity,
        description: impl Into<String>,
        value: f64,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AnomalyId::new(),
            subject,
            anomaly_type,
            severity,
            description: description.into(),
            value,
            threshold: None,
            detected_at,
            status: AnomalyStatus::Active,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// High or critical.
    pub fn requires_attention(&self) -> bool {
        self.severity >= Severity::High
    }
}

pub fn detect_supplier_anomalies(records: &[PerformanceRecord], detected_at: DateTime<Utc>) -> Vec<Anomaly> {
    let mut out = Vec::new();

    for r in records {
        let subject = AnomalySubject::Supplier(r.supplier_id);

        if r.on_time_delivery_rate < DELIVERY_THRESHOLD {
            let severity = if r.on_time_delivery_rate < DELIVERY_HIGH {
                Severity::High
            } else {
                Severity::Medium
            };
            out.push(
                Anomaly::new(
                    subject.clone(),
                    AnomalyType::DeliveryPerformance,
                    severity,
                    "On-time delivery rate below threshold",
                    r.on_time_delivery_rate,
                    detected_at,
                )
                .with_threshold(DELIVERY_THRESHOLD),
            );
        }

        if r.quality_acceptance_rate < QUALITY_THRESHOLD {
            let severity = if r.quality_acceptance_rate < QUALITY_HIGH {
                Severity::High
            } else {
                Severity::Medium
            };
            out.push(
                Anomaly::new(
                    subject,
                    AnomalyType::QualityIssues,
                    severity,
                    "Quality acceptance rate below threshold",
                    r.quality_acceptance_rate,
                    detected_at,
                )
                .with_threshold(QUALITY_THRESHOLD),
            );
        }
    }

    out
}

/// `as_of` bounds the price-volatility window and stamps `detected_at`.
pub fn detect_inventory_anomalies(
    items: &[InventoryItemSnapshot],
    movements: &[StockMovement],
    as_of: DateTime<Utc>,
) -> Vec<Anomaly> {
    let window_start = as_of - Duration::days(PRICE_WINDOW_DAYS);
    let mut out = Vec::new();

    for item in items {
        let subject = AnomalySubject::Item(item.id);

        if item.current_stock <= item.reorder_point {
            let severity = if item.current_stock == 0 {
                Severity::High
            } else {
                Severity::Medium
            };
            out.push(Anomaly::new(
                subject.clone(),
                AnomalyType::LowStock,
                severity,
                "Stock level at or below reorder point",
                item.current_stock as f64,
                as_of,
            ));
        }

        if item.current_stock as f64 > item.max_stock as f64 * OVERSTOCK_FACTOR {
            out.push(Anomaly::new(
                subject.clone(),
                AnomalyType::Overstock,
                Severity::Medium,
                "Stock level significantly above maximum",
                item.current_stock as f64,
                as_of,
            ));
        }

        let costs: Vec<f64> = movements
            .iter()
            .filter(|m| m.item_id == item.id && m.timestamp > window_start && m.timestamp <= as_of)
            .filter_map(|m| m.unit_cost)
            .filter(|c| *c != 0.0 && c.is_finite())
            .collect();

        if let Some(ratio) = price_deviation_ratio(&costs) {
            out.push(Anomaly::new(
                subject,
                AnomalyType::PriceVolatility,
                Severity::Medium,
                "Unusual price volatility detected",
                ratio,
                as_of,
            ));
        }
    }

    out
}

/// Max deviation from the mean, relative to the mean, when it exceeds the limit.
fn price_deviation_ratio(costs: &[f64]) -> Option<f64> {
    if costs.len() < 2 {
        return None;
    }
    let avg = mean(costs);
    let max_dev = costs.iter().map(|c| (c - avg).abs()).fold(0.0, f64::max);
    (max_dev > avg * PRICE_DEVIATION).then(|| max_dev / avg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::MovementKind;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap()
    }

    fn perf(on_time: f64, quality: f64) -> PerformanceRecord {
        PerformanceRecord {
            supplier_id: SupplierId::new(),
            on_time_delivery_rate: on_time,
            quality_acceptance_rate: quality,
            response_time_hours: 24.0,
            overall_rating: 0.8,
            evaluation_date: now() - Duration::days(3),
        }
    }

    fn stock(current: i64, reorder: i64, max: i64) -> InventoryItemSnapshot {
        InventoryItemSnapshot {
            id: ItemId::new(),
            sku: "SKU-1".to_string(),
            current_stock: current,
            reorder_point: reorder,
            max_stock: max,
            unit_price: 10.0,
            unit_cost: 6.0,
        }
    }

    fn costed(item_id: ItemId, cost: Option<f64>, days_ago: i64) -> StockMovement {
        StockMovement {
            item_id,
            kind: MovementKind::Inbound,
            quantity: 5.0,
            unit_cost: cost,
            timestamp: now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn poor_delivery_and_quality_are_flagged() {
        let anomalies = detect_supplier_anomalies(&[perf(60.0, 75.0)], now());

        assert_eq!(anomalies.len(), 2);
        assert!(anomalies.iter().all(|a| a.severity == Severity::High));
        assert!(anomalies.iter().all(|a| a.status == AnomalyStatus::Active));

        let delivery = anomalies
            .iter()
            .find(|a| a.anomaly_type == AnomalyType::DeliveryPerformance)
            .unwrap();
        assert_eq!(delivery.value, 60.0);
        assert_eq!(delivery.threshold, Some(85.0));
    }

    #[test]
    fn borderline_rates_are_medium() {
        let anomalies = detect_supplier_anomalies(&[perf(80.0, 85.0)], now());
        assert_eq!(anomalies.len(), 2);
        assert!(anomalies.iter().all(|a| a.severity == Severity::Medium));
        assert!(detect_supplier_anomalies(&[perf(85.0, 90.0)], now()).is_empty());
    }

    #[test]
    fn delivery_threshold_is_strict() {
        let severity = |rate: f64| {
            detect_supplier_anomalies(&[perf(rate, 95.0)], now())
                .first()
                .map(|a| a.severity)
        };

        assert_eq!(severity(69.0), Some(Severity::High));
        assert_eq!(severity(84.0), Some(Severity::Medium));
        assert_eq!(severity(85.0), None);
    }

    #[test]
    fn empty_stock_is_high_severity_low_stock() {
        let item = stock(0, 10, 100);
        let anomalies = detect_inventory_anomalies(&[item], &[], now());

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].anomaly_type, AnomalyType::LowStock);
        assert_eq!(anomalies[0].severity, Severity::High);
        assert!(anomalies[0].requires_attention());
        assert_eq!(anomalies[0].threshold, None);
    }

    #[test]
    fn overstock_needs_twenty_percent_headroom() {
        let over = detect_inventory_anomalies(&[stock(121, 10, 100)], &[], now());
        assert_eq!(over.len(), 1);
        assert_eq!(over[0].anomaly_type, AnomalyType::Overstock);

        assert!(detect_inventory_anomalies(&[stock(120, 10, 100)], &[], now()).is_empty());
    }

    #[test]
    fn volatile_costs_within_window() {
        let item = stock(50, 10, 100);
        let id = item.id;
        let movements = vec![
            costed(id, Some(10.0), 2),
            costed(id, Some(14.0), 5),
            costed(id, None, 6),
            costed(id, Some(0.0), 7),
            // outside the window
            costed(id, Some(100.0), 45),
        ];

        let anomalies = detect_inventory_anomalies(&[item], &movements, now());

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].anomaly_type, AnomalyType::PriceVolatility);
        // mean 12, max deviation 2
        assert!((anomalies[0].value - 2.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn single_costed_movement_is_not_volatility() {
        let item = stock(50, 10, 100);
        let movements = vec![costed(item.id, Some(10.0), 1)];
        assert!(detect_inventory_anomalies(&[item], &movements, now()).is_empty());
    }

    #[test]
    fn anomaly_serializes_tagged_subject() {
        let item = stock(0, 10, 100);
        let id = item.id;
        let anomaly = detect_inventory_anomalies(&[item], &[], now()).remove(0);

        let json = serde_json::to_value(&anomaly).unwrap();
        assert_eq!(json["subject"]["entity_type"], "item");
        assert_eq!(json["subject"]["entity_id"], id.to_string());
        assert_eq!(json["anomaly_type"], "low_stock");
        assert_eq!(json["severity"], "high");

        let back: Anomaly = serde_json::from_value(json).unwrap();
        assert_eq!(back, anomaly);
    }

    #[test]
    fn unknown_types_survive() {
        let t = AnomalyType::from("latency_spike".to_string());
        assert_eq!(t, AnomalyType::Other("latency_spike".to_string()));
        assert_eq!(t.as_str(), "latency_spike");
        assert_eq!(Severity::parse_lenient("CRITICAL"), Severity::Critical);
    }
}
