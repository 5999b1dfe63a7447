//! `supplysight-ai`
//!
//! **Responsibility:** the statistical models behind supplier, inventory and pricing analytics.
//!
//! This crate is deliberately side-effect free:
//! - It never touches storage; callers hand it snapshots.
//! - It never spawns or awaits; every model is a plain function of its inputs.
//! - Time enters only through explicit `as_of` arguments.

pub mod anomaly;
pub mod demand;
pub mod models;
pub mod pricing;
pub mod result;
pub mod risk;
pub mod snapshot;
pub mod stats;
pub mod supplier_performance;

pub use anomaly::{
    detect_inventory_anomalies, detect_supplier_anomalies, Anomaly, AnomalyStatus, AnomalySubject, AnomalyType,
    Severity,
};
pub use demand::{forecast_demand, DemandForecast, ForecastHorizons, Seasonality};
pub use models::{AnalyticsModels, HeuristicModels};
pub use pricing::{optimize_price, CompetitivePosition, PriceOptimization, PricingParameters};
pub use result::{AiError, Prediction};
pub use risk::{score_supplier_risk, supplier_recommendations, RiskFactors, RiskRecommendation, RiskScore};
pub use snapshot::{InventoryItemSnapshot, MovementKind, PerformanceRecord, PricedItem, StockMovement};
pub use supplier_performance::{PerformanceWeights, SupplierFeatures, SupplierPerformancePredictor};
