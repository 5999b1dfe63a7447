use chrono::{DateTime, Utc};

use supplysight_core::{ItemId, SupplierId};

use crate::anomaly::{self, Anomaly};
use crate::demand::{self, DemandForecast};
use crate::pricing::{self, PriceOptimization, PricingParameters};
use crate::result::{AiError, Prediction};
use crate::risk::{self, RiskScore};
use crate::snapshot::{InventoryItemSnapshot, PerformanceRecord, PricedItem, StockMovement};
use crate::supplier_performance::{PerformanceWeights, SupplierPerformancePredictor};

fn require_history(supplier_id: SupplierId, history: &[PerformanceRecord]) -> Result<(), AiError> {
    if history.is_empty() {
        return Err(AiError::InvalidInput(format!(
            "supplier {supplier_id} has no performance history"
        )));
    }
    Ok(())
}

/// The model surface the orchestrator evaluates per entity.
///
/// Implementations must be pure: no I/O, no shared mutable state. Every default method
/// runs the heuristic model; override to swap a model out (or to inject failures in tests).
pub trait AnalyticsModels: Send + Sync + 'static {
    fn predict_supplier(
        &self,
        supplier_id: SupplierId,
        history: &[PerformanceRecord],
        recent: Option<&PerformanceRecord>,
        as_of: DateTime<Utc>,
    ) -> Result<Prediction, AiError> {
        require_history(supplier_id, history)?;
        Ok(SupplierPerformancePredictor::default().predict(supplier_id, history, recent, as_of))
    }

    fn score_risk(&self, supplier_id: SupplierId, history: &[PerformanceRecord], prediction: &Prediction) -> RiskScore {
        risk::score_supplier_risk(supplier_id, history, prediction)
    }

    fn forecast_demand(
        &self,
        item_id: ItemId,
        movements: &[StockMovement],
        as_of: DateTime<Utc>,
    ) -> Result<DemandForecast, AiError> {
        Ok(demand::forecast_demand(item_id, movements, as_of))
    }

    fn optimize_price(
        &self,
        item: &PricedItem,
        competitor_prices: &[f64],
        params: PricingParameters,
    ) -> Result<PriceOptimization, AiError> {
        if !(0.0..1.0).contains(&params.target_margin) {
            return Err(AiError::InvalidInput(format!(
                "target margin must be in [0, 1), got {}",
                params.target_margin
            )));
        }
        if !item.unit_cost.is_finite() || item.unit_cost < 0.0 {
            return Err(AiError::InvalidInput(format!(
                "item {} has an unusable unit cost",
                item.item_id
            )));
        }
        Ok(pricing::optimize_price(item, competitor_prices, params))
    }

    fn detect_supplier_anomalies(&self, records: &[PerformanceRecord], as_of: DateTime<Utc>) -> Vec<Anomaly> {
        anomaly::detect_supplier_anomalies(records, as_of)
    }

    fn detect_inventory_anomalies(
        &self,
        items: &[InventoryItemSnapshot],
        movements: &[StockMovement],
        as_of: DateTime<Utc>,
    ) -> Vec<Anomaly> {
        anomaly::detect_inventory_anomalies(items, movements, as_of)
    }
}

/// Deterministic statistical models.
#[derive(Debug, Copy, Clone, Default)]
pub struct HeuristicModels {
    predictor: SupplierPerformancePredictor,
}

impl HeuristicModels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: PerformanceWeights) -> Self {
        Self {
            predictor: SupplierPerformancePredictor::new(weights),
        }
    }
}

impl AnalyticsModels for HeuristicModels {
    fn predict_supplier(
        &self,
        supplier_id: SupplierId,
        history: &[PerformanceRecord],
        recent: Option<&PerformanceRecord>,
        as_of: DateTime<Utc>,
    ) -> Result<Prediction, AiError> {
        require_history(supplier_id, history)?;
        Ok(self.predictor.predict(supplier_id, history, recent, as_of))
    }
}
