use serde::{Deserialize, Serialize};

use supplysight_ai::{Anomaly, DemandForecast, Prediction, PriceOptimization, RiskScore};
use supplysight_core::{ItemId, OrganizationId, SupplierId};

use super::error::AnalyticsError;

/// Which entities a batch covers. A single entity wins over its organization.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AnalysisScope<I> {
    Entity(I),
    Organization(OrganizationId),
}

pub type SupplierScope = AnalysisScope<SupplierId>;
pub type ItemScope = AnalysisScope<ItemId>;

impl<I> AnalysisScope<I> {
    pub fn from_options(entity: Option<I>, organization: Option<OrganizationId>) -> Result<Self, AnalyticsError> {
        match (entity, organization) {
            (Some(id), _) => Ok(Self::Entity(id)),
            (None, Some(org)) => Ok(Self::Organization(org)),
            (None, None) => Err(AnalyticsError::InvalidScope),
        }
    }

    pub fn organization(&self) -> Option<OrganizationId> {
        match self {
            Self::Entity(_) => None,
            Self::Organization(org) => Some(*org),
        }
    }
}

/// An entity whose task failed while the batch carried on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFailure {
    pub entity_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SupplierAnalysis {
    pub predictions: Vec<Prediction>,
    pub risk_scores: Vec<RiskScore>,
    pub recommendations: Vec<String>,
    pub failures: Vec<EntityFailure>,
    /// Suppliers evaluated and persisted but left out by the low-confidence filter.
    pub discarded_low_confidence: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ForecastRun {
    pub forecasts: Vec<DemandForecast>,
    pub failures: Vec<EntityFailure>,
    pub discarded_low_confidence: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PricingRun {
    pub optimizations: Vec<PriceOptimization>,
    pub failures: Vec<EntityFailure>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnomalyReport {
    pub supplier: Vec<Anomaly>,
    pub inventory: Vec<Anomaly>,
    /// Previously persisted, still active system anomalies.
    pub system: Vec<Anomaly>,
}

impl AnomalyReport {
    pub fn all(&self) -> impl Iterator<Item = &Anomaly> {
        self.supplier.iter().chain(&self.inventory).chain(&self.system)
    }

    pub fn requiring_attention(&self) -> usize {
        self.all().filter(|a| a.requires_attention()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RealTimeMetrics {
    pub suppliers_analyzed: u64,
    pub inventory_items_processed: u64,
    /// Last 24 hours.
    pub anomalies_detected: u64,
    /// Last 24 hours.
    pub predictions_generated: u64,
    /// Last 24 hours.
    pub optimizations_completed: u64,
    pub processing_time_ms: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Supplier,
    Pricing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedAction {
    pub kind: ActionKind,
    pub priority: Priority,
    pub entity_id: String,
    pub action: String,
    pub potential_impact: String,
    pub timeframe: String,
    /// Ranking key within a priority band (risk score or profit delta).
    pub magnitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusinessInsights {
    pub total_supplier_risk: f64,
    pub inventory_optimization_opportunities: usize,
    /// Mean confidence of the organization's persisted forecasts.
    pub demand_forecast_accuracy: f64,
    pub price_optimization_potential: f64,
    pub anomalies_requiring_attention: usize,
    pub recommended_actions: Vec<RecommendedAction>,
}
