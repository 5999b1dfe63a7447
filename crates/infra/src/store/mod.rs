//! Storage port for the analytics engine.
//!
//! The service never writes SQL itself; it talks to an [`AnalyticsStore`]. Two adapters:
//! - [`InMemoryAnalyticsStore`] for tests/dev (with fault-injection knobs)
//! - [`PostgresAnalyticsStore`] backed by sqlx

pub mod in_memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use supplysight_ai::{
    Anomaly, DemandForecast, InventoryItemSnapshot, PerformanceRecord, Prediction, PriceOptimization, StockMovement,
};
use supplysight_core::{ItemId, OrganizationId, SupplierId};

use crate::analytics::AnalysisScope;

pub use in_memory::InMemoryAnalyticsStore;
pub use postgres::PostgresAnalyticsStore;

/// Storage operation error.
///
/// - **Unavailable**: the backing table or connection is not there
/// - **Query**: the read/write itself failed
/// - **Decode**: a row could not be turned into a domain value
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("failed to decode row: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierRecord {
    pub id: SupplierId,
    pub organization_id: OrganizationId,
    pub name: String,
}

/// An inventory item plus what the service needs around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub organization_id: OrganizationId,
    pub snapshot: InventoryItemSnapshot,
    /// Supplier price-list price for the item's SKU, when one exists.
    pub supplier_price: Option<f64>,
}

/// Countable analytics facts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Suppliers,
    InventoryItems,
    Anomalies,
    Predictions,
    Optimizations,
}

impl MetricKind {
    /// Whether a `since` bound applies; entity counts are totals.
    pub fn is_windowed(&self) -> bool {
        matches!(self, Self::Anomalies | Self::Predictions | Self::Optimizations)
    }
}

#[async_trait]
pub trait AnalyticsStore: Send + Sync + 'static {
    async fn suppliers(&self, scope: &AnalysisScope<SupplierId>) -> Result<Vec<SupplierRecord>, StoreError>;

    /// Most recent first.
    async fn performance_history(&self, supplier_id: SupplierId) -> Result<Vec<PerformanceRecord>, StoreError>;

    /// Evaluations of the organization's suppliers since `since`.
    async fn recent_performance(
        &self,
        organization_id: OrganizationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<PerformanceRecord>, StoreError>;

    async fn inventory_items(&self, scope: &AnalysisScope<ItemId>) -> Result<Vec<ItemRecord>, StoreError>;

    async fn stock_movements(&self, item_id: ItemId, since: DateTime<Utc>) -> Result<Vec<StockMovement>, StoreError>;

    async fn organization_movements(
        &self,
        organization_id: OrganizationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<StockMovement>, StoreError>;

    /// Competitor prices keyed by SKU. The competitor table is optional; callers should
    /// treat an error as "no data".
    async fn competitor_prices(&self, skus: &[String]) -> Result<HashMap<String, Vec<f64>>, StoreError>;

    /// Active system-level anomalies, newest first.
    async fn active_system_anomalies(
        &self,
        organization_id: OrganizationId,
        limit: usize,
    ) -> Result<Vec<Anomaly>, StoreError>;

    async fn count(
        &self,
        organization_id: OrganizationId,
        metric: MetricKind,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// `None` when the organization has no stored forecasts.
    async fn mean_forecast_confidence(&self, organization_id: OrganizationId) -> Result<Option<f64>, StoreError>;

    async fn cache_result(
        &self,
        organization_id: OrganizationId,
        kind: &str,
        data: &serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn insert_predictions(
        &self,
        organization_id: OrganizationId,
        predictions: &[Prediction],
    ) -> Result<(), StoreError>;

    /// One current row per item; later forecasts replace earlier ones.
    async fn upsert_forecasts(
        &self,
        organization_id: OrganizationId,
        forecasts: &[DemandForecast],
    ) -> Result<(), StoreError>;

    async fn insert_price_optimizations(
        &self,
        organization_id: OrganizationId,
        optimizations: &[PriceOptimization],
    ) -> Result<(), StoreError>;

    async fn insert_anomalies(&self, organization_id: OrganizationId, anomalies: &[Anomaly]) -> Result<(), StoreError>;

    /// Removes derived analytics rows created before `cutoff`. Returns the number removed.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
