use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use supplysight_ai::{
    Anomaly, AnomalyStatus, AnomalySubject, DemandForecast, InventoryItemSnapshot, PerformanceRecord, Prediction,
    PriceOptimization, StockMovement,
};
use supplysight_core::{ItemId, OrganizationId, SupplierId};

use super::{AnalyticsStore, ItemRecord, MetricKind, StoreError, SupplierRecord};
use crate::analytics::AnalysisScope;

/// A derived row as persisted, with its owner and write time.
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T> {
    pub organization_id: OrganizationId,
    pub created_at: DateTime<Utc>,
    pub value: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult {
    pub kind: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Default)]
struct Tables {
    suppliers: Vec<SupplierRecord>,
    performance: Vec<PerformanceRecord>,
    items: Vec<(OrganizationId, InventoryItemSnapshot)>,
    price_lists: HashMap<String, f64>,
    movements: Vec<StockMovement>,
    competitor_prices: HashMap<String, Vec<f64>>,
    cache: Vec<Stored<CachedResult>>,
    predictions: Vec<Stored<Prediction>>,
    forecasts: HashMap<ItemId, Stored<DemandForecast>>,
    optimizations: Vec<Stored<PriceOptimization>>,
    anomalies: Vec<Stored<Anomaly>>,
}

impl Tables {
    fn organization_of_supplier(&self, supplier_id: SupplierId) -> Option<OrganizationId> {
        self.suppliers
            .iter()
            .find(|s| s.id == supplier_id)
            .map(|s| s.organization_id)
    }

    fn organization_items(&self, organization_id: OrganizationId) -> HashSet<ItemId> {
        self.items
            .iter()
            .filter(|(org, _)| *org == organization_id)
            .map(|(_, item)| item.id)
            .collect()
    }
}

#[derive(Debug, Default)]
struct Faults {
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    competitor_table_missing: AtomicBool,
    system_anomalies_unavailable: AtomicBool,
    failing_suppliers: RwLock<HashSet<SupplierId>>,
}

/// Decrements the in-flight read count on drop.
struct ReadGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// In-memory analytics store.
///
/// Intended for tests/dev. Carries fault-injection switches and an optional artificial
/// read latency so concurrency limits can be observed.
#[derive(Debug, Default)]
pub struct InMemoryAnalyticsStore {
    tables: RwLock<Tables>,
    faults: Faults,
    read_delay: Option<Duration>,
    reads_in_flight: AtomicUsize,
    peak_reads: AtomicUsize,
}

impl InMemoryAnalyticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every read sleeps for `delay` before answering.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    fn read_tables(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Query("lock poisoned".to_string()))
    }

    fn write_tables(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        if self.faults.fail_writes.load(Ordering::Acquire) {
            return Err(StoreError::Query("writes are failing".to_string()));
        }
        self.tables
            .write()
            .map_err(|_| StoreError::Query("lock poisoned".to_string()))
    }

    fn seed(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn inspect(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    async fn begin_read(&self) -> Result<ReadGuard<'_>, StoreError> {
        if self.faults.fail_reads.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("reads are failing".to_string()));
        }
        let now = self.reads_in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_reads.fetch_max(now, Ordering::AcqRel);
        let guard = ReadGuard {
            in_flight: &self.reads_in_flight,
        };
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(guard)
    }

    // --- seeding ---

    pub fn add_supplier(&self, organization_id: OrganizationId, name: impl Into<String>) -> SupplierId {
        let id = SupplierId::new();
        self.seed().suppliers.push(SupplierRecord {
            id,
            organization_id,
            name: name.into(),
        });
        id
    }

    pub fn add_performance(&self, record: PerformanceRecord) {
        self.seed().performance.push(record);
    }

    pub fn add_item(&self, organization_id: OrganizationId, item: InventoryItemSnapshot) {
        self.seed().items.push((organization_id, item));
    }

    pub fn set_supplier_price(&self, sku: impl Into<String>, unit_price: f64) {
        self.seed().price_lists.insert(sku.into(), unit_price);
    }

    pub fn add_movement(&self, movement: StockMovement) {
        self.seed().movements.push(movement);
    }

    pub fn add_competitor_price(&self, sku: impl Into<String>, price: f64) {
        self.seed().competitor_prices.entry(sku.into()).or_default().push(price);
    }

    /// Seeds an already-persisted anomaly (e.g. a system anomaly raised elsewhere).
    pub fn add_anomaly(&self, organization_id: OrganizationId, anomaly: Anomaly) {
        self.seed().anomalies.push(Stored {
            organization_id,
            created_at: anomaly.detected_at,
            value: anomaly,
        });
    }

    /// Seeds a price optimization as if written at `created_at`.
    pub fn add_optimization(
        &self,
        organization_id: OrganizationId,
        optimization: PriceOptimization,
        created_at: DateTime<Utc>,
    ) {
        self.seed().optimizations.push(Stored {
            organization_id,
            created_at,
            value: optimization,
        });
    }

    // --- fault injection ---

    pub fn fail_reads(&self, fail: bool) {
        self.faults.fail_reads.store(fail, Ordering::Release);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.faults.fail_writes.store(fail, Ordering::Release);
    }

    pub fn drop_competitor_table(&self, missing: bool) {
        self.faults.competitor_table_missing.store(missing, Ordering::Release);
    }

    pub fn fail_system_anomalies(&self, fail: bool) {
        self.faults.system_anomalies_unavailable.store(fail, Ordering::Release);
    }

    /// History reads for `supplier_id` fail from now on.
    pub fn fail_history_for(&self, supplier_id: SupplierId) {
        self.faults
            .failing_suppliers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(supplier_id);
    }

    // --- inspection ---

    /// Highest number of reads observed in flight at once.
    pub fn peak_concurrent_reads(&self) -> usize {
        self.peak_reads.load(Ordering::Acquire)
    }

    pub fn cached_results(&self) -> Vec<Stored<CachedResult>> {
        self.inspect().cache.clone()
    }

    pub fn stored_predictions(&self) -> Vec<Stored<Prediction>> {
        self.inspect().predictions.clone()
    }

    pub fn stored_forecasts(&self) -> Vec<Stored<DemandForecast>> {
        self.inspect().forecasts.values().cloned().collect()
    }

    pub fn stored_optimizations(&self) -> Vec<Stored<PriceOptimization>> {
        self.inspect().optimizations.clone()
    }

    pub fn stored_anomalies(&self) -> Vec<Stored<Anomaly>> {
        self.inspect().anomalies.clone()
    }
}

#[async_trait]
impl AnalyticsStore for InMemoryAnalyticsStore {
    async fn suppliers(&self, scope: &AnalysisScope<SupplierId>) -> Result<Vec<SupplierRecord>, StoreError> {
        let _read = self.begin_read().await?;
        let tables = self.read_tables()?;
        Ok(tables
            .suppliers
            .iter()
            .filter(|s| match scope {
                AnalysisScope::Entity(id) => s.id == *id,
                AnalysisScope::Organization(org) => s.organization_id == *org,
            })
            .cloned()
            .collect())
    }

    async fn performance_history(&self, supplier_id: SupplierId) -> Result<Vec<PerformanceRecord>, StoreError> {
        let _read = self.begin_read().await?;
        let failing = self
            .faults
            .failing_suppliers
            .read()
            .map_err(|_| StoreError::Query("lock poisoned".to_string()))?
            .contains(&supplier_id);
        if failing {
            return Err(StoreError::Query(format!(
                "supplier_performance read failed for {supplier_id}"
            )));
        }

        let tables = self.read_tables()?;
        let mut history: Vec<PerformanceRecord> = tables
            .performance
            .iter()
            .filter(|p| p.supplier_id == supplier_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.evaluation_date.cmp(&a.evaluation_date));
        Ok(history)
    }

    async fn recent_performance(
        &self,
        organization_id: OrganizationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<PerformanceRecord>, StoreError> {
        let _read = self.begin_read().await?;
        let tables = self.read_tables()?;
        Ok(tables
            .performance
            .iter()
            .filter(|p| p.evaluation_date >= since)
            .filter(|p| tables.organization_of_supplier(p.supplier_id) == Some(organization_id))
            .cloned()
            .collect())
    }

    async fn inventory_items(&self, scope: &AnalysisScope<ItemId>) -> Result<Vec<ItemRecord>, StoreError> {
        let _read = self.begin_read().await?;
        let tables = self.read_tables()?;
        Ok(tables
            .items
            .iter()
            .filter(|(org, item)| match scope {
                AnalysisScope::Entity(id) => item.id == *id,
                AnalysisScope::Organization(o) => org == o,
            })
            .map(|(org, item)| ItemRecord {
                organization_id: *org,
                snapshot: item.clone(),
                supplier_price: tables.price_lists.get(&item.sku).copied(),
            })
            .collect())
    }

    async fn stock_movements(&self, item_id: ItemId, since: DateTime<Utc>) -> Result<Vec<StockMovement>, StoreError> {
        let _read = self.begin_read().await?;
        let tables = self.read_tables()?;
        Ok(tables
            .movements
            .iter()
            .filter(|m| m.item_id == item_id && m.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn organization_movements(
        &self,
        organization_id: OrganizationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<StockMovement>, StoreError> {
        let _read = self.begin_read().await?;
        let tables = self.read_tables()?;
        let items = tables.organization_items(organization_id);
        Ok(tables
            .movements
            .iter()
            .filter(|m| items.contains(&m.item_id) && m.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn competitor_prices(&self, skus: &[String]) -> Result<HashMap<String, Vec<f64>>, StoreError> {
        let _read = self.begin_read().await?;
        if self.faults.competitor_table_missing.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable(
                "relation \"competitor_pricing\" does not exist".to_string(),
            ));
        }
        let tables = self.read_tables()?;
        Ok(skus
            .iter()
            .filter_map(|sku| tables.competitor_prices.get(sku).map(|p| (sku.clone(), p.clone())))
            .collect())
    }

    async fn active_system_anomalies(
        &self,
        organization_id: OrganizationId,
        limit: usize,
    ) -> Result<Vec<Anomaly>, StoreError> {
        let _read = self.begin_read().await?;
        if self.faults.system_anomalies_unavailable.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("analytics_anomalies unavailable".to_string()));
        }
        let tables = self.read_tables()?;
        let mut found: Vec<Anomaly> = tables
            .anomalies
            .iter()
            .filter(|a| a.organization_id == organization_id)
            .map(|a| &a.value)
            .filter(|a| matches!(a.subject, AnomalySubject::System(_)) && a.status == AnomalyStatus::Active)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        found.truncate(limit);
        Ok(found)
    }

    async fn count(
        &self,
        organization_id: OrganizationId,
        metric: MetricKind,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let _read = self.begin_read().await?;
        let tables = self.read_tables()?;
        let n = match metric {
            MetricKind::Suppliers => tables
                .suppliers
                .iter()
                .filter(|s| s.organization_id == organization_id)
                .count(),
            MetricKind::InventoryItems => tables.organization_items(organization_id).len(),
            MetricKind::Anomalies => tables
                .anomalies
                .iter()
                .filter(|a| a.organization_id == organization_id && a.value.detected_at >= since)
                .count(),
            MetricKind::Predictions => tables
                .predictions
                .iter()
                .filter(|p| p.organization_id == organization_id && p.created_at >= since)
                .count(),
            MetricKind::Optimizations => tables
                .optimizations
                .iter()
                .filter(|o| o.organization_id == organization_id && o.created_at >= since)
                .count(),
        };
        Ok(n as u64)
    }

    async fn mean_forecast_confidence(&self, organization_id: OrganizationId) -> Result<Option<f64>, StoreError> {
        let _read = self.begin_read().await?;
        let tables = self.read_tables()?;
        let confidences: Vec<f64> = tables
            .forecasts
            .values()
            .filter(|f| f.organization_id == organization_id)
            .map(|f| f.value.confidence)
            .collect();
        if confidences.is_empty() {
            return Ok(None);
        }
        Ok(Some(confidences.iter().sum::<f64>() / confidences.len() as f64))
    }

    async fn cache_result(
        &self,
        organization_id: OrganizationId,
        kind: &str,
        data: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.write_tables()?.cache.push(Stored {
            organization_id,
            created_at: Utc::now(),
            value: CachedResult {
                kind: kind.to_string(),
                data: data.clone(),
            },
        });
        Ok(())
    }

    async fn insert_predictions(
        &self,
        organization_id: OrganizationId,
        predictions: &[Prediction],
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        self.write_tables()?
            .predictions
            .extend(predictions.iter().cloned().map(|value| Stored {
                organization_id,
                created_at: now,
                value,
            }));
        Ok(())
    }

    async fn upsert_forecasts(
        &self,
        organization_id: OrganizationId,
        forecasts: &[DemandForecast],
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tables = self.write_tables()?;
        for f in forecasts {
            tables.forecasts.insert(
                f.item_id,
                Stored {
                    organization_id,
                    created_at: now,
                    value: f.clone(),
                },
            );
        }
        Ok(())
    }

    async fn insert_price_optimizations(
        &self,
        organization_id: OrganizationId,
        optimizations: &[PriceOptimization],
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        self.write_tables()?
            .optimizations
            .extend(optimizations.iter().cloned().map(|value| Stored {
                organization_id,
                created_at: now,
                value,
            }));
        Ok(())
    }

    async fn insert_anomalies(&self, organization_id: OrganizationId, anomalies: &[Anomaly]) -> Result<(), StoreError> {
        let now = Utc::now();
        self.write_tables()?
            .anomalies
            .extend(anomalies.iter().cloned().map(|value| Stored {
                organization_id,
                created_at: now,
                value,
            }));
        Ok(())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.write_tables()?;
        let before = tables.cache.len() + tables.predictions.len() + tables.optimizations.len() + tables.anomalies.len();

        tables.cache.retain(|r| r.created_at >= cutoff);
        tables.predictions.retain(|r| r.created_at >= cutoff);
        tables.optimizations.retain(|r| r.created_at >= cutoff);
        tables
            .anomalies
            .retain(|r| r.created_at >= cutoff || r.value.status == AnomalyStatus::Active);

        let after = tables.cache.len() + tables.predictions.len() + tables.optimizations.len() + tables.anomalies.len();
        Ok((before - after) as u64)
    }
}
