//! The analytics orchestrator.
//!
//! Every public operation follows the same shape:
//! 1. load entities for the scope from the store
//! 2. evaluate each entity as one future, admitted by the limiter
//! 3. join on the caller's task (no spawning) per the configured [`FailurePolicy`]
//! 4. persist derived rows best-effort and return the aggregate
//!
//! Internal failures are logged here with full detail and surface as
//! [`AnalyticsError::Failed`].

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use futures::future::{join_all, try_join_all};
use tracing::{debug, error, info, warn};

use supplysight_ai::{
    supplier_recommendations, AnalyticsModels, HeuristicModels, Prediction, PricedItem, PricingParameters, RiskScore,
};
use supplysight_core::OrganizationId;

use super::error::{AnalyticsError, Operation, TaskError};
use super::insights::BusinessInsightsAggregator;
use super::types::{
    AnalysisScope, AnomalyReport, BusinessInsights, EntityFailure, ForecastRun, ItemScope, PricingRun,
    RealTimeMetrics, SupplierAnalysis, SupplierScope,
};
use crate::config::{AnalyticsConfig, FailurePolicy};
use crate::limiter::{CancellationToken, ConcurrencyLimiter, TaskOptions};
use crate::store::{AnalyticsStore, ItemRecord, MetricKind, StoreError, SupplierRecord};

const FORECAST_LOOKBACK_DAYS: i64 = 180;
const ANOMALY_LOOKBACK_DAYS: i64 = 30;
const METRICS_WINDOW_HOURS: i64 = 24;
const SYSTEM_ANOMALY_LIMIT: usize = 10;

/// One supplier's evaluation result.
struct SupplierEvaluation {
    supplier: SupplierRecord,
    prediction: Prediction,
    risk: RiskScore,
    recommendations: Vec<String>,
}

/// Orchestrates model evaluation over a store.
///
/// Generic over the store and the model set so tests can swap either out.
pub struct AnalyticsService<S, M = HeuristicModels> {
    store: Arc<S>,
    models: Arc<M>,
    limiter: ConcurrencyLimiter,
    config: AnalyticsConfig,
    cancellation: CancellationToken,
    aggregator: BusinessInsightsAggregator,
}

impl<S: AnalyticsStore> AnalyticsService<S, HeuristicModels> {
    pub fn new(store: Arc<S>, config: AnalyticsConfig) -> Result<Self, AnalyticsError> {
        Self::with_models(store, HeuristicModels::new(), config)
    }
}

fn internal(operation: Operation, err: impl Display) -> AnalyticsError {
    error!(operation = ?operation, error = %err, "{}", operation.failure_message());
    AnalyticsError::Failed(operation)
}

/// Owner of the rows a batch writes: the scope's organization, else the first entity's.
fn owner<I>(scope: &AnalysisScope<I>, first_entity_org: Option<OrganizationId>) -> Option<OrganizationId> {
    scope.organization().or(first_entity_org)
}

impl<S: AnalyticsStore, M: AnalyticsModels> AnalyticsService<S, M> {
    pub fn with_models(store: Arc<S>, models: M, config: AnalyticsConfig) -> Result<Self, AnalyticsError> {
        config.validate()?;
        Ok(Self {
            store,
            models: Arc::new(models),
            limiter: ConcurrencyLimiter::new(config.max_concurrent_ml_operations),
            config,
            cancellation: CancellationToken::new(),
            aggregator: BusinessInsightsAggregator::default(),
        })
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Cancels queued and running entity tasks; later tasks are rejected as cancelled.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    fn task_options(&self) -> TaskOptions {
        let options = TaskOptions::default().with_cancellation(self.cancellation.clone());
        match self.config.task_timeout() {
            Some(timeout) => options.with_timeout(timeout),
            None => options,
        }
    }

    /// Whether a result is returned to the caller; persistence ignores this.
    fn keeps(&self, confidence: f64) -> bool {
        !self.config.filter_low_confidence || confidence >= self.config.confidence_threshold
    }

    async fn limited<T, Fut>(&self, work: Fut) -> Result<T, TaskError>
    where
        Fut: Future<Output = Result<T, TaskError>>,
    {
        match self.limiter.run_with(self.task_options(), || work).await {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        }
    }

    /// Runs `task` for every entity through the limiter.
    async fn fan_out<E, T, F, Fut>(
        &self,
        entities: Vec<E>,
        entity_id: fn(&E) -> String,
        task: F,
    ) -> Result<(Vec<T>, Vec<EntityFailure>), TaskError>
    where
        F: Fn(E) -> Fut,
        Fut: Future<Output = Result<T, TaskError>>,
    {
        let runs = entities.into_iter().map(|entity| {
            let id = entity_id(&entity);
            let work = self.limited(task(entity));
            async move { (id, work.await) }
        });

        match self.config.failure_policy {
            FailurePolicy::AbortOnFirstError => {
                let done = try_join_all(runs.map(|run| async move { run.await.1 })).await?;
                Ok((done, Vec::new()))
            }
            FailurePolicy::IsolatePerEntity => {
                let mut done = Vec::new();
                let mut failures = Vec::new();
                for (id, result) in join_all(runs).await {
                    match result {
                        Ok(value) => done.push(value),
                        Err(e) => {
                            warn!(entity_id = %id, error = %e, "entity evaluation failed");
                            failures.push(EntityFailure {
                                entity_id: id,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                Ok((done, failures))
            }
        }
    }

    async fn persist(
        &self,
        organization_id: OrganizationId,
        table: &'static str,
        write: impl Future<Output = Result<(), StoreError>>,
    ) {
        if let Err(e) = write.await {
            warn!(org = %organization_id, table, error = %e, "failed to persist analytics results");
        }
    }

    async fn cache<T: serde::Serialize>(&self, organization_id: OrganizationId, kind: &'static str, value: &T) {
        match serde_json::to_value(value) {
            Ok(data) => {
                self.persist(organization_id, "analytics_cache", self.store.cache_result(organization_id, kind, &data))
                    .await
            }
            Err(e) => warn!(org = %organization_id, kind, error = %e, "failed to encode analytics result"),
        }
    }

    async fn evaluate_supplier(
        &self,
        supplier: SupplierRecord,
        as_of: DateTime<Utc>,
    ) -> Result<Option<SupplierEvaluation>, TaskError> {
        let history = self.store.performance_history(supplier.id).await?;
        if history.is_empty() {
            debug!(supplier_id = %supplier.id, "no performance history; skipping");
            return Ok(None);
        }

        let prediction = self
            .models
            .predict_supplier(supplier.id, &history, history.first(), as_of)?;
        let risk = self.models.score_risk(supplier.id, &history, &prediction);
        let recommendations = supplier_recommendations(&supplier.name, &risk, &prediction);

        Ok(Some(SupplierEvaluation {
            supplier,
            prediction,
            risk,
            recommendations,
        }))
    }

    /// Scores every supplier in scope that has at least one performance record.
    pub async fn analyze_supplier_performance(&self, scope: SupplierScope) -> Result<SupplierAnalysis, AnalyticsError> {
        let op = Operation::SupplierPerformance;
        let started = Instant::now();
        let as_of = Utc::now();

        let suppliers = self.store.suppliers(&scope).await.map_err(|e| internal(op, e))?;
        let (evaluations, failures) = self
            .fan_out(
                suppliers,
                |s: &SupplierRecord| s.id.to_string(),
                |s| self.evaluate_supplier(s, as_of),
            )
            .await
            .map_err(|e| internal(op, e))?;

        let mut analysis = SupplierAnalysis {
            failures,
            ..SupplierAnalysis::default()
        };
        let mut org = None;
        let mut computed = Vec::new();
        for evaluation in evaluations.into_iter().flatten() {
            org = org.or(Some(evaluation.supplier.organization_id));
            computed.push(evaluation.prediction.clone());
            if !self.keeps(evaluation.prediction.confidence) {
                analysis.discarded_low_confidence += 1;
                continue;
            }
            analysis.predictions.push(evaluation.prediction);
            analysis.risk_scores.push(evaluation.risk);
            analysis.recommendations.extend(evaluation.recommendations);
        }

        if let Some(org) = owner(&scope, org) {
            self.cache(org, "supplier_analysis", &analysis).await;
            if !computed.is_empty() {
                self.persist(org, "analytics_predictions", self.store.insert_predictions(org, &computed))
                    .await;
            }
        }

        info!(
            suppliers = analysis.risk_scores.len(),
            failed = analysis.failures.len(),
            discarded = analysis.discarded_low_confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "supplier performance analyzed"
        );
        Ok(analysis)
    }

    /// Forecasts demand for every item in scope from the last 180 days of movements.
    pub async fn forecast_inventory_demand(&self, scope: ItemScope) -> Result<ForecastRun, AnalyticsError> {
        let op = Operation::DemandForecast;
        let as_of = Utc::now();
        let since = as_of - Duration::days(FORECAST_LOOKBACK_DAYS);

        let items = self.store.inventory_items(&scope).await.map_err(|e| internal(op, e))?;
        let first_org = items.first().map(|i| i.organization_id);

        let (forecasts, failures) = self
            .fan_out(
                items,
                |i: &ItemRecord| i.snapshot.id.to_string(),
                |item: ItemRecord| async move {
                    let movements = self.store.stock_movements(item.snapshot.id, since).await?;
                    let mut forecast = self.models.forecast_demand(item.snapshot.id, &movements, as_of)?;
                    forecast.sku = item.snapshot.sku;
                    Ok::<_, TaskError>(forecast)
                },
            )
            .await
            .map_err(|e| internal(op, e))?;

        if let Some(org) = owner(&scope, first_org) {
            if !forecasts.is_empty() {
                self.persist(org, "demand_forecasts", self.store.upsert_forecasts(org, &forecasts))
                    .await;
            }
        }

        let total = forecasts.len();
        let forecasts: Vec<_> = forecasts.into_iter().filter(|f| self.keeps(f.confidence)).collect();
        let run = ForecastRun {
            discarded_low_confidence: total - forecasts.len(),
            forecasts,
            failures,
        };

        info!(
            forecasts = run.forecasts.len(),
            failed = run.failures.len(),
            discarded = run.discarded_low_confidence,
            "inventory demand forecast"
        );
        Ok(run)
    }

    /// Recommends a price for every item in scope.
    pub async fn optimize_pricing(&self, scope: ItemScope) -> Result<PricingRun, AnalyticsError> {
        let op = Operation::Pricing;

        let items = self.store.inventory_items(&scope).await.map_err(|e| internal(op, e))?;
        let first_org = items.first().map(|i| i.organization_id);

        let skus: Vec<String> = items.iter().map(|i| i.snapshot.sku.clone()).collect();
        let competitors = match self.store.competitor_prices(&skus).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!(error = %e, "competitor pricing unavailable; continuing without it");
                HashMap::new()
            }
        };

        let params = PricingParameters {
            demand_elasticity: self.config.demand_elasticity,
            target_margin: self.config.target_margin,
        };
        let competitors = &competitors;

        let (optimizations, failures) = self
            .fan_out(
                items,
                |i: &ItemRecord| i.snapshot.id.to_string(),
                |item: ItemRecord| async move {
                    let mut priced = PricedItem::from(&item.snapshot);
                    if priced.unit_cost <= 0.0 {
                        if let Some(list_price) = item.supplier_price {
                            priced.unit_cost = list_price;
                        }
                    }
                    let observed = competitors
                        .get(&item.snapshot.sku)
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    self.models
                        .optimize_price(&priced, observed, params)
                        .map_err(TaskError::from)
                },
            )
            .await
            .map_err(|e| internal(op, e))?;

        let run = PricingRun {
            optimizations,
            failures,
        };

        if let Some(org) = owner(&scope, first_org) {
            if !run.optimizations.is_empty() {
                self.persist(
                    org,
                    "price_optimizations",
                    self.store.insert_price_optimizations(org, &run.optimizations),
                )
                .await;
            }
        }

        info!(
            optimizations = run.optimizations.len(),
            failed = run.failures.len(),
            "pricing optimized"
        );
        Ok(run)
    }

    /// Runs supplier and inventory detection for the last 30 days and attaches the
    /// organization's active system anomalies.
    pub async fn detect_anomalies(&self, organization_id: OrganizationId) -> Result<AnomalyReport, AnalyticsError> {
        let op = Operation::AnomalyDetection;
        let as_of = Utc::now();
        let since = as_of - Duration::days(ANOMALY_LOOKBACK_DAYS);

        let supplier = self.limited(async {
            let records = self.store.recent_performance(organization_id, since).await?;
            Ok::<_, TaskError>(self.models.detect_supplier_anomalies(&records, as_of))
        });
        let inventory = self.limited(async {
            let items = self
                .store
                .inventory_items(&AnalysisScope::Organization(organization_id))
                .await?;
            let movements = self.store.organization_movements(organization_id, since).await?;
            let snapshots: Vec<_> = items.into_iter().map(|i| i.snapshot).collect();
            Ok::<_, TaskError>(self.models.detect_inventory_anomalies(&snapshots, &movements, as_of))
        });
        let system = async {
            match self
                .store
                .active_system_anomalies(organization_id, SYSTEM_ANOMALY_LIMIT)
                .await
            {
                Ok(found) => found,
                Err(e) => {
                    warn!(org = %organization_id, error = %e, "system anomalies unavailable");
                    Vec::new()
                }
            }
        };

        let (supplier, inventory, system) = tokio::join!(supplier, inventory, system);
        let report = AnomalyReport {
            supplier: supplier.map_err(|e| internal(op, e))?,
            inventory: inventory.map_err(|e| internal(op, e))?,
            system,
        };

        let detected: Vec<_> = report.supplier.iter().chain(&report.inventory).cloned().collect();
        if !detected.is_empty() {
            self.persist(
                organization_id,
                "analytics_anomalies",
                self.store.insert_anomalies(organization_id, &detected),
            )
            .await;
        }

        info!(
            org = %organization_id,
            supplier = report.supplier.len(),
            inventory = report.inventory.len(),
            system = report.system.len(),
            "anomalies detected"
        );
        Ok(report)
    }

    /// Entity totals plus derived-row counts for the last 24 hours.
    pub async fn get_real_time_metrics(&self, organization_id: OrganizationId) -> Result<RealTimeMetrics, AnalyticsError> {
        if !self.config.enable_real_time_processing {
            return Err(AnalyticsError::RealTimeDisabled);
        }

        let op = Operation::RealTimeMetrics;
        let started = Instant::now();
        let since = Utc::now() - Duration::hours(METRICS_WINDOW_HOURS);
        let count = |metric| self.store.count(organization_id, metric, since);

        let (suppliers, items, anomalies, predictions, optimizations) = tokio::try_join!(
            count(MetricKind::Suppliers),
            count(MetricKind::InventoryItems),
            count(MetricKind::Anomalies),
            count(MetricKind::Predictions),
            count(MetricKind::Optimizations),
        )
        .map_err(|e| internal(op, e))?;

        Ok(RealTimeMetrics {
            suppliers_analyzed: suppliers,
            inventory_items_processed: items,
            anomalies_detected: anomalies,
            predictions_generated: predictions,
            optimizations_completed: optimizations,
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Supplier analysis, pricing and anomaly detection for the organization, summarised.
    pub async fn get_business_insights(&self, organization_id: OrganizationId) -> Result<BusinessInsights, AnalyticsError> {
        let op = Operation::BusinessInsights;

        let (suppliers, pricing, anomalies) = tokio::try_join!(
            self.analyze_supplier_performance(AnalysisScope::Organization(organization_id)),
            self.optimize_pricing(AnalysisScope::Organization(organization_id)),
            self.detect_anomalies(organization_id),
        )
        .map_err(|e| internal(op, e))?;

        let accuracy = match self.store.mean_forecast_confidence(organization_id).await {
            Ok(mean) => mean.unwrap_or(0.0),
            Err(e) => {
                warn!(org = %organization_id, error = %e, "forecast confidence unavailable");
                0.0
            }
        };

        let insights = self.aggregator.aggregate(&suppliers, &pricing, &anomalies, accuracy);
        self.cache(organization_id, "business_insights", &insights).await;
        Ok(insights)
    }

    /// Deletes derived analytics rows older than the retention period.
    pub async fn purge_expired(&self) -> Result<u64, AnalyticsError> {
        let cutoff = Utc::now() - self.config.retention();
        let removed = self
            .store
            .purge_before(cutoff)
            .await
            .map_err(|e| internal(Operation::Retention, e))?;
        if removed > 0 {
            info!(removed, cutoff = %cutoff, "expired analytics purged");
        }
        Ok(removed)
    }
}
