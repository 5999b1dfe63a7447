//! Integration tests for the analytics pipeline.
//!
//! Tests: AnalyticsService → ConcurrencyLimiter → models → InMemoryAnalyticsStore
//!
//! Verifies:
//! - Results and persisted rows for each service operation
//! - The limiter bounds concurrent store reads
//! - Failure policies, deadlines and cancellation
//! - Persistence failures never reach the caller

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{Duration as ChronoDuration, Utc};

    use supplysight_ai::{
        AiError, Anomaly, AnomalyStatus, AnomalySubject, AnomalyType, AnalyticsModels, InventoryItemSnapshot, MovementKind,
        PerformanceRecord, Prediction, RiskRecommendation, Severity, StockMovement,
    };
    use supplysight_core::{ItemId, OrganizationId, SupplierId};

    use crate::analytics::{ActionKind, AnalysisScope, AnalyticsError, AnalyticsService, Operation, Priority};
    use crate::config::{AnalyticsConfig, FailurePolicy};
    use crate::store::InMemoryAnalyticsStore;

    fn record(
        supplier_id: SupplierId,
        on_time: f64,
        quality: f64,
        response: f64,
        overall: f64,
        days_ago: i64,
    ) -> PerformanceRecord {
        PerformanceRecord {
            supplier_id,
            on_time_delivery_rate: on_time,
            quality_acceptance_rate: quality,
            response_time_hours: response,
            overall_rating: overall,
            evaluation_date: Utc::now() - ChronoDuration::days(days_ago),
        }
    }

    fn item(sku: &str, stock: i64, reorder: i64, max: i64, price: f64, cost: f64) -> InventoryItemSnapshot {
        InventoryItemSnapshot {
            id: ItemId::new(),
            sku: sku.to_string(),
            current_stock: stock,
            reorder_point: reorder,
            max_stock: max,
            unit_price: price,
            unit_cost: cost,
        }
    }

    fn outbound(item_id: ItemId, quantity: f64, days_ago: i64) -> StockMovement {
        StockMovement {
            item_id,
            kind: MovementKind::Outbound,
            quantity,
            unit_cost: None,
            timestamp: Utc::now() - ChronoDuration::days(days_ago),
        }
    }

    /// Latest period is poor on every axis; the one before was excellent.
    fn seed_deteriorating(store: &InMemoryAnalyticsStore, org: OrganizationId, name: &str) -> SupplierId {
        let s = store.add_supplier(org, name);
        store.add_performance(record(s, 60.0, 75.0, 50.0, 0.5, 1));
        store.add_performance(record(s, 95.0, 98.0, 10.0, 0.9, 20));
        s
    }

    fn seed_failing_supplier(store: &InMemoryAnalyticsStore, org: OrganizationId) -> SupplierId {
        let s = store.add_supplier(org, "Broken");
        store.add_performance(record(s, 90.0, 95.0, 12.0, 0.8, 1));
        store.fail_history_for(s);
        s
    }

    fn service_with(
        store: &Arc<InMemoryAnalyticsStore>,
        config: AnalyticsConfig,
    ) -> AnalyticsService<InMemoryAnalyticsStore> {
        AnalyticsService::new(store.clone(), config).unwrap()
    }

    #[tokio::test]
    async fn deteriorating_supplier_is_flagged_and_persisted() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        seed_deteriorating(&store, org, "Acme");
        let service = service_with(&store, AnalyticsConfig::default());

        let analysis = service
            .analyze_supplier_performance(AnalysisScope::Organization(org))
            .await
            .unwrap();

        assert_eq!(analysis.risk_scores.len(), 1);
        let risk = &analysis.risk_scores[0];
        assert!(risk.risk_score > 50.0, "risk was {}", risk.risk_score);
        assert!(matches!(
            risk.recommendation,
            RiskRecommendation::Review | RiskRecommendation::Replace
        ));
        assert!(
            analysis
                .recommendations
                .contains(&"High risk supplier Acme: Consider diversifying orders".to_string())
        );
        assert!(analysis.failures.is_empty());

        assert_eq!(store.stored_predictions().len(), 1);
        let cached = store.cached_results();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].value.kind, "supplier_analysis");
        assert_eq!(cached[0].organization_id, org);
    }

    #[tokio::test]
    async fn single_supplier_scope_persists_under_its_organization() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        let s = seed_deteriorating(&store, org, "Acme");
        seed_deteriorating(&store, org, "Other");
        let service = service_with(&store, AnalyticsConfig::default());

        let analysis = service
            .analyze_supplier_performance(AnalysisScope::Entity(s))
            .await
            .unwrap();

        assert_eq!(analysis.risk_scores.len(), 1);
        assert_eq!(analysis.risk_scores[0].supplier_id, s);
        assert_eq!(store.stored_predictions()[0].organization_id, org);
    }

    #[tokio::test]
    async fn suppliers_without_history_are_skipped() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        seed_deteriorating(&store, org, "Acme");
        store.add_supplier(org, "Brand new");
        let service = service_with(&store, AnalyticsConfig::default());

        let analysis = service
            .analyze_supplier_performance(AnalysisScope::Organization(org))
            .await
            .unwrap();

        assert_eq!(analysis.risk_scores.len(), 1);
        assert!(analysis.failures.is_empty());
        assert_eq!(analysis.discarded_low_confidence, 0);
    }

    #[tokio::test]
    async fn limiter_bounds_concurrent_store_reads() {
        let store = Arc::new(InMemoryAnalyticsStore::new().with_read_delay(Duration::from_millis(20)));
        let org = OrganizationId::new();
        for i in 0..12 {
            let s = store.add_supplier(org, format!("Supplier {i}"));
            store.add_performance(record(s, 90.0, 95.0, 12.0, 0.8, 1));
        }
        let service = service_with(&store, AnalyticsConfig::default().with_max_concurrent(3));

        let analysis = service
            .analyze_supplier_performance(AnalysisScope::Organization(org))
            .await
            .unwrap();

        assert_eq!(analysis.risk_scores.len(), 12);
        assert!(store.peak_concurrent_reads() <= 3);
        assert_eq!(service.limiter().peak_running(), 3);
        assert_eq!(service.limiter().running(), 0);
        assert_eq!(service.limiter().available(), 3);
    }

    #[tokio::test]
    async fn strict_policy_fails_the_whole_batch() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        seed_deteriorating(&store, org, "Acme");
        seed_deteriorating(&store, org, "Globex");
        seed_failing_supplier(&store, org);
        let service = service_with(&store, AnalyticsConfig::default());

        let err = service
            .analyze_supplier_performance(AnalysisScope::Organization(org))
            .await
            .unwrap_err();

        assert!(matches!(err, AnalyticsError::Failed(Operation::SupplierPerformance)));
        assert_eq!(err.to_string(), "failed to analyze supplier performance");
        assert!(store.stored_predictions().is_empty());
    }

    #[tokio::test]
    async fn isolating_policy_reports_failed_entities() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        seed_deteriorating(&store, org, "Acme");
        seed_deteriorating(&store, org, "Globex");
        let broken = seed_failing_supplier(&store, org);
        let service = service_with(
            &store,
            AnalyticsConfig::default().with_failure_policy(FailurePolicy::IsolatePerEntity),
        );

        let analysis = service
            .analyze_supplier_performance(AnalysisScope::Organization(org))
            .await
            .unwrap();

        assert_eq!(analysis.risk_scores.len(), 2);
        assert_eq!(analysis.failures.len(), 1);
        assert_eq!(analysis.failures[0].entity_id, broken.to_string());
        assert!(analysis.failures[0].reason.contains("query failed"));
        assert_eq!(store.stored_predictions().len(), 2);
    }

    struct RejectingModels {
        reject: SupplierId,
    }

    impl AnalyticsModels for RejectingModels {
        fn predict_supplier(
            &self,
            supplier_id: SupplierId,
            history: &[PerformanceRecord],
            recent: Option<&PerformanceRecord>,
            as_of: chrono::DateTime<Utc>,
        ) -> Result<Prediction, AiError> {
            if supplier_id == self.reject {
                return Err(AiError::InferenceFailed("model rejected input".to_string()));
            }
            supplysight_ai::HeuristicModels::new().predict_supplier(supplier_id, history, recent, as_of)
        }
    }

    #[tokio::test]
    async fn model_errors_follow_the_failure_policy() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        seed_deteriorating(&store, org, "Acme");
        let rejected = seed_deteriorating(&store, org, "Globex");
        let config = AnalyticsConfig::default().with_failure_policy(FailurePolicy::IsolatePerEntity);
        let service = AnalyticsService::with_models(store.clone(), RejectingModels { reject: rejected }, config).unwrap();

        let analysis = service
            .analyze_supplier_performance(AnalysisScope::Organization(org))
            .await
            .unwrap();

        assert_eq!(analysis.risk_scores.len(), 1);
        assert_eq!(analysis.failures[0].entity_id, rejected.to_string());
        assert_eq!(analysis.failures[0].reason, "inference failed: model rejected input");
    }

    #[tokio::test]
    async fn default_config_keeps_and_persists_low_confidence_results() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        // two periods give a confidence of about 0.52
        seed_deteriorating(&store, org, "Acme");
        let widget = item("WIDGET-3", 50, 10, 200, 12.0, 8.0);
        let id = widget.id;
        store.add_item(org, widget);
        for d in 1..=5 {
            store.add_movement(outbound(id, 4.0, d));
        }
        let service = service_with(&store, AnalyticsConfig::default());

        let analysis = service
            .analyze_supplier_performance(AnalysisScope::Organization(org))
            .await
            .unwrap();
        assert_eq!(analysis.risk_scores.len(), 1);
        assert!(analysis.predictions[0].confidence < 0.7);
        assert_eq!(analysis.discarded_low_confidence, 0);
        assert_eq!(store.stored_predictions().len(), 1);

        let run = service
            .forecast_inventory_demand(AnalysisScope::Organization(org))
            .await
            .unwrap();
        let insights = service.get_business_insights(org).await.unwrap();

        assert_eq!(run.forecasts.len(), 1);
        assert!((run.forecasts[0].confidence - 0.3).abs() < 1e-12);
        assert_eq!(run.discarded_low_confidence, 0);
        assert_eq!(store.stored_forecasts().len(), 1);

        assert!(insights.total_supplier_risk > 50.0);
    }

    #[tokio::test]
    async fn low_confidence_filter_hides_results_but_still_persists_them() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        seed_deteriorating(&store, org, "Acme");
        let service = service_with(&store, AnalyticsConfig::default().with_low_confidence_filter(0.7));

        let analysis = service
            .analyze_supplier_performance(AnalysisScope::Organization(org))
            .await
            .unwrap();

        assert!(analysis.risk_scores.is_empty());
        assert!(analysis.predictions.is_empty());
        assert_eq!(analysis.discarded_low_confidence, 1);
        assert_eq!(store.stored_predictions().len(), 1);
    }

    #[tokio::test]
    async fn task_deadline_is_reported_per_entity() {
        let store = Arc::new(InMemoryAnalyticsStore::new().with_read_delay(Duration::from_millis(200)));
        let org = OrganizationId::new();
        seed_deteriorating(&store, org, "Acme");
        seed_deteriorating(&store, org, "Globex");
        let config = AnalyticsConfig::default()
            .with_failure_policy(FailurePolicy::IsolatePerEntity)
            .with_task_timeout(Duration::from_millis(20));
        let service = service_with(&store, config);

        let analysis = service
            .analyze_supplier_performance(AnalysisScope::Organization(org))
            .await
            .unwrap();

        assert!(analysis.risk_scores.is_empty());
        assert_eq!(analysis.failures.len(), 2);
        assert!(analysis.failures.iter().all(|f| f.reason == "task deadline exceeded"));
        assert_eq!(service.limiter().running(), 0);
    }

    #[tokio::test]
    async fn cancelled_service_rejects_entity_work() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        seed_deteriorating(&store, org, "Acme");
        let service = service_with(&store, AnalyticsConfig::default());
        service.cancel();

        let err = service
            .analyze_supplier_performance(AnalysisScope::Organization(org))
            .await
            .unwrap_err();

        assert!(matches!(err, AnalyticsError::Failed(Operation::SupplierPerformance)));
    }

    #[tokio::test]
    async fn persistence_failures_do_not_reach_the_caller() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        seed_deteriorating(&store, org, "Acme");
        store.fail_writes(true);
        let service = service_with(&store, AnalyticsConfig::default());

        let analysis = service
            .analyze_supplier_performance(AnalysisScope::Organization(org))
            .await
            .unwrap();

        assert_eq!(analysis.risk_scores.len(), 1);
        assert!(store.stored_predictions().is_empty());
        assert!(store.cached_results().is_empty());
    }

    #[tokio::test]
    async fn forecasts_carry_sku_and_are_upserted() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        let widget = item("WIDGET-1", 50, 10, 200, 12.0, 8.0);
        let id = widget.id;
        store.add_item(org, widget);
        for d in 1..=14 {
            store.add_movement(outbound(id, 10.0, d));
        }
        // outside the 180-day lookback
        store.add_movement(outbound(id, 1000.0, 400));
        let service = service_with(&store, AnalyticsConfig::default());

        let run = service
            .forecast_inventory_demand(AnalysisScope::Organization(org))
            .await
            .unwrap();
        service
            .forecast_inventory_demand(AnalysisScope::Entity(id))
            .await
            .unwrap();

        assert_eq!(run.forecasts.len(), 1);
        let forecast = &run.forecasts[0];
        assert_eq!(forecast.sku, "WIDGET-1");
        assert!(forecast.predictions.next_30_days > 0.0);
        assert_eq!(forecast.trend, 0.0);
        assert!((forecast.confidence - 0.95).abs() < 1e-12);

        let stored = store.stored_forecasts();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].organization_id, org);
    }

    #[tokio::test]
    async fn filtered_sparse_forecasts_are_still_upserted() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        let widget = item("WIDGET-2", 5, 10, 100, 12.0, 8.0);
        let id = widget.id;
        store.add_item(org, widget);
        store.add_movement(outbound(id, 3.0, 2));
        let service = service_with(&store, AnalyticsConfig::default().with_low_confidence_filter(0.7));

        let run = service
            .forecast_inventory_demand(AnalysisScope::Organization(org))
            .await
            .unwrap();

        assert!(run.forecasts.is_empty());
        assert_eq!(run.discarded_low_confidence, 1);
        assert_eq!(store.stored_forecasts().len(), 1);
    }

    #[tokio::test]
    async fn pricing_falls_back_to_supplier_list_price() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        store.add_item(org, item("GADGET", 20, 5, 100, 120.0, 0.0));
        store.set_supplier_price("GADGET", 100.0);
        store.drop_competitor_table(true);
        let service = service_with(&store, AnalyticsConfig::default());

        let run = service
            .optimize_pricing(AnalysisScope::Organization(org))
            .await
            .unwrap();

        assert_eq!(run.optimizations.len(), 1);
        let opt = &run.optimizations[0];
        assert!((opt.optimized_price - 142.857142857).abs() < 1e-6);
        assert!((opt.expected_profit_increase - 1.142857142857).abs() < 1e-6);
        assert_eq!(store.stored_optimizations().len(), 1);
    }

    #[tokio::test]
    async fn pricing_uses_competitor_prices() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        store.add_item(org, item("GIZMO", 20, 5, 100, 150.0, 100.0));
        for p in [120.0, 130.0, 140.0] {
            store.add_competitor_price("GIZMO", p);
        }
        let service = service_with(&store, AnalyticsConfig::default());

        let run = service
            .optimize_pricing(AnalysisScope::Organization(org))
            .await
            .unwrap();

        assert!((run.optimizations[0].optimized_price - 126.0).abs() < 1e-9);
    }

    fn system_anomaly() -> Anomaly {
        Anomaly::new(
            AnomalySubject::System(Some("ingest".to_string())),
            AnomalyType::Other("queue_backlog".to_string()),
            Severity::Medium,
            "Ingest queue backlog",
            1200.0,
            Utc::now() - ChronoDuration::hours(1),
        )
    }

    #[tokio::test]
    async fn anomalies_cover_suppliers_inventory_and_system() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        let s = store.add_supplier(org, "Late Co");
        store.add_performance(record(s, 60.0, 95.0, 12.0, 0.7, 3));
        // older than the 30-day window
        store.add_performance(record(s, 10.0, 10.0, 12.0, 0.7, 60));
        store.add_item(org, item("EMPTY", 0, 5, 100, 10.0, 5.0));
        store.add_anomaly(org, system_anomaly());
        let service = service_with(&store, AnalyticsConfig::default());

        let report = service.detect_anomalies(org).await.unwrap();

        assert_eq!(report.supplier.len(), 1);
        assert_eq!(report.supplier[0].anomaly_type, AnomalyType::DeliveryPerformance);
        assert_eq!(report.supplier[0].severity, Severity::High);
        assert_eq!(report.inventory.len(), 1);
        assert_eq!(report.inventory[0].anomaly_type, AnomalyType::LowStock);
        assert_eq!(report.inventory[0].severity, Severity::High);
        assert_eq!(report.system.len(), 1);
        assert_eq!(report.requiring_attention(), 2);

        let stored = store.stored_anomalies();
        assert_eq!(stored.len(), 3);
        let system_rows = stored
            .iter()
            .filter(|a| matches!(a.value.subject, AnomalySubject::System(_)))
            .count();
        assert_eq!(system_rows, 1);
    }

    #[tokio::test]
    async fn unavailable_system_anomalies_are_skipped() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        store.add_anomaly(org, system_anomaly());
        store.fail_system_anomalies(true);
        let service = service_with(&store, AnalyticsConfig::default());

        let report = service.detect_anomalies(org).await.unwrap();

        assert!(report.system.is_empty());
    }

    #[tokio::test]
    async fn real_time_metrics_count_recent_rows() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        seed_deteriorating(&store, org, "Acme");
        store.add_supplier(org, "Idle");
        store.add_item(org, item("EMPTY", 0, 5, 100, 10.0, 5.0));
        let service = service_with(&store, AnalyticsConfig::default());

        service
            .analyze_supplier_performance(AnalysisScope::Organization(org))
            .await
            .unwrap();
        service.detect_anomalies(org).await.unwrap();

        let metrics = service.get_real_time_metrics(org).await.unwrap();

        assert_eq!(metrics.suppliers_analyzed, 2);
        assert_eq!(metrics.inventory_items_processed, 1);
        assert_eq!(metrics.predictions_generated, 1);
        // delivery + quality for Acme, low stock for the item
        assert_eq!(metrics.anomalies_detected, 3);
        assert_eq!(metrics.optimizations_completed, 0);
    }

    #[tokio::test]
    async fn real_time_metrics_respect_the_gate() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let service = service_with(&store, AnalyticsConfig::default().with_real_time_processing(false));

        let err = service.get_real_time_metrics(OrganizationId::new()).await.unwrap_err();

        assert!(matches!(err, AnalyticsError::RealTimeDisabled));
    }

    #[tokio::test]
    async fn business_insights_rank_supplier_review_first() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        let s = store.add_supplier(org, "Risky");
        store.add_performance(record(s, 40.0, 60.0, 72.0, 0.2, 1));
        store.add_performance(record(s, 95.0, 98.0, 10.0, 0.9, 20));
        store.add_item(org, item("GADGET", 20, 5, 100, 120.0, 100.0));
        let service = service_with(&store, AnalyticsConfig::default());

        let insights = service.get_business_insights(org).await.unwrap();

        assert!(insights.total_supplier_risk > 70.0, "risk was {}", insights.total_supplier_risk);
        assert_eq!(insights.inventory_optimization_opportunities, 1);
        assert_eq!(insights.demand_forecast_accuracy, 0.0);
        assert!(insights.anomalies_requiring_attention >= 2);

        let kinds: Vec<_> = insights
            .recommended_actions
            .iter()
            .map(|a| (a.kind, a.priority))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ActionKind::Supplier, Priority::High),
                (ActionKind::Pricing, Priority::Medium)
            ]
        );
        assert!(
            store
                .cached_results()
                .iter()
                .any(|c| c.value.kind == "business_insights")
        );
    }

    #[tokio::test]
    async fn missing_scope_is_rejected() {
        let err = AnalysisScope::<SupplierId>::from_options(None, None).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidScope));
        assert_eq!(err.to_string(), "either an entity id or an organization id is required");
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_up_front() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let result = AnalyticsService::new(store, AnalyticsConfig::default().with_max_concurrent(0));
        assert!(matches!(result, Err(AnalyticsError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn purge_respects_retention() {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let org = OrganizationId::new();
        let mut resolved = system_anomaly();
        resolved.detected_at = Utc::now() - ChronoDuration::days(400);
        resolved.status = AnomalyStatus::Resolved;
        let mut still_active = system_anomaly();
        still_active.detected_at = Utc::now() - ChronoDuration::days(400);
        store.add_anomaly(org, resolved);
        store.add_anomaly(org, still_active);
        store.add_anomaly(org, system_anomaly());
        let service = service_with(&store, AnalyticsConfig::default());

        assert_eq!(service.purge_expired().await.unwrap(), 1);
        assert_eq!(store.stored_anomalies().len(), 2);
        assert!(store.stored_anomalies().iter().all(|a| a.value.status == AnomalyStatus::Active));
    }
}
