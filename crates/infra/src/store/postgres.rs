//! Postgres-backed analytics store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (undefined table) | `42P01` | `Unavailable` | Optional table (e.g. `competitor_pricing`) not deployed |
//! | Database (other) | Any other | `Query` | Constraint violations, bad SQL, etc. |
//! | PoolClosed | N/A | `Unavailable` | Connection pool was closed |
//! | ColumnDecode / ColumnNotFound | N/A | `Decode` | Row shape does not match |
//! | Other | N/A | `Query` | Network errors, connection failures, etc. |
//!
//! Numeric columns are cast to `float8`/`int8` in SQL so decoding stays uniform whatever
//! `NUMERIC`/`INTEGER` types the schema uses.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use supplysight_ai::{
    Anomaly, AnomalyStatus, AnomalySubject, AnomalyType, DemandForecast, InventoryItemSnapshot, MovementKind,
    PerformanceRecord, Prediction, PriceOptimization, Severity, StockMovement,
};
use supplysight_core::{AnomalyId, ItemId, OrganizationId, SupplierId};

use super::{AnalyticsStore, ItemRecord, MetricKind, StoreError, SupplierRecord};
use crate::analytics::AnalysisScope;

/// Postgres-backed analytics store.
///
/// Every organization-scoped query filters on `organization_id`. Writes of a batch run in
/// one transaction.
#[derive(Debug, Clone)]
pub struct PostgresAnalyticsStore {
    pool: Arc<PgPool>,
}

impl PostgresAnalyticsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

const ITEM_COLUMNS: &str = r#"
    ii.id,
    ii.organization_id,
    ii.sku,
    ii.current_stock::int8 AS current_stock,
    ii.reorder_point::int8 AS reorder_point,
    ii.max_stock::int8 AS max_stock,
    COALESCE(ii.unit_price, 0)::float8 AS unit_price,
    COALESCE(ii.unit_cost, 0)::float8 AS unit_cost,
    (
        SELECT MIN(spl.unit_price)::float8
        FROM supplier_price_lists spl
        WHERE spl.sku = ii.sku
    ) AS supplier_price
"#;

const PERFORMANCE_COLUMNS: &str = r#"
    sp.supplier_id,
    sp.on_time_delivery_rate::float8 AS on_time_delivery_rate,
    sp.quality_acceptance_rate::float8 AS quality_acceptance_rate,
    sp.response_time_hours::float8 AS response_time_hours,
    sp.overall_rating::float8 AS overall_rating,
    sp.evaluation_date
"#;

const MOVEMENT_COLUMNS: &str = r#"
    sm.item_id,
    sm.type AS movement_type,
    sm.quantity::float8 AS quantity,
    sm.unit_cost::float8 AS unit_cost,
    sm.timestamp
"#;

#[async_trait]
impl AnalyticsStore for PostgresAnalyticsStore {
    #[instrument(skip(self), err)]
    async fn suppliers(&self, scope: &AnalysisScope<SupplierId>) -> Result<Vec<SupplierRecord>, StoreError> {
        let (filter, id) = match scope {
            AnalysisScope::Entity(id) => ("id = $1", *id.as_uuid()),
            AnalysisScope::Organization(org) => ("organization_id = $1", *org.as_uuid()),
        };
        let sql = format!("SELECT id, organization_id, name FROM suppliers WHERE {filter}");

        let rows = sqlx::query(&sql)
            .bind(id)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("suppliers", e))?;

        rows.iter().map(supplier_from_row).collect()
    }

    #[instrument(skip(self), fields(supplier_id = %supplier_id), err)]
    async fn performance_history(&self, supplier_id: SupplierId) -> Result<Vec<PerformanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {PERFORMANCE_COLUMNS} FROM supplier_performance sp \
             WHERE sp.supplier_id = $1 ORDER BY sp.evaluation_date DESC"
        );

        let rows = sqlx::query(&sql)
            .bind(supplier_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("performance_history", e))?;

        rows.iter().map(performance_from_row).collect()
    }

    #[instrument(skip(self), fields(org = %organization_id), err)]
    async fn recent_performance(
        &self,
        organization_id: OrganizationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<PerformanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {PERFORMANCE_COLUMNS} FROM supplier_performance sp \
             JOIN suppliers s ON sp.supplier_id = s.id \
             WHERE s.organization_id = $1 AND sp.evaluation_date >= $2"
        );

        let rows = sqlx::query(&sql)
            .bind(organization_id.as_uuid())
            .bind(since)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("recent_performance", e))?;

        rows.iter().map(performance_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn inventory_items(&self, scope: &AnalysisScope<ItemId>) -> Result<Vec<ItemRecord>, StoreError> {
        let (filter, id) = match scope {
            AnalysisScope::Entity(id) => ("ii.id = $1", *id.as_uuid()),
            AnalysisScope::Organization(org) => ("ii.organization_id = $1", *org.as_uuid()),
        };
        let sql = format!("SELECT {ITEM_COLUMNS} FROM inventory_items ii WHERE {filter}");

        let rows = sqlx::query(&sql)
            .bind(id)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("inventory_items", e))?;

        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn stock_movements(&self, item_id: ItemId, since: DateTime<Utc>) -> Result<Vec<StockMovement>, StoreError> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements sm \
             WHERE sm.item_id = $1 AND sm.timestamp >= $2 ORDER BY sm.timestamp ASC"
        );

        let rows = sqlx::query(&sql)
            .bind(item_id.as_uuid())
            .bind(since)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("stock_movements", e))?;

        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(skip(self), fields(org = %organization_id), err)]
    async fn organization_movements(
        &self,
        organization_id: OrganizationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<StockMovement>, StoreError> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements sm \
             JOIN inventory_items ii ON sm.item_id = ii.id \
             WHERE ii.organization_id = $1 AND sm.timestamp >= $2 ORDER BY sm.timestamp ASC"
        );

        let rows = sqlx::query(&sql)
            .bind(organization_id.as_uuid())
            .bind(since)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("organization_movements", e))?;

        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(skip(self, skus), fields(sku_count = skus.len()), err)]
    async fn competitor_prices(&self, skus: &[String]) -> Result<HashMap<String, Vec<f64>>, StoreError> {
        if skus.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT item_sku, competitor_price::float8 AS competitor_price
            FROM competitor_pricing
            WHERE item_sku = ANY($1)
            "#,
        )
        .bind(skus)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("competitor_prices", e))?;

        let mut out: HashMap<String, Vec<f64>> = HashMap::new();
        for row in &rows {
            let sku: String = row.try_get("item_sku").map_err(decode_error)?;
            let price: f64 = row.try_get("competitor_price").map_err(decode_error)?;
            out.entry(sku).or_default().push(price);
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(org = %organization_id), err)]
    async fn active_system_anomalies(
        &self,
        organization_id: OrganizationId,
        limit: usize,
    ) -> Result<Vec<Anomaly>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                entity_id,
                anomaly_type,
                severity,
                description,
                COALESCE(value, 0)::float8 AS value,
                threshold::float8 AS threshold,
                detected_at
            FROM analytics_anomalies
            WHERE organization_id = $1
              AND entity_type = 'system'
              AND status = 'active'
            ORDER BY detected_at DESC
            LIMIT $2
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_system_anomalies", e))?;

        rows.iter().map(system_anomaly_from_row).collect()
    }

    #[instrument(skip(self), fields(org = %organization_id), err)]
    async fn count(
        &self,
        organization_id: OrganizationId,
        metric: MetricKind,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let sql = match metric {
            MetricKind::Suppliers => "SELECT COUNT(*) FROM suppliers WHERE organization_id = $1",
            MetricKind::InventoryItems => "SELECT COUNT(*) FROM inventory_items WHERE organization_id = $1",
            MetricKind::Anomalies => {
                "SELECT COUNT(*) FROM analytics_anomalies WHERE organization_id = $1 AND detected_at >= $2"
            }
            MetricKind::Predictions => {
                "SELECT COUNT(*) FROM analytics_predictions WHERE organization_id = $1 AND created_at >= $2"
            }
            MetricKind::Optimizations => {
                "SELECT COUNT(*) FROM analytics_optimizations WHERE organization_id = $1 AND created_at >= $2"
            }
        };

        let mut query = sqlx::query_scalar::<_, i64>(sql).bind(organization_id.as_uuid());
        if metric.is_windowed() {
            query = query.bind(since);
        }
        let n = query
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count", e))?;

        Ok(n.max(0) as u64)
    }

    #[instrument(skip(self), fields(org = %organization_id), err)]
    async fn mean_forecast_confidence(&self, organization_id: OrganizationId) -> Result<Option<f64>, StoreError> {
        sqlx::query_scalar::<_, Option<f64>>(
            "SELECT AVG(confidence)::float8 FROM demand_forecasts WHERE organization_id = $1",
        )
        .bind(organization_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mean_forecast_confidence", e))
    }

    #[instrument(skip(self, data), fields(org = %organization_id), err)]
    async fn cache_result(
        &self,
        organization_id: OrganizationId,
        kind: &str,
        data: &serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO analytics_cache (organization_id, type, data, created_at) VALUES ($1, $2, $3, NOW())")
            .bind(organization_id.as_uuid())
            .bind(kind)
            .bind(data)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("cache_result", e))?;
        Ok(())
    }

    #[instrument(skip(self, predictions), fields(org = %organization_id, count = predictions.len()), err)]
    async fn insert_predictions(
        &self,
        organization_id: OrganizationId,
        predictions: &[Prediction],
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("insert_predictions", e))?;

        for p in predictions {
            sqlx::query(
                r#"
                INSERT INTO analytics_predictions (organization_id, subject, score, confidence, factors, created_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                "#,
            )
            .bind(organization_id.as_uuid())
            .bind(&p.subject)
            .bind(finite_or_null(p.score))
            .bind(p.confidence)
            .bind(to_json(&p.factors)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_predictions", e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("insert_predictions", e))
    }

    #[instrument(skip(self, forecasts), fields(org = %organization_id, count = forecasts.len()), err)]
    async fn upsert_forecasts(
        &self,
        organization_id: OrganizationId,
        forecasts: &[DemandForecast],
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("upsert_forecasts", e))?;

        for f in forecasts {
            sqlx::query(
                r#"
                INSERT INTO demand_forecasts
                    (item_id, organization_id, sku, predictions, seasonality, trend, confidence, last_updated, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                ON CONFLICT (item_id) DO UPDATE SET
                    sku = EXCLUDED.sku,
                    predictions = EXCLUDED.predictions,
                    seasonality = EXCLUDED.seasonality,
                    trend = EXCLUDED.trend,
                    confidence = EXCLUDED.confidence,
                    last_updated = EXCLUDED.last_updated
                "#,
            )
            .bind(f.item_id.as_uuid())
            .bind(organization_id.as_uuid())
            .bind(&f.sku)
            .bind(to_json(&f.predictions)?)
            .bind(to_json(&f.seasonality)?)
            .bind(f.trend)
            .bind(f.confidence)
            .bind(f.last_updated)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_forecasts", e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("upsert_forecasts", e))
    }

    #[instrument(skip(self, optimizations), fields(org = %organization_id, count = optimizations.len()), err)]
    async fn insert_price_optimizations(
        &self,
        organization_id: OrganizationId,
        optimizations: &[PriceOptimization],
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("insert_price_optimizations", e))?;

        for o in optimizations {
            sqlx::query(
                r#"
                INSERT INTO price_optimizations
                    (item_id, organization_id, current_price, optimized_price, expected_profit_increase,
                     demand_sensitivity, competitive_position, recommendation, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                "#,
            )
            .bind(o.item_id.as_uuid())
            .bind(organization_id.as_uuid())
            .bind(o.current_price)
            .bind(o.optimized_price)
            .bind(o.expected_profit_increase)
            .bind(o.demand_sensitivity)
            .bind(o.competitive_position.as_str())
            .bind(&o.recommendation)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_price_optimizations", e))?;

            // org-scoped log the real-time metrics count from
            sqlx::query(
                r#"
                INSERT INTO analytics_optimizations (organization_id, item_id, payload, created_at)
                VALUES ($1, $2, $3, NOW())
                "#,
            )
            .bind(organization_id.as_uuid())
            .bind(o.item_id.as_uuid())
            .bind(to_json(o)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_price_optimizations", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("insert_price_optimizations", e))
    }

    #[instrument(skip(self, anomalies), fields(org = %organization_id, count = anomalies.len()), err)]
    async fn insert_anomalies(&self, organization_id: OrganizationId, anomalies: &[Anomaly]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("insert_anomalies", e))?;

        for a in anomalies {
            sqlx::query(
                r#"
                INSERT INTO analytics_anomalies
                    (id, organization_id, entity_type, entity_id, anomaly_type, severity, description,
                     value, threshold, status, detected_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
                "#,
            )
            .bind(a.id.as_uuid())
            .bind(organization_id.as_uuid())
            .bind(a.subject.entity_type())
            .bind(a.subject.entity_id())
            .bind(a.anomaly_type.as_str())
            .bind(a.severity.as_str())
            .bind(&a.description)
            .bind(finite_or_null(a.value))
            .bind(a.threshold)
            .bind(a.status.as_str())
            .bind(a.detected_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_anomalies", e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("insert_anomalies", e))
    }

    #[instrument(skip(self), err)]
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut removed = 0;
        // active anomalies outlive retention until resolved
        for (table, filter) in PURGE_TABLES {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE created_at < $1{filter}"))
                .bind(cutoff)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("purge_before", e))?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }
}

const PURGE_TABLES: [(&str, &str); 5] = [
    ("analytics_cache", ""),
    ("analytics_predictions", ""),
    ("analytics_optimizations", ""),
    ("price_optimizations", ""),
    ("analytics_anomalies", " AND status = 'resolved'"),
];

// Row decoding

fn supplier_from_row(row: &PgRow) -> Result<SupplierRecord, StoreError> {
    Ok(SupplierRecord {
        id: SupplierId::from_uuid(row.try_get("id").map_err(decode_error)?),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id").map_err(decode_error)?),
        name: row.try_get("name").map_err(decode_error)?,
    })
}

fn performance_from_row(row: &PgRow) -> Result<PerformanceRecord, StoreError> {
    let inner = || -> Result<PerformanceRecord, sqlx::Error> {
        Ok(PerformanceRecord {
            supplier_id: SupplierId::from_uuid(row.try_get("supplier_id")?),
            on_time_delivery_rate: row.try_get("on_time_delivery_rate")?,
            quality_acceptance_rate: row.try_get("quality_acceptance_rate")?,
            response_time_hours: row.try_get("response_time_hours")?,
            overall_rating: row.try_get("overall_rating")?,
            evaluation_date: row.try_get("evaluation_date")?,
        })
    };
    inner().map_err(decode_error)
}

fn item_from_row(row: &PgRow) -> Result<ItemRecord, StoreError> {
    let inner = || -> Result<ItemRecord, sqlx::Error> {
        Ok(ItemRecord {
            organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
            snapshot: InventoryItemSnapshot {
                id: ItemId::from_uuid(row.try_get("id")?),
                sku: row.try_get("sku")?,
                current_stock: row.try_get::<Option<i64>, _>("current_stock")?.unwrap_or(0),
                reorder_point: row.try_get::<Option<i64>, _>("reorder_point")?.unwrap_or(0),
                max_stock: row.try_get::<Option<i64>, _>("max_stock")?.unwrap_or(0),
                unit_price: row.try_get("unit_price")?,
                unit_cost: row.try_get("unit_cost")?,
            },
            supplier_price: row.try_get("supplier_price")?,
        })
    };
    inner().map_err(decode_error)
}

fn movement_from_row(row: &PgRow) -> Result<StockMovement, StoreError> {
    let inner = || -> Result<StockMovement, sqlx::Error> {
        let kind: String = row.try_get("movement_type")?;
        Ok(StockMovement {
            item_id: ItemId::from_uuid(row.try_get("item_id")?),
            kind: MovementKind::parse_lenient(&kind),
            quantity: row.try_get("quantity")?,
            unit_cost: row.try_get("unit_cost")?,
            timestamp: row.try_get("timestamp")?,
        })
    };
    inner().map_err(decode_error)
}

fn system_anomaly_from_row(row: &PgRow) -> Result<Anomaly, StoreError> {
    let inner = || -> Result<Anomaly, sqlx::Error> {
        let anomaly_type: Option<String> = row.try_get("anomaly_type")?;
        let severity: Option<String> = row.try_get("severity")?;
        let description: Option<String> = row.try_get("description")?;
        Ok(Anomaly {
            id: AnomalyId::from_uuid(row.try_get("id")?),
            subject: AnomalySubject::System(row.try_get("entity_id")?),
            anomaly_type: AnomalyType::from(anomaly_type.unwrap_or_else(|| "system_performance".to_string())),
            severity: severity.as_deref().map_or(Severity::Medium, Severity::parse_lenient),
            description: description.unwrap_or_else(|| "System anomaly detected".to_string()),
            value: row.try_get("value")?,
            threshold: row.try_get("threshold")?,
            detected_at: row.try_get("detected_at")?,
            status: AnomalyStatus::Active,
        })
    };
    inner().map_err(decode_error)
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Decode(err.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Query(format!("failed to encode json column: {e}")))
}

/// Postgres `float8` accepts NaN, but downstream readers treat it as missing.
fn finite_or_null(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // undefined_table
                Some("42P01") => StoreError::Unavailable(msg),
                _ => StoreError::Query(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::Decode(_) => {
            StoreError::Decode(format!("{} in {}", err, operation))
        }
        _ => StoreError::Query(format!("sqlx error in {}: {}", operation, err)),
    }
}
