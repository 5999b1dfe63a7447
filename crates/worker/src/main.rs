use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use supplysight_core::OrganizationId;
use supplysight_infra::analytics::BusinessInsights;
use supplysight_infra::{AnalyticsConfig, AnalyticsRunner, AnalyticsService, InsightSink, PostgresAnalyticsStore};

/// Logs each cycle's headline numbers.
struct LogInsightSink;

impl InsightSink for LogInsightSink {
    fn emit(&self, organization_id: OrganizationId, insights: BusinessInsights) {
        tracing::info!(
            org = %organization_id,
            supplier_risk = insights.total_supplier_risk,
            opportunities = insights.inventory_optimization_opportunities,
            attention = insights.anomalies_requiring_attention,
            actions = insights.recommended_actions.len(),
            "business insights updated"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    supplysight_observability::init();

    let config = AnalyticsConfig::from_env().context("invalid analytics configuration")?;
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let organization_id: OrganizationId = std::env::var("SUPPLYSIGHT_ORGANIZATION_ID")
        .context("SUPPLYSIGHT_ORGANIZATION_ID must be set")?
        .parse()
        .context("SUPPLYSIGHT_ORGANIZATION_ID is not a valid id")?;

    let pool = PgPool::connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = Arc::new(PostgresAnalyticsStore::new(pool));

    let runner = AnalyticsRunner::from_config(&config);
    let service = Arc::new(AnalyticsService::new(store, config)?);

    let handle = runner.spawn_for_organization("analytics", organization_id, service, Arc::new(LogInsightSink));
    tracing::info!(org = %organization_id, interval_secs = runner.interval.as_secs(), "analytics worker running");

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");
    handle.shutdown().await;

    Ok(())
}
