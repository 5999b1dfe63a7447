//! Analytics orchestration.
//!
//! - [`AnalyticsService`]: loads entities from an [`AnalyticsStore`](crate::store::AnalyticsStore),
//!   evaluates each one through the [`ConcurrencyLimiter`](crate::limiter::ConcurrencyLimiter),
//!   persists what it derived and returns the aggregate.
//! - [`BusinessInsightsAggregator`]: folds supplier, pricing and anomaly results into one summary.

pub mod error;
pub mod insights;
pub mod service;
pub mod types;

pub use error::{AnalyticsError, Operation};
pub use insights::BusinessInsightsAggregator;
pub use service::AnalyticsService;
pub use types::{
    ActionKind, AnalysisScope, AnomalyReport, BusinessInsights, EntityFailure, ForecastRun, ItemScope, PricingRun,
    Priority, RealTimeMetrics, RecommendedAction, SupplierAnalysis, SupplierScope,
};
