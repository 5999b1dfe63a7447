use thiserror::Error;

use supplysight_ai::AiError;

use crate::config::ConfigError;
use crate::limiter::LimiterError;
use crate::store::StoreError;

/// The service operation an error surfaced from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operation {
    SupplierPerformance,
    DemandForecast,
    Pricing,
    AnomalyDetection,
    RealTimeMetrics,
    BusinessInsights,
    Retention,
}

impl Operation {
    pub fn failure_message(&self) -> &'static str {
        match self {
            Self::SupplierPerformance => "failed to analyze supplier performance",
            Self::DemandForecast => "failed to forecast inventory demand",
            Self::Pricing => "failed to optimize pricing",
            Self::AnomalyDetection => "failed to detect anomalies",
            Self::RealTimeMetrics => "failed to get real-time metrics",
            Self::BusinessInsights => "failed to generate business insights",
            Self::Retention => "failed to purge expired analytics",
        }
    }
}

/// Errors returned to callers of the analytics service.
///
/// Internal failures are logged where they happen and surface only as
/// [`AnalyticsError::Failed`]; caller mistakes are reported as-is.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("either an entity id or an organization id is required")]
    InvalidScope,

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("real-time processing is disabled")]
    RealTimeDisabled,

    #[error("{}", .0.failure_message())]
    Failed(Operation),
}

/// Failure of a single unit of work inside a batch. Never leaves the crate unmapped.
#[derive(Debug, Error)]
pub(crate) enum TaskError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] AiError),

    #[error(transparent)]
    Limiter(#[from] LimiterError),
}
