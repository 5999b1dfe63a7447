//! Infrastructure layer: orchestration, storage adapters, config, scheduling.

pub mod analytics;
pub mod config;
pub mod limiter;
pub mod runner;
pub mod store;

mod integration_tests;

pub use analytics::{AnalysisScope, AnalyticsError, AnalyticsService};
pub use config::{AnalyticsConfig, ConfigError, FailurePolicy};
pub use limiter::{CancellationToken, ConcurrencyLimiter, LimiterError, TaskOptions};
pub use runner::{AnalyticsRunner, AnalyticsRunnerHandle, InMemoryInsightSink, InsightSink};
pub use store::{AnalyticsStore, InMemoryAnalyticsStore, PostgresAnalyticsStore, StoreError};
