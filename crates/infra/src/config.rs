//! Analytics engine configuration.
//!
//! Loaded from `SUPPLYSIGHT_*` environment variables; anything unset keeps its default.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a batch reacts when one entity's task fails.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// First failed task fails the whole batch.
    #[default]
    AbortOnFirstError,
    /// Successful entities are returned; failed ones are reported individually.
    IsolatePerEntity,
}

impl FailurePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" | "abort_on_first_error" | "strict" => Some(Self::AbortOnFirstError),
            "isolate" | "isolate_per_entity" | "partial" => Some(Self::IsolatePerEntity),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Parse { key: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub update_interval_minutes: u64,
    pub retention_period_days: u32,
    /// Confidence below which a result counts as low-confidence.
    pub confidence_threshold: f64,
    /// When set, low-confidence results are left out of returned lists. They are persisted either way.
    pub filter_low_confidence: bool,
    /// Gates real-time metrics and scheduled runner ticks.
    pub enable_real_time_processing: bool,
    pub max_concurrent_ml_operations: usize,
    pub failure_policy: FailurePolicy,
    /// Per-entity deadline covering queue wait and execution.
    pub task_timeout_ms: Option<u64>,
    pub target_margin: f64,
    pub demand_elasticity: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            update_interval_minutes: 15,
            retention_period_days: 365,
            confidence_threshold: 0.7,
            filter_low_confidence: false,
            enable_real_time_processing: true,
            max_concurrent_ml_operations: 5,
            failure_policy: FailurePolicy::AbortOnFirstError,
            task_timeout_ms: None,
            target_margin: 0.30,
            demand_elasticity: -1.5,
        }
    }
}

const PREFIX: &str = "SUPPLYSIGHT_";

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(&format!("{PREFIX}{key}")) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Parse { key, value: raw }),
    }
}

impl AnalyticsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = parse_var(&lookup, "UPDATE_INTERVAL_MINUTES")? {
            cfg.update_interval_minutes = v;
        }
        if let Some(v) = parse_var(&lookup, "RETENTION_PERIOD_DAYS")? {
            cfg.retention_period_days = v;
        }
        if let Some(v) = parse_var(&lookup, "CONFIDENCE_THRESHOLD")? {
            cfg.confidence_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "FILTER_LOW_CONFIDENCE")? {
            cfg.filter_low_confidence = v;
        }
        if let Some(v) = parse_var(&lookup, "ENABLE_REAL_TIME_PROCESSING")? {
            cfg.enable_real_time_processing = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_CONCURRENT_ML_OPERATIONS")? {
            cfg.max_concurrent_ml_operations = v;
        }
        if let Some(v) = parse_var(&lookup, "TASK_TIMEOUT_MS")? {
            cfg.task_timeout_ms = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "TARGET_MARGIN")? {
            cfg.target_margin = v;
        }
        if let Some(v) = parse_var(&lookup, "DEMAND_ELASTICITY")? {
            cfg.demand_elasticity = v;
        }
        if let Some(raw) = lookup(&format!("{PREFIX}FAILURE_POLICY")) {
            cfg.failure_policy = FailurePolicy::parse(&raw).ok_or(ConfigError::Parse {
                key: "FAILURE_POLICY",
                value: raw,
            })?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.max_concurrent_ml_operations == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_ml_operations must be at least 1".to_string(),
            ));
        }
        if self.update_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "update_interval_minutes must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.target_margin) {
            return Err(ConfigError::Invalid(format!(
                "target_margin must be within [0, 1), got {}",
                self.target_margin
            )));
        }
        if !self.demand_elasticity.is_finite() {
            return Err(ConfigError::Invalid("demand_elasticity must be finite".to_string()));
        }
        if self.task_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("task_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes.saturating_mul(60))
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_period_days))
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_ml_operations = max;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Leaves results below `threshold` out of returned lists.
    pub fn with_low_confidence_filter(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self.filter_low_confidence = true;
        self
    }

    pub fn with_real_time_processing(mut self, enabled: bool) -> Self {
        self.enable_real_time_processing = enabled;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }
}
