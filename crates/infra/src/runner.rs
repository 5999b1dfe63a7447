use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use supplysight_ai::AnalyticsModels;
use supplysight_core::OrganizationId;

use crate::analytics::{AnalysisScope, AnalyticsError, AnalyticsService, BusinessInsights};
use crate::config::AnalyticsConfig;
use crate::store::AnalyticsStore;

/// Receives the insights each runner cycle produces.
pub trait InsightSink: Send + Sync + 'static {
    fn emit(&self, organization_id: OrganizationId, insights: BusinessInsights);
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryInsightSink {
    inner: Mutex<Vec<(OrganizationId, BusinessInsights)>>,
}

impl InMemoryInsightSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<(OrganizationId, BusinessInsights)> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InsightSink for InMemoryInsightSink {
    fn emit(&self, organization_id: OrganizationId, insights: BusinessInsights) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((organization_id, insights));
    }
}

/// Config for the periodic analytics runner.
#[derive(Debug, Clone)]
pub struct AnalyticsRunner {
    pub interval: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
    /// When false, interval ticks (and the startup run) are skipped; triggers still run.
    pub scheduled: bool,
}

impl Default for AnalyticsRunner {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
            scheduled: true,
        }
    }
}

/// Handle for a running analytics runner (shutdown + trigger hook).
#[derive(Debug)]
pub struct AnalyticsRunnerHandle {
    shutdown: oneshot::Sender<()>,
    trigger: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl AnalyticsRunnerHandle {
    /// Requests a cycle now.
    ///
    /// Triggers are coalesced (capacity 1); if one is already pending this is a no-op.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Stops the runner, abandoning a cycle in progress, and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.join.await {
            warn!(error = ?e, "analytics runner task ended abnormally");
        }
    }
}

impl AnalyticsRunner {
    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self {
            interval: config.update_interval(),
            scheduled: config.enable_real_time_processing,
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max_retries: u32) -> Self {
        self.base_backoff = base;
        self.max_retries = max_retries;
        self
    }

    /// Spawn an organization-scoped runner on the current tokio runtime.
    ///
    /// - Schedule: runs on startup and every `interval`
    /// - Event-trigger: `handle.trigger()`
    /// - Failures: logged + retried with bounded exponential backoff; never propagate
    pub fn spawn_for_organization<S, M, K>(
        &self,
        name: &'static str,
        organization_id: OrganizationId,
        service: Arc<AnalyticsService<S, M>>,
        sink: Arc<K>,
    ) -> AnalyticsRunnerHandle
    where
        S: AnalyticsStore,
        M: AnalyticsModels,
        K: InsightSink,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        let join = tokio::spawn(runner_loop(
            name,
            organization_id,
            self.clone(),
            shutdown_rx,
            trigger_rx,
            service,
            sink,
        ));

        AnalyticsRunnerHandle {
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join,
        }
    }
}

async fn run_cycle<S, M, K>(
    organization_id: OrganizationId,
    service: &AnalyticsService<S, M>,
    sink: &K,
) -> Result<(), AnalyticsError>
where
    S: AnalyticsStore,
    M: AnalyticsModels,
    K: InsightSink,
{
    let insights = service.get_business_insights(organization_id).await?;
    sink.emit(organization_id, insights);
    service
        .forecast_inventory_demand(AnalysisScope::Organization(organization_id))
        .await?;
    service.purge_expired().await?;
    Ok(())
}

async fn runner_loop<S, M, K>(
    name: &'static str,
    organization_id: OrganizationId,
    cfg: AnalyticsRunner,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut trigger_rx: mpsc::Receiver<()>,
    service: Arc<AnalyticsService<S, M>>,
    sink: Arc<K>,
) where
    S: AnalyticsStore,
    M: AnalyticsModels,
    K: InsightSink,
{
    info!(runner = name, org = %organization_id, "analytics runner started");

    let mut ticker = tokio::time::interval_at(Instant::now() + cfg.interval, cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pending = cfg.scheduled; // startup run
    let mut failures: u32 = 0;
    let mut backoff_until: Option<Instant> = None;

    loop {
        let ready = pending && backoff_until.is_none_or(|until| Instant::now() >= until);

        if ready {
            pending = false;
            backoff_until = None;

            // Shutdown has priority; a dropped cycle releases its limiter slots.
            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                outcome = run_cycle(organization_id, &service, sink.as_ref()) => outcome,
            };

            match outcome {
                Ok(()) => {
                    failures = 0;
                    debug!(runner = name, org = %organization_id, "analytics cycle completed");
                }
                Err(e) => {
                    warn!(runner = name, org = %organization_id, error = ?e, "analytics cycle failed");
                    failures += 1;
                    if failures <= cfg.max_retries {
                        pending = true;
                        backoff_until = Some(Instant::now() + backoff(cfg.base_backoff, failures));
                    } else {
                        failures = 0;
                    }
                }
            }
            continue;
        }

        let retry_at = backoff_until.filter(|_| pending);

        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            Some(()) = trigger_rx.recv() => pending = true,
            _ = ticker.tick() => {
                if cfg.scheduled {
                    pending = true;
                } else {
                    debug!(runner = name, org = %organization_id, "real-time processing disabled; tick skipped");
                }
            }
            _ = sleep_until_opt(retry_at) => {}
        }
    }

    info!(runner = name, org = %organization_id, "analytics runner stopped");
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // Exponential backoff: base * 2^(attempt-1), capped.
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(pow as u128);
    Duration::from_millis(ms.min(10_000) as u64)
}
