use crate::coordination::CoordinationStore;
use crate::domain::processor::{
    ActiveDecision, HealthSnapshot, ProcessorHealth, ProcessorId, ProcessorPair, ProcessorSpec,
};
use crate::gateways::ProcessorClient;
use crate::health::selection::select_active;
use crate::telemetry::PipelineMetrics;
use anyhow::Result;
use parking_lot::RwLock;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const LOCK_KEY: &str = "health:lock";
pub const LAST_REFRESH_KEY: &str = "health:last_refresh";
pub const DECISION_KEY: &str = "health:active";
pub const HEALTH_HASH: &str = "health";

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub refresh_interval: Duration,
    pub probe_timeout: Duration,
    pub startup_jitter: Duration,
    pub lock_retry: Duration,
    pub read_retries: u32,
    pub read_retry_delay: Duration,
    /// Value written into the lock so only the holder releases it.
    pub instance_id: String,
}

impl MonitorConfig {
    fn lock_ttl(&self) -> Duration {
        self.refresh_interval + Duration::from_secs(1)
    }

    fn decision_ttl(&self) -> Duration {
        self.refresh_interval * 3
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another instance holds the lock.
    LockBusy,
    /// Someone refreshed recently; wait out the rest of the interval.
    NotDue(Duration),
    Refreshed(ActiveDecision),
}

/// Keeps the fleet-shared view of which processor is active.
///
/// Every instance runs the loop, but the coordination lock plus the shared
/// last-refresh timestamp mean only one of them probes per interval. Workers
/// read the published decision through [`HealthMonitor::resolve_active`].
#[derive(Clone)]
pub struct HealthMonitor {
    store: Arc<dyn CoordinationStore>,
    client: Arc<dyn ProcessorClient>,
    processors: Arc<ProcessorPair>,
    config: MonitorConfig,
    metrics: PipelineMetrics,
    last_known: Arc<RwLock<Option<ActiveDecision>>>,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        client: Arc<dyn ProcessorClient>,
        processors: Arc<ProcessorPair>,
        config: MonitorConfig,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            store,
            client,
            processors,
            config,
            metrics,
            last_known: Arc::new(RwLock::new(None)),
        }
    }

    pub fn processor(&self, id: ProcessorId) -> &ProcessorSpec {
        self.processors.get(id)
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let jitter_ms = self.config.startup_jitter.as_millis() as u64;
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
        tracing::debug!("health monitor starting after {:?} jitter", jitter);
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(jitter) => {}
        }

        loop {
            let wait = match self.tick().await {
                Ok(TickOutcome::LockBusy) => self.config.lock_retry,
                Ok(TickOutcome::NotDue(remaining)) => remaining,
                Ok(TickOutcome::Refreshed(_)) => self.config.refresh_interval,
                Err(err) => {
                    tracing::error!("health refresh error: {:#}", err);
                    self.config.lock_retry
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        tracing::info!("health monitor stopped");
    }

    /// One pass of the refresh protocol.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let owner = &self.config.instance_id;
        if !self
            .store
            .try_lock(LOCK_KEY, owner, self.config.lock_ttl())
            .await?
        {
            return Ok(TickOutcome::LockBusy);
        }

        let outcome = self.refresh_if_due().await;
        if let Err(err) = self.store.unlock(LOCK_KEY, owner).await {
            tracing::warn!("failed to release health lock: {:#}", err);
        }
        outcome
    }

    async fn refresh_if_due(&self) -> Result<TickOutcome> {
        let now = chrono::Utc::now();
        if let Some(last) = self.store.get_timestamp(LAST_REFRESH_KEY).await? {
            // A timestamp from the future (clock skew) counts as just refreshed.
            let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
            if elapsed < self.config.refresh_interval {
                return Ok(TickOutcome::NotDue(self.config.refresh_interval - elapsed));
            }
        }

        let decision = self.refresh().await?;
        self.store.set_timestamp(LAST_REFRESH_KEY, now).await?;
        Ok(TickOutcome::Refreshed(decision))
    }

    /// Probes both processors and publishes the resulting decision.
    pub async fn refresh(&self) -> Result<ActiveDecision> {
        let (default, fallback) = tokio::join!(
            self.probe(&self.processors.default),
            self.probe(&self.processors.fallback)
        );
        self.metrics.health_refreshes.inc();
        self.publish(default, fallback).await
    }

    async fn probe(&self, spec: &ProcessorSpec) -> ProcessorHealth {
        let timeout = self.config.probe_timeout;
        match tokio::time::timeout(timeout, self.client.probe_health(spec, timeout)).await {
            Ok(Ok(health)) => health,
            Ok(Err(err)) => {
                tracing::warn!("health probe for {} failed: {:#}", spec.id, err);
                ProcessorHealth::unreachable(chrono::Utc::now())
            }
            Err(_) => {
                tracing::warn!("health probe for {} timed out after {:?}", spec.id, timeout);
                ProcessorHealth::unreachable(chrono::Utc::now())
            }
        }
    }

    async fn publish(&self, default: ProcessorHealth, fallback: ProcessorHealth) -> Result<ActiveDecision> {
        let processor = select_active(&default, &fallback);
        let latency_ms = match processor {
            Some(ProcessorId::Default) => default.min_response_time,
            Some(ProcessorId::Fallback) => fallback.min_response_time,
            None => 0,
        };
        let decision = ActiveDecision {
            processor,
            latency_ms,
            decided_at: chrono::Utc::now(),
        };

        self.store
            .hset(HEALTH_HASH, ProcessorId::Default.as_str(), &serde_json::to_string(&default)?)
            .await?;
        self.store
            .hset(HEALTH_HASH, ProcessorId::Fallback.as_str(), &serde_json::to_string(&fallback)?)
            .await?;
        self.store
            .set(
                DECISION_KEY,
                &serde_json::to_string(&decision)?,
                Some(self.config.decision_ttl()),
            )
            .await?;

        let previous = self.last_known.write().replace(decision.clone());
        let from = previous.map(|d| d.processor);
        if from != Some(decision.processor) {
            tracing::info!(
                "active processor {} -> {}",
                from.flatten().map_or("none", |p| p.as_str()),
                decision.label()
            );
        }
        Ok(decision)
    }

    /// Reads the published decision. Store errors fall back to the last decision
    /// this instance saw; an absent key means nothing is published.
    pub async fn active_decision(&self) -> Option<ActiveDecision> {
        match self.store.get(DECISION_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<ActiveDecision>(&raw) {
                Ok(decision) => {
                    *self.last_known.write() = Some(decision.clone());
                    Some(decision)
                }
                Err(err) => {
                    tracing::warn!("unreadable active decision {:?}: {}", raw, err);
                    self.last_known.read().clone()
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!("active decision read failed, using last known: {:#}", err);
                self.last_known.read().clone()
            }
        }
    }

    /// Decision with an actual processor, polled a bounded number of times.
    pub async fn resolve_active(&self) -> Option<ActiveDecision> {
        for attempt in 0..=self.config.read_retries {
            if let Some(decision) = self.active_decision().await {
                if decision.processor.is_some() {
                    return Some(decision);
                }
            }
            if attempt < self.config.read_retries {
                tokio::time::sleep(self.config.read_retry_delay).await;
            }
        }
        None
    }

    pub async fn health_snapshot(&self) -> Result<HealthSnapshot> {
        let mut snapshot = HealthSnapshot::default();
        for id in ProcessorId::ALL {
            let Some(raw) = self.store.hget(HEALTH_HASH, id.as_str()).await? else {
                continue;
            };
            let health = serde_json::from_str::<ProcessorHealth>(&raw)?;
            match id {
                ProcessorId::Default => snapshot.default = Some(health),
                ProcessorId::Fallback => snapshot.fallback = Some(health),
            }
        }
        Ok(snapshot)
    }

    /// Records a forwarding failure without probing: the processor is marked
    /// failing and the decision recomputed from the other side's cached health.
    pub async fn mark_failing(&self, id: ProcessorId) -> Result<ActiveDecision> {
        let now = chrono::Utc::now();
        let snapshot = self.health_snapshot().await?;
        let failing = ProcessorHealth::unreachable(now);
        let other = |other: ProcessorId| {
            snapshot
                .get(other)
                .cloned()
                .unwrap_or_else(|| ProcessorHealth::healthy(0, now))
        };
        let (default, fallback) = match id {
            ProcessorId::Default => (failing, other(ProcessorId::Fallback)),
            ProcessorId::Fallback => (other(ProcessorId::Default), failing),
        };
        tracing::warn!("marking {} failing after a forwarding error", id);
        self.publish(default, fallback).await
    }
}
