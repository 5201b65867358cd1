use anyhow::{bail, Result};
use payments_router::coordination::in_memory::InMemoryCoordinationStore;
use payments_router::coordination::CoordinationStore;
use payments_router::domain::processor::{ProcessorId, ProcessorPair, ProcessorSpec};
use payments_router::gateways::mock::MockProcessor;
use payments_router::health::monitor::{HealthMonitor, MonitorConfig, TickOutcome, DECISION_KEY};
use payments_router::telemetry::PipelineMetrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Delegates to the in-memory store but can be told to fail reads.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: InMemoryCoordinationStore,
    down: Arc<AtomicBool>,
}

impl FlakyStore {
    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            bail!("connection reset");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CoordinationStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }
    async fn del(&self, key: &str) -> Result<()> {
        self.check()?;
        self.inner.del(key).await
    }
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.check()?;
        self.inner.hget(key, field).await
    }
    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        self.check()?;
        self.inner.hmget(key, fields).await
    }
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.check()?;
        self.inner.hset(key, field, value).await
    }
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        self.check()?;
        self.inner.zadd(key, score, member).await
    }
    async fn zrange_by_score(&self, key: &str, min: Option<f64>, max: Option<f64>) -> Result<Vec<String>> {
        self.check()?;
        self.inner.zrange_by_score(key, min, max).await
    }
    async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        self.inner.rpush(key, value).await
    }
    async fn blpop(&self, key: &str, wait: Duration) -> Result<Option<String>> {
        self.check()?;
        self.inner.blpop(key, wait).await
    }
    async fn llen(&self, key: &str) -> Result<u64> {
        self.check()?;
        self.inner.llen(key).await
    }
    async fn try_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.check()?;
        self.inner.try_lock(key, owner, ttl).await
    }
    async fn unlock(&self, key: &str, owner: &str) -> Result<()> {
        self.check()?;
        self.inner.unlock(key, owner).await
    }
}

fn config(instance: &str, interval: Duration) -> MonitorConfig {
    MonitorConfig {
        refresh_interval: interval,
        probe_timeout: Duration::from_millis(50),
        startup_jitter: Duration::ZERO,
        lock_retry: Duration::from_millis(10),
        read_retries: 2,
        read_retry_delay: Duration::from_millis(1),
        instance_id: instance.to_string(),
    }
}

fn monitor(store: Arc<dyn CoordinationStore>, mock: &MockProcessor, cfg: MonitorConfig) -> (HealthMonitor, PipelineMetrics) {
    let processors = ProcessorPair {
        default: ProcessorSpec::new(ProcessorId::Default, "http://d", "t", Duration::from_secs(1)),
        fallback: ProcessorSpec::new(ProcessorId::Fallback, "http://f", "t", Duration::from_secs(1)),
    };
    let metrics = PipelineMetrics::new().unwrap();
    let m = HealthMonitor::new(store, Arc::new(mock.clone()), Arc::new(processors), cfg, metrics.clone());
    (m, metrics)
}

#[tokio::test]
async fn fleet_probes_at_most_once_per_interval() {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
    let mock = MockProcessor::new();
    let interval = Duration::from_millis(100);
    let (a, a_metrics) = monitor(store.clone(), &mock, config("a", interval));
    let (b, b_metrics) = monitor(store.clone(), &mock, config("b", interval));
    let (c, c_metrics) = monitor(store, &mock, config("c", interval));

    let shutdown = CancellationToken::new();
    let tasks = [
        tokio::spawn(a.run(shutdown.clone())),
        tokio::spawn(b.run(shutdown.clone())),
        tokio::spawn(c.run(shutdown.clone())),
    ];
    tokio::time::sleep(Duration::from_millis(450)).await;
    shutdown.cancel();
    for task in tasks {
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    let refreshes = a_metrics.health_refreshes.get()
        + b_metrics.health_refreshes.get()
        + c_metrics.health_refreshes.get();
    assert!(refreshes >= 2, "expected periodic refreshes, got {refreshes}");
    assert!(refreshes <= 5, "more than one refresh per interval: {refreshes}");
    assert_eq!(mock.probes() as u64, refreshes * 2);
}

#[tokio::test]
async fn slow_default_hands_traffic_to_fast_fallback() {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
    let mock = MockProcessor::new();
    mock.set_health(ProcessorId::Default, Some((false, 300)));
    mock.set_health(ProcessorId::Fallback, Some((false, 60)));
    let (m, _) = monitor(store, &mock, config("a", Duration::from_secs(5)));

    let outcome = m.tick().await.unwrap();
    let TickOutcome::Refreshed(decision) = outcome else {
        panic!("expected a refresh, got {outcome:?}");
    };
    assert_eq!(decision.processor, Some(ProcessorId::Fallback));
    assert_eq!(decision.latency_ms, 60);

    let snapshot = m.health_snapshot().await.unwrap();
    assert_eq!(snapshot.default.unwrap().min_response_time, 300);
    assert_eq!(snapshot.fallback.unwrap().min_response_time, 60);
}

#[tokio::test(start_paused = true)]
async fn published_decision_expires_when_nobody_refreshes() {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
    let mock = MockProcessor::new();
    let (m, _) = monitor(store.clone(), &mock, config("a", Duration::from_secs(5)));

    m.refresh().await.unwrap();
    assert!(store.get(DECISION_KEY).await.unwrap().is_some());

    tokio::time::advance(Duration::from_secs(15) + Duration::from_millis(1)).await;
    assert!(store.get(DECISION_KEY).await.unwrap().is_none());
    assert!(m.resolve_active().await.is_none());
}

#[tokio::test]
async fn store_outage_keeps_last_known_decision() {
    let flaky = FlakyStore::default();
    let mock = MockProcessor::new();
    let (m, _) = monitor(Arc::new(flaky.clone()), &mock, config("a", Duration::from_secs(5)));

    m.refresh().await.unwrap();
    flaky.down.store(true, Ordering::SeqCst);

    let decision = m.resolve_active().await.expect("last known decision");
    assert_eq!(decision.processor, Some(ProcessorId::Default));
    assert!(m.tick().await.is_err());
}
