use payments_router::coordination::in_memory::InMemoryCoordinationStore;
use payments_router::domain::payment::PaymentJob;
use payments_router::domain::processor::{ProcessorId, ProcessorPair, ProcessorSpec};
use payments_router::gateways::mock::{MockProcessor, NETWORK_ERROR};
use payments_router::health::monitor::{HealthMonitor, MonitorConfig};
use payments_router::queue::PaymentQueue;
use payments_router::service::forwarder::RetryPolicy;
use payments_router::service::worker::{spawn_pool, ForwardingWorker, JobDisposition};
use payments_router::settlement::{InMemorySettlements, SettlementBook};
use payments_router::telemetry::PipelineMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Harness {
    mock: MockProcessor,
    monitor: HealthMonitor,
    queue: PaymentQueue,
    settlements: Arc<InMemorySettlements>,
    metrics: PipelineMetrics,
    worker: ForwardingWorker,
}

fn harness(max_attempts: Option<u32>) -> Harness {
    let store = Arc::new(InMemoryCoordinationStore::new());
    let mock = MockProcessor::new();
    let metrics = PipelineMetrics::new().unwrap();
    let processors = Arc::new(ProcessorPair {
        default: ProcessorSpec::new(ProcessorId::Default, "http://d", "t", Duration::from_secs(1)),
        fallback: ProcessorSpec::new(ProcessorId::Fallback, "http://f", "t", Duration::from_secs(1)),
    });
    let monitor = HealthMonitor::new(
        store.clone(),
        Arc::new(mock.clone()),
        processors,
        MonitorConfig {
            refresh_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(1),
            startup_jitter: Duration::ZERO,
            lock_retry: Duration::from_millis(10),
            read_retries: 1,
            read_retry_delay: Duration::from_millis(1),
            instance_id: "test".to_string(),
        },
        metrics.clone(),
    );
    let queue = PaymentQueue::new(store, "payments:queue");
    let settlements = Arc::new(InMemorySettlements::new(chrono::Duration::seconds(1)));
    let worker = ForwardingWorker {
        id: 0,
        queue: queue.clone(),
        monitor: monitor.clone(),
        client: Arc::new(mock.clone()),
        settlements: settlements.clone(),
        metrics: metrics.clone(),
        policy: RetryPolicy {
            max_attempts,
            retry_backoff: Duration::from_millis(1),
            no_processor_backoff: Duration::from_millis(1),
        },
        dequeue_wait: Duration::from_millis(20),
    };
    Harness {
        mock,
        monitor,
        queue,
        settlements,
        metrics,
        worker,
    }
}

fn job(amount_minor: i64) -> PaymentJob {
    PaymentJob::new(uuid::Uuid::new_v4(), amount_minor, chrono::Utc::now())
}

async fn next_job(queue: &PaymentQueue) -> PaymentJob {
    queue
        .dequeue(Duration::from_millis(20))
        .await
        .unwrap()
        .expect("job should have been requeued")
}

#[tokio::test]
async fn success_records_settlement_for_resolved_processor() {
    let h = harness(Some(10));
    h.monitor.refresh().await.unwrap();

    assert_eq!(h.worker.process(job(1990)).await, JobDisposition::Settled);

    let totals = h.settlements.summary(ProcessorId::Default, None, None).await.unwrap();
    assert_eq!(totals.count, 1);
    assert_eq!(totals.sum_minor, 1990);
    let fallback = h.settlements.summary(ProcessorId::Fallback, None, None).await.unwrap();
    assert_eq!(fallback.count, 0);
    assert_eq!(
        h.metrics
            .payments_forwarded
            .with_label_values(&["default", "success"])
            .get(),
        1
    );
}

#[tokio::test]
async fn server_error_is_requeued_and_reattempted() {
    let h = harness(Some(10));
    h.monitor.refresh().await.unwrap();
    h.mock.script(ProcessorId::Default, &[500]);

    let original = job(500);
    assert_eq!(h.worker.process(original.clone()).await, JobDisposition::Requeued);

    let retried = next_job(&h.queue).await;
    assert_eq!(retried.correlation_id, original.correlation_id);
    assert_eq!(retried.requested_at, original.requested_at);
    assert_eq!(retried.attempt, 1);

    // The 500 marked default failing, so the retry goes to fallback.
    assert_eq!(h.worker.process(retried).await, JobDisposition::Settled);
    assert_eq!(h.mock.calls_to(ProcessorId::Default), 1);
    assert_eq!(h.mock.calls_to(ProcessorId::Fallback), 1);
    let totals = h.settlements.summary(ProcessorId::Fallback, None, None).await.unwrap();
    assert_eq!(totals.count, 1);
}

#[tokio::test]
async fn network_error_is_retryable() {
    let h = harness(Some(10));
    h.monitor.refresh().await.unwrap();
    h.mock.script(ProcessorId::Default, &[NETWORK_ERROR]);

    assert_eq!(h.worker.process(job(100)).await, JobDisposition::Requeued);
    assert_eq!(next_job(&h.queue).await.attempt, 1);
}

#[tokio::test]
async fn unprocessable_is_dropped_without_retry() {
    let h = harness(Some(10));
    h.monitor.refresh().await.unwrap();
    h.mock.script(ProcessorId::Default, &[422]);

    assert_eq!(h.worker.process(job(100)).await, JobDisposition::Rejected);
    assert_eq!(h.queue.len().await.unwrap(), 0);
    assert_eq!(h.mock.calls().len(), 1);
    assert_eq!(
        h.settlements.summary(ProcessorId::Default, None, None).await.unwrap().count,
        0
    );
    let active = h.monitor.active_decision().await.unwrap();
    assert_eq!(active.processor, Some(ProcessorId::Default));
}

#[tokio::test]
async fn client_errors_other_than_422_retry_without_rerouting() {
    let h = harness(Some(10));
    h.monitor.refresh().await.unwrap();
    h.mock.script(ProcessorId::Default, &[429]);

    assert_eq!(h.worker.process(job(100)).await, JobDisposition::Requeued);
    let active = h.monitor.active_decision().await.unwrap();
    assert_eq!(active.processor, Some(ProcessorId::Default));
}

#[tokio::test]
async fn attempt_cap_drops_and_counts() {
    let h = harness(Some(2));
    h.monitor.refresh().await.unwrap();
    h.mock.set_steady_status(ProcessorId::Default, 429);

    assert_eq!(h.worker.process(job(100)).await, JobDisposition::Requeued);
    let retried = next_job(&h.queue).await;
    assert_eq!(h.worker.process(retried).await, JobDisposition::Dropped);

    assert_eq!(h.queue.len().await.unwrap(), 0);
    assert_eq!(
        h.metrics
            .payments_dropped
            .with_label_values(&["max_attempts"])
            .get(),
        1
    );
}

#[tokio::test]
async fn no_active_processor_requeues_untouched() {
    let h = harness(Some(10));
    h.mock.set_health(ProcessorId::Default, Some((true, 0)));
    h.mock.set_health(ProcessorId::Fallback, Some((true, 0)));
    h.monitor.refresh().await.unwrap();

    let original = job(100);
    assert_eq!(h.worker.process(original.clone()).await, JobDisposition::NoProcessor);
    assert_eq!(next_job(&h.queue).await, original);
    assert!(h.mock.calls().is_empty());
}

#[tokio::test]
async fn nothing_published_yet_counts_as_no_processor() {
    let h = harness(Some(10));
    assert_eq!(h.worker.process(job(100)).await, JobDisposition::NoProcessor);
    assert_eq!(h.queue.len().await.unwrap(), 1);
}

#[tokio::test]
async fn deadline_adds_measured_latency() {
    let h = harness(Some(10));
    h.mock.set_health(ProcessorId::Default, Some((false, 80)));
    h.monitor.refresh().await.unwrap();

    h.worker.process(job(100)).await;
    let calls = h.mock.calls();
    assert_eq!(calls[0].deadline, Duration::from_millis(1_080));
    assert_eq!(calls[0].request.amount.to_string(), "1.00");
}

#[tokio::test]
async fn pool_drains_queue_and_stops_on_shutdown() {
    let h = harness(Some(10));
    h.monitor.refresh().await.unwrap();
    for _ in 0..25 {
        h.queue.enqueue(&job(10)).await.unwrap();
    }

    let shutdown = CancellationToken::new();
    let handles = spawn_pool(4, h.worker.clone(), shutdown.clone());

    let settled = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let totals = h.settlements.summary(ProcessorId::Default, None, None).await.unwrap();
            if totals.count == 25 {
                return totals;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pool should settle every job");
    assert_eq!(settled.sum_minor, 250);

    shutdown.cancel();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should observe shutdown")
            .unwrap();
    }
}
