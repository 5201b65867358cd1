use payments_router::config::{AppConfig, SettlementBackend};
use payments_router::coordination::in_memory::InMemoryCoordinationStore;
use payments_router::coordination::store_redis::RedisCoordinationStore;
use payments_router::coordination::CoordinationStore;
use payments_router::gateways::http::HttpProcessorClient;
use payments_router::gateways::ProcessorClient;
use payments_router::health::monitor::HealthMonitor;
use payments_router::queue::PaymentQueue;
use payments_router::service::payment_service::PaymentService;
use payments_router::service::worker::{spawn_pool, ForwardingWorker};
use payments_router::settlement::shared::SharedSettlements;
use payments_router::settlement::{InMemorySettlements, SettlementBook};
use payments_router::telemetry::PipelineMetrics;
use payments_router::AppState;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();
    let metrics = PipelineMetrics::new()?;

    let coordination: Arc<dyn CoordinationStore> = match &cfg.redis_url {
        Some(url) => Arc::new(RedisCoordinationStore::connect(url).await?),
        None => {
            tracing::warn!("REDIS_URL not set; running single-instance with in-process coordination");
            Arc::new(InMemoryCoordinationStore::new())
        }
    };

    let processors = Arc::new(cfg.processors());
    let http = reqwest::Client::builder()
        .pool_max_idle_per_host(cfg.worker_count * 2)
        .build()?;
    let client: Arc<dyn ProcessorClient> = Arc::new(HttpProcessorClient::new(http));

    let settlements: Arc<dyn SettlementBook> = match cfg.settlement_backend {
        SettlementBackend::Memory => Arc::new(InMemorySettlements::new(cfg.bucket_width())),
        SettlementBackend::Shared => Arc::new(SharedSettlements::new(coordination.clone(), processors.clone())),
    };

    let queue = PaymentQueue::new(coordination.clone(), &cfg.queue_key);
    let monitor = HealthMonitor::new(
        coordination.clone(),
        client.clone(),
        processors.clone(),
        cfg.monitor_config(),
        metrics.clone(),
    );

    let shutdown = CancellationToken::new();
    let monitor_task = tokio::spawn(monitor.clone().run(shutdown.clone()));
    let workers = spawn_pool(
        cfg.worker_count,
        ForwardingWorker {
            id: 0,
            queue: queue.clone(),
            monitor: monitor.clone(),
            client: client.clone(),
            settlements: settlements.clone(),
            metrics: metrics.clone(),
            policy: cfg.retry_policy(),
            dequeue_wait: cfg.dequeue_wait(),
        },
        shutdown.clone(),
    );

    let state = AppState {
        payment_service: PaymentService {
            queue,
            settlements,
            client,
            processors,
            metrics: metrics.clone(),
        },
        monitor,
        metrics,
        coordination,
    };
    let app = payments_router::http::router::build(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!(
        "listening on {} as {} with {} workers",
        cfg.bind_addr,
        cfg.instance_id,
        cfg.worker_count
    );

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {}", err);
            }
            tracing::info!("shutting down");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = monitor_task.await;
    for worker in workers {
        let _ = worker.await;
    }
    Ok(())
}
