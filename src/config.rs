use crate::domain::processor::{ProcessorId, ProcessorPair, ProcessorSpec};
use crate::health::monitor::MonitorConfig;
use crate::service::forwarder::RetryPolicy;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementBackend {
    /// Per-instance bucket index.
    Memory,
    /// Kept in the coordination store, visible to every instance.
    Shared,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// `None` runs single-instance on the in-process store.
    pub redis_url: Option<String>,
    pub default_url: String,
    pub fallback_url: String,
    pub processor_token: String,
    pub processor_timeout_ms: u64,
    pub health_refresh_interval_ms: u64,
    pub health_probe_timeout_ms: u64,
    pub health_startup_jitter_ms: u64,
    pub health_lock_retry_ms: u64,
    pub health_read_retries: u32,
    pub health_read_retry_ms: u64,
    pub worker_count: usize,
    /// 0 means unlimited.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub no_processor_backoff_ms: u64,
    pub queue_key: String,
    pub dequeue_wait_ms: u64,
    pub settlement_backend: SettlementBackend,
    pub settlement_bucket_ms: i64,
    pub instance_id: String,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("ignoring unparseable {}={:?}", name, raw);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let settlement_backend = match var_or("SETTLEMENT_BACKEND", "memory").to_lowercase().as_str() {
            "shared" | "redis" => SettlementBackend::Shared,
            _ => SettlementBackend::Memory,
        };
        let instance_id = std::env::var("INSTANCE_ID")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        Self {
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:9999"),
            redis_url: std::env::var("REDIS_URL").ok().filter(|u| !u.trim().is_empty()),
            default_url: var_or("PROCESSOR_DEFAULT_URL", "http://payment-processor-default:8080"),
            fallback_url: var_or("PROCESSOR_FALLBACK_URL", "http://payment-processor-fallback:8080"),
            processor_token: var_or("PROCESSOR_TOKEN", "123"),
            processor_timeout_ms: parsed_or("PROCESSOR_TIMEOUT_MS", 10_000),
            health_refresh_interval_ms: parsed_or("HEALTH_REFRESH_INTERVAL_MS", 5_000),
            health_probe_timeout_ms: parsed_or("HEALTH_PROBE_TIMEOUT_MS", 4_000),
            health_startup_jitter_ms: parsed_or("HEALTH_STARTUP_JITTER_MS", 3_000),
            health_lock_retry_ms: parsed_or("HEALTH_LOCK_RETRY_MS", 1_000),
            health_read_retries: parsed_or("HEALTH_READ_RETRIES", 5),
            health_read_retry_ms: parsed_or("HEALTH_READ_RETRY_MS", 10),
            worker_count: parsed_or("WORKER_COUNT", 8usize).max(1),
            max_attempts: parsed_or("MAX_ATTEMPTS", 10),
            retry_backoff_ms: parsed_or("RETRY_BACKOFF_MS", 1_000),
            no_processor_backoff_ms: parsed_or("NO_PROCESSOR_BACKOFF_MS", 50),
            queue_key: var_or("QUEUE_KEY", "payments:queue"),
            dequeue_wait_ms: parsed_or("DEQUEUE_WAIT_MS", 1_000),
            settlement_backend,
            settlement_bucket_ms: parsed_or("SETTLEMENT_BUCKET_MS", 1_000i64).max(1),
            instance_id,
        }
    }

    pub fn processors(&self) -> ProcessorPair {
        let timeout = Duration::from_millis(self.processor_timeout_ms);
        ProcessorPair {
            default: ProcessorSpec::new(ProcessorId::Default, &self.default_url, &self.processor_token, timeout),
            fallback: ProcessorSpec::new(ProcessorId::Fallback, &self.fallback_url, &self.processor_token, timeout),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            refresh_interval: Duration::from_millis(self.health_refresh_interval_ms),
            probe_timeout: Duration::from_millis(self.health_probe_timeout_ms),
            startup_jitter: Duration::from_millis(self.health_startup_jitter_ms),
            lock_retry: Duration::from_millis(self.health_lock_retry_ms),
            read_retries: self.health_read_retries,
            read_retry_delay: Duration::from_millis(self.health_read_retry_ms),
            instance_id: self.instance_id.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            no_processor_backoff: Duration::from_millis(self.no_processor_backoff_ms),
        }
    }

    pub fn dequeue_wait(&self) -> Duration {
        Duration::from_millis(self.dequeue_wait_ms)
    }

    pub fn bucket_width(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.settlement_bucket_ms)
    }
}
