use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Pipeline counters. Built once at startup and cloned into every component.
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,
    pub payments_accepted: IntCounter,
    pub payments_forwarded: IntCounterVec,
    pub payments_dropped: IntCounterVec,
    pub settlement_errors: IntCounter,
    pub health_refreshes: IntCounter,
    pub queue_depth: IntGauge,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let payments_accepted =
            IntCounter::new("payments_accepted_total", "Payments accepted for processing")?;
        let payments_forwarded = IntCounterVec::new(
            Opts::new("payments_forwarded_total", "Forwarding attempts by processor and outcome"),
            &["processor", "outcome"],
        )?;
        let payments_dropped = IntCounterVec::new(
            Opts::new("payments_dropped_total", "Jobs abandoned without settlement"),
            &["reason"],
        )?;
        let settlement_errors =
            IntCounter::new("settlement_errors_total", "Settled payments that failed to record")?;
        let health_refreshes =
            IntCounter::new("health_refreshes_total", "Health probes performed by this instance")?;
        let queue_depth = IntGauge::new("payment_queue_depth", "Jobs waiting in the payment queue")?;

        registry.register(Box::new(payments_accepted.clone()))?;
        registry.register(Box::new(payments_forwarded.clone()))?;
        registry.register(Box::new(payments_dropped.clone()))?;
        registry.register(Box::new(settlement_errors.clone()))?;
        registry.register(Box::new(health_refreshes.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            payments_accepted,
            payments_forwarded,
            payments_dropped,
            settlement_errors,
            health_refreshes,
            queue_depth,
        })
    }

    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
