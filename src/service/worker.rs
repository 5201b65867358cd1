use crate::domain::payment::PaymentJob;
use crate::gateways::{ForwardOutcome, ProcessorClient};
use crate::health::monitor::HealthMonitor;
use crate::queue::PaymentQueue;
use crate::service::forwarder::{adaptive_deadline, register_failed_attempt, RetryDirective, RetryPolicy};
use crate::settlement::SettlementBook;
use crate::telemetry::PipelineMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    Settled,
    /// Settled upstream but the local record failed.
    SettledUnrecorded,
    Requeued,
    Dropped,
    /// 422 from the processor; nothing to retry.
    Rejected,
    /// No active processor; job went back untouched.
    NoProcessor,
}

#[derive(Clone)]
pub struct ForwardingWorker {
    pub id: usize,
    pub queue: PaymentQueue,
    pub monitor: HealthMonitor,
    pub client: Arc<dyn ProcessorClient>,
    pub settlements: Arc<dyn SettlementBook>,
    pub metrics: PipelineMetrics,
    pub policy: RetryPolicy,
    pub dequeue_wait: Duration,
}

impl ForwardingWorker {
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::debug!("worker {} started", self.id);
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = self.queue.dequeue(self.dequeue_wait) => next,
            };

            match next {
                Ok(Some(job)) => {
                    self.process(job).await;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::error!("worker {} dequeue error: {:#}", self.id, err);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.dequeue_wait) => {}
                    }
                }
            }
        }
        tracing::debug!("worker {} stopped", self.id);
    }

    pub async fn process(&self, mut job: PaymentJob) -> JobDisposition {
        let active = self
            .monitor
            .resolve_active()
            .await
            .and_then(|d| d.processor.map(|p| (p, d.latency_ms)));
        let Some((processor, latency_ms)) = active else {
            self.requeue(&job).await;
            tokio::time::sleep(self.policy.no_processor_backoff).await;
            return JobDisposition::NoProcessor;
        };

        let spec = self.monitor.processor(processor);
        let deadline = adaptive_deadline(spec, latency_ms);
        let outcome = self
            .client
            .forward(spec, &job.to_processor_request(), deadline)
            .await;
        self.metrics
            .payments_forwarded
            .with_label_values(&[processor.as_str(), outcome.label()])
            .inc();

        match outcome {
            ForwardOutcome::Success => {
                if let Err(err) = self.settlements.record(job.settle(processor)).await {
                    self.metrics.settlement_errors.inc();
                    tracing::error!(
                        "payment {} settled on {} but not recorded: {:#}",
                        job.correlation_id,
                        processor,
                        err
                    );
                    return JobDisposition::SettledUnrecorded;
                }
                JobDisposition::Settled
            }
            ForwardOutcome::Terminal { status } => {
                tracing::debug!(
                    "payment {} rejected by {} with {}",
                    job.correlation_id,
                    processor,
                    status
                );
                JobDisposition::Rejected
            }
            ForwardOutcome::Retryable { ref reason, .. } => {
                tracing::debug!(
                    "payment {} failed on {}: {}",
                    job.correlation_id,
                    processor,
                    reason
                );
                if outcome.is_upstream_fault() {
                    if let Err(err) = self.monitor.mark_failing(processor).await {
                        tracing::warn!("could not mark {} failing: {:#}", processor, err);
                    }
                    tokio::time::sleep(self.policy.retry_backoff).await;
                }

                match register_failed_attempt(&mut job, &self.policy) {
                    RetryDirective::Requeue => {
                        if self.requeue(&job).await {
                            JobDisposition::Requeued
                        } else {
                            JobDisposition::Dropped
                        }
                    }
                    RetryDirective::GiveUp => {
                        self.metrics
                            .payments_dropped
                            .with_label_values(&["max_attempts"])
                            .inc();
                        tracing::warn!(
                            "dropping payment {} after {} attempts",
                            job.correlation_id,
                            job.attempt
                        );
                        JobDisposition::Dropped
                    }
                }
            }
        }
    }

    async fn requeue(&self, job: &PaymentJob) -> bool {
        match self.queue.enqueue(job).await {
            Ok(()) => true,
            Err(err) => {
                self.metrics
                    .payments_dropped
                    .with_label_values(&["requeue_failed"])
                    .inc();
                tracing::warn!("failed to requeue payment {}: {:#}", job.correlation_id, err);
                false
            }
        }
    }
}

/// Starts `count` workers sharing one template; each gets its own id.
pub fn spawn_pool(count: usize, template: ForwardingWorker, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|id| {
            let worker = ForwardingWorker {
                id,
                ..template.clone()
            };
            tokio::spawn(worker.run(shutdown.clone()))
        })
        .collect()
}
