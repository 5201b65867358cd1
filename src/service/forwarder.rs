use crate::domain::payment::PaymentJob;
use crate::domain::processor::ProcessorSpec;
use crate::gateways::ForwardOutcome;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum RetryDirective {
    Requeue,
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Pause after a transport error or 5xx before the job goes back on the queue.
    pub retry_backoff: Duration,
    /// Pause after finding no active processor.
    pub no_processor_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            retry_backoff: Duration::from_secs(1),
            no_processor_backoff: Duration::from_millis(50),
        }
    }
}

pub fn classify_status(status: u16) -> ForwardOutcome {
    match status {
        200..=299 => ForwardOutcome::Success,
        422 => ForwardOutcome::Terminal { status },
        0 => ForwardOutcome::Retryable {
            status: None,
            reason: "HTTP_0".to_string(),
        },
        _ => ForwardOutcome::Retryable {
            status: Some(status),
            reason: format!("HTTP_{}", status),
        },
    }
}

/// Counts the attempt that just failed and decides whether the job goes back.
pub fn register_failed_attempt(job: &mut PaymentJob, policy: &RetryPolicy) -> RetryDirective {
    job.attempt = job.attempt.saturating_add(1);
    match policy.max_attempts {
        Some(max) if job.attempt >= max => RetryDirective::GiveUp,
        _ => RetryDirective::Requeue,
    }
}

/// The fixed budget plus the processor's last measured latency.
pub fn adaptive_deadline(spec: &ProcessorSpec, latency_ms: u64) -> Duration {
    spec.timeout + Duration::from_millis(latency_ms)
}
