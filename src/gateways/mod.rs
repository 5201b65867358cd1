use crate::domain::payment::ProcessorPaymentRequest;
use crate::domain::processor::{ProcessorHealth, ProcessorSpec};
use anyhow::Result;
use std::time::Duration;

pub mod http;
pub mod mock;

/// Result of one forwarding attempt, already classified for the worker loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    Success,
    /// Worth another attempt. `status` is `None` for transport errors and timeouts.
    Retryable { status: Option<u16>, reason: String },
    /// The processor will never accept this payment (e.g. duplicate id). Not an error.
    Terminal { status: u16 },
}

impl ForwardOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ForwardOutcome::Success => "success",
            ForwardOutcome::Retryable { .. } => "retryable",
            ForwardOutcome::Terminal { .. } => "terminal",
        }
    }

    /// Network errors, timeouts and 5xx mean the processor itself is in trouble.
    pub fn is_upstream_fault(&self) -> bool {
        matches!(
            self,
            ForwardOutcome::Retryable { status: None, .. }
                | ForwardOutcome::Retryable { status: Some(500..=599), .. }
        )
    }
}

#[async_trait::async_trait]
pub trait ProcessorClient: Send + Sync {
    async fn forward(
        &self,
        spec: &ProcessorSpec,
        request: &ProcessorPaymentRequest,
        deadline: Duration,
    ) -> ForwardOutcome;

    async fn probe_health(&self, spec: &ProcessorSpec, timeout: Duration) -> Result<ProcessorHealth>;

    async fn purge(&self, spec: &ProcessorSpec) -> Result<()>;
}
