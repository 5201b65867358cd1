use crate::domain::payment::ProcessorPaymentRequest;
use crate::domain::processor::{ProcessorHealth, ProcessorId, ProcessorSpec};
use crate::gateways::{ForwardOutcome, ProcessorClient};
use crate::service::forwarder::classify_status;
use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Status code the mock uses to simulate a transport failure.
pub const NETWORK_ERROR: u16 = 0;

#[derive(Debug, Clone)]
pub struct ForwardCall {
    pub processor: ProcessorId,
    pub request: ProcessorPaymentRequest,
    pub deadline: Duration,
}

#[derive(Default)]
struct MockState {
    scripted: HashMap<ProcessorId, VecDeque<u16>>,
    steady: HashMap<ProcessorId, u16>,
    health: HashMap<ProcessorId, Option<(bool, u64)>>,
    calls: Vec<ForwardCall>,
    probes: Vec<ProcessorId>,
    purges: Vec<ProcessorId>,
}

/// In-process stand-in for both upstream processors.
///
/// Forward responses are taken from a per-processor script first, then from a
/// steady status (200 unless changed). Health answers are configurable; `None`
/// makes the probe fail outright.
#[derive(Clone, Default)]
pub struct MockProcessor {
    state: Arc<Mutex<MockState>>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, id: ProcessorId, statuses: &[u16]) {
        let mut state = self.state.lock();
        state.scripted.entry(id).or_default().extend(statuses.iter().copied());
    }

    pub fn set_steady_status(&self, id: ProcessorId, status: u16) {
        self.state.lock().steady.insert(id, status);
    }

    pub fn set_health(&self, id: ProcessorId, health: Option<(bool, u64)>) {
        self.state.lock().health.insert(id, health);
    }

    pub fn calls(&self) -> Vec<ForwardCall> {
        self.state.lock().calls.clone()
    }

    pub fn calls_to(&self, id: ProcessorId) -> usize {
        self.state.lock().calls.iter().filter(|c| c.processor == id).count()
    }

    pub fn probes(&self) -> usize {
        self.state.lock().probes.len()
    }

    pub fn purges(&self) -> Vec<ProcessorId> {
        self.state.lock().purges.clone()
    }
}

#[async_trait::async_trait]
impl ProcessorClient for MockProcessor {
    async fn forward(
        &self,
        spec: &ProcessorSpec,
        request: &ProcessorPaymentRequest,
        deadline: Duration,
    ) -> ForwardOutcome {
        let status = {
            let mut state = self.state.lock();
            state.calls.push(ForwardCall {
                processor: spec.id,
                request: request.clone(),
                deadline,
            });
            let scripted = state.scripted.get_mut(&spec.id).and_then(VecDeque::pop_front);
            scripted.unwrap_or_else(|| state.steady.get(&spec.id).copied().unwrap_or(200))
        };

        if status == NETWORK_ERROR {
            return ForwardOutcome::Retryable {
                status: None,
                reason: "NETWORK_ERROR: mock connection refused".to_string(),
            };
        }
        classify_status(status)
    }

    async fn probe_health(&self, spec: &ProcessorSpec, _timeout: Duration) -> Result<ProcessorHealth> {
        let health = {
            let mut state = self.state.lock();
            state.probes.push(spec.id);
            state.health.get(&spec.id).copied().unwrap_or(Some((false, 0)))
        };
        let (failing, min_response_time) =
            health.ok_or_else(|| anyhow!("mock health endpoint for {} unreachable", spec.id))?;
        Ok(ProcessorHealth {
            failing,
            min_response_time,
            last_checked: chrono::Utc::now(),
        })
    }

    async fn purge(&self, spec: &ProcessorSpec) -> Result<()> {
        self.state.lock().purges.push(spec.id);
        Ok(())
    }
}
