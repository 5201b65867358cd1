use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Response time reported for a processor whose probe failed.
pub const UNREACHABLE_RESPONSE_TIME_MS: u64 = 9_999;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorId {
    Default,
    Fallback,
}

impl ProcessorId {
    pub const ALL: [ProcessorId; 2] = [ProcessorId::Default, ProcessorId::Fallback];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorId::Default => "default",
            ProcessorId::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static configuration of one upstream processor. Immutable after load.
#[derive(Debug, Clone)]
pub struct ProcessorSpec {
    pub id: ProcessorId,
    pub base_url: String,
    pub token: String,
    /// Fixed per-call budget; the forwarding deadline adds measured latency on top.
    pub timeout: Duration,
    /// Prefix for the keys this processor's settlements live under in the shared backend.
    pub summary_key: String,
}

impl ProcessorSpec {
    pub fn new(id: ProcessorId, base_url: &str, token: &str, timeout: Duration) -> Self {
        Self {
            id,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout,
            summary_key: format!("summary:{}", id.as_str()),
        }
    }

    pub fn payments_url(&self) -> String {
        format!("{}/payments", self.base_url)
    }

    pub fn health_url(&self) -> String {
        format!("{}/payments/service-health", self.base_url)
    }

    pub fn purge_url(&self) -> String {
        format!("{}/admin/purge-payments", self.base_url)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorPair {
    pub default: ProcessorSpec,
    pub fallback: ProcessorSpec,
}

impl ProcessorPair {
    pub fn get(&self, id: ProcessorId) -> &ProcessorSpec {
        match id {
            ProcessorId::Default => &self.default,
            ProcessorId::Fallback => &self.fallback,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessorSpec> {
        [&self.default, &self.fallback].into_iter()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorHealth {
    pub failing: bool,
    pub min_response_time: u64,
    #[serde(default = "chrono::Utc::now")]
    pub last_checked: chrono::DateTime<chrono::Utc>,
}

impl ProcessorHealth {
    pub fn healthy(min_response_time: u64, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            failing: false,
            min_response_time,
            last_checked: now,
        }
    }

    pub fn unreachable(now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            failing: true,
            min_response_time: UNREACHABLE_RESPONSE_TIME_MS,
            last_checked: now,
        }
    }
}

/// The fleet-wide routing choice. `processor == None` means both upstreams are down.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveDecision {
    pub processor: Option<ProcessorId>,
    /// Last measured `minResponseTime` of the selected processor, in ms.
    pub latency_ms: u64,
    pub decided_at: chrono::DateTime<chrono::Utc>,
}

impl ActiveDecision {
    pub fn label(&self) -> String {
        match self.processor {
            Some(id) => format!("{}({}ms)", id, self.latency_ms),
            None => "none".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HealthSnapshot {
    pub default: Option<ProcessorHealth>,
    pub fallback: Option<ProcessorHealth>,
}

impl HealthSnapshot {
    pub fn get(&self, id: ProcessorId) -> Option<&ProcessorHealth> {
        match id {
            ProcessorId::Default => self.default.as_ref(),
            ProcessorId::Fallback => self.fallback.as_ref(),
        }
    }
}
