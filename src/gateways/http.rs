use crate::domain::payment::ProcessorPaymentRequest;
use crate::domain::processor::{ProcessorHealth, ProcessorSpec};
use crate::gateways::{ForwardOutcome, ProcessorClient};
use crate::service::forwarder::classify_status;
use anyhow::{bail, Result};
use serde::Deserialize;
use std::time::Duration;

pub const TOKEN_HEADER: &str = "X-Rinha-Token";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    failing: bool,
    min_response_time: u64,
}

/// Talks to the upstream processors over HTTP. One client is shared by every
/// worker and the health monitor.
#[derive(Clone)]
pub struct HttpProcessorClient {
    pub client: reqwest::Client,
}

impl HttpProcessorClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ProcessorClient for HttpProcessorClient {
    async fn forward(
        &self,
        spec: &ProcessorSpec,
        request: &ProcessorPaymentRequest,
        deadline: Duration,
    ) -> ForwardOutcome {
        let resp = self
            .client
            .post(spec.payments_url())
            .header(TOKEN_HEADER, &spec.token)
            .json(request)
            .timeout(deadline)
            .send()
            .await;

        match resp {
            Ok(r) => classify_status(r.status().as_u16()),
            Err(e) if e.is_timeout() => ForwardOutcome::Retryable {
                status: None,
                reason: "TIMEOUT".to_string(),
            },
            Err(e) => ForwardOutcome::Retryable {
                status: e.status().map(|s| s.as_u16()),
                reason: format!("NETWORK_ERROR: {}", e),
            },
        }
    }

    async fn probe_health(&self, spec: &ProcessorSpec, timeout: Duration) -> Result<ProcessorHealth> {
        let resp = self
            .client
            .get(spec.health_url())
            .header(TOKEN_HEADER, &spec.token)
            .timeout(timeout)
            .send()
            .await?;

        if resp.status() != reqwest::StatusCode::OK {
            bail!("health probe for {} returned HTTP_{}", spec.id, resp.status().as_u16());
        }

        let body: HealthResponse = resp.json().await?;
        Ok(ProcessorHealth {
            failing: body.failing,
            min_response_time: body.min_response_time,
            last_checked: chrono::Utc::now(),
        })
    }

    async fn purge(&self, spec: &ProcessorSpec) -> Result<()> {
        let resp = self
            .client
            .post(spec.purge_url())
            .header(TOKEN_HEADER, &spec.token)
            .timeout(spec.timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("purge on {} returned HTTP_{}", spec.id, resp.status().as_u16());
        }
        Ok(())
    }
}
