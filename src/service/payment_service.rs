use crate::domain::payment::{
    to_minor_units, CreatePaymentRequest, ErrorEnvelope, ErrorPayload, PaymentJob, ProcessorSummary,
    SummaryResponse,
};
use crate::domain::processor::{ProcessorId, ProcessorPair};
use crate::gateways::ProcessorClient;
use crate::queue::PaymentQueue;
use crate::settlement::SettlementBook;
use crate::telemetry::PipelineMetrics;
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::Arc;

pub type ApiError = (StatusCode, ErrorEnvelope);

#[derive(Clone)]
pub struct PaymentService {
    pub queue: PaymentQueue,
    pub settlements: Arc<dyn SettlementBook>,
    pub client: Arc<dyn ProcessorClient>,
    pub processors: Arc<ProcessorPair>,
    pub metrics: PipelineMetrics,
}

impl PaymentService {
    /// Validates and stamps the payment, then hands the queue push to a
    /// background task. Returns as soon as the job exists.
    pub fn enqueue_payment(&self, req: CreatePaymentRequest) -> Result<PaymentJob, ApiError> {
        let job = build_job(&req, Utc::now())?;
        self.metrics.payments_accepted.inc();

        let queue = self.queue.clone();
        let metrics = self.metrics.clone();
        let queued = job.clone();
        tokio::spawn(async move {
            if let Err(err) = queue.enqueue(&queued).await {
                metrics.payments_dropped.with_label_values(&["enqueue_failed"]).inc();
                tracing::error!("failed to enqueue payment {}: {:#}", queued.correlation_id, err);
            }
        });
        Ok(job)
    }

    pub async fn summary(&self, from: Option<&str>, to: Option<&str>) -> Result<SummaryResponse, ApiError> {
        let from = parse_bound("from", from)?;
        let to = parse_bound("to", to)?;
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err((
                    StatusCode::BAD_REQUEST,
                    err("INVALID_RANGE", "from must not be after to"),
                ));
            }
        }

        let (default, fallback) = tokio::try_join!(
            self.settlements.summary(ProcessorId::Default, from, to),
            self.settlements.summary(ProcessorId::Fallback, from, to)
        )
        .map_err(internal)?;

        Ok(SummaryResponse {
            default: ProcessorSummary::from(default),
            fallback: ProcessorSummary::from(fallback),
        })
    }

    /// Clears local settlements and asks both processors to do the same.
    /// Upstream purges are best effort and never fail the call.
    pub async fn purge(&self) -> Result<(), ApiError> {
        self.settlements.purge().await.map_err(internal)?;

        for spec in self.processors.iter() {
            let client = self.client.clone();
            let spec = spec.clone();
            tokio::spawn(async move {
                match client.purge(&spec).await {
                    Ok(()) => tracing::info!("purged payments on {}", spec.id),
                    Err(err) => tracing::warn!("purge on {} failed: {:#}", spec.id, err),
                }
            });
        }
        Ok(())
    }
}

fn build_job(req: &CreatePaymentRequest, now: DateTime<Utc>) -> Result<PaymentJob, ApiError> {
    match to_minor_units(req.amount) {
        Some(amount_minor) if amount_minor > 0 => Ok(PaymentJob::new(req.correlation_id, amount_minor, now)),
        _ => Err((
            StatusCode::BAD_REQUEST,
            err("INVALID_AMOUNT", "amount must be positive"),
        )),
    }
}

/// RFC3339, or a naive `YYYY-MM-DDTHH:MM:SS[.fff]` read as UTC. Blank means unbounded.
fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Some(naive.and_utc()));
    }
    Err((
        StatusCode::BAD_REQUEST,
        ErrorEnvelope {
            error: ErrorPayload {
                code: "INVALID_TIMESTAMP".to_string(),
                message: format!("{} is not a valid timestamp", name),
                details: Some(raw.to_string()),
            },
        },
    ))
}

fn err(code: &str, message: &str) -> ErrorEnvelope {
    ErrorEnvelope {
        error: ErrorPayload {
            code: code.to_string(),
            message: message.to_string(),
            details: None,
        },
    }
}

fn internal(e: anyhow::Error) -> ApiError {
    tracing::error!("request failed: {:#}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, err("INTERNAL_ERROR", &e.to_string()))
}
