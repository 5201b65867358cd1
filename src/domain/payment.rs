use crate::domain::processor::ProcessorId;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Currency amounts are carried as integer minor units (cents) end to end.
pub const MINOR_UNIT_SCALE: u32 = 2;

pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

pub fn from_minor_units(amount_minor: i64) -> Decimal {
    Decimal::new(amount_minor, MINOR_UNIT_SCALE)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub correlation_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Accepted for compatibility, never trusted.
    #[serde(default)]
    pub requested_at: Option<String>,
}

/// A submission in flight between accept and settlement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentJob {
    pub correlation_id: Uuid,
    pub amount_minor: i64,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub attempt: u32,
}

impl PaymentJob {
    pub fn new(correlation_id: Uuid, amount_minor: i64, requested_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            correlation_id,
            amount_minor,
            requested_at,
            attempt: 0,
        }
    }

    pub fn to_processor_request(&self) -> ProcessorPaymentRequest {
        ProcessorPaymentRequest {
            correlation_id: self.correlation_id,
            amount: from_minor_units(self.amount_minor),
            requested_at: self.requested_at,
        }
    }

    pub fn settle(&self, processor: ProcessorId) -> SettlementRecord {
        SettlementRecord {
            correlation_id: self.correlation_id,
            amount_minor: self.amount_minor,
            settled_at: self.requested_at,
            processor,
        }
    }
}

/// Body of `POST {processor}/payments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorPaymentRequest {
    pub correlation_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub requested_at: chrono::DateTime<chrono::Utc>,
}

/// Immutable fact: a payment accepted by a processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRecord {
    pub correlation_id: Uuid,
    pub amount_minor: i64,
    pub settled_at: chrono::DateTime<chrono::Utc>,
    pub processor: ProcessorId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryTotals {
    pub count: u64,
    pub sum_minor: i64,
}

impl SummaryTotals {
    pub fn add(&mut self, count: u64, sum_minor: i64) {
        self.count += count;
        self.sum_minor += sum_minor;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorSummary {
    pub total_requests: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
}

impl From<SummaryTotals> for ProcessorSummary {
    fn from(totals: SummaryTotals) -> Self {
        Self {
            total_requests: totals.count,
            total_amount: from_minor_units(totals.sum_minor),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryResponse {
    pub default: ProcessorSummary,
    pub fallback: ProcessorSummary,
}

#[derive(Debug, Deserialize, Default)]
pub struct SummaryQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}
