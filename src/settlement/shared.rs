use crate::coordination::CoordinationStore;
use crate::domain::payment::{SettlementRecord, SummaryTotals};
use crate::domain::processor::{ProcessorId, ProcessorPair};
use crate::settlement::SettlementBook;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Book kept in the coordination store so every instance reports the same totals.
///
/// Per processor: a hash of correlation id to amount in minor units, and a
/// score-ordered set of correlation ids keyed by settlement time in seconds.
/// Re-recording an id overwrites it, so a payment is never counted twice.
pub struct SharedSettlements {
    store: Arc<dyn CoordinationStore>,
    processors: Arc<ProcessorPair>,
}

fn score(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_nanos()) / 1e9
}

impl SharedSettlements {
    pub fn new(store: Arc<dyn CoordinationStore>, processors: Arc<ProcessorPair>) -> Self {
        Self { store, processors }
    }

    fn amounts_key(&self, processor: ProcessorId) -> String {
        format!("{}:amounts", self.processors.get(processor).summary_key)
    }

    fn history_key(&self, processor: ProcessorId) -> String {
        format!("{}:history", self.processors.get(processor).summary_key)
    }
}

#[async_trait::async_trait]
impl SettlementBook for SharedSettlements {
    async fn record(&self, record: SettlementRecord) -> Result<()> {
        let id = record.correlation_id.to_string();
        self.store
            .hset(
                &self.amounts_key(record.processor),
                &id,
                &record.amount_minor.to_string(),
            )
            .await?;
        self.store
            .zadd(&self.history_key(record.processor), score(record.settled_at), &id)
            .await
    }

    async fn summary(
        &self,
        processor: ProcessorId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<SummaryTotals> {
        let ids = self
            .store
            .zrange_by_score(&self.history_key(processor), from.map(score), to.map(score))
            .await?;

        let amounts = self.store.hmget(&self.amounts_key(processor), &ids).await?;
        let mut totals = SummaryTotals::default();
        for (id, raw) in ids.iter().zip(amounts) {
            let Some(raw) = raw else {
                continue;
            };
            let amount: i64 = raw
                .parse()
                .with_context(|| format!("bad settled amount for {}: {}", id, raw))?;
            totals.add(1, amount);
        }
        Ok(totals)
    }

    async fn purge(&self) -> Result<()> {
        for id in ProcessorId::ALL {
            self.store.del(&self.amounts_key(id)).await?;
            self.store.del(&self.history_key(id)).await?;
        }
        Ok(())
    }
}
