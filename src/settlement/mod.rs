//! Record of settled payments per processor, answering time-range summaries.

use crate::domain::payment::{SettlementRecord, SummaryTotals};
use crate::domain::processor::ProcessorId;
use anyhow::Result;
use chrono::{DateTime, Utc};

pub mod bucket;
pub mod shared;
pub mod store;

pub use store::{QueryStats, SettlementStore};

#[async_trait::async_trait]
pub trait SettlementBook: Send + Sync {
    async fn record(&self, record: SettlementRecord) -> Result<()>;

    /// Totals for `from <= settled_at < to`; `None` bounds are open.
    async fn summary(
        &self,
        processor: ProcessorId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<SummaryTotals>;

    async fn purge(&self) -> Result<()>;
}

/// Process-local book: one bucketed store per processor.
pub struct InMemorySettlements {
    default: SettlementStore,
    fallback: SettlementStore,
}

impl InMemorySettlements {
    pub fn new(bucket_width: chrono::Duration) -> Self {
        Self {
            default: SettlementStore::new(bucket_width),
            fallback: SettlementStore::new(bucket_width),
        }
    }

    pub fn store(&self, processor: ProcessorId) -> &SettlementStore {
        match processor {
            ProcessorId::Default => &self.default,
            ProcessorId::Fallback => &self.fallback,
        }
    }
}

#[async_trait::async_trait]
impl SettlementBook for InMemorySettlements {
    async fn record(&self, record: SettlementRecord) -> Result<()> {
        self.store(record.processor).add_record(record)
    }

    async fn summary(
        &self,
        processor: ProcessorId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<SummaryTotals> {
        self.store(processor).query(from, to)
    }

    async fn purge(&self) -> Result<()> {
        self.default.purge();
        self.fallback.purge();
        Ok(())
    }
}
