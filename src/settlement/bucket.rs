use crate::domain::payment::SettlementRecord;
use chrono::{DateTime, Utc};

/// Settlements whose timestamps truncate to the same instant, with their
/// running count and sum so a fully covered bucket costs O(1) to aggregate.
#[derive(Debug, Clone)]
pub struct TimeBucket {
    pub start: DateTime<Utc>,
    /// Exclusive.
    pub end: DateTime<Utc>,
    pub records: Vec<SettlementRecord>,
    pub count: u64,
    pub sum_minor: i64,
}

impl TimeBucket {
    pub fn new(start: DateTime<Utc>, width: chrono::Duration) -> Self {
        Self {
            start,
            end: start + width,
            records: Vec::new(),
            count: 0,
            sum_minor: 0,
        }
    }

    pub fn push(&mut self, record: SettlementRecord) {
        self.count += 1;
        self.sum_minor += record.amount_minor;
        self.records.push(record);
    }

    /// True when every instant of the bucket lies inside `[from, to)`.
    pub fn within(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
        from.map_or(true, |from| self.start >= from) && to.map_or(true, |to| self.end <= to)
    }
}
