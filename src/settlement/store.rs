use crate::domain::payment::{SettlementRecord, SummaryTotals};
use crate::settlement::bucket::TimeBucket;
use anyhow::Result;
use chrono::{DateTime, DurationRound, Utc};
use parking_lot::RwLock;

/// How a query was answered; lets callers see whether the precomputed
/// bucket aggregates were used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub aggregated_buckets: usize,
    pub scanned_buckets: usize,
}

/// Time-bucketed index of one processor's settlements.
///
/// Buckets are kept sorted by start so a range is located by binary search.
/// One lock covers ingest and query, so a query never sees a bucket whose
/// records and running totals disagree.
pub struct SettlementStore {
    width: chrono::Duration,
    buckets: RwLock<Vec<TimeBucket>>,
}

impl SettlementStore {
    pub fn new(width: chrono::Duration) -> Self {
        Self {
            width,
            buckets: RwLock::new(Vec::new()),
        }
    }

    pub fn add_record(&self, record: SettlementRecord) -> Result<()> {
        let start = record.settled_at.duration_trunc(self.width)?;
        let mut buckets = self.buckets.write();

        // Settlements mostly arrive in time order, so the tail is the usual hit.
        let idx = match buckets.last() {
            Some(last) if last.start == start => buckets.len() - 1,
            _ => match buckets.binary_search_by(|b| b.start.cmp(&start)) {
                Ok(idx) => idx,
                Err(idx) => {
                    buckets.insert(idx, TimeBucket::new(start, self.width));
                    idx
                }
            },
        };
        buckets[idx].push(record);
        Ok(())
    }

    /// Totals for settlements with `from <= settled_at < to`. Missing bounds are open.
    pub fn query(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<SummaryTotals> {
        Ok(self.query_with_stats(from, to)?.0)
    }

    pub fn query_with_stats(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<(SummaryTotals, QueryStats)> {
        let mut totals = SummaryTotals::default();
        let mut stats = QueryStats::default();
        let buckets = self.buckets.read();
        // First bucket that can hold a settlement at or after `from`; `from` is
        // never truncated, so any representable bound is valid.
        let first = from.map_or(0, |from| buckets.partition_point(|b| b.end <= from));

        for bucket in &buckets[first..] {
            if to.is_some_and(|to| bucket.start >= to) {
                break;
            }
            if bucket.within(from, to) {
                totals.add(bucket.count, bucket.sum_minor);
                stats.aggregated_buckets += 1;
                continue;
            }
            stats.scanned_buckets += 1;
            for record in &bucket.records {
                if from.is_some_and(|from| record.settled_at < from) {
                    continue;
                }
                if to.is_some_and(|to| record.settled_at >= to) {
                    continue;
                }
                totals.add(1, record.amount_minor);
            }
        }

        Ok((totals, stats))
    }

    pub fn purge(&self) {
        *self.buckets.write() = Vec::new();
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    pub fn record_count(&self) -> u64 {
        self.buckets.read().iter().map(|b| b.count).sum()
    }
}
