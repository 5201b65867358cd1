use crate::coordination::CoordinationStore;
use crate::domain::payment::PaymentJob;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// FIFO of pending jobs, kept in the coordination store's list so every
/// instance drains the same backlog.
#[derive(Clone)]
pub struct PaymentQueue {
    store: Arc<dyn CoordinationStore>,
    key: String,
}

impl PaymentQueue {
    pub fn new(store: Arc<dyn CoordinationStore>, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
        }
    }

    pub async fn enqueue(&self, job: &PaymentJob) -> Result<()> {
        let payload = serde_json::to_string(job)?;
        self.store.rpush(&self.key, &payload).await
    }

    /// Waits up to `wait` for a job. Undecodable entries are logged and skipped.
    pub async fn dequeue(&self, wait: Duration) -> Result<Option<PaymentJob>> {
        let Some(raw) = self.store.blpop(&self.key, wait).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<PaymentJob>(&raw) {
            Ok(job) => Ok(Some(job)),
            Err(err) => {
                tracing::warn!("discarding undecodable queue entry {:?}: {}", raw, err);
                Ok(None)
            }
        }
    }

    pub async fn len(&self) -> Result<u64> {
        self.store.llen(&self.key).await
    }
}
